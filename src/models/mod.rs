//! Request and Response models for the operations API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{InvalidateRequest, PushRequest, UrgeRequest};
pub use responses::{
    CleanupResponse, HealthResponse, InvalidateResponse, PushResponse, StatsResponse,
    UrgeResponse,
};
