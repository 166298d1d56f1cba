//! API Module
//!
//! HTTP handlers and routing for the operations API.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
