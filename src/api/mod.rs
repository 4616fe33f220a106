//! Omni Pipeline Cloud API Module
//! REST glue over the processing Coordinator

pub mod handlers;
pub mod routes;
pub mod types;

pub use routes::create_router;
pub use types::*;
