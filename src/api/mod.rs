//! Operations API.
//!
//! A small JSON surface for inspecting feeds, their delivery records and
//! daily limits, retrying failed feeds and editing connection messages.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::ApiServer;
