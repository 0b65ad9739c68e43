//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (net::listener)
//!     → server.rs (router, middleware stack)
//!     → request.rs (request ID assigned, exposed to spans)
//!     → handler (AppState: config, db, cache)
//!     → response.rs (JSON body, ResourceError → status)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{build_router, AppState};
