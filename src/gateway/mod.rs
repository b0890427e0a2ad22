//! Gateway server implementation

pub mod auth;
pub mod compactor;
pub mod dispatcher;
mod router;
mod server;
pub mod session;

pub use auth::{AuthState, AuthenticatedUser, auth_middleware};
pub use dispatcher::ToolContext;
pub use router::{AppState, ChatRequest, ConfirmRequest, create_router};
pub use server::Gateway;
pub use session::{ChatEvent, StreamingSession};
