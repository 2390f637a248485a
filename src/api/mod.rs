pub mod error;
pub mod extract;
pub mod guards;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{create_router, init_tracing, run_server};
pub use state::AppState;
