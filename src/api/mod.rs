//! HTTP surface: operator dashboard API, chat simulator and the provider
//! webhook.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::app_router;
pub use state::AppState;
