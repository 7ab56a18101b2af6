mod error;
mod handlers;
mod params;
mod router;
mod types;

pub use router::{handle_request, shutdown};
pub use types::{AppState, Request};
