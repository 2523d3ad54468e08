mod api;
mod credentials;
mod endpoints;
mod query_cache;
mod session_state;
pub mod toasts;

pub use api::*;
pub use credentials::*;
pub use endpoints::*;
pub use query_cache::*;
pub use session_state::*;
