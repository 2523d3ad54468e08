mod auth;
mod cache;
mod endpoint;
mod error;
mod notification;
mod request;
mod session;
mod storage;
mod transport;

pub use auth::*;
pub use cache::*;
pub use endpoint::*;
pub use error::*;
pub use notification::*;
pub use request::*;
pub use session::*;
pub use storage::*;
pub use transport::*;
