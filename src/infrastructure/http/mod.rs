mod executor;
mod offline;

pub use executor::*;
pub use offline::*;
