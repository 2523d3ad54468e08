pub mod http;
pub mod notifiers;
pub mod storage;
