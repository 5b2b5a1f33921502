pub mod catalog;
pub mod protocol;
pub mod server;
pub mod sse;
