#![forbid(unsafe_code)]

pub mod coordinator;
pub mod handler;
mod serve;

pub use coordinator::handle_coordinator;
pub use handler::handle_connection;
pub use serve::{serve_coordinator, serve_rpc};
