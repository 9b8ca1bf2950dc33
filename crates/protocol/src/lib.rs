#![forbid(unsafe_code)]

mod action;
mod connection;
pub mod coord;
mod frame;
mod parse;
mod rpc;

pub use action::Action;
pub use connection::Connection;
pub use coord::{CoordCommand, LeaseId, WatchEvent};
pub use frame::Frame;
pub use parse::Parse;
pub use rpc::{Credentials, Method, Mutation, Request, Response, Status};
