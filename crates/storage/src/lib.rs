#![forbid(unsafe_code)]

pub mod api;
mod config;
mod expire;
mod hash;
mod keyspace;
mod list;
mod marshal;
mod range;
mod store;
mod string;
mod task;
mod zset;

pub use api::{Common, Hashes, Lists, SortedSets, Strings};
pub use config::StoreConfig;
pub use expire::{Expirable, Expiration};
pub use hash::{HashStore, HashValue};
pub use list::{ListStore, ListValue};
pub use marshal::Marshal;
pub use range::ScoreBound;
pub use store::Store;
pub use string::{StringStore, StringValue};
pub use task::spawn_periodic;
pub use zset::{ScoredMember, SortedSetStore, SortedSetValue};
