//! Repository Layer
//!
//! The gateway contract and its implementations.

mod db;
mod rest;
mod traits;


pub use db::{now_timestamp, SqliteGateway};
pub use rest::{query_params, RestGateway};
pub use traits::Gateway;
