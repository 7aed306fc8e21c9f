//! Bulletin Gateway
//!
//! Layered architecture:
//! - domain: tables, rows, queries and errors
//! - repository: the `Gateway` contract plus embedded (SQLite) and hosted
//!   (PostgREST over HTTP) implementations

mod domain;
mod repository;

pub use domain::{
    Column, ColumnKind, Direction, Filter, GatewayError, GatewayResult, Order, Query, Row, Table,
};
pub use repository::{now_timestamp, query_params, Gateway, RestGateway, SqliteGateway};
