//! Domain Layer
//!
//! Tables, rows, queries and the error vocabulary shared by every gateway.
//! This layer has NO storage dependencies.

mod error;
mod query;
mod table;

pub use error::{GatewayError, GatewayResult};
pub use query::{Direction, Filter, Order, Query};
pub use table::{Column, ColumnKind, Row, Table};
