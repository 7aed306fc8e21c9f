//! Site Bulletin
//!
//! Client-side synchronization core for a daily bulletin board:
//! - store: snapshot, internal state and the reducer over it
//! - commands: loads and mutations against the gateway
//! - session: the signed-in identity
//! - views: projections for the view layer
//! - app: wiring plus the identity watcher

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod session;
pub mod store;
pub mod views;

#[cfg(test)]
mod testing;

pub use commands::{BulletinStore, LoadOutcome};
pub use config::{BulletinConfig, GatewayConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use models::{ActionItem, NewActionItem, NewPost, Post, User};
pub use session::{Identity, Session, SessionProvider};
pub use store::{LoadPhase, Snapshot};
