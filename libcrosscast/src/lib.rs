//! Core library for Crosscast
//!
//! Crosscast links social accounts over OAuth and dispatches scheduled posts
//! to them on a timer tick. The library carries everything the binaries
//! share: configuration, the credential store, provider adapters, the token
//! lifecycle manager, and the dispatch loop.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod providers;
pub mod tokens;
pub mod types;

pub use config::Config;
pub use db::Database;
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{CrosscastError, ProviderError, Result};
pub use providers::{build_registry, Provider, ProviderRegistry};
pub use tokens::TokenBroker;
pub use types::{LinkedAccount, Platform, ScheduledPost, TokenSet};
