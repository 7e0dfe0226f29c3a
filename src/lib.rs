// Public modules
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod logging;
pub mod observability;
pub mod paste;
pub mod plugins;
pub mod session;
/// Scripted [`ChatApi`] for tests. Public so `tests/` and crates embedding
/// kindling can drive a [`Session`] offline; not used by the binary.
pub mod testing;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{Campfire, ChatApi};
pub use config::Config;
pub use dispatch::{DispatchReport, Dispatcher, Handler};
pub use error::{Error, Result};
pub use event::Event;
pub use observability::register_biometrics;
pub use session::{Account, Room, RoomRef, Session};
pub use types::*;
