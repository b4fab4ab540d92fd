pub mod core;
pub mod inspector;
pub mod network;
pub mod security;
pub mod setup_logger;
pub mod storage;

pub use crate::core::{Configuration, FilterService, TunnelError, TunnelResult};
pub use crate::security::Blocklist;
