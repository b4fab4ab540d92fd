pub mod config;
pub mod error;
pub mod service;
pub mod stats;
pub mod tunnel;

pub use config::Configuration;
pub use error::{TunnelError, TunnelResult};
pub use service::FilterService;
pub use stats::{PumpStats, StatsSnapshot};
pub use tunnel::{PacketPump, PumpExit, PumpOptions, PumpState, StopReason};
