pub mod channel;
pub mod packet;
pub mod tun;

pub use channel::{DuplexPacketChannel, MemoryChannel, MemoryChannelHandle, ReadOutcome};
pub use tun::{configure_interface, TunChannel};
