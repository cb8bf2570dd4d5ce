// Relay module
//
// - config: relay daemon configuration rendering and writing
// - supervisor: spawning, output relaying and termination of the relay daemon

pub mod config;
pub mod supervisor;

pub use config::{RelayConfig, WrittenRelayConfig};
pub use supervisor::{OUTPUT_PREFIX, RelaySupervisor};
