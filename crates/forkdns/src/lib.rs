#[cfg(test)]
pub(crate) mod test_utils;

mod logging;
pub use logging::setup_logging;
mod cli;
pub use cli::{Args, UseTcp};
mod config;
pub use config::DispatcherConfig;
mod connection;
pub use connection::Connection;
mod dispatcher;
pub use dispatcher::{Dispatcher, PooledTimer, TimerPool};
mod ecs;
pub use ecs::EcsOption;
mod server;
pub use server::DnsServer;
mod upstream;
pub use upstream::Upstream;
mod util;

use std::time::Duration;

/// Receive buffer size for DNS messages over UDP
pub const MAX_UDP_MESSAGE_SIZE: usize = 4096;
/// UDP payload size advertised in OPT records created by this server
pub const OPT_UDP_PAYLOAD_SIZE: u16 = 2048;
/// Largest DoH response body accepted
pub const MAX_DOH_BODY_SIZE: usize = 2048;
/// Per-request deadline shared by both upstreams
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a TCP client may stay silent between queries
pub const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
