use std::net::SocketAddr;
use std::time::Duration;

use forkdns_lists::{DomainList, IpList, PatternList};

use crate::DEFAULT_QUERY_TIMEOUT;

/// Everything a [`Dispatcher`](crate::Dispatcher) is built from. Lists are already loaded.
#[derive(Debug)]
pub struct DispatcherConfig {
    pub local_server: Option<SocketAddr>,
    pub local_use_tcp: bool,
    /// Don't send unusual queries to the local server and don't let unusual local replies skip the IP filters
    pub local_block_unusual_type: bool,
    pub local_allowed_ips: Option<IpList>,
    pub local_blocked_ips: Option<IpList>,
    pub local_forced_domains: Option<DomainList>,
    pub local_blocked_domains: Option<DomainList>,
    pub local_blocked_patterns: Option<PatternList>,

    /// Plain DNS server, or the address to dial for the DoH host when `remote_doh_url` is set
    pub remote_server: Option<SocketAddr>,
    pub remote_use_tcp: bool,
    pub remote_doh_url: Option<String>,
    pub remote_skip_verify: bool,
    pub remote_delay_start: Duration,
    pub remote_ecs_subnet: Option<String>,

    pub query_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            local_server: None,
            local_use_tcp: false,
            local_block_unusual_type: false,
            local_allowed_ips: None,
            local_blocked_ips: None,
            local_forced_domains: None,
            local_blocked_domains: None,
            local_blocked_patterns: None,
            remote_server: None,
            remote_use_tcp: false,
            remote_doh_url: None,
            remote_skip_verify: false,
            remote_delay_start: Duration::ZERO,
            remote_ecs_subnet: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}
