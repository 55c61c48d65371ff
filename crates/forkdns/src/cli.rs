use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use forkdns_lists::{DomainList, IpList, PatternList};

use crate::DispatcherConfig;

#[derive(Parser)]
#[command(version, name = "forkdns")]
pub struct Args {
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:53")]
    pub bind: SocketAddr,
    #[arg(long, value_name = "ADDR")]
    pub local_server: Option<SocketAddr>,
    /// Keep non A/AAAA queries away from the local server
    #[arg(long, default_value_t = false)]
    pub local_block_unusual_type: bool,
    /// Plain DNS server, or the address to dial for the DoH host
    #[arg(long, value_name = "ADDR")]
    pub remote_server: Option<SocketAddr>,
    #[arg(long, value_name = "URL")]
    pub remote_doh_url: Option<String>,
    #[arg(long, default_value_t = false)]
    pub remote_skip_verify: bool,
    /// Milliseconds to give the local server before the remote server is queried
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub remote_delay_start: u64,
    #[arg(long, value_name = "SIDE")]
    pub use_tcp: Option<UseTcp>,
    #[arg(long, value_name = "PATH")]
    pub local_allowed_ip_list: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    pub local_blocked_ip_list: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    pub local_forced_domain_list: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    pub local_blocked_domain_list: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    pub local_blocked_domain_regex: Option<PathBuf>,
    #[arg(long, value_name = "CIDR")]
    pub remote_ecs_subnet: Option<String>,
    #[arg(long, value_name = "MS", default_value_t = 3000, value_parser = clap::value_parser!(u64).range(1..))]
    pub query_timeout: u64,
    /// Milliseconds a TCP client may stay silent before it is disconnected
    #[arg(long, value_name = "MS", default_value_t = 10000, value_parser = clap::value_parser!(u64).range(1..))]
    pub tcp_idle_timeout: u64,
    #[arg(long, value_name = "WORKERS", default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub workers: u8,
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Which upstreams are queried over TCP instead of UDP
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UseTcp {
    Local,
    Remote,
    Both,
}

impl Args {
    /// Loads every configured list.
    pub fn dispatcher_config(&self) -> anyhow::Result<DispatcherConfig> {
        let use_tcp = self.use_tcp;

        Ok(DispatcherConfig {
            local_server: self.local_server,
            local_use_tcp: matches!(use_tcp, Some(UseTcp::Local | UseTcp::Both)),
            local_block_unusual_type: self.local_block_unusual_type,
            local_allowed_ips: load(
                self.local_allowed_ip_list.as_deref(),
                IpList::from_path,
                "allowed IP list",
            )?,
            local_blocked_ips: load(
                self.local_blocked_ip_list.as_deref(),
                IpList::from_path,
                "blocked IP list",
            )?,
            local_forced_domains: load(
                self.local_forced_domain_list.as_deref(),
                DomainList::from_path,
                "forced domain list",
            )?,
            local_blocked_domains: load(
                self.local_blocked_domain_list.as_deref(),
                DomainList::from_path,
                "blocked domain list",
            )?,
            local_blocked_patterns: load(
                self.local_blocked_domain_regex.as_deref(),
                PatternList::from_path,
                "blocked domain regex list",
            )?,
            remote_server: self.remote_server,
            remote_use_tcp: matches!(use_tcp, Some(UseTcp::Remote | UseTcp::Both)),
            remote_doh_url: self.remote_doh_url.clone(),
            remote_skip_verify: self.remote_skip_verify,
            remote_delay_start: Duration::from_millis(self.remote_delay_start),
            remote_ecs_subnet: self.remote_ecs_subnet.clone(),
            query_timeout: Duration::from_millis(self.query_timeout),
        })
    }
}

fn load<T, E>(
    path: Option<&Path>,
    from_path: impl FnOnce(&Path) -> Result<T, E>,
    what: &str,
) -> anyhow::Result<Option<T>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let Some(path) = path else {
        return Ok(None);
    };
    let list = from_path(path).with_context(|| format!("failed to load the {}", what))?;
    tracing::info!(path = %path.display(), "Loaded the {}", what);

    Ok(Some(list))
}
