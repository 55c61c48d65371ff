mod doh;
mod plain;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use hickory_proto::op::Message;
use tokio::time::Instant;

pub use doh::DohUpstream;
pub use plain::PlainUpstream;

/// A resolver the dispatcher forwards queries to. The transport is fixed at construction.
pub enum Upstream {
    Plain(PlainUpstream),
    Doh(DohUpstream),
}

impl Upstream {
    pub fn plain(addr: SocketAddr, use_tcp: bool) -> Self {
        Upstream::Plain(PlainUpstream::new(addr, use_tcp))
    }

    pub fn doh(url: &str, dial_addr: Option<SocketAddr>, skip_verify: bool) -> anyhow::Result<Self> {
        DohUpstream::new(url, dial_addr, skip_verify).map(Upstream::Doh)
    }

    /// Sends `query` and waits for the reply until `deadline`. Returns the reply and the round-trip time.
    pub async fn exchange(&self, query: &Message, deadline: Instant) -> anyhow::Result<(Message, Duration)> {
        let started_at = Instant::now();
        let reply = match self {
            Upstream::Plain(upstream) => tokio::time::timeout_at(deadline, upstream.exchange(query)).await,
            Upstream::Doh(upstream) => tokio::time::timeout_at(deadline, upstream.exchange(query)).await,
        }
        .with_context(|| format!("{}: no reply before the deadline", self))??;

        Ok((reply, started_at.elapsed()))
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Plain(upstream) => fmt::Display::fmt(upstream, f),
            Upstream::Doh(upstream) => fmt::Display::fmt(upstream, f),
        }
    }
}
