use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context as _;
use hickory_proto::op::Message;
use tokio::net::{TcpStream, UdpSocket};

use crate::connection::Connection;

/// Classic DNS over UDP or TCP.
pub struct PlainUpstream {
    addr: SocketAddr,
    use_tcp: bool,
}

impl PlainUpstream {
    pub fn new(addr: SocketAddr, use_tcp: bool) -> Self {
        PlainUpstream { addr, use_tcp }
    }

    /// UDP replies with the TC bit set are retried once over TCP.
    pub async fn exchange(&self, query: &Message) -> anyhow::Result<Message> {
        let encoded = query.to_vec().context("error while encoding the query")?;
        let mut buf = Vec::new();

        let mut force_tcp = self.use_tcp;
        loop {
            let mut connection = if force_tcp {
                Connection::Tcp(
                    TcpStream::connect(self.addr)
                        .await
                        .context("TCP: error while connecting to the upstream resolver")?,
                )
            } else {
                let local_addr: SocketAddr = if self.addr.is_ipv6() {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(local_addr)
                    .await
                    .context("UDP: unable to bind a socket")?;
                socket
                    .connect(self.addr)
                    .await
                    .context("UDP: error while connecting to the upstream resolver")?;
                Connection::Udp((Arc::new(socket), None))
            };

            connection
                .send_encoded_packet(&encoded)
                .await
                .context("error while forwarding the query")?;

            let reply = loop {
                let length = connection
                    .read(&mut buf)
                    .await
                    .context("error while reading the reply")?;
                let reply = Message::from_vec(&buf[..length]).context("error while decoding the reply")?;

                if reply.id() == query.id() {
                    break reply;
                }
                if connection.is_tcp() {
                    anyhow::bail!("reply id {} doesn't match query id {}", reply.id(), query.id());
                }
                // Stray datagram, keep waiting for the real reply
                tracing::debug!(id = reply.id(), "Discarding a UDP reply with a mismatched id");
            };

            if reply.truncated() {
                if connection.is_tcp() {
                    anyhow::bail!("reply truncation when using TCP");
                }
                tracing::debug!("Reply is truncated, retrying over TCP");
                force_tcp = true;
                continue;
            }

            break Ok(reply);
        }
    }
}

impl fmt::Display for PlainUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tcp { "tcp" } else { "udp" };
        write!(f, "{}://{}", scheme, self.addr)
    }
}
