use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpStream, UdpSocket};

use crate::MAX_UDP_MESSAGE_SIZE;

/// A DNS transport shared by the listener and the plain upstream client.
///
/// UDP sockets either carry an explicit peer (listener side) or are connected (client side).
pub enum Connection {
    Tcp(TcpStream),
    Udp((Arc<UdpSocket>, Option<SocketAddr>)),
}

impl Connection {
    pub async fn send_encoded_packet(&mut self, src: &[u8]) -> anyhow::Result<()> {
        match self {
            Connection::Tcp(socket) => {
                let length = u16::try_from(src.len())
                    .context("TCP: DNS message doesn't fit into a length prefix")?
                    .to_be_bytes();
                socket
                    .write_all(&length)
                    .await
                    .context("TCP: error while sending message's length")?;
                socket
                    .write_all(src)
                    .await
                    .context("TCP: error while sending a DNS message")?;
            }
            Connection::Udp((socket, addr)) => {
                if let Some(addr) = addr {
                    socket
                        .send_to(src, *addr)
                        .await
                        .with_context(|| format!("UDP: error while sending a DNS message to {}", addr))?;
                } else {
                    socket
                        .send(src)
                        .await
                        .context("UDP: error while sending a DNS message")?;
                }
            }
        };

        Ok(())
    }

    /// Reads one message into `dst`, growing it when needed. Returns the message length.
    pub async fn read(&mut self, dst: &mut Vec<u8>) -> anyhow::Result<usize> {
        let length = match self {
            Connection::Tcp(socket) => {
                let length = socket
                    .read_u16()
                    .await
                    .context("TCP: error while reading message's length")? as usize;
                if dst.len() < length {
                    dst.resize(length, 0);
                }
                socket
                    .read_exact(&mut dst[..length])
                    .await
                    .context("TCP: error while reading a message")?;
                length
            }
            Connection::Udp((socket, _)) => {
                if dst.len() < MAX_UDP_MESSAGE_SIZE {
                    dst.resize(MAX_UDP_MESSAGE_SIZE, 0);
                }
                socket.recv(dst).await.context("UDP: error while reading a message")?
            }
        };

        Ok(length)
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        match self {
            Connection::Tcp(socket) => socket.peer_addr().context("bug: TCP socket is not connected?"),
            Connection::Udp((socket, addr)) => addr
                .or_else(|| socket.peer_addr().ok())
                .context("bug: UDP socket is not connected and explicit addr is missing?"),
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, Connection::Tcp(_))
    }
}
