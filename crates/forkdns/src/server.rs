use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use hickory_proto::op::Message;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::{Connection, Dispatcher, DEFAULT_TCP_IDLE_TIMEOUT, MAX_UDP_MESSAGE_SIZE};

type HandlerResult = anyhow::Result<()>;

/// Accepts DNS queries over UDP and TCP on one address and hands them to the dispatcher.
pub struct DnsServer {
    udp_socket: Arc<UdpSocket>,
    tcp_listener: Arc<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    tcp_idle_timeout: Duration,
    workers: JoinSet<HandlerResult>,
}

impl DnsServer {
    /// With port 0 both transports share the port picked for UDP.
    pub async fn new(bind_addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> anyhow::Result<Self> {
        let udp_socket = Arc::new(
            UdpSocket::bind(bind_addr)
                .await
                .with_context(|| format!("error while binding a UDP socket to {}", bind_addr))?,
        );
        let bound_addr = udp_socket
            .local_addr()
            .context("error while getting the UDP socket's address")?;
        let tcp_listener = Arc::new(
            TcpListener::bind(bound_addr)
                .await
                .with_context(|| format!("error while binding a TcpListener to {}", bound_addr))?,
        );

        tracing::info!(addr = %bound_addr, "Listening for DNS queries");

        Ok(DnsServer {
            udp_socket,
            tcp_listener,
            dispatcher,
            tcp_idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            workers: JoinSet::new(),
        })
    }

    /// How long a TCP client may stay silent before its connection is closed.
    pub fn with_tcp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_idle_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.udp_socket
            .local_addr()
            .context("error while getting the UDP socket's address")
    }

    pub async fn add_workers(&mut self, n: usize) {
        for idx in 0..n {
            let udp_socket = self.udp_socket.clone();
            let tcp_listener = self.tcp_listener.clone();
            let dispatcher = self.dispatcher.clone();

            self.workers.spawn(
                handle_incoming_requests(udp_socket, tcp_listener, dispatcher, self.tcp_idle_timeout)
                    .instrument(tracing::trace_span!("", worker = idx)),
            );
        }
    }

    pub async fn block_until_completion(&mut self) -> anyhow::Result<()> {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result.context("worker task failed to execute")? {
                tracing::error!("Error in a worker: {:#}", e);
            }
        }

        Ok(())
    }
}

async fn handle_incoming_requests(
    udp_socket: Arc<UdpSocket>,
    tcp_listener: Arc<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    tcp_idle_timeout: Duration,
) -> HandlerResult {
    let mut recv = vec![0; MAX_UDP_MESSAGE_SIZE];
    let mut handlers: JoinSet<HandlerResult> = JoinSet::new();
    loop {
        tokio::select! {
            received = udp_socket.recv_from(&mut recv) => {
                let (length, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::debug!("UDP: error while receiving a request: {}", e);
                        continue;
                    }
                };
                tracing::trace!(%from, "New UDP request");

                let request = recv[..length].to_vec();
                let udp_socket = udp_socket.clone();
                let dispatcher = dispatcher.clone();
                handlers.spawn(
                    async move {
                        let mut connection = Connection::Udp((udp_socket, Some(from)));
                        handle_request(&mut connection, &request, &dispatcher).await
                    }
                    .in_current_span(),
                );
            }
            accepted = tcp_listener.accept() => {
                let (stream, from) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::debug!("TCP: error while accepting a connection: {}", e);
                        continue;
                    }
                };
                tracing::trace!(%from, "New TCP connection");

                handlers.spawn(
                    handle_tcp_connection(stream, dispatcher.clone(), tcp_idle_timeout).in_current_span(),
                );
            }
            Some(result) = handlers.join_next() => {
                if let Err(e) = result.context("connection handling task failed to execute")? {
                    tracing::debug!("Error while handling a request: {:#}", e);
                }
            }
        };
    }
}

/// Serves queries from one TCP client until it disconnects or stays idle for `idle_timeout`.
async fn handle_tcp_connection(stream: TcpStream, dispatcher: Arc<Dispatcher>, idle_timeout: Duration) -> HandlerResult {
    let mut connection = Connection::Tcp(stream);
    let mut buf = Vec::new();
    loop {
        let read = tokio::time::timeout(idle_timeout, connection.read(&mut buf)).await;
        let length = match read {
            Ok(Ok(length)) => length,
            // A read error here is usually the client closing the connection
            Ok(Err(_)) => break,
            Err(_) => {
                tracing::debug!(peer = ?connection.peer_addr().ok(), "Closing an idle TCP connection");
                break;
            }
        };
        handle_request(&mut connection, &buf[..length], &dispatcher).await?;
    }

    Ok(())
}

async fn handle_request(connection: &mut Connection, request: &[u8], dispatcher: &Arc<Dispatcher>) -> HandlerResult {
    let query = match Message::from_vec(request) {
        Ok(query) => query,
        Err(e) => {
            tracing::debug!(peer = ?connection.peer_addr().ok(), "Dropping an undecodable request: {}", e);
            return Ok(());
        }
    };

    if let Some(reply) = dispatcher.dispatch(query).await {
        let encoded = reply.to_vec().context("error while encoding the reply")?;
        connection
            .send_encoded_packet(&encoded)
            .await
            .context("error while sending the reply")?;
    }

    Ok(())
}
