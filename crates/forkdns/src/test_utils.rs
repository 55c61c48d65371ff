use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query as UrlQuery, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::{TcpListener, UdpSocket};

use crate::{Connection, MAX_DOH_BODY_SIZE, MAX_UDP_MESSAGE_SIZE};

pub(crate) const TEST_QUERY_ID: u16 = 0x1234;

pub(crate) fn get_query(name: &str, record_type: RecordType) -> Message {
    let mut query = Message::new();
    query
        .set_id(TEST_QUERY_ID)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));
    query
}

/// A NOERROR reply answering the first question with `ips`
pub(crate) fn get_reply(query: &Message, ips: &[IpAddr]) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError)
        .add_queries(query.queries().iter().cloned());

    let name = query.queries().first().map(|q| q.name().clone()).unwrap_or_else(Name::root);
    for ip in ips {
        let rdata = match ip {
            IpAddr::V4(v4) => RData::A(A(*v4)),
            IpAddr::V6(v6) => RData::AAAA(AAAA(*v6)),
        };
        reply.add_answer(Record::from_rdata(name.clone(), 300, rdata));
    }
    reply
}

pub(crate) fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub(crate) fn first_answer_ip(message: &Message) -> Option<IpAddr> {
    crate::util::answer_ips(message).next()
}

type Received = Arc<Mutex<Vec<Message>>>;

/// A fake resolver listening on localhost. Keeps every query it decoded.
pub(crate) struct MockUpstream {
    pub addr: SocketAddr,
    received: Received,
}

impl MockUpstream {
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum MockBehavior {
    Reply { ips: Vec<IpAddr>, latency: Duration },
    Rcode(ResponseCode),
    /// Empty reply with the TC bit set
    Truncated,
    /// A reply with the wrong id followed by the right one
    WrongIdFirst(Vec<IpAddr>),
    Garbage,
    Silent,
}

impl MockBehavior {
    pub fn reply(ip_str: &str, latency_ms: u64) -> Self {
        MockBehavior::Reply {
            ips: vec![ip(ip_str)],
            latency: Duration::from_millis(latency_ms),
        }
    }

    async fn replies(&self, query: &Message) -> Vec<Vec<u8>> {
        let replies = match self {
            MockBehavior::Reply { ips, latency } => {
                tokio::time::sleep(*latency).await;
                vec![get_reply(query, ips)]
            }
            MockBehavior::Rcode(rcode) => {
                let mut reply = get_reply(query, &[]);
                reply.set_response_code(*rcode);
                vec![reply]
            }
            MockBehavior::Truncated => {
                let mut reply = get_reply(query, &[]);
                reply.set_truncated(true);
                vec![reply]
            }
            MockBehavior::WrongIdFirst(ips) => {
                let mut stray = get_reply(query, ips);
                stray.set_id(query.id().wrapping_add(1));
                vec![stray, get_reply(query, ips)]
            }
            MockBehavior::Garbage => return vec![vec![0xde, 0xad]],
            MockBehavior::Silent => vec![],
        };

        replies.iter().map(|reply| reply.to_vec().unwrap()).collect()
    }
}

pub(crate) async fn spawn_udp_upstream(behavior: MockBehavior) -> MockUpstream {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let received = Received::default();

    let log = received.clone();
    tokio::spawn(async move {
        let mut buf = vec![0; MAX_UDP_MESSAGE_SIZE];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(query) = Message::from_vec(&buf[..len]) else {
                continue;
            };
            log.lock().unwrap().push(query.clone());

            let socket = socket.clone();
            let behavior = behavior.clone();
            tokio::spawn(async move {
                for reply in behavior.replies(&query).await {
                    let _ = socket.send_to(&reply, from).await;
                }
            });
        }
    });

    MockUpstream { addr, received }
}

/// Pass `127.0.0.1:0` for a fresh port or a UDP mock's address to serve both transports on one port.
pub(crate) async fn spawn_tcp_upstream(addr: SocketAddr, behavior: MockBehavior) -> MockUpstream {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Received::default();

    let log = received.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let log = log.clone();
            let behavior = behavior.clone();
            tokio::spawn(async move {
                let mut connection = Connection::Tcp(stream);
                let mut buf = Vec::new();
                let Ok(len) = connection.read(&mut buf).await else {
                    return;
                };
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    return;
                };
                log.lock().unwrap().push(query.clone());
                for reply in behavior.replies(&query).await {
                    let _ = connection.send_encoded_packet(&reply).await;
                }
            });
        }
    });

    MockUpstream { addr, received }
}

#[derive(Debug, Clone)]
pub(crate) enum DohBehavior {
    Reply(Vec<IpAddr>),
    Status(StatusCode),
    Oversized,
    Garbage,
}

/// Serves `GET /dns-query?dns=...` over plain HTTP.
pub(crate) async fn spawn_doh_upstream(behavior: DohBehavior) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Received::default();

    let app = Router::new()
        .route("/dns-query", get(handle_doh_query))
        .with_state((behavior, received.clone()));
    tokio::spawn(async move { axum::serve(listener, app).await });

    MockUpstream { addr, received }
}

async fn handle_doh_query(
    State((behavior, received)): State<(DohBehavior, Received)>,
    headers: HeaderMap,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
) -> Response {
    if headers.get(ACCEPT).map(|value| value.as_bytes()) != Some(b"application/dns-message".as_slice()) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    let Some(query) = params
        .get("dns")
        .and_then(|encoded| URL_SAFE_NO_PAD.decode(encoded).ok())
        .and_then(|wire| Message::from_vec(&wire).ok())
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    received.lock().unwrap().push(query.clone());

    let body = match behavior {
        DohBehavior::Reply(ips) => get_reply(&query, &ips).to_vec().unwrap(),
        DohBehavior::Status(status) => return status.into_response(),
        DohBehavior::Oversized => vec![0; MAX_DOH_BODY_SIZE + 1],
        DohBehavior::Garbage => vec![1, 2, 3],
    };

    ([(CONTENT_TYPE, "application/dns-message")], body).into_response()
}
