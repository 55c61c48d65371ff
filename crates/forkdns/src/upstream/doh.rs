use std::fmt;
use std::net::SocketAddr;

use anyhow::Context as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hickory_proto::op::Message;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};

use crate::MAX_DOH_BODY_SIZE;

const DNS_MESSAGE_MIME: &str = "application/dns-message";

/// DNS over HTTPS using the GET form (`?dns=<base64url>`).
#[derive(Debug)]
pub struct DohUpstream {
    url: Url,
    client: reqwest::Client,
}

impl DohUpstream {
    /// `dial_addr` pins the IP the URL's host resolves to. Its port must match the URL's port.
    pub fn new(url: &str, dial_addr: Option<SocketAddr>, skip_verify: bool) -> anyhow::Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid DoH URL '{}'", url))?;
        if !matches!(url.scheme(), "https" | "http") {
            anyhow::bail!("invalid DoH URL '{}': unsupported scheme", url);
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(skip_verify);
        if let (Some(addr), Some(host)) = (dial_addr, url.host_str()) {
            // The client connects to the URL's port whatever the dial address says
            if url.port_or_known_default() != Some(addr.port()) {
                anyhow::bail!(
                    "DoH dial address {} doesn't use the port of '{}', put the port in the URL instead",
                    addr,
                    url
                );
            }
            builder = builder.resolve(host, addr);
        }
        let client = builder.build().context("failed to create an HTTP client")?;

        Ok(DohUpstream { url, client })
    }

    pub async fn exchange(&self, query: &Message) -> anyhow::Result<Message> {
        let encoded = query.to_vec().context("error while encoding the query")?;

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("dns", &URL_SAFE_NO_PAD.encode(&encoded));

        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, DNS_MESSAGE_MIME)
            .send()
            .await
            .context("DoH: error while sending the request")?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("DoH: unexpected HTTP status {}", response.status());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("DoH: error while reading the response body")?
        {
            if body.len() + chunk.len() > MAX_DOH_BODY_SIZE {
                anyhow::bail!("DoH: response body is larger than {} bytes", MAX_DOH_BODY_SIZE);
            }
            body.extend_from_slice(&chunk);
        }

        Message::from_vec(&body).context("DoH: error while decoding the reply")
    }
}

impl fmt::Display for DohUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
