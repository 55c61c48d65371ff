use forkdns_lists::IpList;
use hickory_proto::op::{Message, ResponseCode};

use crate::util::{answer_ips, is_unusual};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Keep(&'static str),
    Drop(&'static str),
}

/// Decides whether a reply from the local server can be trusted.
#[derive(Debug, Default)]
pub(crate) struct LocalPolicy {
    pub block_unusual_type: bool,
    pub allowed_ips: Option<IpList>,
    pub blocked_ips: Option<IpList>,
}

impl LocalPolicy {
    /// Rules are checked in order and the first one that applies wins.
    pub fn judge(&self, reply: Option<&Message>) -> Verdict {
        let Some(reply) = reply else {
            return Verdict::Drop("no reply");
        };
        if reply.response_code() != ResponseCode::NoError {
            return Verdict::Drop("rcode is not NOERROR");
        }
        if reply.answers().is_empty() {
            return Verdict::Drop("empty answer section");
        }
        if is_unusual(reply) && !self.block_unusual_type {
            return Verdict::Keep("unusual type");
        }
        if let Some(blocked) = &self.blocked_ips {
            if answer_ips(reply).any(|ip| blocked.contains(ip)) {
                return Verdict::Drop("answer IP is blocked");
            }
        }
        if let Some(allowed) = &self.allowed_ips {
            return if answer_ips(reply).any(|ip| allowed.contains(ip)) {
                Verdict::Keep("answer IP is allowed")
            } else {
                Verdict::Drop("no answer IP is allowed")
            };
        }

        Verdict::Keep("no IP filters")
    }
}
