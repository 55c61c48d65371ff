use std::net::IpAddr;

use anyhow::Context as _;
use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::{ClientSubnet, EdnsCode, EdnsOption};

use crate::OPT_UDP_PAYLOAD_SIZE;

/// An EDNS Client Subnet option attached to queries sent to the remote server.
#[derive(Debug, Clone)]
pub struct EcsOption {
    subnet: ClientSubnet,
}

impl EcsOption {
    /// Parses `address/prefix`. The address is masked down to the prefix.
    pub fn parse(cidr: &str) -> anyhow::Result<Self> {
        let (address, prefix) = cidr
            .split_once('/')
            .with_context(|| format!("invalid ECS subnet '{}': not in CIDR notation", cidr))?;
        let address: IpAddr = address
            .parse()
            .with_context(|| format!("invalid ECS subnet '{}': bad address", cidr))?;
        let prefix: u8 = prefix
            .parse()
            .with_context(|| format!("invalid ECS subnet '{}': bad prefix length", cidr))?;

        let masked = match address {
            IpAddr::V4(v4) if prefix <= 32 => {
                let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
                IpAddr::V4((u32::from(v4) & mask).into())
            }
            IpAddr::V6(v6) if prefix <= 128 => {
                let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
                IpAddr::V6((u128::from(v6) & mask).into())
            }
            _ => anyhow::bail!("invalid ECS subnet '{}': prefix length out of range", cidr),
        };

        Ok(EcsOption {
            subnet: ClientSubnet::new(masked, prefix, 0),
        })
    }

    pub fn subnet(&self) -> &ClientSubnet {
        &self.subnet
    }

    /// Attaches the subnet to `query` unless it already carries one.
    ///
    /// Queries without an OPT record get a fresh one.
    pub fn inject(&self, query: &mut Message) {
        let edns = query.extensions_mut().get_or_insert_with(|| {
            let mut edns = Edns::new();
            edns.set_max_payload(OPT_UDP_PAYLOAD_SIZE);
            edns
        });

        if edns.option(EdnsCode::Subnet).is_none() {
            edns.options_mut().insert(EdnsOption::Subnet(self.subnet.clone()));
        }
    }
}
