//! App locator resolution for the Aragon client
//!
//! Turns a user mapping such as `lido:http://localhost:3010,oracle:Qm...`
//! into the `id:address` list the client reads from `ARAGON_APP_LOCATOR`.

use crate::config::DeploymentDescriptor;

/// Gateway used for content-hash addresses
pub const DEFAULT_GATEWAY: &str = "https://mainnet.lido.fi";

const HEX_PREFIX: &str = "0x";
const CID_V0_PREFIX: &str = "Qm";
const CID_V0_LEN: usize = 46;

/// One resolved `identifier:address` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorEntry {
    pub id: String,
    pub address: String,
}

impl std::fmt::Display for LocatorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.address)
    }
}

pub struct LocatorResolver<'a> {
    descriptor: &'a DeploymentDescriptor,
    gateway: String,
}

impl<'a> LocatorResolver<'a> {
    pub fn new(descriptor: &'a DeploymentDescriptor) -> Self {
        Self {
            descriptor,
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Resolve every pair of `mapping` against every role.
    ///
    /// Pairs that match no role, or whose address is neither a URL nor a
    /// content hash, are dropped.
    pub fn resolve(&self, mapping: &str) -> Vec<LocatorEntry> {
        let mut entries = Vec::new();

        for pair in mapping.split(',') {
            let Some((id, address)) = pair.trim().split_once(':') else {
                if !pair.trim().is_empty() {
                    log::warn!("Ignoring app locator entry without ':': {}", pair);
                }
                continue;
            };
            let (id, address) = (id.trim(), address.trim());
            if id.is_empty() || address.is_empty() {
                continue;
            }

            let mut matched = false;
            for app in self.descriptor.roles.values() {
                let resolved_id = if id.starts_with(HEX_PREFIX) && id == app.id {
                    id
                } else if !app.id.is_empty() && id == app.name {
                    app.id.as_str()
                } else {
                    continue;
                };
                matched = true;

                match self.resolve_address(address) {
                    Some(address) => entries.push(LocatorEntry {
                        id: resolved_id.to_string(),
                        address,
                    }),
                    None => log::warn!("Unrecognized app address for {}: {}", id, address),
                }
            }

            if !matched {
                log::debug!("No deployed app matches '{}'", id);
            }
        }

        entries
    }

    /// The comma-joined locator value
    pub fn to_locator_string(&self, mapping: &str) -> String {
        self.resolve(mapping)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn resolve_address(&self, address: &str) -> Option<String> {
        if address.contains("http://") || address.contains("https://") {
            return Some(format!("{}/", address));
        }

        if address.starts_with(CID_V0_PREFIX) && address.len() == CID_V0_LEN {
            return Some(format!(
                "{}/ipfs/{}/",
                self.gateway.trim_end_matches('/'),
                address
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppInfo;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    fn descriptor() -> DeploymentDescriptor {
        let mut descriptor = DeploymentDescriptor {
            dao_address: "0xDA0".to_string(),
            ..Default::default()
        };
        descriptor.roles.insert(
            "lido".to_string(),
            AppInfo {
                id: "0xAA".to_string(),
                name: "Lido".to_string(),
                ..Default::default()
            },
        );
        descriptor.roles.insert(
            "oracle".to_string(),
            AppInfo {
                id: "0xBB".to_string(),
                name: "Oracle".to_string(),
                ..Default::default()
            },
        );
        descriptor
    }

    #[test]
    fn test_resolve_names_and_hashes() {
        let descriptor = descriptor();
        let resolver = LocatorResolver::new(&descriptor);
        let mapping = format!("Lido:https://x.test,Oracle:{}", CID);

        assert_eq!(
            resolver.to_locator_string(&mapping),
            format!("0xAA:https://x.test/,0xBB:https://mainnet.lido.fi/ipfs/{CID}/")
        );
    }

    #[test]
    fn test_raw_id_passes_through() {
        let descriptor = descriptor();
        let resolver = LocatorResolver::new(&descriptor);

        let entries = resolver.resolve("0xBB:http://localhost:3001");
        assert_eq!(
            entries,
            vec![LocatorEntry {
                id: "0xBB".to_string(),
                address: "http://localhost:3001/".to_string(),
            }]
        );
    }

    #[test]
    fn test_unmatched_pairs_are_dropped() {
        let descriptor = descriptor();
        let resolver = LocatorResolver::new(&descriptor);

        let locator = resolver.to_locator_string(
            "Voting:http://localhost:3002,0xCC:http://a.test,Lido:http://localhost:3000",
        );
        assert_eq!(locator, "0xAA:http://localhost:3000/");
    }

    #[test]
    fn test_unrecognized_address_is_dropped() {
        let descriptor = descriptor();
        let resolver = LocatorResolver::new(&descriptor);

        assert!(resolver.resolve("Lido:localhost:3000").is_empty());
        assert!(resolver.resolve("Lido:QmTooShort").is_empty());
        assert!(resolver.resolve("Lido,,Oracle:").is_empty());
    }

    #[test]
    fn test_custom_gateway() {
        let descriptor = descriptor();
        let resolver = LocatorResolver::new(&descriptor).with_gateway("http://127.0.0.1:8080/");

        assert_eq!(
            resolver.to_locator_string(&format!("Oracle:{}", CID)),
            format!("0xBB:http://127.0.0.1:8080/ipfs/{}/", CID)
        );
    }
}
