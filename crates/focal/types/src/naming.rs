//! Derivation of local identifiers for mirrored objects
//!
//! Every discovered endpoint gets a [`DomainPrefix`] computed from its
//! connection address. A remote object `dom:k=v` mirrored from that endpoint
//! is registered locally as `<prefix>:remoteDomain=dom,k=v`. The mapping is a
//! pure function, so re-registering the same remote object always lands on
//! the same local name, and all of an endpoint's proxies can be found again
//! with [`wildcard_of`].

use crate::error::Result;
use crate::name::{ObjectName, ObjectNamePattern};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved property key carrying the domain of a remote object.
///
/// Remote objects should not use this key themselves. If one does, the
/// remote value is dropped in favor of the remote domain.
pub const REMOTE_DOMAIN_KEY: &str = "remoteDomain";

/// Address characters reserved by the naming syntax
const RESERVED_ADDRESS_CHARS: [char; 3] = [':', '/', '.'];

/// Inert replacement for reserved address characters
const SUBSTITUTE: char = '_';

/// Local domain under which one endpoint's proxies are registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainPrefix(String);

impl DomainPrefix {
    /// Replace every `:`, `/` and `.` in a connection address with `_`
    pub fn sanitize(address: &str) -> Self {
        Self(
            address
                .chars()
                .map(|c| {
                    if RESERVED_ADDRESS_CHARS.contains(&c) {
                        SUBSTITUTE
                    } else {
                        c
                    }
                })
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local identifier of the proxy for `remote` under `prefix`.
///
/// Fails with `InvalidIdentifier` when the prefix is not a legal domain or
/// the remote domain is not a legal property value.
pub fn to_local(prefix: &DomainPrefix, remote: &ObjectName) -> Result<ObjectName> {
    let mut properties = Vec::with_capacity(remote.properties().len() + 1);
    properties.push((REMOTE_DOMAIN_KEY.to_string(), remote.domain().to_string()));
    properties.extend(
        remote
            .properties()
            .iter()
            .filter(|(key, _)| key != REMOTE_DOMAIN_KEY)
            .cloned(),
    );
    ObjectName::new(prefix.as_str(), properties)
}

/// Whether a remote name uses the reserved [`REMOTE_DOMAIN_KEY`]
pub fn uses_reserved_key(remote: &ObjectName) -> bool {
    remote.property(REMOTE_DOMAIN_KEY).is_some()
}

/// Recover the remote identifier a local proxy name was derived from
pub fn from_local(local: &ObjectName) -> Option<ObjectName> {
    let remote_domain = local.property(REMOTE_DOMAIN_KEY)?;
    let rest = local
        .properties()
        .iter()
        .filter(|(key, _)| key != REMOTE_DOMAIN_KEY)
        .cloned();
    ObjectName::new(remote_domain, rest).ok()
}

/// Pattern `<prefix>*:*` selecting every proxy derived under `prefix`
pub fn wildcard_of(prefix: &DomainPrefix) -> ObjectNamePattern {
    ObjectNamePattern::domain_glob(format!("{}*", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_service_address() {
        let prefix = DomainPrefix::sanitize("service://10.0.0.5:1100");
        assert_eq!(prefix.as_str(), "service___10_0_0_5_1100");
    }

    #[test]
    fn test_to_local_scenario() {
        let prefix = DomainPrefix::sanitize("service://10.0.0.5:1100");
        let remote = ObjectName::parse("demo:type=Cache").unwrap();

        let local = to_local(&prefix, &remote).unwrap();
        assert_eq!(local.domain(), "service___10_0_0_5_1100");
        assert_eq!(local.property(REMOTE_DOMAIN_KEY), Some("demo"));
        assert_eq!(local.property("type"), Some("Cache"));
        assert_eq!(local.properties().len(), 2);
        assert_eq!(local.properties()[0].0, REMOTE_DOMAIN_KEY);
    }

    #[test]
    fn test_reserved_key_is_overwritten() {
        let prefix = DomainPrefix::sanitize("host:1");
        let remote = ObjectName::parse("demo:remoteDomain=other,type=Cache").unwrap();
        assert!(uses_reserved_key(&remote));

        let local = to_local(&prefix, &remote).unwrap();
        assert_eq!(local.property(REMOTE_DOMAIN_KEY), Some("demo"));
        assert_eq!(local.properties().len(), 2);
    }

    #[test]
    fn test_to_local_rejects_illegal_prefix() {
        let prefix = DomainPrefix::sanitize("host*:1");
        let remote = ObjectName::parse("demo:type=Cache").unwrap();
        assert!(to_local(&prefix, &remote).is_err());
    }

    #[test]
    fn test_from_local_inverts_to_local() {
        let prefix = DomainPrefix::sanitize("rmi://node-3:9999");
        let remote = ObjectName::parse("app:type=Queue,name=orders").unwrap();
        let local = to_local(&prefix, &remote).unwrap();
        assert_eq!(from_local(&local), Some(remote));

        let plain = ObjectName::parse("focal:type=FederationBridge").unwrap();
        assert_eq!(from_local(&plain), None);
    }

    #[test]
    fn test_wildcard_selects_prefix() {
        let prefix = DomainPrefix::sanitize("svc://a:1");
        let pattern = wildcard_of(&prefix);
        assert_eq!(pattern.to_string(), "svc___a_1*:*");

        let remote = ObjectName::parse("demo:type=Cache").unwrap();
        let local = to_local(&prefix, &remote).unwrap();
        assert!(pattern.matches(&local));
        assert!(!pattern.matches(&remote));
    }

    fn remote_name() -> impl Strategy<Value = ObjectName> {
        (
            "[a-z][a-z0-9.]{0,8}",
            proptest::collection::btree_map("[a-z]{1,6}", "[A-Za-z0-9]{1,6}", 1..4),
        )
            .prop_filter_map("reserved key", |(domain, props)| {
                if props.contains_key(REMOTE_DOMAIN_KEY) {
                    return None;
                }
                ObjectName::new(domain, props).ok()
            })
    }

    proptest! {
        #[test]
        fn property_sanitize_is_deterministic(address in ".{0,40}") {
            let first = DomainPrefix::sanitize(&address);
            let second = DomainPrefix::sanitize(&address);
            prop_assert_eq!(&first, &second);
            prop_assert!(!first.as_str().contains(|c| RESERVED_ADDRESS_CHARS.contains(&c)));
            prop_assert_eq!(first.as_str().chars().count(), address.chars().count());
        }

        #[test]
        fn property_to_local_is_deterministic(remote in remote_name()) {
            let prefix = DomainPrefix::sanitize("service://10.0.0.5:1100");
            let a = to_local(&prefix, &remote).unwrap();
            let b = to_local(&prefix, &remote).unwrap();
            prop_assert_eq!(a.canonical_name(), b.canonical_name());
            prop_assert!(wildcard_of(&prefix).matches(&a));
        }

        #[test]
        fn property_to_local_is_injective(a in remote_name(), b in remote_name()) {
            let prefix = DomainPrefix::sanitize("service://10.0.0.5:1100");
            let local_a = to_local(&prefix, &a).unwrap();
            let local_b = to_local(&prefix, &b).unwrap();
            prop_assert_eq!(a == b, local_a == local_b);
        }
    }
}
