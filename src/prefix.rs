use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ipnetwork::IpNetwork;

/// An IPv4 or IPv6 network, plus the optional block identifier the
/// announcement feed tags prefixes with so memory-bounded iteration can
/// group rows by the block they came from. Equality and hashing consider
/// only `network`: `prefix_id` is a source-block tag, not part of a
/// prefix's identity, so two rows for the same CIDR with different (or
/// missing) `prefix_id`s must still key the same RIB entry.
#[derive(Debug, Clone, Copy)]
pub struct Prefix {
    pub network: IpNetwork,
    pub prefix_id: Option<u32>,
}

impl PartialEq for Prefix {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network
    }
}

impl Eq for Prefix {}

impl Hash for Prefix {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network.hash(state);
    }
}

impl Prefix {
    pub fn new(network: IpNetwork) -> Self {
        Prefix {
            network,
            prefix_id: None,
        }
    }

    pub fn with_prefix_id(mut self, prefix_id: u32) -> Self {
        self.prefix_id = Some(prefix_id);
        self
    }

    /// `self ⊆ other`: true iff `other`'s netmask is a prefix of `self`'s and
    /// the masked addresses agree. A prefix contains itself.
    pub fn is_contained_in(&self, other: &Prefix) -> bool {
        match (self.network, other.network) {
            (IpNetwork::V4(a), IpNetwork::V4(b)) => {
                b.prefix() <= a.prefix() && b.contains(a.network())
            }
            (IpNetwork::V6(a), IpNetwork::V6(b)) => {
                b.prefix() <= a.prefix() && b.contains(a.network())
            }
            _ => false,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix()
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

impl FromStr for Prefix {
    type Err = ipnetwork::IpNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Prefix::new(IpNetwork::from_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_more_specific() {
        let a: Prefix = "10.0.0.0/8".parse().unwrap();
        let b: Prefix = "10.1.1.0/24".parse().unwrap();
        assert!(b.is_contained_in(&a));
        assert!(!a.is_contained_in(&b));
    }

    #[test]
    fn contains_self() {
        let a: Prefix = "10.0.0.0/24".parse().unwrap();
        assert!(a.is_contained_in(&a));
    }

    #[test]
    fn unrelated_prefixes_do_not_contain() {
        let a: Prefix = "10.0.0.0/24".parse().unwrap();
        let b: Prefix = "192.168.0.0/24".parse().unwrap();
        assert!(!a.is_contained_in(&b));
        assert!(!b.is_contained_in(&a));
    }

    #[test]
    fn equal_prefixes_contain_each_other() {
        let a: Prefix = "10.0.0.0/24".parse().unwrap();
        let b: Prefix = "10.0.0.0/24".parse().unwrap();
        assert!(a.is_contained_in(&b));
        assert!(b.is_contained_in(&a));
    }

    #[test]
    fn prefix_id_does_not_affect_equality_or_hash() {
        use std::collections::HashMap;

        let tagged: Prefix = "10.0.0.0/24".parse::<Prefix>().unwrap().with_prefix_id(7);
        let untagged: Prefix = "10.0.0.0/24".parse().unwrap();
        assert_eq!(tagged, untagged);

        let mut rib: HashMap<Prefix, u32> = HashMap::new();
        rib.insert(untagged, 1);
        rib.insert(tagged, 2);
        assert_eq!(rib.len(), 1);
        assert_eq!(rib[&untagged], 2);
    }
}
