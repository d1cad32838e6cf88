use crate::shared::{Asn, Relationships};

/// Relationship class of the neighbor a route was received from, in
/// ascending preference order. A locally-originated route outranks every
/// neighbor-learned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RelationshipClass {
    Provider = 0,
    Peer = 1,
    Customer = 2,
    Origin = 3,
}

impl From<Relationships> for RelationshipClass {
    fn from(r: Relationships) -> Self {
        match r {
            Relationships::Providers => RelationshipClass::Provider,
            Relationships::Peers => RelationshipClass::Peer,
            Relationships::Customers => RelationshipClass::Customer,
            Relationships::Origin => RelationshipClass::Origin,
        }
    }
}

/// Packs (relationship class, path length) into a single `u64` so that an
/// unsigned integer compare resolves Gao-Rexford best-path selection:
/// relationship class occupies a more significant byte than path length, and
/// shorter paths sort higher within the same class.
///
/// Layout mirrors the reserved-byte packing of the original priority
/// struct (relationship at the high byte, path-length term lower down) but
/// drops the unused reserved bytes since nothing in this crate consumes them.
pub fn pack_priority(class: RelationshipClass, path_length: u8) -> u64 {
    let path_term = 255u64.saturating_sub(path_length as u64);
    ((class as u64) << 40) | (path_term << 16)
}

/// A one-byte Galois-field-style mix used as a deterministic per-ASN
/// permutation for tie-breaking. Must be bit-exact across implementations:
/// tie outcomes influence which route an AS ends up selecting.
pub fn tiny_hash(asn: Asn) -> u8 {
    let mask: u8 = 0xFF;
    let mut acc: u8 = 0;
    for i in 0..4 {
        let byte = ((asn >> (8 * i)) & 0xFF) as u8;
        acc = ((acc ^ mask) & byte).wrapping_mul(3);
    }
    acc
}

/// A per-AS pseudo-random tiebreak bit, seeded from the AS's own ASN so the
/// outcome stays reproducible across runs without any stored RNG state.
pub fn pseudo_random_tiebreak_bit(asn: Asn) -> bool {
    use rand::{RngCore, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(asn as u64);
    rng.next_u32() & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_relationship_class_outranks_longer_path() {
        let customer_long = pack_priority(RelationshipClass::Customer, 200);
        let peer_short = pack_priority(RelationshipClass::Peer, 1);
        assert!(customer_long > peer_short);
    }

    #[test]
    fn shorter_path_wins_within_same_class() {
        let short = pack_priority(RelationshipClass::Customer, 1);
        let long = pack_priority(RelationshipClass::Customer, 5);
        assert!(short > long);
    }

    #[test]
    fn tiny_hash_is_deterministic() {
        assert_eq!(tiny_hash(111), tiny_hash(111));
        assert_eq!(tiny_hash(0), tiny_hash(0));
    }

    #[test]
    fn tiny_hash_distinguishes_most_inputs() {
        // Not a correctness requirement, just a sanity check that the mix
        // isn't degenerate (e.g. constant zero).
        let values: Vec<u8> = (1u32..50).map(tiny_hash).collect();
        assert!(values.iter().any(|&v| v != 0));
    }

    #[test]
    fn pseudo_random_tiebreak_is_reproducible_per_asn() {
        assert_eq!(
            pseudo_random_tiebreak_bit(13335),
            pseudo_random_tiebreak_bit(13335)
        );
    }
}
