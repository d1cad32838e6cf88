use crate::prefix::Prefix;
use crate::priority::{pack_priority, RelationshipClass};
use crate::shared::Asn;

/// Policy-controlled annotation carried by ROV++ announcements: either a
/// marker that an attacker-origin route arrived from this neighbor at some
/// point, or the neighbor ASN whose route a preventive announcement clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltAnnotation {
    AttackerOnRoute,
    Neighbor(Asn),
}

/// A single candidate route for a prefix, as seen by one AS.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub prefix: Prefix,
    pub origin: Asn,
    pub received_from_asn: Asn,
    pub priority: u64,
    /// Ordered sequence of ASNs traversed so far, monitor-nearest first,
    /// origin last. Only populated by the ROV++ variant; the base variant
    /// only needs received-from and priority.
    pub as_path: Vec<Asn>,
    pub tstamp: i64,
    /// True iff this announcement was seeded from a trusted monitor
    /// observation; such entries are never overwritten once installed.
    pub from_monitor: bool,
    pub withdraw: bool,
    pub alt: Option<AltAnnotation>,
}

impl Announcement {
    pub fn new(
        prefix: Prefix,
        origin: Asn,
        received_from_asn: Asn,
        class: RelationshipClass,
        path_length: u8,
    ) -> Self {
        Announcement {
            prefix,
            origin,
            received_from_asn,
            priority: pack_priority(class, path_length),
            as_path: Vec::new(),
            tstamp: 0,
            from_monitor: false,
            withdraw: false,
            alt: None,
        }
    }

    pub fn with_as_path(mut self, as_path: Vec<Asn>) -> Self {
        self.as_path = as_path;
        self
    }

    pub fn with_tstamp(mut self, tstamp: i64) -> Self {
        self.tstamp = tstamp;
        self
    }

    pub fn from_monitor(mut self) -> Self {
        self.from_monitor = true;
        self
    }

    pub fn with_alt(mut self, alt: AltAnnotation) -> Self {
        self.alt = Some(alt);
        self
    }

    pub fn path_length(&self) -> u8 {
        self.as_path.len().max(1) as u8
    }

    /// Builds the copy of this announcement a neighbor would receive:
    /// received-from becomes `exporter`, priority is recomputed for the
    /// receiver's relationship to `exporter`, and the path gains one hop.
    /// `from_monitor` and `withdraw` are never propagated as-is; the
    /// receiver decides those for itself.
    pub fn exported_via(
        &self,
        exporter: Asn,
        receiver_relationship: RelationshipClass,
    ) -> Announcement {
        let mut as_path = self.as_path.clone();
        if as_path.is_empty() {
            as_path.push(self.origin);
        }
        as_path.insert(0, exporter);
        let path_length = as_path.len() as u8;
        Announcement {
            prefix: self.prefix,
            origin: self.origin,
            received_from_asn: exporter,
            priority: pack_priority(receiver_relationship, path_length),
            as_path,
            tstamp: self.tstamp,
            from_monitor: false,
            withdraw: false,
            alt: self.alt,
        }
    }

    /// A withdrawal record matching this announcement's prefix and origin.
    pub fn as_withdrawal(&self) -> Announcement {
        let mut w = self.clone();
        w.withdraw = true;
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Prefix {
        "10.0.0.0/24".parse().unwrap()
    }

    #[test]
    fn exported_via_increments_path_and_rewrites_received_from() {
        let base = Announcement::new(prefix(), 1, 0, RelationshipClass::Origin, 1)
            .with_as_path(vec![1]);
        let exported = base.exported_via(2, RelationshipClass::Provider);
        assert_eq!(exported.received_from_asn, 2);
        assert_eq!(exported.as_path, vec![2, 1]);
        assert!(!exported.from_monitor);
    }

    #[test]
    fn withdrawal_preserves_prefix_and_origin() {
        let ann = Announcement::new(prefix(), 1, 5, RelationshipClass::Customer, 1);
        let w = ann.as_withdrawal();
        assert!(w.withdraw);
        assert_eq!(w.prefix, ann.prefix);
        assert_eq!(w.origin, ann.origin);
    }
}
