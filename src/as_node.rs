use std::collections::{HashMap, HashSet};

use crate::announcement::Announcement;
use crate::prefix::Prefix;
use crate::priority::{pseudo_random_tiebreak_bit, tiny_hash};
use crate::shared::{Asn, OVERRIDDEN_LOCAL_ORIGIN_ASN};

/// Tracks, per (prefix, origin), which ASes in the graph have not yet
/// adopted that route. Shrinks as propagation proceeds; membership is
/// removed the moment an AS installs a matching announcement as its best.
pub type InverseResultsMap = HashMap<(Prefix, Asn), HashSet<Asn>>;

/// One Autonomous System (or, post-condensation, one supernode standing in
/// for a strongly-connected component of ASes).
#[derive(Debug, Clone)]
pub struct AsNode {
    pub asn: Asn,
    pub member_ases: HashSet<Asn>,
    pub providers: HashSet<Asn>,
    pub peers: HashSet<Asn>,
    pub customers: HashSet<Asn>,

    /// LocRIB: best announcement known per prefix.
    pub loc_rib: HashMap<Prefix, Announcement>,
    /// Second-best announcement known per prefix.
    pub depref_anns: HashMap<Prefix, Announcement>,
    /// Staged inbound announcements awaiting the next `process_announcements`.
    pub incoming_announcements: Vec<Announcement>,
    /// Prefixes this AS itself originates, used to neutralise colliding
    /// neighbor-learned announcements.
    pub local_prefixes: HashSet<Prefix>,

    pub rank: Option<u32>,

    // Tarjan scratch, reset at the start of each condensation run.
    pub tarjan_index: Option<u32>,
    pub tarjan_lowlink: u32,
    pub on_stack: bool,
}

impl AsNode {
    pub fn new(asn: Asn) -> Self {
        AsNode {
            asn,
            member_ases: HashSet::from([asn]),
            providers: HashSet::new(),
            peers: HashSet::new(),
            customers: HashSet::new(),
            loc_rib: HashMap::new(),
            depref_anns: HashMap::new(),
            incoming_announcements: Vec::new(),
            local_prefixes: HashSet::new(),
            rank: None,
            tarjan_index: None,
            tarjan_lowlink: 0,
            on_stack: false,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.customers.is_empty() && self.peers.is_empty() && self.providers.len() == 1
    }

    /// Registers `prefix` as one this AS itself originates, so subsequently
    /// integrated announcements for an equal-or-covered prefix get
    /// neutralised rather than overriding the local route.
    pub fn originate(&mut self, prefix: Prefix) {
        self.local_prefixes.insert(prefix);
    }

    /// Empties RIBs and the incoming queue between iterations; graph
    /// structure (neighbors, rank) is preserved.
    pub fn clear_announcements(&mut self) {
        self.loc_rib.clear();
        self.depref_anns.clear();
        self.incoming_announcements.clear();
    }

    /// Integrates a single candidate route into the RIB. See the best-path
    /// decision procedure: case 1 (no existing best), case 2 (strictly
    /// better), case 3 (strictly worse), case 4 (tie, broken by tiny-hash or
    /// a per-AS pseudo-random bit).
    pub fn process_announcement(
        &mut self,
        ann: Announcement,
        random_tiebreak: bool,
        inverse_results: Option<&mut InverseResultsMap>,
    ) {
        if ann.origin == self.asn {
            // A route this AS itself originates can never arrive back as a
            // legitimate neighbor announcement; base policy always drops it.
            return;
        }
        self.integrate_candidate(ann, random_tiebreak, inverse_results);
    }

    /// Same integration logic as `process_announcement`, but without the
    /// self-origin drop: an attacker AS observing its own originated route
    /// does not get the immunity the drop rule gives a well-behaved AS.
    /// Only `RovAsNode::integrate` calls this, and only for that exception.
    pub fn process_self_originated_attacker_announcement(
        &mut self,
        ann: Announcement,
        random_tiebreak: bool,
        inverse_results: Option<&mut InverseResultsMap>,
    ) {
        self.integrate_candidate(ann, random_tiebreak, inverse_results);
    }

    fn integrate_candidate(
        &mut self,
        mut ann: Announcement,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        for local in &self.local_prefixes {
            if ann.prefix.is_contained_in(local) {
                ann.received_from_asn = OVERRIDDEN_LOCAL_ORIGIN_ASN;
                break;
            }
        }

        let existing = self.loc_rib.get(&ann.prefix).cloned();

        let Some(best) = existing else {
            self.install_best(ann, inverse_results.as_deref_mut());
            return;
        };

        if best == ann {
            return;
        }

        if best.from_monitor {
            self.offer_depref(ann, &best);
            return;
        }

        if ann.priority > best.priority {
            self.install_best_evicting(ann, best, inverse_results.as_deref_mut());
        } else if ann.priority < best.priority {
            self.offer_depref(ann, &best);
        } else {
            let a_wins = if random_tiebreak {
                pseudo_random_tiebreak_bit(self.asn)
            } else {
                tiny_hash(ann.received_from_asn) < tiny_hash(best.received_from_asn)
            };
            if a_wins {
                self.install_best_evicting(ann, best, inverse_results.as_deref_mut());
            } else {
                self.depref_anns.insert(ann.prefix, ann);
            }
        }
    }

    fn install_best(&mut self, ann: Announcement, inverse_results: Option<&mut InverseResultsMap>) {
        let key = (ann.prefix, ann.origin);
        let prefix = ann.prefix;
        self.loc_rib.insert(prefix, ann);
        if let Some(map) = inverse_results {
            if let Some(set) = map.get_mut(&key) {
                set.remove(&self.asn);
            }
        }
    }

    fn install_best_evicting(
        &mut self,
        ann: Announcement,
        old_best: Announcement,
        inverse_results: Option<&mut InverseResultsMap>,
    ) {
        let prefix = ann.prefix;
        self.depref_anns.insert(prefix, old_best);
        self.install_best(ann, inverse_results);
    }

    /// Case-3 / tied-but-loses depref handling: keep the existing depref
    /// entry unless the candidate beats it.
    fn offer_depref(&mut self, ann: Announcement, _current_best: &Announcement) {
        let prefix = ann.prefix;
        match self.depref_anns.get(&prefix) {
            None => {
                self.depref_anns.insert(prefix, ann);
            }
            Some(current_depref) if ann.priority > current_depref.priority => {
                self.depref_anns.insert(prefix, ann);
            }
            _ => {}
        }
    }

    /// Drains `incoming_announcements` through `process_announcement` in
    /// arrival order, then clears the queue.
    pub fn process_announcements(
        &mut self,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        let batch = std::mem::take(&mut self.incoming_announcements);
        for ann in batch {
            self.process_announcement(ann, random_tiebreak, inverse_results.as_deref_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::RelationshipClass;

    fn prefix() -> Prefix {
        "10.0.0.0/24".parse().unwrap()
    }

    fn ann(origin: Asn, received_from: Asn, class: RelationshipClass, path_len: u8) -> Announcement {
        Announcement::new(prefix(), origin, received_from, class, path_len)
    }

    #[test]
    fn case1_no_existing_best_is_installed() {
        let mut node = AsNode::new(1);
        node.process_announcement(ann(5, 2, RelationshipClass::Customer, 2), false, None);
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, 2);
    }

    #[test]
    fn case2_strictly_better_evicts_old_best_to_depref() {
        let mut node = AsNode::new(1);
        node.process_announcement(ann(5, 2, RelationshipClass::Peer, 3), false, None);
        node.process_announcement(ann(5, 3, RelationshipClass::Customer, 3), false, None);
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, 3);
        assert_eq!(node.depref_anns[&prefix()].received_from_asn, 2);
    }

    #[test]
    fn case3_strictly_worse_is_offered_to_depref_only() {
        let mut node = AsNode::new(1);
        node.process_announcement(ann(5, 2, RelationshipClass::Customer, 1), false, None);
        node.process_announcement(ann(5, 3, RelationshipClass::Peer, 1), false, None);
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, 2);
        assert_eq!(node.depref_anns[&prefix()].received_from_asn, 3);
    }

    #[test]
    fn case4_tie_breaks_by_tiny_hash() {
        let mut node = AsNode::new(1);
        let a = ann(5, 111, RelationshipClass::Customer, 2);
        let b = ann(5, 222, RelationshipClass::Customer, 2);
        node.process_announcement(a.clone(), false, None);
        node.process_announcement(b.clone(), false, None);

        let winner = if tiny_hash(111) < tiny_hash(222) { 111 } else { 222 };
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, winner);

        // Order independence: feeding B first then A must converge identically.
        let mut node2 = AsNode::new(1);
        node2.process_announcement(b, false, None);
        node2.process_announcement(a, false, None);
        assert_eq!(node2.loc_rib[&prefix()].received_from_asn, winner);
    }

    #[test]
    fn monitor_seeded_route_is_immutable() {
        let mut node = AsNode::new(1);
        let monitor_ann = ann(5, 2, RelationshipClass::Peer, 1).from_monitor();
        node.process_announcement(monitor_ann, false, None);
        node.process_announcement(ann(5, 3, RelationshipClass::Customer, 1), false, None);
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, 2);
        assert!(node.loc_rib[&prefix()].from_monitor);
    }

    #[test]
    fn self_origin_announcement_is_dropped() {
        let mut node = AsNode::new(1);
        node.process_announcement(ann(1, 2, RelationshipClass::Customer, 1), false, None);
        assert!(node.loc_rib.get(&prefix()).is_none());
    }

    #[test]
    fn self_originated_attacker_announcement_bypasses_the_drop() {
        let mut node = AsNode::new(666);
        node.process_self_originated_attacker_announcement(
            ann(666, 2, RelationshipClass::Customer, 1),
            false,
            None,
        );
        assert_eq!(node.loc_rib[&prefix()].received_from_asn, 2);
    }

    #[test]
    fn local_origin_collision_is_neutralised() {
        let mut node = AsNode::new(1);
        node.originate(prefix());
        node.process_announcement(ann(9, 2, RelationshipClass::Customer, 1), false, None);
        assert_eq!(
            node.loc_rib[&prefix()].received_from_asn,
            OVERRIDDEN_LOCAL_ORIGIN_ASN
        );
    }
}
