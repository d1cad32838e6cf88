use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use crate::announcement::{AltAnnotation, Announcement};
use crate::as_node::{AsNode, InverseResultsMap};
use crate::prefix::Prefix;
use crate::shared::{Asn, UNUSED_ASN_FLAG_FOR_BLACKHOLES};

/// Which ROV/ROV++ behavior an AS runs. Ordered roughly by how much defense
/// each adds over the last; see module docs on `process_announcements` for
/// what each variant actually does differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RovPolicy {
    Bgp,
    Rov,
    RovPpV0,
    RovPpV0_1,
    RovPpV0_2,
    RovPpV0_2Bis,
    RovPpV0_3Preventive,
}

/// An AS running a ROV or ROV++ policy. Wraps the base capability set
/// (`AsNode`'s RIB + best-path selection) and adds the state ROV++ needs:
/// per-neighbor inbound history (`ribs_in`), synthesized blackhole and
/// preventive routes, and bad-neighbor tracking. `process_announcements` is
/// the only entry point that differs from the base variant; the engine
/// dispatches to one or the other based on which kind of node it holds.
#[derive(Debug, Clone)]
pub struct RovAsNode {
    pub base: AsNode,
    pub policy: RovPolicy,
    pub ribs_in: HashMap<Prefix, Vec<Announcement>>,
    pub blackholes: HashMap<Prefix, Announcement>,
    pub preventive_anns: HashMap<Prefix, Announcement>,
    pub passed_rov: HashSet<(Prefix, Asn)>,
    pub failed_rov: HashSet<(Prefix, Asn)>,
    pub bad_neighbors: HashSet<Asn>,
}

impl Deref for RovAsNode {
    type Target = AsNode;
    fn deref(&self) -> &AsNode {
        &self.base
    }
}

impl DerefMut for RovAsNode {
    fn deref_mut(&mut self) -> &mut AsNode {
        &mut self.base
    }
}

impl RovAsNode {
    pub fn new(asn: Asn, policy: RovPolicy) -> Self {
        RovAsNode {
            base: AsNode::new(asn),
            policy,
            ribs_in: HashMap::new(),
            blackholes: HashMap::new(),
            preventive_anns: HashMap::new(),
            passed_rov: HashSet::new(),
            failed_rov: HashSet::new(),
            bad_neighbors: HashSet::new(),
        }
    }

    /// Empties the base RIBs plus every piece of ROV++-specific per-prefix
    /// state. Without this override, `Deref`-only access to `clear_announcements`
    /// would leave `ribs_in`/`blackholes`/`preventive_anns`/`passed_rov`/
    /// `failed_rov`/`bad_neighbors` populated with entries from a prior
    /// block, so a per-block memory-bounded run must call this, not
    /// `self.base.clear_announcements()`.
    pub fn clear_announcements(&mut self) {
        self.base.clear_announcements();
        self.ribs_in.clear();
        self.blackholes.clear();
        self.preventive_anns.clear();
        self.passed_rov.clear();
        self.failed_rov.clear();
        self.bad_neighbors.clear();
    }

    fn pass_rov(&self, ann: &Announcement, attacker_asns: &HashSet<Asn>) -> bool {
        !attacker_asns.contains(&ann.origin)
    }

    /// Runs a withdrawal-reconciliation pass followed by an integration
    /// pass, per the ROV++ propagation design.
    pub fn process_announcements(
        &mut self,
        attacker_asns: &HashSet<Asn>,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        let batch = std::mem::take(&mut self.base.incoming_announcements);

        for ann in &batch {
            let key = (ann.prefix, ann.origin);
            if self.pass_rov(ann, attacker_asns) {
                self.passed_rov.insert(key);
            } else {
                self.failed_rov.insert(key);
                self.bad_neighbors.insert(ann.received_from_asn);
            }
            self.ribs_in.entry(ann.prefix).or_default().push(ann.clone());
        }

        self.reconcile_withdrawals(random_tiebreak, inverse_results.as_deref_mut());

        for ann in batch {
            if ann.withdraw {
                continue;
            }
            self.integrate(ann, attacker_asns, random_tiebreak, inverse_results.as_deref_mut());
        }
    }

    /// Matches withdrawals against the real announcements already recorded
    /// in `ribs_in`; when a withdrawal retires the currently installed best
    /// route, installs the best remaining alternative in its place. Iterates
    /// to a fixed point since removing one route can expose another
    /// withdrawal/announcement pair that was previously masked.
    fn reconcile_withdrawals(
        &mut self,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        let mut iterations = 0u32;
        loop {
            let mut changed = false;
            let prefixes: Vec<Prefix> = self.ribs_in.keys().copied().collect();

            for prefix in prefixes {
                let entries = self.ribs_in.get(&prefix).cloned().unwrap_or_default();
                let withdrawal_idx = entries.iter().position(|a| a.withdraw);
                let Some(w_idx) = withdrawal_idx else {
                    continue;
                };
                let w = entries[w_idx].clone();
                let real_idx = entries.iter().position(|a| {
                    !a.withdraw
                        && a.origin == w.origin
                        && a.received_from_asn == w.received_from_asn
                });
                let Some(r_idx) = real_idx else {
                    continue;
                };
                let real = entries[r_idx].clone();

                let mut remaining = entries;
                let (lo, hi) = if w_idx < r_idx { (w_idx, r_idx) } else { (r_idx, w_idx) };
                remaining.remove(hi);
                remaining.remove(lo);
                self.ribs_in.insert(prefix, remaining);

                let was_best = self.base.loc_rib.get(&prefix) == Some(&real);
                if was_best {
                    self.base.loc_rib.remove(&prefix);
                    if let Some(alt) = self.best_alternative_route(prefix) {
                        self.base
                            .process_announcement(alt, random_tiebreak, inverse_results.as_deref_mut());
                    }
                    self.check_preventives(prefix, random_tiebreak, inverse_results.as_deref_mut());
                }
                changed = true;
            }

            iterations += 1;
            if !changed {
                break;
            }
            if iterations > 64 {
                log::warn!("withdrawal reconciliation exceeded 64 iterations, stopping");
                break;
            }
        }
    }

    /// Given a covering (or equal) prefix, finds the highest-priority
    /// ribs_in entry that passes ROV, is not a withdrawal, and did not
    /// arrive from a neighbor that has also sent an attacker-origin route.
    pub fn best_alternative_route(&self, attacker_prefix: Prefix) -> Option<Announcement> {
        let mut best: Option<&Announcement> = None;
        for anns in self.ribs_in.values() {
            for c in anns {
                if c.withdraw {
                    continue;
                }
                if !attacker_prefix.is_contained_in(&c.prefix) {
                    continue;
                }
                if self.failed_rov.contains(&(c.prefix, c.origin)) {
                    continue;
                }
                if self.bad_neighbors.contains(&c.received_from_asn) {
                    continue;
                }
                match best {
                    None => best = Some(c),
                    Some(b) if c.priority > b.priority => best = Some(c),
                    _ => {}
                }
            }
        }
        best.cloned()
    }

    fn synthesize_blackhole(&self, attacker_ann: &Announcement) -> Announcement {
        let mut bh = attacker_ann.clone();
        bh.origin = UNUSED_ASN_FLAG_FOR_BLACKHOLES;
        bh.received_from_asn = UNUSED_ASN_FLAG_FOR_BLACKHOLES;
        bh.as_path.clear();
        bh
    }

    fn synthesize_preventive(
        &self,
        alt_route: &Announcement,
        attacker_prefix: Prefix,
        alt_neighbor: Asn,
    ) -> Announcement {
        let mut preventive = alt_route.clone();
        preventive.prefix = attacker_prefix;
        preventive.alt = Some(AltAnnotation::Neighbor(alt_neighbor));
        preventive
    }

    /// Re-derives every established preventive route whose covering best
    /// path changed. A preventive is synthesized once from whichever
    /// covering route was best at that moment; if a later, better covering
    /// route wins at a broader prefix, the preventive must be rebuilt from
    /// it rather than left pointing at a route that is no longer installed.
    /// Call this after any change to `self.base.loc_rib[changed_prefix]`.
    fn check_preventives(
        &mut self,
        changed_prefix: Prefix,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        if self.policy != RovPolicy::RovPpV0_3Preventive {
            return;
        }
        let stale: Vec<Prefix> = self
            .preventive_anns
            .keys()
            .copied()
            .filter(|&p| p != changed_prefix && p.is_contained_in(&changed_prefix))
            .collect();

        for attacker_prefix in stale {
            if let Some(alt) = self.best_alternative_route(attacker_prefix) {
                let alt_neighbor = alt.received_from_asn;
                let preventive = self.synthesize_preventive(&alt, attacker_prefix, alt_neighbor);
                self.preventive_anns.insert(attacker_prefix, preventive.clone());
                self.base.process_announcement(
                    preventive,
                    random_tiebreak,
                    inverse_results.as_deref_mut(),
                );
            }
        }
    }

    /// Applies this AS's policy to a single freshly-arrived announcement.
    fn integrate(
        &mut self,
        mut ann: Announcement,
        attacker_asns: &HashSet<Asn>,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        if ann.origin == self.base.asn && attacker_asns.contains(&self.base.asn) {
            // This AS is itself an attacker observing its own originated
            // route: the self-origin drop (and the attacker-defense policy
            // below) is for protecting a well-behaved AS, not for this AS's
            // own advertisement of its own prefix.
            let prefix = ann.prefix;
            self.base.process_self_originated_attacker_announcement(
                ann,
                random_tiebreak,
                inverse_results.as_deref_mut(),
            );
            self.check_preventives(prefix, random_tiebreak, inverse_results.as_deref_mut());
            return;
        }

        let is_attacker = attacker_asns.contains(&ann.origin);
        let prefix = ann.prefix;

        if !is_attacker {
            if self.bad_neighbors.contains(&ann.received_from_asn) {
                ann.alt = Some(AltAnnotation::AttackerOnRoute);
            }
            self.base
                .process_announcement(ann, random_tiebreak, inverse_results.as_deref_mut());
            self.check_preventives(prefix, random_tiebreak, inverse_results.as_deref_mut());
            return;
        }

        match self.policy {
            RovPolicy::Bgp => {
                self.base
                    .process_announcement(ann, random_tiebreak, inverse_results.as_deref_mut());
                self.check_preventives(prefix, random_tiebreak, inverse_results.as_deref_mut());
            }
            RovPolicy::Rov | RovPolicy::RovPpV0 => {
                // Drop the attacker route outright; no blackhole synthesized.
            }
            RovPolicy::RovPpV0_1 | RovPolicy::RovPpV0_2 => {
                self.install_blackhole_or_alternate(&ann, random_tiebreak, inverse_results.as_deref_mut());
            }
            RovPolicy::RovPpV0_2Bis => {
                if self.base.customers.contains(&ann.received_from_asn) {
                    // Silently drop attacker announcements arriving from a
                    // customer: no blackhole, no alternate substitution.
                    return;
                }
                self.install_blackhole_or_alternate(&ann, random_tiebreak, inverse_results.as_deref_mut());
            }
            RovPolicy::RovPpV0_3Preventive => {
                if self.base.customers.contains(&ann.received_from_asn) {
                    return;
                }
                if let Some(alt) = self.best_alternative_route(ann.prefix) {
                    let alt_neighbor = alt.received_from_asn;
                    let preventive = self.synthesize_preventive(&alt, ann.prefix, alt_neighbor);
                    self.preventive_anns.insert(ann.prefix, preventive.clone());
                    self.base.process_announcement(
                        preventive,
                        random_tiebreak,
                        inverse_results.as_deref_mut(),
                    );
                } else {
                    let bh = self.synthesize_blackhole(&ann);
                    self.blackholes.insert(ann.prefix, ann.clone());
                    self.base
                        .process_announcement(bh, random_tiebreak, inverse_results.as_deref_mut());
                }
                self.check_preventives(prefix, random_tiebreak, inverse_results.as_deref_mut());
            }
        }
    }

    fn install_blackhole_or_alternate(
        &mut self,
        ann: &Announcement,
        random_tiebreak: bool,
        mut inverse_results: Option<&mut InverseResultsMap>,
    ) {
        if let Some(alt) = self.best_alternative_route(ann.prefix) {
            self.base
                .process_announcement(alt, random_tiebreak, inverse_results.as_deref_mut());
        } else {
            let bh = self.synthesize_blackhole(ann);
            self.blackholes.insert(ann.prefix, ann.clone());
            self.base
                .process_announcement(bh, random_tiebreak, inverse_results.as_deref_mut());
        }
        self.check_preventives(ann.prefix, random_tiebreak, inverse_results.as_deref_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::RelationshipClass;

    fn prefix() -> Prefix {
        "10.0.0.0/24".parse().unwrap()
    }

    fn attacker_ann(received_from: Asn) -> Announcement {
        Announcement::new(prefix(), 666, received_from, RelationshipClass::Customer, 2)
    }

    #[test]
    fn rovpp_v0_1_blackholes_when_no_alternate_exists() {
        let mut node = RovAsNode::new(1, RovPolicy::RovPpV0_1);
        node.base.incoming_announcements.push(attacker_ann(100));
        let attackers = HashSet::from([666u32]);
        node.process_announcements(&attackers, false, None);

        let best = &node.base.loc_rib[&prefix()];
        assert_eq!(best.origin, UNUSED_ASN_FLAG_FOR_BLACKHOLES);
        assert_eq!(best.received_from_asn, UNUSED_ASN_FLAG_FOR_BLACKHOLES);
        assert!(node.blackholes.contains_key(&prefix()));
    }

    #[test]
    fn rovpp_v0_3_installs_preventive_route_from_covering_alternate() {
        let mut node = RovAsNode::new(1, RovPolicy::RovPpV0_3Preventive);
        let covering_prefix: Prefix = "10.0.0.0/16".parse().unwrap();
        let legit = Announcement::new(covering_prefix, 5, 200, RelationshipClass::Peer, 2);
        node.base.incoming_announcements.push(legit);
        node.base.incoming_announcements.push(attacker_ann(100));

        let attackers = HashSet::from([666u32]);
        node.process_announcements(&attackers, false, None);

        let best = &node.base.loc_rib[&prefix()];
        assert_eq!(best.received_from_asn, 200);
        assert_eq!(best.alt, Some(AltAnnotation::Neighbor(200)));
        assert!(node.preventive_anns.contains_key(&prefix()));
    }

    #[test]
    fn rovpp_v0_3_reanchors_preventive_when_a_better_covering_route_wins() {
        let mut node = RovAsNode::new(1, RovPolicy::RovPpV0_3Preventive);
        let covering_prefix: Prefix = "10.0.0.0/16".parse().unwrap();
        let attackers = HashSet::from([666u32]);

        let weak_legit = Announcement::new(covering_prefix, 5, 300, RelationshipClass::Peer, 3);
        node.base.incoming_announcements.push(weak_legit);
        node.base.incoming_announcements.push(attacker_ann(100));
        node.process_announcements(&attackers, false, None);
        assert_eq!(
            node.preventive_anns[&prefix()].alt,
            Some(AltAnnotation::Neighbor(300))
        );

        // A strictly better covering route for the same origin now wins.
        let better_legit = Announcement::new(covering_prefix, 5, 5, RelationshipClass::Peer, 1);
        node.base.incoming_announcements.push(better_legit);
        node.process_announcements(&attackers, false, None);

        assert_eq!(node.base.loc_rib[&covering_prefix].received_from_asn, 5);
        assert_eq!(
            node.preventive_anns[&prefix()].alt,
            Some(AltAnnotation::Neighbor(5))
        );
        assert_eq!(node.base.loc_rib[&prefix()].received_from_asn, 5);
    }

    #[test]
    fn rovpp_v0_2bis_silently_drops_attacker_route_from_customer() {
        let mut node = RovAsNode::new(1, RovPolicy::RovPpV0_2Bis);
        node.base.customers.insert(100);
        node.base.incoming_announcements.push(attacker_ann(100));

        let attackers = HashSet::from([666u32]);
        node.process_announcements(&attackers, false, None);

        assert!(node.base.loc_rib.get(&prefix()).is_none());
        assert!(node.blackholes.is_empty());
    }

    #[test]
    fn attacker_as_observing_its_own_route_is_not_dropped() {
        let mut node = RovAsNode::new(666, RovPolicy::RovPpV0_1);
        let own_route = Announcement::new(prefix(), 666, 666, RelationshipClass::Peer, 1);
        node.base.incoming_announcements.push(own_route);

        let attackers = HashSet::from([666u32]);
        node.process_announcements(&attackers, false, None);

        assert_eq!(node.base.loc_rib[&prefix()].received_from_asn, 666);
    }

    #[test]
    fn clear_announcements_resets_rov_specific_state() {
        let mut node = RovAsNode::new(1, RovPolicy::RovPpV0_1);
        node.base.incoming_announcements.push(attacker_ann(100));
        let attackers = HashSet::from([666u32]);
        node.process_announcements(&attackers, false, None);
        assert!(!node.blackholes.is_empty());

        node.clear_announcements();
        assert!(node.base.loc_rib.is_empty());
        assert!(node.ribs_in.is_empty());
        assert!(node.blackholes.is_empty());
        assert!(node.passed_rov.is_empty());
        assert!(node.failed_rov.is_empty());
        assert!(node.bad_neighbors.is_empty());
    }
}
