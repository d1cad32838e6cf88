use std::collections::{HashMap, HashSet};

use crate::announcement::Announcement;
use crate::as_node::AsNode;
use crate::config::SimulationConfig;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::prefix::Prefix;
use crate::priority::RelationshipClass;
use crate::rov::RovAsNode;
use crate::shared::Asn;

fn collapse_adjacent(path: &[Asn]) -> Vec<Asn> {
    let mut out: Vec<Asn> = Vec::with_capacity(path.len());
    for &asn in path {
        if out.last() != Some(&asn) {
            out.push(asn);
        }
    }
    out
}

/// True iff the (adjacent-duplicate-collapsed, supernode-translated) path
/// visits the same ASN twice. Prepending the same AS repeatedly is allowed
/// and collapsed away; a genuine non-adjacent repeat is a routing loop.
fn has_loop(path: &[Asn]) -> bool {
    let collapsed = collapse_adjacent(path);
    let unique: HashSet<Asn> = collapsed.iter().copied().collect();
    unique.len() != collapsed.len()
}

fn relationship_class_at_receiver(graph: &Graph, receiver: Asn, sender: Asn) -> Option<RelationshipClass> {
    let node = graph.get(receiver)?;
    if node.customers.contains(&sender) {
        Some(RelationshipClass::Customer)
    } else if node.peers.contains(&sender) {
        Some(RelationshipClass::Peer)
    } else if node.providers.contains(&sender) {
        Some(RelationshipClass::Provider)
    } else {
        None
    }
}

/// Classifies an already-installed route by how the holding AS learned it,
/// which governs Gao-Rexford re-export eligibility. `received_from ==
/// holder` (self-origin) and monitor-seeded routes are both treated as
/// freely exportable, matching a customer-learned route.
fn learned_class(node: &AsNode, ann: &Announcement) -> RelationshipClass {
    if ann.from_monitor || ann.origin == node.asn {
        return RelationshipClass::Origin;
    }
    if node.customers.contains(&ann.received_from_asn) {
        RelationshipClass::Customer
    } else if node.peers.contains(&ann.received_from_asn) {
        RelationshipClass::Peer
    } else if node.providers.contains(&ann.received_from_asn) {
        RelationshipClass::Provider
    } else {
        RelationshipClass::Origin
    }
}

fn exportable_to_peers_or_providers(class: RelationshipClass) -> bool {
    matches!(class, RelationshipClass::Customer | RelationshipClass::Origin)
}

/// Walks one observed MRT path and stages a monitor-seeded announcement at
/// every AS along it. Paths are given monitor-nearest-first, origin last
/// (`[a_n, ..., a_1]`, origin = `a_1`); delivery proceeds from the origin
/// outward. A path containing a non-adjacent repeat (after supernode
/// translation) is discarded entirely; an unknown ASN along the path skips
/// just that hop.
pub fn seed_mrt_path(graph: &mut Graph, raw_path: &[Asn], prefix: Prefix, tstamp: i64) {
    if raw_path.is_empty() {
        return;
    }
    let translated: Vec<Asn> = raw_path.iter().map(|&a| graph.translate(a)).collect();
    if has_loop(&translated) {
        log::warn!("discarding looped path {:?}", raw_path);
        return;
    }

    let origin = *translated.last().unwrap();
    let mut as_path_acc: Vec<Asn> = vec![origin];

    for i in (1..translated.len()).rev() {
        let recv_from = translated[i];
        let recv_to = translated[i - 1];

        let Some(class) = relationship_class_at_receiver(graph, recv_to, recv_from) else {
            log::warn!(
                "unknown relationship between AS{} and AS{}, skipping hop",
                recv_to,
                recv_from
            );
            as_path_acc.insert(0, recv_to);
            continue;
        };

        let path_length = as_path_acc.len() as u8;
        let mut ann = Announcement::new(prefix, origin, recv_from, class, path_length)
            .with_as_path(as_path_acc.clone())
            .with_tstamp(tstamp);
        ann.from_monitor = true;

        if let Some(node) = graph.get_mut(recv_to) {
            install_monitor_seed(node, ann);
        }

        as_path_acc.insert(0, recv_to);
    }
}

/// Seeding-specific conflict resolution for two monitor observations at the
/// same AS for the same prefix: prefer the smaller timestamp, then the
/// shorter path, then the tiny-hash tiebreak. A non-monitor entry always
/// loses to an incoming monitor observation.
fn install_monitor_seed(node: &mut AsNode, ann: Announcement) {
    use crate::priority::tiny_hash;

    let prefix = ann.prefix;
    match node.loc_rib.remove(&prefix) {
        None => {
            node.loc_rib.insert(prefix, ann);
        }
        Some(existing) if existing.from_monitor => {
            let new_wins = if ann.tstamp != existing.tstamp {
                ann.tstamp < existing.tstamp
            } else if ann.as_path.len() != existing.as_path.len() {
                ann.as_path.len() < existing.as_path.len()
            } else {
                tiny_hash(ann.received_from_asn) < tiny_hash(existing.received_from_asn)
            };
            if new_wins {
                node.depref_anns.insert(prefix, existing);
                node.loc_rib.insert(prefix, ann);
            } else {
                node.loc_rib.insert(prefix, existing);
                node.depref_anns.insert(prefix, ann);
            }
        }
        Some(non_monitor) => {
            node.depref_anns.insert(prefix, non_monitor);
            node.loc_rib.insert(prefix, ann);
        }
    }
}

/// The base-variant propagation engine: rank-ordered up/peer/down sweeps
/// over a condensed graph, implementing the Gao-Rexford export policy.
/// `config` is the single source of this run's parameters (tiebreak mode,
/// staging/result options) — set it once via `with_config` rather than
/// threading individual flags through `propagate`/`drain_rank`.
pub struct Engine {
    pub graph: Graph,
    pub config: SimulationConfig,
}

impl Engine {
    pub fn new(graph: Graph) -> Self {
        Engine {
            graph,
            config: SimulationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_random_tiebreak(mut self, random_tiebreak: bool) -> Self {
        self.config.random_tiebreak = random_tiebreak;
        self
    }

    pub fn seed(&mut self, raw_path: &[Asn], prefix: Prefix, tstamp: i64) {
        seed_mrt_path(&mut self.graph, raw_path, prefix, tstamp);
    }

    /// Runs the full up/peer/down sweep to a fixed propagation result.
    pub fn propagate(&mut self) -> Result<(), GraphError> {
        let max_rank = self.graph.ases_by_rank.len();
        if max_rank == 0 {
            return Ok(());
        }

        for r in 0..max_rank {
            let asns: Vec<Asn> = self.graph.ases_by_rank[r].iter().copied().collect();
            self.drain_rank(&asns);
            self.export_up_and_peer(&asns);
            // A second drain catches peer deliveries exchanged within the
            // same rank (peers are not guaranteed to differ in rank).
            self.drain_rank(&asns);
        }

        for r in (0..max_rank).rev() {
            let asns: Vec<Asn> = self.graph.ases_by_rank[r].iter().copied().collect();
            self.drain_rank(&asns);
            self.export_down(&asns);
        }
        let asns: Vec<Asn> = self.graph.ases_by_rank[0].iter().copied().collect();
        self.drain_rank(&asns);

        Ok(())
    }

    fn drain_rank(&mut self, asns: &[Asn]) {
        for &asn in asns {
            let mut inverse_results = self.graph.inverse_results.take();
            if let Some(node) = self.graph.nodes.get_mut(&asn) {
                node.process_announcements(self.config.random_tiebreak, inverse_results.as_mut());
            }
            self.graph.inverse_results = inverse_results;
        }
    }

    fn export_up_and_peer(&mut self, asns: &[Asn]) {
        for &asn in asns {
            let Some(node) = self.graph.nodes.get(&asn) else {
                continue;
            };
            let routes: Vec<Announcement> = node.loc_rib.values().cloned().collect();
            let providers: Vec<Asn> = node.providers.iter().copied().collect();
            let peers: Vec<Asn> = node.peers.iter().copied().collect();

            for ann in &routes {
                let class = learned_class(node, ann);
                if !exportable_to_peers_or_providers(class) {
                    continue;
                }
                for &provider in &providers {
                    let exported = ann.exported_via(asn, RelationshipClass::Customer);
                    if let Some(p_node) = self.graph.nodes.get_mut(&provider) {
                        p_node.incoming_announcements.push(exported);
                    }
                }
                for &peer in &peers {
                    let exported = ann.exported_via(asn, RelationshipClass::Peer);
                    if let Some(peer_node) = self.graph.nodes.get_mut(&peer) {
                        peer_node.incoming_announcements.push(exported);
                    }
                }
            }
        }
    }

    fn export_down(&mut self, asns: &[Asn]) {
        for &asn in asns {
            let Some(node) = self.graph.nodes.get(&asn) else {
                continue;
            };
            let routes: Vec<Announcement> = node.loc_rib.values().cloned().collect();
            let customers: Vec<Asn> = node.customers.iter().copied().collect();

            for ann in &routes {
                for &customer in &customers {
                    let exported = ann.exported_via(asn, RelationshipClass::Provider);
                    if let Some(c_node) = self.graph.nodes.get_mut(&customer) {
                        c_node.incoming_announcements.push(exported);
                    }
                }
            }
        }
    }
}

/// The ROV++ propagation engine. Structurally identical sweep to `Engine`
/// but dispatches integration through `RovAsNode::process_announcements`
/// and carries the read-only attacker ASN set every AS checks routes
/// against.
pub struct RovEngine {
    pub nodes: HashMap<Asn, RovAsNode>,
    pub ases_by_rank: Vec<HashSet<Asn>>,
    pub attacker_asns: HashSet<Asn>,
    pub config: SimulationConfig,
}

impl RovEngine {
    pub fn new(nodes: HashMap<Asn, RovAsNode>, ases_by_rank: Vec<HashSet<Asn>>, attacker_asns: HashSet<Asn>) -> Self {
        RovEngine {
            nodes,
            ases_by_rank,
            attacker_asns,
            config: SimulationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_random_tiebreak(mut self, random_tiebreak: bool) -> Self {
        self.config.random_tiebreak = random_tiebreak;
        self
    }

    pub fn seed(&mut self, recv_to: Asn, ann: Announcement) {
        if let Some(node) = self.nodes.get_mut(&recv_to) {
            node.incoming_announcements.push(ann);
        }
    }

    pub fn propagate(&mut self) {
        let max_rank = self.ases_by_rank.len();
        if max_rank == 0 {
            return;
        }

        for r in 0..max_rank {
            let asns: Vec<Asn> = self.ases_by_rank[r].iter().copied().collect();
            self.drain_rank(&asns);
            self.export_up_and_peer(&asns);
            self.drain_rank(&asns);
        }
        for r in (0..max_rank).rev() {
            let asns: Vec<Asn> = self.ases_by_rank[r].iter().copied().collect();
            self.drain_rank(&asns);
            self.export_down(&asns);
        }
        let asns: Vec<Asn> = self.ases_by_rank[0].iter().copied().collect();
        self.drain_rank(&asns);
    }

    fn drain_rank(&mut self, asns: &[Asn]) {
        for &asn in asns {
            if let Some(node) = self.nodes.get_mut(&asn) {
                node.process_announcements(&self.attacker_asns, self.config.random_tiebreak, None);
            }
        }
    }

    fn export_up_and_peer(&mut self, asns: &[Asn]) {
        for &asn in asns {
            let Some(node) = self.nodes.get(&asn) else {
                continue;
            };
            let routes: Vec<Announcement> = node.base.loc_rib.values().cloned().collect();
            let providers: Vec<Asn> = node.base.providers.iter().copied().collect();
            let peers: Vec<Asn> = node.base.peers.iter().copied().collect();

            for ann in &routes {
                let class = learned_class(&node.base, ann);
                if !exportable_to_peers_or_providers(class) {
                    continue;
                }
                for &provider in &providers {
                    let exported = ann.exported_via(asn, RelationshipClass::Customer);
                    if let Some(p_node) = self.nodes.get_mut(&provider) {
                        p_node.base.incoming_announcements.push(exported);
                    }
                }
                for &peer in &peers {
                    let exported = ann.exported_via(asn, RelationshipClass::Peer);
                    if let Some(peer_node) = self.nodes.get_mut(&peer) {
                        peer_node.base.incoming_announcements.push(exported);
                    }
                }
            }
        }
    }

    fn export_down(&mut self, asns: &[Asn]) {
        for &asn in asns {
            let Some(node) = self.nodes.get(&asn) else {
                continue;
            };
            let routes: Vec<Announcement> = node.base.loc_rib.values().cloned().collect();
            let customers: Vec<Asn> = node.base.customers.iter().copied().collect();

            for ann in &routes {
                for &customer in &customers {
                    let exported = ann.exported_via(asn, RelationshipClass::Provider);
                    if let Some(c_node) = self.nodes.get_mut(&customer) {
                        c_node.base.incoming_announcements.push(exported);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::tiny_hash;

    fn diamond() -> Graph {
        let mut g = Graph::new();
        g.ingest_customer_provider(2, 1);
        g.ingest_customer_provider(3, 1);
        g.ingest_customer_provider(4, 2);
        g.ingest_customer_provider(4, 3);
        g.ingest_peers(2, 3);
        g
    }

    #[test]
    fn simple_diamond_scenario() {
        let mut g = diamond();
        g.decide_ranks().unwrap();
        let mut engine = Engine::new(g);

        let prefix: Prefix = "10.0.0.0/24".parse().unwrap();
        engine.seed(&[1, 2, 4], prefix, 0);
        engine.seed(&[1, 3, 4], prefix, 0);
        engine.propagate().unwrap();

        assert_eq!(engine.graph.nodes[&2].loc_rib[&prefix].received_from_asn, 4);
        assert_eq!(engine.graph.nodes[&3].loc_rib[&prefix].received_from_asn, 4);

        let winner = if tiny_hash(2) < tiny_hash(3) { 2 } else { 3 };
        assert_eq!(engine.graph.nodes[&1].loc_rib[&prefix].received_from_asn, winner);
    }

    #[test]
    fn path_with_nonadjacent_repeat_is_discarded() {
        let mut g = diamond();
        g.decide_ranks().unwrap();
        let mut engine = Engine::new(g);
        let prefix: Prefix = "10.0.0.0/24".parse().unwrap();

        engine.seed(&[1, 2, 1, 4], prefix, 0);
        assert!(engine.graph.nodes[&2].loc_rib.get(&prefix).is_none());
    }
}
