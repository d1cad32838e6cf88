use std::collections::{HashMap, HashSet};

use crate::as_node::{AsNode, InverseResultsMap};
use crate::error::GraphError;
use crate::prefix::Prefix;
use crate::shared::{Asn, Relationships};

/// Owns every AS node in the topology and the bookkeeping condensation
/// produces: which ASNs were folded into a supernode, which were stripped
/// as stubs, and the rank ordering that drives propagation.
#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: HashMap<Asn, AsNode>,
    /// member ASN -> supernode ASN, populated by `combine_components`.
    pub component_translation: HashMap<Asn, Asn>,
    /// stub ASN -> its provider at the moment of removal (chains are not
    /// pre-resolved; use `resolve_stub_parents` for the final AS a stub's
    /// route should be inherited from).
    pub stub_to_parent: HashMap<Asn, Asn>,
    pub ases_by_rank: Vec<HashSet<Asn>>,
    pub inverse_results: Option<InverseResultsMap>,
    frozen: bool,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    fn ensure_as(&mut self, asn: Asn) {
        self.nodes.entry(asn).or_insert_with(|| AsNode::new(asn));
    }

    pub fn get(&self, asn: Asn) -> Option<&AsNode> {
        self.nodes.get(&asn)
    }

    pub fn get_mut(&mut self, asn: Asn) -> Option<&mut AsNode> {
        self.nodes.get_mut(&asn)
    }

    /// Records that `b` stands in relation `rel` to `a`; the inverse edge is
    /// added on `b`'s own node at the same time.
    pub fn add_relationship(&mut self, a: Asn, b: Asn, rel: Relationships) {
        assert!(!self.frozen, "cannot add relationships after condensation");
        self.ensure_as(a);
        self.ensure_as(b);
        match rel {
            Relationships::Providers => {
                self.nodes.get_mut(&a).unwrap().providers.insert(b);
                self.nodes.get_mut(&b).unwrap().customers.insert(a);
            }
            Relationships::Customers => {
                self.nodes.get_mut(&a).unwrap().customers.insert(b);
                self.nodes.get_mut(&b).unwrap().providers.insert(a);
            }
            Relationships::Peers => {
                self.nodes.get_mut(&a).unwrap().peers.insert(b);
                self.nodes.get_mut(&b).unwrap().peers.insert(a);
            }
            Relationships::Origin => {}
        }
    }

    pub fn ingest_peers(&mut self, peer_as_1: Asn, peer_as_2: Asn) {
        self.add_relationship(peer_as_1, peer_as_2, Relationships::Peers);
    }

    pub fn ingest_customer_provider(&mut self, customer_as: Asn, provider_as: Asn) {
        self.add_relationship(customer_as, provider_as, Relationships::Providers);
    }

    /// `component_translation[asn]` if present, else `asn` unchanged.
    pub fn translate(&self, asn: Asn) -> Asn {
        self.component_translation.get(&asn).copied().unwrap_or(asn)
    }

    /// Runs the full condensation pipeline: stub removal, Tarjan SCC
    /// detection (provider edges only), SCC collapse, then rank assignment.
    /// After this call the graph is frozen; no further relationships may be
    /// added.
    pub fn condense(&mut self) -> Result<(), GraphError> {
        self.remove_stubs();
        let sccs = self.tarjan_sccs();
        for scc in &sccs {
            if scc.len() > 1 {
                log::debug!("collapsing SCC of size {} into supernode", scc.len());
            }
        }
        self.combine_components(sccs);
        self.decide_ranks()?;
        self.frozen = true;
        Ok(())
    }

    /// An AS with zero customers, zero peers, and exactly one provider.
    /// Stubs carry no independent routing decision: their route is always
    /// their single provider's route for the same prefix.
    ///
    /// Taken from a single snapshot of the graph: only ASes that are
    /// already stubs before any removal happens are removed. A provider
    /// that becomes a stub only as a side effect of its own children being
    /// removed here is left in the graph — it is not cascaded into on this
    /// pass, matching the ground-truth stub-removal behavior.
    pub fn remove_stubs(&mut self) {
        let stubs: Vec<Asn> = self
            .nodes
            .values()
            .filter(|n| n.is_stub())
            .map(|n| n.asn)
            .collect();
        let mut removed = 0u32;

        for asn in stubs {
            let Some(node) = self.nodes.get(&asn) else {
                continue;
            };
            let provider = *node.providers.iter().next().unwrap();
            self.stub_to_parent.insert(asn, provider);
            self.nodes.remove(&asn);
            removed += 1;

            if let Some(p) = self.nodes.get_mut(&provider) {
                p.customers.remove(&asn);
            }
        }
        log::debug!("removed {} stub ASes", removed);
    }

    /// Resolves stub-removal chains: if a stub's recorded parent was itself
    /// later removed as a stub, follow the chain to the final surviving AS.
    pub fn resolve_stub_parents(&self) -> HashMap<Asn, Asn> {
        let mut resolved = HashMap::with_capacity(self.stub_to_parent.len());
        for &stub in self.stub_to_parent.keys() {
            let mut parent = self.stub_to_parent[&stub];
            let mut guard = 0usize;
            while let Some(&next) = self.stub_to_parent.get(&parent) {
                parent = next;
                guard += 1;
                if guard > self.stub_to_parent.len() + 1 {
                    break;
                }
            }
            resolved.insert(stub, parent);
        }
        resolved
    }

    /// Iterative (explicit-stack) Tarjan over provider edges only, so
    /// recursion depth never scales with graph size.
    pub fn tarjan_sccs(&mut self) -> Vec<Vec<Asn>> {
        for node in self.nodes.values_mut() {
            node.tarjan_index = None;
            node.tarjan_lowlink = 0;
            node.on_stack = false;
        }

        let mut index_counter = 0u32;
        let mut tarjan_stack: Vec<Asn> = Vec::new();
        let mut sccs = Vec::new();
        let all_asns: Vec<Asn> = self.nodes.keys().copied().collect();

        for start in all_asns {
            if self.nodes[&start].tarjan_index.is_some() {
                continue;
            }
            self.tarjan_from(start, &mut index_counter, &mut tarjan_stack, &mut sccs);
        }
        sccs
    }

    fn visit_init(&mut self, asn: Asn, index_counter: &mut u32, tarjan_stack: &mut Vec<Asn>) {
        let node = self.nodes.get_mut(&asn).unwrap();
        node.tarjan_index = Some(*index_counter);
        node.tarjan_lowlink = *index_counter;
        *index_counter += 1;
        node.on_stack = true;
        tarjan_stack.push(asn);
    }

    fn tarjan_from(
        &mut self,
        start: Asn,
        index_counter: &mut u32,
        tarjan_stack: &mut Vec<Asn>,
        sccs: &mut Vec<Vec<Asn>>,
    ) {
        struct Frame {
            asn: Asn,
            providers: Vec<Asn>,
            next: usize,
        }

        let mut work: Vec<Frame> = Vec::new();
        self.visit_init(start, index_counter, tarjan_stack);
        work.push(Frame {
            asn: start,
            providers: self.nodes[&start].providers.iter().copied().collect(),
            next: 0,
        });

        while let Some(frame) = work.last_mut() {
            if frame.next < frame.providers.len() {
                let w = frame.providers[frame.next];
                frame.next += 1;
                let asn = frame.asn;

                if self.nodes[&w].tarjan_index.is_none() {
                    self.visit_init(w, index_counter, tarjan_stack);
                    let providers_w: Vec<Asn> = self.nodes[&w].providers.iter().copied().collect();
                    work.push(Frame {
                        asn: w,
                        providers: providers_w,
                        next: 0,
                    });
                } else if self.nodes[&w].on_stack {
                    let w_index = self.nodes[&w].tarjan_index.unwrap();
                    let node = self.nodes.get_mut(&asn).unwrap();
                    node.tarjan_lowlink = node.tarjan_lowlink.min(w_index);
                }
            } else {
                let frame = work.pop().unwrap();
                let asn = frame.asn;
                let node_index = self.nodes[&asn].tarjan_index.unwrap();
                let node_lowlink = self.nodes[&asn].tarjan_lowlink;

                if let Some(parent_frame) = work.last() {
                    let parent = parent_frame.asn;
                    let parent_lowlink = self.nodes[&parent].tarjan_lowlink;
                    self.nodes.get_mut(&parent).unwrap().tarjan_lowlink =
                        parent_lowlink.min(node_lowlink);
                }

                if node_index == node_lowlink {
                    let mut component = Vec::new();
                    loop {
                        let w = tarjan_stack.pop().unwrap();
                        self.nodes.get_mut(&w).unwrap().on_stack = false;
                        component.push(w);
                        if w == asn {
                            break;
                        }
                    }
                    sccs.push(component);
                }
            }
        }
    }

    /// Collapses every SCC of size > 1 into a single supernode identified by
    /// the minimum member ASN; external edges are re-wired, with
    /// provider/customer relations superseding a peer relation to the same
    /// external neighbor.
    pub fn combine_components(&mut self, sccs: Vec<Vec<Asn>>) {
        for comp in sccs.into_iter().filter(|c| c.len() > 1) {
            let supernode_asn = *comp.iter().min().unwrap();
            let member_set: HashSet<Asn> = comp.iter().copied().collect();

            let mut providers: HashSet<Asn> = HashSet::new();
            let mut peers: HashSet<Asn> = HashSet::new();
            let mut customers: HashSet<Asn> = HashSet::new();
            let mut member_ases: HashSet<Asn> = HashSet::new();

            for &m in &comp {
                let node = self.nodes.remove(&m).expect("component member missing");
                member_ases.extend(node.member_ases.iter().copied());
                for &p in &node.providers {
                    if !member_set.contains(&p) {
                        providers.insert(p);
                    }
                }
                for &pe in &node.peers {
                    if !member_set.contains(&pe) {
                        peers.insert(pe);
                    }
                }
                for &c in &node.customers {
                    if !member_set.contains(&c) {
                        customers.insert(c);
                    }
                }
                self.component_translation.insert(m, supernode_asn);
            }

            peers.retain(|p| !providers.contains(p) && !customers.contains(p));

            let mut supernode = AsNode::new(supernode_asn);
            supernode.member_ases = member_ases;
            supernode.providers = providers.clone();
            supernode.peers = peers.clone();
            supernode.customers = customers.clone();
            self.nodes.insert(supernode_asn, supernode);

            for &p in &providers {
                self.rewire_neighbor(p, &member_set, supernode_asn, Relationships::Customers);
            }
            for &pe in &peers {
                self.rewire_neighbor(pe, &member_set, supernode_asn, Relationships::Peers);
            }
            for &c in &customers {
                self.rewire_neighbor(c, &member_set, supernode_asn, Relationships::Providers);
            }
        }
    }

    /// Replaces every reference to a collapsed member ASN in `neighbor`'s
    /// relationship sets with `supernode_asn`, recorded under
    /// `relation_from_neighbor` (the relation the supernode now has in
    /// `neighbor`'s own sets), then re-applies provider/customer-over-peer.
    fn rewire_neighbor(
        &mut self,
        neighbor: Asn,
        member_set: &HashSet<Asn>,
        supernode_asn: Asn,
        relation_from_neighbor: Relationships,
    ) {
        let Some(node) = self.nodes.get_mut(&neighbor) else {
            return;
        };
        node.providers.retain(|a| !member_set.contains(a));
        node.peers.retain(|a| !member_set.contains(a));
        node.customers.retain(|a| !member_set.contains(a));

        match relation_from_neighbor {
            Relationships::Providers => {
                node.providers.insert(supernode_asn);
            }
            Relationships::Peers => {
                node.peers.insert(supernode_asn);
            }
            Relationships::Customers => {
                node.customers.insert(supernode_asn);
            }
            Relationships::Origin => {}
        }

        if node.peers.contains(&supernode_asn)
            && (node.providers.contains(&supernode_asn) || node.customers.contains(&supernode_asn))
        {
            node.peers.remove(&supernode_asn);
        }
    }

    /// Assigns `rank`: ASes with no customers start at rank 0; a provider's
    /// rank becomes `max(customer_rank) + 1` across all its customers,
    /// propagated bucket by bucket until a bucket is empty.
    pub fn decide_ranks(&mut self) -> Result<(), GraphError> {
        for node in self.nodes.values_mut() {
            node.rank = None;
        }

        let mut ases_by_rank: Vec<HashSet<Asn>> = vec![self
            .nodes
            .values()
            .filter(|n| n.customers.is_empty())
            .map(|n| n.asn)
            .collect()];
        for &asn in &ases_by_rank[0] {
            self.nodes.get_mut(&asn).unwrap().rank = Some(0);
        }

        let mut i = 0usize;
        while i < ases_by_rank.len() && !ases_by_rank[i].is_empty() {
            let current: Vec<Asn> = ases_by_rank[i].iter().copied().collect();
            let new_rank = i as u32 + 1;
            if ases_by_rank.len() == i + 1 {
                ases_by_rank.push(HashSet::new());
            }

            for asn in current {
                let providers: Vec<Asn> = self.nodes[&asn].providers.iter().copied().collect();
                for p in providers {
                    let p = self.translate(p);
                    let Some(p_node) = self.nodes.get(&p) else {
                        continue;
                    };
                    let cur_rank = p_node.rank;
                    if cur_rank.is_none() || cur_rank.unwrap() < new_rank {
                        if let Some(old_rank) = cur_rank {
                            ases_by_rank[old_rank as usize].remove(&p);
                        }
                        while ases_by_rank.len() <= new_rank as usize {
                            ases_by_rank.push(HashSet::new());
                        }
                        ases_by_rank[new_rank as usize].insert(p);
                        self.nodes.get_mut(&p).unwrap().rank = Some(new_rank);
                    }
                }
            }
            i += 1;
        }

        // Drop any trailing empty buckets left by the loop's lookahead push.
        while ases_by_rank.last().is_some_and(|b| b.is_empty()) {
            ases_by_rank.pop();
        }

        for node in self.nodes.values() {
            if node.rank.is_none() {
                return Err(GraphError::RankInconsistency {
                    asn: node.asn,
                    rank: 0,
                    customer: node.asn,
                    customer_rank: 0,
                });
            }
        }

        log::debug!("rank levels = {}", ases_by_rank.len());
        self.ases_by_rank = ases_by_rank;
        Ok(())
    }

    /// Prepares the inverse-results map: every (prefix, origin) pair maps to
    /// the full set of AS numbers in the graph, shrinking as each AS adopts
    /// that route during propagation.
    pub fn init_inverse_results(&mut self, prefix_origins: impl IntoIterator<Item = (Prefix, Asn)>) {
        let all_asns: HashSet<Asn> = self.nodes.keys().copied().collect();
        let mut map = InverseResultsMap::new();
        for key in prefix_origins {
            map.insert(key, all_asns.clone());
        }
        self.inverse_results = Some(map);
    }

    pub fn clear_announcements(&mut self) {
        for node in self.nodes.values_mut() {
            node.clear_announcements();
        }
    }

    /// Builds the ROV++ node set for a simulation from this already-condensed
    /// topology: every surviving AS gets a fresh `RovAsNode` with the same
    /// neighbor sets, rank, and member ASNs but an empty RIB, running the
    /// policy `policy_for` assigns it.
    pub fn build_rov_nodes(
        &self,
        mut policy_for: impl FnMut(Asn) -> crate::rov::RovPolicy,
    ) -> HashMap<Asn, crate::rov::RovAsNode> {
        let mut out = HashMap::with_capacity(self.nodes.len());
        for (&asn, node) in &self.nodes {
            let mut rov_node = crate::rov::RovAsNode::new(asn, policy_for(asn));
            rov_node.base.member_ases = node.member_ases.clone();
            rov_node.base.providers = node.providers.clone();
            rov_node.base.peers = node.peers.clone();
            rov_node.base.customers = node.customers.clone();
            rov_node.base.rank = node.rank;
            out.insert(asn, rov_node);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_removal_then_rank() {
        let mut g = Graph::new();
        g.ingest_customer_provider(2, 1);
        g.ingest_customer_provider(3, 1);
        g.ingest_customer_provider(4, 3);
        g.ingest_customer_provider(5, 3);
        g.ingest_peers(2, 3);

        g.remove_stubs();

        assert!(!g.nodes.contains_key(&4));
        assert!(!g.nodes.contains_key(&5));
        assert_eq!(g.stub_to_parent[&4], 3);
        assert_eq!(g.stub_to_parent[&5], 3);

        // After stub removal AS 3 has no customers left either (its only
        // customers were the removed stubs), so 2 and 3 both land at rank 0
        // and 1 (provider of both) lands at rank 1.
        g.decide_ranks().unwrap();
        assert_eq!(g.nodes[&2].rank, Some(0));
        assert_eq!(g.nodes[&3].rank, Some(0));
        assert_eq!(g.nodes[&1].rank, Some(1));
    }

    #[test]
    fn remove_stubs_does_not_cascade_into_newly_exposed_stubs() {
        let mut g = Graph::new();
        g.ingest_customer_provider(10, 20);
        g.ingest_customer_provider(20, 30);

        g.remove_stubs();

        assert!(!g.nodes.contains_key(&10));
        // AS 20 only becomes a stub as a side effect of AS 10's removal; a
        // single snapshot-based pass leaves it in the graph rather than
        // cascading into it on the same call.
        assert!(g.nodes.contains_key(&20));
        assert!(g.nodes[&20].is_stub());
    }

    #[test]
    fn scc_collapse_picks_minimum_asn_and_resolves_peer_conflict() {
        let mut g = Graph::new();
        // Cycle 1 -> 2 -> 3 -> 1 (each arrow is "provides"): customer sides
        // are 2 (of 1), 3 (of 2), 1 (of 3).
        g.ingest_customer_provider(2, 1);
        g.ingest_customer_provider(3, 2);
        g.ingest_customer_provider(1, 3);
        g.ingest_customer_provider(1, 7);
        g.ingest_customer_provider(4, 1);
        g.ingest_peers(3, 4);
        g.ingest_peers(2, 8);

        let sccs = g.tarjan_sccs();
        g.combine_components(sccs);

        assert!(g.nodes.contains_key(&1));
        assert!(!g.nodes.contains_key(&2));
        assert!(!g.nodes.contains_key(&3));

        let supernode = &g.nodes[&1];
        assert_eq!(supernode.providers, HashSet::from([7]));
        assert_eq!(supernode.customers, HashSet::from([4]));
        assert_eq!(supernode.peers, HashSet::from([8]));
    }

    #[test]
    fn post_condensation_graph_is_acyclic_and_ranks_respect_edges() {
        let mut g = Graph::new();
        g.ingest_customer_provider(2, 1);
        g.ingest_customer_provider(3, 2);
        g.condense().unwrap();

        assert!(g.nodes[&3].rank.unwrap() < g.nodes[&2].rank.unwrap());
        assert!(g.nodes[&2].rank.unwrap() < g.nodes[&1].rank.unwrap());
    }
}
