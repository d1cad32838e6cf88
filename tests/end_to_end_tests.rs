use std::collections::HashSet;

use route_extrapolator::engine::{Engine, RovEngine};
use route_extrapolator::graph::Graph;
use route_extrapolator::prefix::Prefix;
use route_extrapolator::priority::tiny_hash;
use route_extrapolator::rov::RovPolicy;

fn diamond_graph() -> Graph {
    let mut g = Graph::new();
    g.ingest_customer_provider(2, 1);
    g.ingest_customer_provider(3, 1);
    g.ingest_customer_provider(4, 2);
    g.ingest_customer_provider(4, 3);
    g.ingest_peers(2, 3);
    g
}

#[test]
fn simple_diamond_end_to_end() {
    let mut g = diamond_graph();
    g.condense().unwrap();

    assert!(g.nodes[&4].rank.unwrap() < g.nodes[&2].rank.unwrap());
    assert!(g.nodes[&4].rank.unwrap() < g.nodes[&3].rank.unwrap());
    assert!(g.nodes[&2].rank.unwrap() < g.nodes[&1].rank.unwrap());
    assert!(g.nodes[&3].rank.unwrap() < g.nodes[&1].rank.unwrap());

    let mut engine = Engine::new(g);
    let prefix: Prefix = "10.0.0.0/24".parse().unwrap();
    engine.seed(&[1, 2, 4], prefix, 0);
    engine.seed(&[1, 3, 4], prefix, 0);
    engine.propagate().unwrap();

    assert_eq!(engine.graph.nodes[&2].loc_rib[&prefix].received_from_asn, 4);
    assert_eq!(engine.graph.nodes[&3].loc_rib[&prefix].received_from_asn, 4);

    let winner = if tiny_hash(2) < tiny_hash(3) { 2 } else { 3 };
    assert_eq!(engine.graph.nodes[&1].loc_rib[&prefix].received_from_asn, winner);

    // Idempotence: re-running propagate on the settled graph doesn't change
    // the winning routes.
    engine.propagate().unwrap();
    assert_eq!(engine.graph.nodes[&1].loc_rib[&prefix].received_from_asn, winner);
    assert_eq!(engine.graph.nodes[&2].loc_rib[&prefix].received_from_asn, 4);
}

#[test]
fn rovpp_preventive_propagates_downstream_of_the_defending_as() {
    let mut g = Graph::new();
    // legit(5) --peer--> defender(1) --provider--> victim_customer(10)
    // attacker(666) --peer--> defender(1)
    g.ingest_peers(5, 1);
    g.ingest_peers(666, 1);
    g.ingest_customer_provider(10, 1);
    g.condense().unwrap();

    let rov_nodes = g.build_rov_nodes(|asn| {
        if asn == 1 {
            RovPolicy::RovPpV0_3Preventive
        } else {
            RovPolicy::Bgp
        }
    });
    let ases_by_rank = g.ases_by_rank.clone();
    let attackers = HashSet::from([666u32]);
    let mut rov_engine = RovEngine::new(rov_nodes, ases_by_rank, attackers);

    use route_extrapolator::announcement::Announcement;
    use route_extrapolator::priority::RelationshipClass;

    let covering_prefix: Prefix = "10.0.0.0/16".parse().unwrap();
    let attacker_prefix: Prefix = "10.0.0.0/24".parse().unwrap();

    let legit = Announcement::new(covering_prefix, 5, 5, RelationshipClass::Peer, 1);
    let attack = Announcement::new(attacker_prefix, 666, 666, RelationshipClass::Peer, 1);
    rov_engine.seed(1, legit);
    rov_engine.seed(1, attack);
    rov_engine.propagate();

    let defender = &rov_engine.nodes[&1];
    let best = &defender.base.loc_rib[&attacker_prefix];
    assert_eq!(best.received_from_asn, 5);
    assert!(defender.preventive_anns.contains_key(&attacker_prefix));
}
