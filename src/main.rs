use route_extrapolator::config::SimulationConfig;
use route_extrapolator::engine::Engine;
use route_extrapolator::feeds::{drain_results, CsvResultSink};
use route_extrapolator::graph::Graph;
use route_extrapolator::prefix::Prefix;

/// Demo: runs the simple-diamond scenario end to end and prints each AS's
/// chosen route, matching the way the engine is meant to be driven — build
/// a graph, condense it, seed from observed paths, propagate, drain results.
/// `SimulationConfig` is built once up front and is the only place the run's
/// tiebreak mode and result options are set.
fn main() {
    env_logger::init();

    let config = SimulationConfig::new().with_store_full_path(true);

    let mut graph = Graph::new();
    graph.ingest_customer_provider(2, 1);
    graph.ingest_customer_provider(3, 1);
    graph.ingest_customer_provider(4, 2);
    graph.ingest_customer_provider(4, 3);
    graph.ingest_peers(2, 3);
    graph.condense().expect("condensation invariants hold for a hand-built demo graph");

    let mut engine = Engine::new(graph).with_config(config);
    let prefix: Prefix = "10.0.0.0/24".parse().unwrap();
    engine.seed(&[1, 2, 4], prefix, 0);
    engine.seed(&[1, 3, 4], prefix, 0);
    engine.propagate().expect("propagation invariants hold for a hand-built demo graph");

    let mut asns: Vec<_> = engine.graph.nodes.keys().copied().collect();
    asns.sort_unstable();
    for asn in asns {
        let node = &engine.graph.nodes[&asn];
        match node.loc_rib.get(&prefix) {
            Some(ann) => println!("AS{asn}: best route for {prefix} via AS{}", ann.received_from_asn),
            None => println!("AS{asn}: no route for {prefix}"),
        }
    }

    let mut sink = CsvResultSink::create(&engine.config.staging_dir, engine.config.store_full_path)
        .expect("staging directory is writable for this demo run");
    drain_results(&engine.graph, &mut sink, engine.config.store_depref)
        .expect("draining results into the staging sink succeeds for this demo run");
    println!("staged results under {}", engine.config.staging_dir.display());
}
