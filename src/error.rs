use thiserror::Error;

use crate::shared::Asn;

/// Errors surfaced while ingesting an external feed (relation, announcement)
/// or writing a result sink. Row-level problems (malformed rows, unknown
/// ASNs) are normally logged and skipped by the feed iterators themselves;
/// these variants exist for callers that want the strict, non-skipping form.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("unknown ASN {asn} referenced in path, remaining path: {remaining:?}")]
    UnknownAsn { asn: Asn, remaining: Vec<Asn> },

    #[error("cycle in AS path: {0:?}")]
    CycleInPath(Vec<Asn>),

    #[error("staging I/O error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Invariant violations detected during condensation or propagation. These
/// indicate a bug in the engine, not a data problem, and are never recovered
/// from automatically.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate prefix {prefix} in loc_rib of AS{asn}")]
    DuplicateLocRibEntry { asn: Asn, prefix: String },

    #[error("rank inconsistency: AS{asn} has rank {rank} but customer AS{customer} has rank {customer_rank}")]
    RankInconsistency {
        asn: Asn,
        rank: u32,
        customer: Asn,
        customer_rank: u32,
    },

    #[error("cycle detected in provider graph after condensation, involving AS{0}")]
    PostCondensationCycle(Asn),

    #[error("Tarjan scratch state corrupted at AS{0}")]
    TarjanStackCorruption(Asn),
}
