use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::FeedError;
use crate::graph::Graph;
use crate::prefix::Prefix;
use crate::shared::Asn;

/// One parsed row of the peers relation table: both ASNs become peers of
/// each other.
#[derive(Debug, Clone, Copy)]
pub struct PeerRow {
    pub peer_as_1: Asn,
    pub peer_as_2: Asn,
}

/// One parsed row of the customer-provider relation table.
#[derive(Debug, Clone, Copy)]
pub struct CustomerProviderRow {
    pub customer_as: Asn,
    pub provider_as: Asn,
}

/// Loads the peers table from a headerless CSV of `(peer_as_1, peer_as_2)`.
pub fn load_peers_csv(path: impl AsRef<Path>) -> Result<Vec<PeerRow>, FeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = (|| -> Option<PeerRow> {
            Some(PeerRow {
                peer_as_1: record.get(0)?.parse().ok()?,
                peer_as_2: record.get(1)?.parse().ok()?,
            })
        })();
        match row {
            Some(r) => rows.push(r),
            None => log::warn!("malformed peers row, skipping: {:?}", record),
        }
    }
    Ok(rows)
}

/// Loads the customer-provider table from a headerless CSV of
/// `(customer_as, provider_as)`.
pub fn load_customer_provider_csv(
    path: impl AsRef<Path>,
) -> Result<Vec<CustomerProviderRow>, FeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = (|| -> Option<CustomerProviderRow> {
            Some(CustomerProviderRow {
                customer_as: record.get(0)?.parse().ok()?,
                provider_as: record.get(1)?.parse().ok()?,
            })
        })();
        match row {
            Some(r) => rows.push(r),
            None => log::warn!("malformed customer-provider row, skipping: {:?}", record),
        }
    }
    Ok(rows)
}

/// Feeds a relation table straight into a graph under construction.
pub fn ingest_relations(
    graph: &mut Graph,
    peers: &[PeerRow],
    customer_providers: &[CustomerProviderRow],
) {
    for row in peers {
        graph.ingest_peers(row.peer_as_1, row.peer_as_2);
    }
    for row in customer_providers {
        graph.ingest_customer_provider(row.customer_as, row.provider_as);
    }
}

/// One parsed row of the MRT-style announcement feed.
#[derive(Debug, Clone)]
pub struct AnnouncementRow {
    pub prefix: Prefix,
    /// Observed right-to-left AS path; `origin` must equal its last element.
    pub as_path: Vec<Asn>,
    pub origin: Asn,
    pub monitor_asn: Asn,
    pub timestamp: i64,
    pub prefix_id: Option<u32>,
    pub block_id: i64,
}

fn parse_as_path(raw: &str) -> Option<Vec<Asn>> {
    let trimmed = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    trimmed
        .split(',')
        .map(|tok| tok.trim().parse::<Asn>().ok())
        .collect()
}

fn parse_announcement_row(record: &csv::StringRecord) -> Option<AnnouncementRow> {
    let mut prefix: Prefix = record.get(0)?.parse().ok()?;
    let as_path = parse_as_path(record.get(1)?)?;
    let origin: Asn = record.get(2)?.parse().ok()?;
    if as_path.last().copied() != Some(origin) {
        return None;
    }
    let monitor_asn: Asn = record.get(3)?.parse().ok()?;
    let timestamp: i64 = record.get(4)?.parse().ok()?;
    let prefix_id: Option<u32> = record.get(5).and_then(|s| if s.is_empty() { None } else { s.parse().ok() });
    if let Some(id) = prefix_id {
        prefix = prefix.with_prefix_id(id);
    }
    let block_id: i64 = record.get(6)?.parse().ok()?;

    Some(AnnouncementRow {
        prefix,
        as_path,
        origin,
        monitor_asn,
        timestamp,
        prefix_id,
        block_id,
    })
}

/// The announcement feed, grouped into the blocks the engine iterates one
/// at a time to bound peak memory. `block_id` is opaque to the engine; this
/// feed only uses it to partition rows.
pub struct AnnouncementFeed {
    blocks: BTreeMap<i64, Vec<AnnouncementRow>>,
}

impl AnnouncementFeed {
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        let mut blocks: BTreeMap<i64, Vec<AnnouncementRow>> = BTreeMap::new();
        for result in reader.records() {
            let record = result?;
            match parse_announcement_row(&record) {
                Some(row) => blocks.entry(row.block_id).or_default().push(row),
                None => log::warn!("malformed announcement row, skipping: {:?}", record),
            }
        }
        Ok(AnnouncementFeed { blocks })
    }

    pub fn block_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.blocks.keys().copied()
    }

    pub fn block(&self, block_id: i64) -> &[AnnouncementRow] {
        self.blocks.get(&block_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A destination for propagation results. Implementors decide storage;
/// `CsvResultSink` below is the staging-file-to-bulk-load implementation
/// this crate ships.
pub trait ResultSink {
    fn write_best(&mut self, asn: Asn, ann: &crate::announcement::Announcement) -> Result<(), FeedError>;
    fn write_depref(&mut self, asn: Asn, ann: &crate::announcement::Announcement) -> Result<(), FeedError>;
    fn write_supernode(&mut self, member_asn: Asn, supernode_asn: Asn) -> Result<(), FeedError>;
    fn write_stub(&mut self, stub_asn: Asn, parent_asn: Asn) -> Result<(), FeedError>;
    fn flush(&mut self) -> Result<(), FeedError>;
}

fn format_path(path: &[Asn]) -> String {
    let joined = path.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(",");
    format!("[{}]", joined)
}

/// Writes each table to its own headerless CSV file in a staging directory,
/// matching the "staging file crosses the process boundary to the database
/// loader" resource model.
pub struct CsvResultSink {
    best: csv::Writer<File>,
    depref: csv::Writer<File>,
    supernode: csv::Writer<File>,
    stub: csv::Writer<File>,
    full_path: Option<csv::Writer<File>>,
}

impl CsvResultSink {
    pub fn create(dir: impl AsRef<Path>, store_full_path: bool) -> Result<Self, FeedError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let writer = |name: &str| -> Result<csv::Writer<File>, FeedError> {
            Ok(csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(dir.join(name))?)
        };
        Ok(CsvResultSink {
            best: writer("best_results.csv")?,
            depref: writer("depref_results.csv")?,
            supernode: writer("supernode_table.csv")?,
            stub: writer("stub_table.csv")?,
            full_path: if store_full_path {
                Some(writer("full_path_results.csv")?)
            } else {
                None
            },
        })
    }

    fn write_route_row(
        writer: &mut csv::Writer<File>,
        asn: Asn,
        ann: &crate::announcement::Announcement,
    ) -> Result<(), FeedError> {
        writer.write_record(&[
            asn.to_string(),
            ann.prefix.to_string(),
            ann.origin.to_string(),
            ann.received_from_asn.to_string(),
            ann.tstamp.to_string(),
            ann.prefix.prefix_id.map(|id| id.to_string()).unwrap_or_default(),
        ])?;
        Ok(())
    }
}

impl ResultSink for CsvResultSink {
    fn write_best(&mut self, asn: Asn, ann: &crate::announcement::Announcement) -> Result<(), FeedError> {
        Self::write_route_row(&mut self.best, asn, ann)?;
        if let Some(fp) = &mut self.full_path {
            fp.write_record(&[asn.to_string(), ann.prefix.to_string(), format_path(&ann.as_path)])?;
        }
        Ok(())
    }

    fn write_depref(&mut self, asn: Asn, ann: &crate::announcement::Announcement) -> Result<(), FeedError> {
        Self::write_route_row(&mut self.depref, asn, ann)
    }

    fn write_supernode(&mut self, member_asn: Asn, supernode_asn: Asn) -> Result<(), FeedError> {
        self.supernode
            .write_record(&[member_asn.to_string(), supernode_asn.to_string()])?;
        Ok(())
    }

    fn write_stub(&mut self, stub_asn: Asn, parent_asn: Asn) -> Result<(), FeedError> {
        self.stub
            .write_record(&[stub_asn.to_string(), parent_asn.to_string()])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FeedError> {
        self.best.flush()?;
        self.depref.flush()?;
        self.supernode.flush()?;
        self.stub.flush()?;
        if let Some(fp) = &mut self.full_path {
            fp.flush()?;
        }
        Ok(())
    }
}

/// Drains loc_rib/depref_anns from every surviving AS, plus the
/// supernode and stub tables, into `sink`.
pub fn drain_results(
    graph: &Graph,
    sink: &mut impl ResultSink,
    store_depref: bool,
) -> Result<(), FeedError> {
    for node in graph.nodes.values() {
        for ann in node.loc_rib.values() {
            sink.write_best(node.asn, ann)?;
        }
        if store_depref {
            for ann in node.depref_anns.values() {
                sink.write_depref(node.asn, ann)?;
            }
        }
    }

    for (&member, &supernode) in &graph.component_translation {
        sink.write_supernode(member, supernode)?;
    }

    let resolved_stubs = graph.resolve_stub_parents();
    for (&stub, &parent) in &resolved_stubs {
        let parent = graph.translate(parent);
        sink.write_stub(stub, parent)?;
        if let Some(parent_node) = graph.nodes.get(&parent) {
            for ann in parent_node.loc_rib.values() {
                sink.write_best(stub, ann)?;
            }
        }
    }

    sink.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_as_path() {
        assert_eq!(parse_as_path("[1,2,4]"), Some(vec![1, 2, 4]));
        assert_eq!(parse_as_path("[]"), Some(vec![]));
        assert_eq!(parse_as_path("1,2,4"), None);
    }

    #[test]
    fn rejects_origin_mismatched_with_path_tail() {
        let mut record = csv::StringRecord::new();
        record.push_field("10.0.0.0/24");
        record.push_field("[1,2,4]");
        record.push_field("5"); // origin should be 4, not 5
        record.push_field("4");
        record.push_field("0");
        record.push_field("");
        record.push_field("0");
        assert!(parse_announcement_row(&record).is_none());
    }

    #[test]
    fn accepts_well_formed_row() {
        let mut record = csv::StringRecord::new();
        record.push_field("10.0.0.0/24");
        record.push_field("[1,2,4]");
        record.push_field("4");
        record.push_field("4");
        record.push_field("100");
        record.push_field("7");
        record.push_field("0");
        let row = parse_announcement_row(&record).unwrap();
        assert_eq!(row.origin, 4);
        assert_eq!(row.prefix_id, Some(7));
        assert_eq!(row.block_id, 0);
    }
}
