// Topology loading
//
// Two input shapes are understood:
// - raw graph dumps in `lncli describegraph` JSON form, one record per channel
// - preprocessed CSV with one row per channel direction (optionally holding
//   many snapshots, told apart by `snapshot_id`)
//
// Either may be shipped inside a `.zip` archive.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;

use crate::ln_error::{LnError, Result};
use crate::ln_interface::{DirectedEdge, NodeId, SnapshotId};
use crate::ln_params::ExperimentParams;

// ============================================================================
// Input files
// ============================================================================

/// Read a file, transparently unpacking the first `.json`/`.csv` entry of a zip
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return fs::read(path).map_err(LnError::io(path));
    }

    let zip_err = |source| LnError::Zip {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(LnError::io(path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;
        let name = entry.name().to_ascii_lowercase();
        if entry.is_dir() || !(name.ends_with(".json") || name.ends_with(".csv")) {
            continue;
        }
        debug!("{}: reading archive entry {}", path.display(), entry.name());
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(LnError::io(path))?;
        return Ok(bytes);
    }

    Err(LnError::EmptyArchive(path.to_path_buf()))
}

// ============================================================================
// Raw graph dump
// ============================================================================

/// Number that may arrive as a JSON number or as a decimal string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Int(v) => Some(*v as f64),
            Numeric::Float(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            Numeric::Int(v) => Some(*v),
            Numeric::Float(v) if *v >= 0.0 => Some(*v as u64),
            Numeric::Float(_) => None,
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphDump {
    edges: Vec<ChannelRecord>,
}

#[derive(Debug, Deserialize)]
struct ChannelRecord {
    channel_id: Numeric,
    node1_pub: NodeId,
    node2_pub: NodeId,
    capacity: Numeric,
    last_update: Option<Numeric>,
    node1_policy: Option<RoutingPolicy>,
    node2_policy: Option<RoutingPolicy>,
}

#[derive(Debug, Deserialize)]
struct RoutingPolicy {
    min_htlc: Option<Numeric>,
    fee_base_msat: Option<Numeric>,
    fee_rate_milli_msat: Option<Numeric>,
    #[serde(default)]
    disabled: bool,
    last_update: Option<Numeric>,
}

fn numeric_f64(value: &Option<Numeric>) -> f64 {
    value.as_ref().and_then(Numeric::as_f64).unwrap_or(0.0)
}

fn numeric_u64(value: &Option<Numeric>) -> Option<u64> {
    value.as_ref().and_then(Numeric::as_u64)
}

/// Parse a graph dump into directed edges; a direction without policy is dropped
pub fn parse_graph_dump(json: &[u8], snapshot_id: SnapshotId) -> serde_json::Result<Vec<DirectedEdge>> {
    let dump: GraphDump = serde_json::from_slice(json)?;

    let mut edges = Vec::with_capacity(dump.edges.len() * 2);
    for channel in &dump.edges {
        let directions = [
            (&channel.node1_pub, &channel.node2_pub, &channel.node1_policy),
            (&channel.node2_pub, &channel.node1_pub, &channel.node2_policy),
        ];
        for (src, trg, policy) in directions {
            let Some(policy) = policy else {
                continue;
            };
            edges.push(DirectedEdge {
                snapshot_id,
                src: src.clone(),
                trg: trg.clone(),
                last_update: numeric_u64(&policy.last_update)
                    .or_else(|| numeric_u64(&channel.last_update))
                    .unwrap_or(0),
                channel_id: channel.channel_id.as_u64().unwrap_or(0),
                capacity: channel.capacity.as_f64().unwrap_or(0.0),
                disabled: policy.disabled,
                fee_base_msat: numeric_f64(&policy.fee_base_msat),
                fee_rate_milli_msat: numeric_f64(&policy.fee_rate_milli_msat),
                min_htlc: numeric_f64(&policy.min_htlc),
            });
        }
    }

    Ok(edges)
}

pub fn load_raw_json(path: &Path, snapshot_id: SnapshotId) -> Result<Vec<DirectedEdge>> {
    let bytes = read_input(path)?;
    let edges = parse_graph_dump(&bytes, snapshot_id).map_err(LnError::json(path))?;
    info!(
        "Loaded {} directed edges from graph dump {}",
        edges.len(),
        path.display()
    );
    Ok(edges)
}

// ============================================================================
// Preprocessed CSV
// ============================================================================

pub fn load_edges_csv(path: &Path) -> Result<Vec<DirectedEdge>> {
    let bytes = read_input(path)?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let edges = reader
        .deserialize()
        .collect::<std::result::Result<Vec<DirectedEdge>, _>>()
        .map_err(LnError::csv(path))?;
    info!("Loaded {} directed edges from {}", edges.len(), path.display());
    Ok(edges)
}

/// Keep only the rows of one snapshot from a multi-snapshot edge file
pub fn load_snapshot(path: &Path, snapshot_id: SnapshotId) -> Result<Vec<DirectedEdge>> {
    let mut edges = load_edges_csv(path)?;
    edges.retain(|e| e.snapshot_id == snapshot_id);
    if edges.is_empty() {
        return Err(LnError::EmptyTopology(format!(
            "snapshot {} not present in {}",
            snapshot_id,
            path.display()
        )));
    }
    info!("Snapshot {}: {} directed edges", snapshot_id, edges.len());
    Ok(edges)
}

/// `<data_dir>/ln_edges.csv`, or its zipped form if only that exists
fn snapshot_table(data_dir: &Path) -> PathBuf {
    let plain = data_dir.join("ln_edges.csv");
    let zipped = data_dir.join("ln_edges.csv.zip");
    if !plain.exists() && zipped.exists() {
        zipped
    } else {
        plain
    }
}

// ============================================================================
// Source selection
// ============================================================================

/// Where the topology of a run comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TopologySource {
    /// Graph dump (JSON, possibly zipped)
    Raw(PathBuf),

    /// Preprocessed edge CSV used as is
    Preprocessed(PathBuf),

    /// One snapshot of a multi-snapshot edge CSV
    Snapshot { path: PathBuf, id: SnapshotId },
}

impl TopologySource {
    /// Interpret a preprocessed argument: an existing edge file (`.csv` or
    /// `.zip`), or a snapshot id looked up in `<data_dir>/ln_edges.csv`
    /// (`ln_edges.csv.zip` when only the archive is present)
    pub fn preprocessed(arg: &str, data_dir: &Path) -> Result<Self> {
        let path = Path::new(arg);
        if path.is_file() {
            return Ok(TopologySource::Preprocessed(path.to_path_buf()));
        }
        let id = arg.parse::<SnapshotId>().map_err(|_| {
            LnError::InvalidParams(format!(
                "`{}` is neither an existing edge file nor a snapshot id",
                arg
            ))
        })?;
        Ok(TopologySource::Snapshot {
            path: snapshot_table(data_dir),
            id,
        })
    }

    pub fn load(&self) -> Result<Vec<DirectedEdge>> {
        let edges = match self {
            TopologySource::Raw(path) => load_raw_json(path, 0)?,
            TopologySource::Preprocessed(path) => load_edges_csv(path)?,
            TopologySource::Snapshot { path, id } => load_snapshot(path, *id)?,
        };
        if edges.is_empty() {
            return Err(LnError::EmptyTopology(format!("{:?} has no edges", self)));
        }
        Ok(edges)
    }
}

// ============================================================================
// Edge preparation
// ============================================================================

#[derive(Debug)]
struct Aggregate {
    edge: DirectedEdge,
    channels: usize,
}

/// Filter edges for an experiment and merge parallel channels
///
/// Parallel channels between the same ordered pair become one edge: capacity
/// is summed, fees are averaged, the latest `last_update` and the smallest
/// `min_htlc` are kept.
pub fn prepare_edges(edges: &[DirectedEdge], params: &ExperimentParams) -> Result<Vec<DirectedEdge>> {
    let amount = params.amount as f64;
    let mut merged: IndexMap<(&str, &str), Aggregate> = IndexMap::new();
    let mut dropped_disabled = 0;
    let mut dropped_low_cap = 0;

    for edge in edges {
        if params.drop_disabled && edge.disabled {
            dropped_disabled += 1;
            continue;
        }
        if params.drop_low_cap && edge.capacity < amount {
            dropped_low_cap += 1;
            continue;
        }

        let key = (edge.src.as_str(), edge.trg.as_str());
        match merged.get_mut(&key) {
            Some(agg) => {
                agg.channels += 1;
                agg.edge.capacity += edge.capacity;
                agg.edge.fee_base_msat += edge.fee_base_msat;
                agg.edge.fee_rate_milli_msat += edge.fee_rate_milli_msat;
                agg.edge.last_update = agg.edge.last_update.max(edge.last_update);
                agg.edge.min_htlc = agg.edge.min_htlc.min(edge.min_htlc);
                agg.edge.disabled &= edge.disabled;
            }
            None => {
                merged.insert(
                    key,
                    Aggregate {
                        edge: edge.clone(),
                        channels: 1,
                    },
                );
            }
        }
    }

    let prepared: Vec<DirectedEdge> = merged
        .into_values()
        .map(|agg| {
            let mut edge = agg.edge;
            let n = agg.channels as f64;
            edge.fee_base_msat /= n;
            edge.fee_rate_milli_msat /= n;
            edge
        })
        .collect();

    info!(
        "Prepared {} edges ({} disabled and {} low-capacity directions dropped)",
        prepared.len(),
        dropped_disabled,
        dropped_low_cap
    );

    if prepared.is_empty() {
        return Err(LnError::EmptyTopology(
            "no edge survives the disabled / low-capacity filters".into(),
        ));
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DUMP: &str = r#"{
        "nodes": [{"pub_key": "a"}, {"pub_key": "b"}, {"pub_key": "c"}],
        "edges": [
            {
                "channel_id": "700000000000001",
                "node1_pub": "a",
                "node2_pub": "b",
                "capacity": "250000",
                "last_update": 1600000000,
                "node1_policy": {"min_htlc": "1000", "fee_base_msat": "1000",
                                 "fee_rate_milli_msat": "1", "disabled": false,
                                 "last_update": 1600000100},
                "node2_policy": {"min_htlc": 1, "fee_base_msat": 0,
                                 "fee_rate_milli_msat": 500, "disabled": true}
            },
            {
                "channel_id": 700000000000002,
                "node1_pub": "b",
                "node2_pub": "c",
                "capacity": 50000,
                "node1_policy": null,
                "node2_policy": {"fee_base_msat": "2000", "fee_rate_milli_msat": "10"}
            }
        ]
    }"#;

    fn edge(src: &str, trg: &str, capacity: f64) -> DirectedEdge {
        DirectedEdge {
            snapshot_id: 0,
            src: src.to_string(),
            trg: trg.to_string(),
            last_update: 0,
            channel_id: 0,
            capacity,
            disabled: false,
            fee_base_msat: 1000.0,
            fee_rate_milli_msat: 1.0,
            min_htlc: 1000.0,
        }
    }

    #[test]
    fn test_graph_dump_yields_one_edge_per_policy() {
        let edges = parse_graph_dump(DUMP.as_bytes(), 3).unwrap();
        assert_eq!(edges.len(), 3);

        let ab = &edges[0];
        assert_eq!((ab.src.as_str(), ab.trg.as_str()), ("a", "b"));
        assert_eq!(ab.channel_id, 700000000000001);
        assert_eq!(ab.capacity, 250000.0);
        assert_eq!(ab.last_update, 1600000100);
        assert_eq!(ab.snapshot_id, 3);

        let ba = &edges[1];
        assert!(ba.disabled);
        assert_eq!(ba.fee_rate_milli_msat, 500.0);
        assert_eq!(ba.last_update, 1600000000);

        // b->c has no policy, only c->b survives
        let cb = &edges[2];
        assert_eq!((cb.src.as_str(), cb.trg.as_str()), ("c", "b"));
        assert_eq!(cb.fee_base_msat, 2000.0);
        assert_eq!(cb.last_update, 0);
    }

    #[test]
    fn test_load_raw_json_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.zip");
        {
            let file = File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("README.txt", options).unwrap();
            zip.write_all(b"not the graph").unwrap();
            zip.start_file("graph.json", options).unwrap();
            zip.write_all(DUMP.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let edges = TopologySource::Raw(path).load().unwrap();
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_snapshot_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ln_edges.csv");
        fs::write(
            &path,
            "snapshot_id,src,trg,last_update,channel_id,capacity,disabled,fee_base_msat,fee_rate_milli_msat,min_htlc\n\
             0,a,b,1,11,1000,False,1000,1,1000\n\
             1,a,b,1,11,1000,False,1000,1,1000\n\
             1,b,a,1,11,1000,True,1000,1,1000\n",
        )
        .unwrap();

        let source = TopologySource::preprocessed("1", dir.path()).unwrap();
        assert_eq!(
            source,
            TopologySource::Snapshot {
                path: path.clone(),
                id: 1
            }
        );
        let edges = source.load().unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges[1].disabled);

        assert!(matches!(
            load_snapshot(&path, 9),
            Err(LnError::EmptyTopology(_))
        ));
    }

    #[test]
    fn test_preprocessed_argument_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("edges.csv");
        fs::write(&csv, "src,trg,capacity\n").unwrap();

        let arg = csv.to_str().unwrap();
        assert_eq!(
            TopologySource::preprocessed(arg, dir.path()).unwrap(),
            TopologySource::Preprocessed(csv.clone())
        );
        assert!(TopologySource::preprocessed("missing.csv", dir.path()).is_err());
    }

    const SNAPSHOT_CSV: &str = "snapshot_id,src,trg,last_update,channel_id,capacity,disabled,fee_base_msat,fee_rate_milli_msat,min_htlc\n\
         0,a,b,1,11,1000,False,1000,1,1000\n\
         1,a,b,1,11,1000,False,1000,1,1000\n\
         1,b,a,1,11,1000,True,1000,1,1000\n";

    fn write_zip(path: &Path, entry: &str, content: &str) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file(entry, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_zipped_edge_csv_as_preprocessed_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.zip");
        write_zip(&path, "edges.csv", SNAPSHOT_CSV);

        let source = TopologySource::preprocessed(path.to_str().unwrap(), dir.path()).unwrap();
        assert_eq!(source, TopologySource::Preprocessed(path.clone()));
        assert_eq!(source.load().unwrap().len(), 3);
        assert_eq!(load_edges_csv(&path).unwrap()[2].src, "b");
    }

    #[test]
    fn test_snapshot_from_zipped_table() {
        let dir = tempfile::tempdir().unwrap();
        let zipped = dir.path().join("ln_edges.csv.zip");
        write_zip(&zipped, "ln_edges.csv", SNAPSHOT_CSV);

        let source = TopologySource::preprocessed("0", dir.path()).unwrap();
        assert_eq!(
            source,
            TopologySource::Snapshot {
                path: zipped,
                id: 0
            }
        );
        assert_eq!(source.load().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_numeric_cells_load_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        fs::write(
            &path,
            "snapshot_id,src,trg,last_update,channel_id,capacity,disabled,fee_base_msat,fee_rate_milli_msat,min_htlc\n\
             0,a,b,1554076800.0,,1000,,,1,\n\
             0,b,a,,11,2000.0,True,1000,,1000\n",
        )
        .unwrap();

        let edges = load_edges_csv(&path).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].last_update, 1554076800);
        assert_eq!(edges[0].channel_id, 0);
        assert_eq!(edges[0].fee_base_msat, 0.0);
        assert_eq!(edges[0].min_htlc, 0.0);
        assert!(!edges[0].disabled);
        assert_eq!(edges[1].last_update, 0);
        assert_eq!(edges[1].capacity, 2000.0);
        assert_eq!(edges[1].fee_rate_milli_msat, 0.0);
    }

    #[test]
    fn test_prepare_edges_merges_disabled_flags() {
        let mut off = edge("a", "b", 1.0);
        off.disabled = true;
        let mut also_off = edge("b", "a", 1.0);
        also_off.disabled = true;
        let edges = vec![off.clone(), edge("a", "b", 1.0), also_off.clone(), also_off];
        let params = ExperimentParams {
            drop_disabled: false,
            drop_low_cap: false,
            ..Default::default()
        };

        let prepared = prepare_edges(&edges, &params).unwrap();
        assert_eq!(prepared.len(), 2);
        // one enabled parallel channel keeps the pair usable
        assert!(!prepared[0].disabled);
        assert!(prepared[1].disabled);
        assert_eq!(prepared[1].capacity, 2.0);
    }

    #[test]
    fn test_prepare_edges_filters_and_merges() {
        let mut disabled = edge("a", "c", 500_000.0);
        disabled.disabled = true;
        let mut parallel = edge("a", "b", 200_000.0);
        parallel.fee_base_msat = 3000.0;
        parallel.min_htlc = 1.0;
        parallel.last_update = 9;

        let edges = vec![
            edge("a", "b", 100_000.0),
            edge("b", "a", 10_000.0),
            disabled,
            parallel,
        ];
        let params = ExperimentParams {
            amount: 60_000,
            ..Default::default()
        };

        let prepared = prepare_edges(&edges, &params).unwrap();
        assert_eq!(prepared.len(), 1);
        let ab = &prepared[0];
        assert_eq!(ab.capacity, 300_000.0);
        assert_eq!(ab.fee_base_msat, 2000.0);
        assert_eq!(ab.min_htlc, 1.0);
        assert_eq!(ab.last_update, 9);
    }

    #[test]
    fn test_prepare_edges_keeps_everything_without_filters() {
        let edges = vec![edge("a", "b", 1.0), edge("b", "a", 1.0)];
        let params = ExperimentParams {
            drop_disabled: false,
            drop_low_cap: false,
            ..Default::default()
        };
        assert_eq!(prepare_edges(&edges, &params).unwrap().len(), 2);

        let params = ExperimentParams::default();
        assert!(matches!(
            prepare_edges(&edges, &params),
            Err(LnError::EmptyTopology(_))
        ));
    }
}
