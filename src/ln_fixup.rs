// Conversion of clique edge tables into the LN edge schema
//
// Clique exports only carry src/trg/capacity and fee hints. The traffic
// simulator wants the full preprocessed schema, so the missing columns are
// filled in: snapshot 0, one timestamp for every row, random 15-digit channel
// ids, and default fees and minimum HTLC.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;

use crate::ln_error::{LnError, Result};
use crate::ln_export::write_edges;
use crate::ln_interface::{optional_flexible_bool, CliqueEdge, DirectedEdge, NodeId};

pub const DEFAULT_FIXUP_BASE_FEE: f64 = 1000.0;
pub const DEFAULT_FIXUP_FEE_RATE: f64 = 1.0;
pub const DEFAULT_MIN_HTLC: f64 = 1000.0;

const CHANNEL_ID_MIN: u64 = 100_000_000_000_000;
const CHANNEL_ID_MAX: u64 = 1_000_000_000_000_000;

/// Input row: any edge table with at least src, trg and capacity
#[derive(Debug, Clone, Deserialize)]
pub struct LooseEdgeRow {
    pub src: NodeId,
    pub trg: NodeId,
    pub capacity: f64,
    #[serde(default, deserialize_with = "optional_flexible_bool")]
    pub disabled: Option<bool>,
    #[serde(default, deserialize_with = "optional_flexible_bool")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub fee_base_msat: Option<f64>,
    #[serde(default)]
    pub base_fee: Option<f64>,
    #[serde(default)]
    pub fee_rate_milli_msat: Option<f64>,
    #[serde(default)]
    pub fee_rate: Option<f64>,
}

impl From<&CliqueEdge> for LooseEdgeRow {
    fn from(row: &CliqueEdge) -> Self {
        Self {
            src: row.src.clone(),
            trg: row.trg.clone(),
            capacity: row.capacity,
            disabled: None,
            enabled: Some(row.enabled),
            fee_base_msat: None,
            base_fee: Some(row.base_fee),
            fee_rate_milli_msat: None,
            fee_rate: Some(row.fee_rate),
        }
    }
}

/// Fills in the LN columns a loose edge row lacks
pub struct EdgeFixer {
    rng: StdRng,
    last_update: u64,
}

impl EdgeFixer {
    /// `last_update` defaults to the current time
    pub fn new(rng: StdRng, last_update: Option<u64>) -> Self {
        let last_update = last_update.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        Self { rng, last_update }
    }

    pub fn fix(&mut self, row: LooseEdgeRow) -> DirectedEdge {
        // an explicit disabled column wins over enabled
        let disabled = row
            .disabled
            .or(row.enabled.map(|enabled| !enabled))
            .unwrap_or(false);
        DirectedEdge {
            snapshot_id: 0,
            src: row.src,
            trg: row.trg,
            last_update: self.last_update,
            channel_id: self.rng.gen_range(CHANNEL_ID_MIN..CHANNEL_ID_MAX),
            capacity: row.capacity,
            disabled,
            fee_base_msat: row
                .fee_base_msat
                .or(row.base_fee)
                .unwrap_or(DEFAULT_FIXUP_BASE_FEE),
            fee_rate_milli_msat: row
                .fee_rate_milli_msat
                .or(row.fee_rate)
                .unwrap_or(DEFAULT_FIXUP_FEE_RATE),
            min_htlc: DEFAULT_MIN_HTLC,
        }
    }

    pub fn fix_all(&mut self, rows: impl IntoIterator<Item = LooseEdgeRow>) -> Vec<DirectedEdge> {
        rows.into_iter().map(|row| self.fix(row)).collect()
    }

    pub fn fix_clique(&mut self, rows: &[CliqueEdge]) -> Vec<DirectedEdge> {
        self.fix_all(rows.iter().map(LooseEdgeRow::from))
    }
}

pub fn load_loose_edges(path: &Path) -> Result<Vec<LooseEdgeRow>> {
    crate::ln_export::read_rows(path)
}

/// `runs/fhs_5_edges.csv` becomes `runs/fhs_5_edges_fixed.csv`
pub fn default_fixed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}_fixed.csv", stem))
}

/// Rewrite `input` in the LN schema; returns the number of edges written
pub fn fix_edge_file(input: &Path, output: &Path, fixer: &mut EdgeFixer) -> Result<usize> {
    let rows = load_loose_edges(input)?;
    if rows.is_empty() {
        return Err(LnError::EmptyTopology(format!("{} has no rows", input.display())));
    }
    let edges = fixer.fix_all(rows);
    write_edges(output, &edges)?;
    info!(
        "Fixed {} edges from {} (last_update {})",
        edges.len(),
        input.display(),
        fixer.last_update
    );
    Ok(edges.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ln_params::stream_rng;
    use std::fs;

    fn fixer() -> EdgeFixer {
        EdgeFixer::new(stream_rng(&[5u8; 32], "fixup"), Some(1_700_000_000))
    }

    #[test]
    fn test_clique_rows_get_ln_columns() {
        let rows = vec![CliqueEdge {
            src: "a".to_string(),
            trg: "b".to_string(),
            capacity: 0.5,
            base_fee: 100.0,
            fee_rate: 1.0,
            enabled: false,
        }];

        let edges = fixer().fix_clique(&rows);

        assert_eq!(edges.len(), 1);
        let e = &edges[0];
        assert_eq!(e.snapshot_id, 0);
        assert_eq!(e.last_update, 1_700_000_000);
        assert!((CHANNEL_ID_MIN..CHANNEL_ID_MAX).contains(&e.channel_id));
        assert!(e.disabled);
        assert_eq!(e.fee_base_msat, 100.0);
        assert_eq!(e.fee_rate_milli_msat, 1.0);
        assert_eq!(e.min_htlc, DEFAULT_MIN_HTLC);
    }

    #[test]
    fn test_minimal_csv_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fhs_5_edges.csv");
        fs::write(&input, "src,trg,capacity\na,b,10\nb,a,10\n").unwrap();
        let output = default_fixed_path(&input);

        let written = fix_edge_file(&input, &output, &mut fixer()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(output.file_name().unwrap(), "fhs_5_edges_fixed.csv");

        let edges: Vec<DirectedEdge> = crate::ln_export::read_rows(&output).unwrap();
        assert!(edges.iter().all(|e| !e.disabled));
        assert!(edges.iter().all(|e| e.fee_base_msat == DEFAULT_FIXUP_BASE_FEE));
        assert!(edges.iter().all(|e| e.fee_rate_milli_msat == DEFAULT_FIXUP_FEE_RATE));
    }

    #[test]
    fn test_ln_fee_columns_take_precedence() {
        let data = "src,trg,capacity,fee_base_msat,base_fee,disabled,enabled\na,b,10,7,100,True,True\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<LooseEdgeRow> = reader
            .deserialize()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        let edge = fixer().fix(rows[0].clone());
        assert_eq!(edge.fee_base_msat, 7.0);
        assert!(edge.disabled);
    }

    #[test]
    fn test_channel_ids_reproducible() {
        let row = || LooseEdgeRow::from(&CliqueEdge {
            src: "a".to_string(),
            trg: "b".to_string(),
            capacity: 1.0,
            base_fee: 100.0,
            fee_rate: 1.0,
            enabled: true,
        });
        assert_eq!(fixer().fix(row()).channel_id, fixer().fix(row()).channel_id);
    }
}
