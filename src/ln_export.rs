// Flat-table output
//
// Every table is written with the csv crate from the serde field order of its
// row type, so the header always matches the struct.

use std::fs;
use std::path::Path;

use hashbrown::HashSet;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ln_error::{LnError, Result};
use crate::ln_interface::{CliqueEdge, DirectedEdge, Satoshi, Transaction};
use crate::ln_merchants::MerchantList;

/// Write `rows` as CSV with a header, creating parent directories
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(LnError::io(parent))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(LnError::csv(path))?;
    for row in rows {
        writer.serialize(row).map_err(LnError::csv(path))?;
    }
    writer.flush().map_err(LnError::io(path))?;
    Ok(())
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(LnError::csv(path))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(LnError::csv(path))
}

pub fn write_transactions(path: &Path, transactions: &[Transaction]) -> Result<()> {
    write_rows(path, transactions)?;
    info!("Wrote {} transactions to {}", transactions.len(), path.display());
    Ok(())
}

pub fn write_edges(path: &Path, edges: &[DirectedEdge]) -> Result<()> {
    write_rows(path, edges)?;
    info!("Wrote {} LN edges to {}", edges.len(), path.display());
    Ok(())
}

pub fn write_clique_edges(path: &Path, rows: &[CliqueEdge]) -> Result<()> {
    write_rows(path, rows)?;
    info!("Wrote {} clique edges to {}", rows.len(), path.display());
    Ok(())
}

pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    read_rows(path)
}

// ============================================================================
// Dataset summary
// ============================================================================

/// Aggregate view of a transaction table
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSummary {
    pub transactions: usize,
    pub distinct_sources: usize,
    pub distinct_targets: usize,
    pub total_amount: Satoshi,
    /// Transactions paying a merchant, when a merchant list was given
    pub merchant_targets: Option<usize>,
}

impl TrafficSummary {
    pub fn of(transactions: &[Transaction], merchants: Option<&MerchantList>) -> Self {
        let sources: HashSet<&str> = transactions.iter().map(|t| t.source.as_str()).collect();
        let targets: HashSet<&str> = transactions.iter().map(|t| t.target.as_str()).collect();
        Self {
            transactions: transactions.len(),
            distinct_sources: sources.len(),
            distinct_targets: targets.len(),
            total_amount: transactions.iter().map(|t| t.amount_sat).sum(),
            merchant_targets: merchants
                .map(|m| transactions.iter().filter(|t| m.contains(&t.target)).count()),
        }
    }
}

impl std::fmt::Display for TrafficSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Transactions:      {}", self.transactions)?;
        writeln!(f, "  Distinct sources:  {}", self.distinct_sources)?;
        writeln!(f, "  Distinct targets:  {}", self.distinct_targets)?;
        write!(f, "  Total amount:      {} sat", self.total_amount)?;
        if let Some(hits) = self.merchant_targets {
            let share = if self.transactions == 0 {
                0.0
            } else {
                100.0 * hits as f64 / self.transactions as f64
            };
            write!(f, "\n  Merchant targets:  {} ({:.1}%)", hits, share)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u64, source: &str, target: &str) -> Transaction {
        Transaction {
            transaction_id: id,
            source: source.to_string(),
            target: target.to_string(),
            amount_sat: 60_000,
        }
    }

    #[test]
    fn test_transactions_written_under_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("0").join("transactions.csv");
        let txs = vec![tx(0, "a", "b"), tx(2, "c", "a")];

        write_transactions(&path, &txs).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "transaction_id,source,target,amount_SAT\n0,a,b,60000\n2,c,a,60000\n"
        );
        assert_eq!(read_transactions(&path).unwrap(), txs);
    }

    #[test]
    fn test_edge_header_follows_ln_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        let edge = DirectedEdge {
            snapshot_id: 0,
            src: "a".to_string(),
            trg: "b".to_string(),
            last_update: 1_600_000_000,
            channel_id: 42,
            capacity: 500_000.0,
            disabled: false,
            fee_base_msat: 1000.0,
            fee_rate_milli_msat: 1.0,
            min_htlc: 1000.0,
        };

        write_edges(&path, &[edge.clone()]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "snapshot_id,src,trg,last_update,channel_id,capacity,disabled,fee_base_msat,fee_rate_milli_msat,min_htlc\n"
        ));
        let back: Vec<DirectedEdge> = read_rows(&path).unwrap();
        assert_eq!(back, vec![edge]);
    }

    #[test]
    fn test_clique_edge_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clique.csv");
        let row = CliqueEdge {
            src: "a".to_string(),
            trg: "b".to_string(),
            capacity: 0.5,
            base_fee: 100.0,
            fee_rate: 1.0,
            enabled: true,
        };

        write_clique_edges(&path, &[row]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "src,trg,capacity,base_fee,fee_rate,enabled\na,b,0.5,100.0,1.0,true\n"
        );
    }

    #[test]
    fn test_summary_counts() {
        let txs = vec![tx(0, "a", "m"), tx(1, "b", "m"), tx(3, "a", "c")];
        let merchants = MerchantList::from_ids(["m"]);

        let summary = TrafficSummary::of(&txs, Some(&merchants));
        assert_eq!(summary.transactions, 3);
        assert_eq!(summary.distinct_sources, 2);
        assert_eq!(summary.distinct_targets, 2);
        assert_eq!(summary.total_amount, 180_000);
        assert_eq!(summary.merchant_targets, Some(2));
        assert!(summary.to_string().contains("Merchant targets:  2 (66.7%)"));

        assert_eq!(TrafficSummary::of(&txs, None).merchant_targets, None);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = read_transactions(Path::new("/nonexistent/transactions.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/transactions.csv"));
    }
}
