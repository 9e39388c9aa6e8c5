use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ln_error::Result;
use crate::ln_merchants::MerchantList;
use crate::ln_params::ExperimentParams;

// LN node public key (hex), kept as text end to end
pub type NodeId = String;
pub type ChannelId = u64;
pub type Satoshi = u64;
pub type SnapshotId = u64;

/// Base fee written into clique edges when no fee profile is available
pub const DEFAULT_BASE_FEE: f64 = 100.0;
pub const DEFAULT_FEE_RATE: f64 = 1.0;

/// Capacity used for a hyperedge member that has no explicit deposit
pub const DEFAULT_NODE_CAP: f64 = 1.0;

/// Largest hyperedge that may be expanded into pairwise edges
pub const DEFAULT_MAX_CLIQUE_SIZE: usize = 500;

// ============================================================================
// Preprocessed LN edge
// ============================================================================

/// One direction of a payment channel, in the preprocessed LN edge schema
///
/// Field order is the column order of the CSV files consumed by the traffic
/// simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectedEdge {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub snapshot_id: SnapshotId,
    pub src: NodeId,
    pub trg: NodeId,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub last_update: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub channel_id: ChannelId,
    /// Channel capacity in satoshi
    pub capacity: f64,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub disabled: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fee_base_msat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fee_rate_milli_msat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_htlc: f64,
}

// ============================================================================
// Clique edge (hyperedge expansion)
// ============================================================================

/// Pairwise edge produced by expanding a hyperedge into a clique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliqueEdge {
    pub src: NodeId,
    pub trg: NodeId,
    pub capacity: f64,
    pub base_fee: f64,
    pub fee_rate: f64,
    pub enabled: bool,
}

// ============================================================================
// Synthetic transaction
// ============================================================================

/// A sampled payment: `amount_sat` from `source` to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Index of the draw; gaps remain where draws were filtered out
    pub transaction_id: u64,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "amount_SAT")]
    pub amount_sat: Satoshi,
}

// ============================================================================
// Sampler seam
// ============================================================================

/// Produces synthetic payments over a topology
///
/// The routing simulation itself (paths, fees, depletion) belongs to the
/// external traffic simulator; implementors only decide who pays whom.
pub trait TransactionSampler {
    fn sample(
        &mut self,
        edges: &[DirectedEdge],
        merchants: &MerchantList,
        params: &ExperimentParams,
    ) -> Result<Vec<Transaction>>;
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Parse a boolean cell as written by different tools (`true`, `True`, `1`, ...)
pub(crate) fn parse_bool_cell(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_flexible_bool(deserializer)?.unwrap_or(false))
}

pub(crate) fn optional_flexible_bool<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell: Option<String> = Option::deserialize(deserializer)?;
    match cell {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_bool_cell(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("not a boolean: {}", text))),
    }
}

/// Numeric cell that may be blank (missing value) or written as a float
enum NumericCell {
    Blank,
    Int(u64),
    Float(f64),
}

struct NumericCellVisitor;

impl<'de> Visitor<'de> for NumericCellVisitor {
    type Value = NumericCell;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or an empty cell")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<NumericCell, E> {
        Ok(NumericCell::Int(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<NumericCell, E> {
        Ok(NumericCell::Float(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<NumericCell, E> {
        if v.is_nan() {
            return Ok(NumericCell::Blank);
        }
        Ok(NumericCell::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<NumericCell, E> {
        let text = v.trim();
        if text.is_empty() {
            return Ok(NumericCell::Blank);
        }
        if let Ok(n) = text.parse::<u64>() {
            return Ok(NumericCell::Int(n));
        }
        match text.parse::<f64>() {
            Ok(n) => self.visit_f64(n),
            Err(_) => Err(E::custom(format!("not a number: {}", v))),
        }
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<NumericCell, E> {
        Ok(NumericCell::Blank)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<NumericCell, E> {
        Ok(NumericCell::Blank)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<NumericCell, D::Error> {
        d.deserialize_any(NumericCellVisitor)
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match deserializer.deserialize_any(NumericCellVisitor)? {
        NumericCell::Blank => 0.0,
        NumericCell::Int(v) => v as f64,
        NumericCell::Float(v) => v,
    })
}

/// Blank cells become 0, `1554076800.0` becomes `1554076800`
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match deserializer.deserialize_any(NumericCellVisitor)? {
        NumericCell::Blank => Ok(0),
        NumericCell::Int(v) => Ok(v),
        NumericCell::Float(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
        NumericCell::Float(v) => Err(de::Error::custom(format!("not a whole number: {}", v))),
    }
}
