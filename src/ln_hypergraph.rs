// Hypergraph model, capacity assignment and hyperjson exchange format
//
// A hyperedge is a multi-party channel. Each member deposits a capacity into
// every hyperedge it belongs to; deposits are keyed by (node, hyperedge index).
//
// hyperjson layout:
//   {"hyperedges": [["a", "b", "c"], ...], "node_caps": {"a|0": 1.0, ...}}

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::ln_error::{LnError, Result};
use crate::ln_interface::{CliqueEdge, NodeId, DEFAULT_BASE_FEE, DEFAULT_FEE_RATE, DEFAULT_NODE_CAP};

// ============================================================================
// Capacity Policies
// ============================================================================

/// How member deposits are assigned after the hyperedges are built
#[derive(Debug, Clone, Copy)]
pub enum CapacityPolicy<'a> {
    /// Leave deposits empty; consumers fall back to a unit deposit
    None,

    /// Each membership gets `1 / memberships`
    Uniform,

    /// Split the node's total incident capacity evenly over its memberships;
    /// a non-positive total becomes a unit deposit
    NodeTotals(&'a HashMap<NodeId, f64>),
}

// ============================================================================
// Hypergraph
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hypergraph {
    pub hyperedges: Vec<Vec<NodeId>>,
    pub node_caps: BTreeMap<(NodeId, usize), f64>,
}

/// Size statistics over the hyperedges of a hypergraph
#[derive(Debug, Clone, PartialEq)]
pub struct SizeStats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub median: usize,
    pub mean: f64,
}

impl fmt::Display for SizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} min={} max={} median={} mean={:.2}",
            self.count, self.min, self.max, self.median, self.mean
        )
    }
}

impl Hypergraph {
    pub fn new(hyperedges: Vec<Vec<NodeId>>) -> Self {
        Self {
            hyperedges,
            node_caps: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hyperedges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyperedges.is_empty()
    }

    /// Hyperedge indices per member node, nodes in first-seen order
    pub fn memberships(&self) -> IndexMap<&str, Vec<usize>> {
        let mut memberships: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (idx, hyperedge) in self.hyperedges.iter().enumerate() {
            for node in hyperedge {
                memberships.entry(node.as_str()).or_default().push(idx);
            }
        }
        memberships
    }

    pub fn assign_caps(&mut self, policy: CapacityPolicy<'_>) {
        let mut caps = BTreeMap::new();
        for (node, idxs) in self.memberships() {
            let total = match policy {
                CapacityPolicy::None => break,
                CapacityPolicy::Uniform => 1.0,
                CapacityPolicy::NodeTotals(totals) => {
                    let total = totals.get(node).copied().unwrap_or(0.0);
                    if total <= 0.0 {
                        DEFAULT_NODE_CAP
                    } else {
                        total
                    }
                }
            };
            let per_membership = total / idxs.len() as f64;
            for idx in idxs {
                caps.insert((node.to_string(), idx), per_membership);
            }
        }
        self.node_caps = caps;
    }

    /// Deposit of `node` in hyperedge `idx`
    pub fn cap(&self, node: &str, idx: usize) -> f64 {
        self.node_caps
            .get(&(node.to_string(), idx))
            .copied()
            .unwrap_or(DEFAULT_NODE_CAP)
    }

    pub fn size_stats(&self) -> Option<SizeStats> {
        if self.hyperedges.is_empty() {
            return None;
        }
        let mut sizes: Vec<usize> = self.hyperedges.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        Some(SizeStats {
            count: sizes.len(),
            min: sizes[0],
            max: sizes[sizes.len() - 1],
            median: sizes[sizes.len() / 2],
            mean: sizes.iter().sum::<usize>() as f64 / sizes.len() as f64,
        })
    }

    pub fn max_size(&self) -> usize {
        self.hyperedges.iter().map(Vec::len).max().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Clique expansion
    // ------------------------------------------------------------------------

    fn clique_rows_of(
        &self,
        idx: usize,
        fee_profile: Option<&HashMap<NodeId, f64>>,
        rows: &mut Vec<CliqueEdge>,
    ) {
        let hyperedge = &self.hyperedges[idx];
        for u in hyperedge {
            let capacity = self.cap(u, idx);
            let base_fee = fee_profile
                .and_then(|profile| profile.get(u).copied())
                .unwrap_or(DEFAULT_BASE_FEE);
            for v in hyperedge {
                if u == v {
                    continue;
                }
                rows.push(CliqueEdge {
                    src: u.clone(),
                    trg: v.clone(),
                    capacity,
                    base_fee,
                    fee_rate: DEFAULT_FEE_RATE,
                    enabled: true,
                });
            }
        }
    }

    /// Expand every hyperedge into all ordered member pairs
    ///
    /// Refused when `max_clique_size` is given and some hyperedge is larger,
    /// since the output grows quadratically with hyperedge size.
    pub fn to_clique_rows(
        &self,
        max_clique_size: Option<usize>,
        fee_profile: Option<&HashMap<NodeId, f64>>,
    ) -> Result<Vec<CliqueEdge>> {
        if let Some(limit) = max_clique_size {
            let size = self.max_size();
            if size > limit {
                return Err(LnError::CliqueTooLarge { size, limit });
            }
        }
        let mut rows = Vec::new();
        for idx in 0..self.hyperedges.len() {
            self.clique_rows_of(idx, fee_profile, &mut rows);
        }
        Ok(rows)
    }

    /// Expand hyperedges up to `threshold` members and keep the larger ones
    ///
    /// The kept hyperedges are reindexed from zero and carry their deposits.
    pub fn split(&self, threshold: usize) -> (Vec<CliqueEdge>, Hypergraph) {
        let mut rows = Vec::new();
        let mut big = Hypergraph::default();
        for (idx, hyperedge) in self.hyperedges.iter().enumerate() {
            if hyperedge.len() <= threshold {
                self.clique_rows_of(idx, None, &mut rows);
                continue;
            }
            let new_idx = big.hyperedges.len();
            for node in hyperedge {
                if let Some(cap) = self.node_caps.get(&(node.clone(), idx)) {
                    big.node_caps.insert((node.clone(), new_idx), *cap);
                }
            }
            big.hyperedges.push(hyperedge.clone());
        }
        (rows, big)
    }

    // ------------------------------------------------------------------------
    // hyperjson
    // ------------------------------------------------------------------------

    pub fn to_json(&self) -> serde_json::Result<String> {
        let doc = HyperJsonOut {
            hyperedges: &self.hyperedges,
            node_caps: self
                .node_caps
                .iter()
                .map(|((node, idx), cap)| (format!("{}|{}", node, idx), *cap))
                .collect(),
        };
        serde_json::to_string(&doc)
    }

    pub fn from_json(json: &[u8]) -> Result<Self> {
        let doc: HyperJsonIn = serde_json::from_slice(json)
            .map_err(|e| LnError::Hyperjson(e.to_string()))?;

        let hyperedges = doc
            .hyperedges
            .into_iter()
            .map(|members| members.iter().map(node_key).collect())
            .collect();

        let mut node_caps = BTreeMap::new();
        for (key, cap) in doc.node_caps {
            let (node, idx) = key
                .rsplit_once('|')
                .ok_or_else(|| LnError::Hyperjson(format!("cap key `{}` lacks `|`", key)))?;
            let idx = idx
                .parse::<usize>()
                .map_err(|_| LnError::Hyperjson(format!("bad hyperedge index in `{}`", key)))?;
            node_caps.insert((node.to_string(), idx), cap);
        }

        Ok(Self {
            hyperedges,
            node_caps,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(LnError::io(parent))?;
        }
        let json = self.to_json().map_err(LnError::json(path))?;
        fs::write(path, json).map_err(LnError::io(path))?;
        info!("Wrote hyperjson {} ({} hyperedges)", path.display(), self.len());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(LnError::io(path))?;
        Self::from_json(&bytes)
    }
}

#[derive(Serialize)]
struct HyperJsonOut<'a> {
    hyperedges: &'a [Vec<NodeId>],
    node_caps: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct HyperJsonIn {
    hyperedges: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    node_caps: BTreeMap<String, f64>,
}

// numeric node ids in foreign hyperjson files are kept as their decimal text
fn node_key(value: &serde_json::Value) -> NodeId {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
