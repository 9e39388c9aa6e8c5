// Undirected channel graph and the raw edge table it is built from
//
// Nodes are interned in first-seen order and adjacency is kept in ordered
// sets, so every traversal (and therefore every topology construction) is
// deterministic for a given input file.

use std::collections::BTreeSet;
use std::path::Path;

use hashbrown::HashMap;
use indexmap::IndexSet;
use log::debug;

use crate::ln_error::{LnError, Result};
use crate::ln_interface::{parse_bool_cell, NodeId};
use crate::ln_topology::read_input;

// ============================================================================
// Edge Table
// ============================================================================

/// One row of a pairwise edge table, reduced to what topology building needs
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub src: NodeId,
    pub trg: NodeId,
    pub capacity: Option<f64>,
    pub base_fee: Option<f64>,
    pub disabled: bool,
}

/// Pairwise edge table with loosely named columns
///
/// Accepts the snapshot CSV as well as hand-made edge lists: endpoints may be
/// called `src/trg`, `source/target`, `node1/node2`, `u/v` or `from/to`, and
/// otherwise the second and third columns are used.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    pub rows: Vec<EdgeRecord>,
    pub has_capacity: bool,
    pub has_fees: bool,
}

const ENDPOINT_NAMES: [(&str, &str); 5] = [
    ("src", "trg"),
    ("source", "target"),
    ("node1", "node2"),
    ("u", "v"),
    ("from", "to"),
];

const FEE_COLUMNS: [&str; 2] = ["fee_base_msat", "base_fee"];

fn detect_endpoint_columns(headers: &csv::StringRecord) -> Option<(usize, usize)> {
    let position = |name: &str| headers.iter().position(|h| h == name);
    for (a, b) in ENDPOINT_NAMES {
        if let (Some(i), Some(j)) = (position(a), position(b)) {
            return Some((i, j));
        }
    }
    // first column is usually the snapshot id
    if headers.len() >= 3 {
        return Some((1, 2));
    }
    None
}

impl EdgeTable {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_input(path)?;
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().map_err(LnError::csv(path))?.clone();

        let (src_col, trg_col) =
            detect_endpoint_columns(&headers).ok_or_else(|| LnError::MissingColumn {
                path: path.to_path_buf(),
                column: "src/trg".to_string(),
            })?;
        let cap_col = headers.iter().position(|h| h == "capacity");
        let fee_col = FEE_COLUMNS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == *name));
        let disabled_col = headers.iter().position(|h| h == "disabled");

        debug!(
            "{}: endpoints in columns {} and {}, capacity: {:?}",
            path.display(),
            src_col,
            trg_col,
            cap_col
        );

        let numeric = |record: &csv::StringRecord, col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .and_then(|cell| cell.trim().parse::<f64>().ok())
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(LnError::csv(path))?;
            let (Some(src), Some(trg)) = (record.get(src_col), record.get(trg_col)) else {
                continue;
            };
            rows.push(EdgeRecord {
                src: src.trim().to_string(),
                trg: trg.trim().to_string(),
                // unparsable capacity cells count as zero, like an empty deposit
                capacity: cap_col.map(|_| numeric(&record, cap_col).unwrap_or(0.0)),
                base_fee: fee_col.map(|_| numeric(&record, fee_col).unwrap_or(0.0)),
                disabled: disabled_col
                    .and_then(|c| record.get(c))
                    .and_then(parse_bool_cell)
                    .unwrap_or(false),
            });
        }

        Ok(Self {
            rows,
            has_capacity: cap_col.is_some(),
            has_fees: fee_col.is_some(),
        })
    }

    /// Drop rows flagged as disabled
    pub fn enabled_only(mut self) -> Self {
        self.rows.retain(|r| !r.disabled);
        self
    }

    /// Sum of incident capacity per node; every row credits both endpoints
    pub fn node_capacity_totals(&self) -> HashMap<NodeId, f64> {
        let mut totals: HashMap<NodeId, f64> = HashMap::new();
        for row in &self.rows {
            let cap = row.capacity.unwrap_or(0.0);
            *totals.entry(row.src.clone()).or_insert(0.0) += cap;
            *totals.entry(row.trg.clone()).or_insert(0.0) += cap;
        }
        totals
    }

    /// Mean base fee per node over its incident rows
    pub fn fee_profile(&self) -> Option<HashMap<NodeId, f64>> {
        if !self.has_fees {
            return None;
        }
        let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
        for row in &self.rows {
            let fee = row.base_fee.unwrap_or(0.0);
            for node in [&row.src, &row.trg] {
                let entry = sums.entry(node.as_str()).or_insert((0.0, 0));
                entry.0 += fee;
                entry.1 += 1;
            }
        }
        Some(
            sums.into_iter()
                .map(|(node, (sum, count))| (node.to_string(), sum / count as f64))
                .collect(),
        )
    }

    pub fn to_graph(&self) -> UndirectedGraph {
        UndirectedGraph::from_pairs(self.rows.iter().map(|r| (r.src.as_str(), r.trg.as_str())))
    }
}

// ============================================================================
// Undirected Graph
// ============================================================================

/// Simple undirected graph over interned node ids
///
/// Node indices are stable: removing a node only marks it dead, so indices
/// taken from one copy of a graph stay valid in its clones.
#[derive(Debug, Clone, Default)]
pub struct UndirectedGraph {
    nodes: IndexSet<NodeId>,
    adjacency: Vec<BTreeSet<usize>>,
    alive: Vec<bool>,
    edge_count: usize,
}

impl UndirectedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from endpoint pairs; duplicate channels collapse and self-loops are ignored
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in pairs {
            graph.add_edge(a, b);
        }
        graph
    }

    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(index) = self.nodes.get_index_of(id) {
            return index;
        }
        let (index, _) = self.nodes.insert_full(id.to_string());
        self.adjacency.push(BTreeSet::new());
        self.alive.push(true);
        index
    }

    pub fn add_edge(&mut self, a: &str, b: &str) {
        let i = self.add_node(a);
        let j = self.add_node(b);
        if i == j {
            return;
        }
        if self.adjacency[i].insert(j) {
            self.adjacency[j].insert(i);
            self.edge_count += 1;
        }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes
            .get_index_of(id)
            .filter(|index| self.alive[*index])
    }

    /// Node id for an index (also valid for removed nodes)
    pub fn node_id(&self, index: usize) -> &str {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Live node indices in insertion order
    pub fn node_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |i| self.alive[*i])
    }

    pub fn degree(&self, index: usize) -> usize {
        self.adjacency[index].len()
    }

    /// Neighbors in ascending index order
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[index].iter().copied()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency[a].contains(&b)
    }

    pub fn remove_edge(&mut self, a: usize, b: usize) -> bool {
        if self.adjacency[a].remove(&b) {
            self.adjacency[b].remove(&a);
            self.edge_count -= 1;
            true
        } else {
            false
        }
    }

    /// Remove a node together with its incident edges
    pub fn remove_node(&mut self, index: usize) {
        if !self.alive[index] {
            return;
        }
        let neighbors = std::mem::take(&mut self.adjacency[index]);
        for n in &neighbors {
            self.adjacency[*n].remove(&index);
        }
        self.edge_count -= neighbors.len();
        self.alive[index] = false;
    }

    /// Remove every live node without edges; returns how many were removed
    pub fn prune_isolated(&mut self) -> usize {
        let isolated: Vec<usize> = self
            .node_indices()
            .filter(|i| self.adjacency[*i].is_empty())
            .collect();
        for index in &isolated {
            self.alive[*index] = false;
        }
        isolated.len()
    }

    /// Live node with the highest degree; ties go to the earliest node
    pub fn highest_degree_node(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for index in self.node_indices() {
            let degree = self.degree(index);
            if best.map_or(true, |(_, d)| degree > d) {
                best = Some((index, degree));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Numeric identity per node: the decimal value when the id parses as one,
    /// otherwise the insertion index
    pub fn numeric_ids(&self) -> Vec<u64> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, id)| id.parse::<u64>().unwrap_or(i as u64))
            .collect()
    }
}
