//! Hypergraph constructions over the channel graph
//!
//! - **LN rollup**: a single hyperedge containing every node
//! - **Supernodes**: neighborhoods of nodes whose neighbors cannot reach each
//!   other locally
//! - **NCH** (neighborhood cover hypergraph): neighborhoods of a greedy vertex
//!   cover
//! - **FHS** (fixed hyperedge size): BFS groups of at most `m_max` nodes,
//!   peeled off the graph until no channel is left uncovered

use std::collections::VecDeque;
use std::fmt;

use hashbrown::HashSet;
use log::{debug, info};
use serde::Deserialize;

use crate::ln_error::{LnError, Result};
use crate::ln_graph::UndirectedGraph;
use crate::ln_hypergraph::{CapacityPolicy, Hypergraph};
use crate::ln_interface::NodeId;

pub const DEFAULT_MAX_SEARCH_DEPTH: usize = 4;
pub const DEFAULT_MAX_STATES: usize = 5000;

// ============================================================================
// Topology selection
// ============================================================================

/// Which hypergraph to build, as written in scenario files
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    Rollup,

    Supernode {
        #[serde(default = "default_max_search_depth")]
        max_search_depth: usize,
        #[serde(default = "default_max_states")]
        max_states: usize,
    },

    Nch {
        #[serde(default)]
        max_cover_size: Option<usize>,
    },

    Fhs { m_max: usize },
}

fn default_max_search_depth() -> usize {
    DEFAULT_MAX_SEARCH_DEPTH
}

fn default_max_states() -> usize {
    DEFAULT_MAX_STATES
}

impl TopologySpec {
    pub fn supernode() -> Self {
        TopologySpec::Supernode {
            max_search_depth: DEFAULT_MAX_SEARCH_DEPTH,
            max_states: DEFAULT_MAX_STATES,
        }
    }

    /// File-name friendly label, e.g. `fhs_5`
    pub fn label(&self) -> String {
        match self {
            TopologySpec::Rollup => "lnrollup".to_string(),
            TopologySpec::Supernode { .. } => "supernode".to_string(),
            TopologySpec::Nch { .. } => "nch".to_string(),
            TopologySpec::Fhs { m_max } => format!("fhs_{}", m_max),
        }
    }

    /// Build the hypergraph with the construction's own deposit convention
    pub fn build(&self, graph: &UndirectedGraph) -> Result<Hypergraph> {
        let hypergraph = match self {
            TopologySpec::Rollup => ln_rollup(graph),
            TopologySpec::Supernode {
                max_search_depth,
                max_states,
            } => supernode_hypergraph(graph, *max_search_depth, *max_states),
            TopologySpec::Nch { max_cover_size } => nch(graph, *max_cover_size),
            TopologySpec::Fhs { m_max } => fhs(graph, *m_max)?,
        };
        info!(
            "{}: {} hyperedges over {} nodes / {} channels",
            self.label(),
            hypergraph.len(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(hypergraph)
    }
}

impl fmt::Display for TopologySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn ids_of(graph: &UndirectedGraph, nodes: impl IntoIterator<Item = usize>) -> Vec<NodeId> {
    nodes
        .into_iter()
        .map(|n| graph.node_id(n).to_string())
        .collect()
}

// ============================================================================
// LN rollup
// ============================================================================

/// One hyperedge holding every node, each with a unit deposit
pub fn ln_rollup(graph: &UndirectedGraph) -> Hypergraph {
    let mut hypergraph = Hypergraph::new(vec![ids_of(graph, graph.node_indices())]);
    if graph.node_count() == 0 {
        hypergraph.hyperedges.clear();
    }
    hypergraph.assign_caps(CapacityPolicy::Uniform);
    hypergraph
}

// ============================================================================
// Supernodes
// ============================================================================

/// Nodes within two hops of `n`, excluding `n` itself
///
/// `n` must stay out: with it in the ball every pair of neighbors is joined
/// through `n` and no node of degree 2 or more survives.
fn two_hop_ball(graph: &UndirectedGraph, n: usize) -> HashSet<usize> {
    let mut ball = HashSet::new();
    for first in graph.neighbors(n) {
        ball.insert(first);
        ball.extend(graph.neighbors(first));
    }
    ball.remove(&n);
    ball
}

/// Is there a path `u -> v` inside `ball`, at most `max_depth` edges long,
/// whose internal nodes carry strictly decreasing ids?
///
/// Gives up (returns false) once `max_states` states have been explored.
fn exists_monotone_path(
    graph: &UndirectedGraph,
    u: usize,
    v: usize,
    ball: &HashSet<usize>,
    ids: &[u64],
    max_depth: usize,
    max_states: usize,
) -> bool {
    if u == v {
        return true;
    }
    if !ball.contains(&u) || !ball.contains(&v) {
        return false;
    }

    // (node, id of the last internal node, depth)
    let mut queue: VecDeque<(usize, Option<u64>, usize)> = VecDeque::new();
    let mut seen: HashSet<usize> = HashSet::new();
    queue.push_back((u, None, 0));
    let mut explored = 0;

    while let Some((current, last_internal, depth)) = queue.pop_front() {
        explored += 1;
        if explored > max_states {
            return false;
        }
        if depth >= max_depth {
            continue;
        }

        for next in graph.neighbors(current) {
            if next == v {
                return true;
            }
            if next == u || !ball.contains(&next) {
                continue;
            }
            let next_id = ids[next];
            if last_internal.map_or(false, |last| last <= next_id) {
                continue;
            }
            if seen.insert(next) {
                queue.push_back((next, Some(next_id), depth + 1));
            }
        }
    }

    false
}

/// Select supernodes: a node stays a supernode only if no two of its
/// neighbors are adjacent or joined by a short monotone path around it
pub fn select_supernodes(
    graph: &UndirectedGraph,
    max_search_depth: usize,
    max_states: usize,
) -> Vec<usize> {
    let ids = graph.numeric_ids();
    let mut supernodes = Vec::new();

    for n in graph.node_indices() {
        let neighbors: Vec<usize> = graph.neighbors(n).collect();
        let ball = two_hop_ball(graph, n);

        let redundant = neighbors.iter().enumerate().any(|(i, &u)| {
            neighbors[i + 1..].iter().any(|&v| {
                graph.has_edge(u, v)
                    || exists_monotone_path(graph, u, v, &ball, &ids, max_search_depth, max_states)
            })
        });

        if !redundant {
            supernodes.push(n);
        }
    }

    debug!(
        "{} of {} nodes selected as supernodes",
        supernodes.len(),
        graph.node_count()
    );
    supernodes
}

/// One hyperedge per supernode: its neighborhood, with uniform deposits
pub fn supernode_hypergraph(
    graph: &UndirectedGraph,
    max_search_depth: usize,
    max_states: usize,
) -> Hypergraph {
    let hyperedges = select_supernodes(graph, max_search_depth, max_states)
        .into_iter()
        .filter(|s| graph.degree(*s) > 0)
        .map(|s| ids_of(graph, graph.neighbors(s)))
        .collect();

    let mut hypergraph = Hypergraph::new(hyperedges);
    hypergraph.assign_caps(CapacityPolicy::Uniform);
    hypergraph
}

// ============================================================================
// Neighborhood cover (NCH)
// ============================================================================

/// Greedy vertex cover: repeatedly take the highest-degree node and delete it,
/// until no edge is left or `max_nodes` nodes are taken
pub fn greedy_vertex_cover(graph: &UndirectedGraph, max_nodes: Option<usize>) -> Vec<usize> {
    let mut work = graph.clone();
    let mut cover = Vec::new();

    while work.edge_count() > 0 {
        let Some(node) = work.highest_degree_node() else {
            break;
        };
        cover.push(node);
        work.remove_node(node);
        if max_nodes.map_or(false, |max| cover.len() >= max) {
            break;
        }
    }

    cover
}

/// Neighborhoods of the cover nodes, taken in sorted node id order
pub fn nch(graph: &UndirectedGraph, max_cover_size: Option<usize>) -> Hypergraph {
    let mut cover = greedy_vertex_cover(graph, max_cover_size);
    cover.sort_by(|a, b| graph.node_id(*a).cmp(graph.node_id(*b)));

    let hyperedges = cover
        .into_iter()
        .filter(|c| graph.degree(*c) > 0)
        .map(|c| ids_of(graph, graph.neighbors(c)))
        .collect();

    Hypergraph::new(hyperedges)
}

// ============================================================================
// Fixed hyperedge size (FHS)
// ============================================================================

/// BFS from `start` collecting at most `m_max` nodes, root first
pub fn bfs_collect(graph: &UndirectedGraph, start: usize, m_max: usize) -> Vec<usize> {
    let mut visited = HashSet::new();
    visited.insert(start);
    let mut queue = VecDeque::from([start]);
    let mut collected = vec![start];

    'outer: while let Some(current) = queue.pop_front() {
        if collected.len() >= m_max {
            break;
        }
        for next in graph.neighbors(current) {
            if visited.insert(next) {
                queue.push_back(next);
                collected.push(next);
                if collected.len() >= m_max {
                    break 'outer;
                }
            }
        }
    }

    collected
}

/// Peel BFS groups of at most `m_max` nodes off a working copy of the graph
///
/// Every round starts at the highest-degree node, emits the group as a
/// hyperedge, deletes the channels inside the group and prunes nodes left
/// without channels. Deposits are left for the caller.
pub fn fhs(graph: &UndirectedGraph, m_max: usize) -> Result<Hypergraph> {
    if m_max < 2 {
        return Err(LnError::InvalidParams(format!(
            "fhs needs m_max >= 2 to make progress, got {}",
            m_max
        )));
    }

    let mut work = graph.clone();
    let mut hyperedges = Vec::new();

    while work.edge_count() > 0 {
        let Some(root) = work.highest_degree_node() else {
            break;
        };
        let group = bfs_collect(&work, root, m_max);

        for (i, &a) in group.iter().enumerate() {
            for &b in &group[i + 1..] {
                work.remove_edge(a, b);
            }
        }
        work.prune_isolated();

        hyperedges.push(ids_of(graph, group));
    }

    Ok(Hypergraph::new(hyperedges))
}
