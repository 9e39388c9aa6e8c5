//! # ln-traffic - Lightning Network traffic datasets
//!
//! Tooling around a Lightning Network topology snapshot, a merchant list and a
//! synthetic payment dataset. The crate draws payment endpoints over a
//! topology and writes them out as a flat table; routing, fees and channel
//! depletion are left to an external traffic simulator.
//!
//! ## Core Components
//!
//! - **TopologySource**: loads raw graph dumps or preprocessed edge CSVs
//! - **MerchantList**: allowlist of nodes that receive most payments
//! - **TransactionSampler**: seam for drawing payments; `EndpointSampler` is the
//!   built-in, seeded implementation
//! - **Hypergraph / TopologySpec**: alternative topologies (LN rollup,
//!   supernodes, NCH, FHS) built from the channel graph
//!
//! ## Usage
//!
//! ```no_run
//! use ln_traffic::{
//!     prepare_edges, write_transactions, EndpointSampler, ExperimentParams, MerchantList,
//!     TopologySource, TransactionSampler,
//! };
//! use std::path::Path;
//!
//! # fn main() -> ln_traffic::Result<()> {
//! let params = ExperimentParams::load(Path::new("params.json"))?;
//! let edges = TopologySource::preprocessed("0", Path::new("../ln_data"))?.load()?;
//! let edges = prepare_edges(&edges, &params)?;
//! let merchants = MerchantList::load(Path::new("../ln_data/1ml_meta_data.csv"))?;
//!
//! let mut sampler = EndpointSampler::from_seed(&[0u8; 32]);
//! let transactions = sampler.sample(&edges, &merchants, &params)?;
//! write_transactions(Path::new("out/transactions.csv"), &transactions)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Runs
//!
//! The `topology_runner` binary in `simulator/` builds every topology listed in
//! a YAML scenario and optionally hands each one to the external simulator.

// Shared types and errors
pub mod ln_error;
pub mod ln_interface;
pub mod ln_params;

// Traffic pipeline
pub mod ln_export;
pub mod ln_external;
pub mod ln_merchants;
pub mod ln_sampler;
pub mod ln_topology;

// Topology transformations
pub mod ln_fixup;
pub mod ln_graph;
pub mod ln_hypergraph;
pub mod ln_topologies;

pub mod ln_pipeline;

// Re-export commonly used types
pub use ln_error::{LnError, Result};
pub use ln_export::{write_clique_edges, write_edges, write_transactions, TrafficSummary};
pub use ln_external::ExternalSimulator;
pub use ln_interface::{
    ChannelId, CliqueEdge, DirectedEdge, NodeId, Satoshi, Transaction, TransactionSampler,
};
pub use ln_merchants::MerchantList;
pub use ln_params::{parse_seed_hex, resolve_seed, seed_to_hex, ExperimentParams};
pub use ln_sampler::EndpointSampler;
pub use ln_topology::{prepare_edges, TopologySource};
// Topology building
pub use ln_graph::{EdgeTable, UndirectedGraph};
pub use ln_hypergraph::{CapacityPolicy, Hypergraph};
pub use ln_topologies::TopologySpec;
