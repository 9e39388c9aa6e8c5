// Pipeline stages shared by the command line and the batch runner
//
//   sampling:  topology -> prepare -> merchants -> sampler -> transactions.csv
//   topology:  edge table -> graph -> hypergraph -> hyperjson (+ clique edges)

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::ln_error::{LnError, Result};
use crate::ln_export::{read_rows, write_clique_edges, write_edges, write_transactions};
use crate::ln_external::ExternalSimulator;
use crate::ln_fixup::EdgeFixer;
use crate::ln_graph::EdgeTable;
use crate::ln_hypergraph::{CapacityPolicy, Hypergraph};
use crate::ln_interface::{CliqueEdge, TransactionSampler, DEFAULT_MAX_CLIQUE_SIZE};
use crate::ln_merchants::MerchantList;
use crate::ln_params::{parse_seed_hex, resolve_seed, seed_to_hex, ExperimentParams};
use crate::ln_sampler::EndpointSampler;
use crate::ln_topologies::TopologySpec;
use crate::ln_topology::{prepare_edges, TopologySource};

/// `runs/fhs_5` + `_hyper.json` -> `runs/fhs_5_hyper.json`
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

// ============================================================================
// Transaction sampling
// ============================================================================

/// Everything one sampling run needs
#[derive(Debug, Clone)]
pub struct SamplingJob {
    pub source: TopologySource,
    pub merchants: PathBuf,
    pub params: ExperimentParams,
    pub output_dir: PathBuf,
    /// Passed through to the external simulator
    pub hyperjson: Option<PathBuf>,
    /// Overrides the seed of the parameter file
    pub seed: Option<[u8; 32]>,
    pub simulator: Option<ExternalSimulator>,
}

#[derive(Debug, Clone)]
pub struct SamplingOutcome {
    pub seed: [u8; 32],
    pub prepared_edges: usize,
    pub transactions: usize,
    pub transactions_csv: PathBuf,
}

impl SamplingJob {
    /// Seed from the job, else from the parameter file, else fresh
    pub fn resolve_seed(&self) -> Result<[u8; 32]> {
        let from_params = match &self.params.seed {
            Some(hex) => Some(parse_seed_hex(hex)?),
            None => None,
        };
        Ok(resolve_seed(self.seed.or(from_params)))
    }
}

pub fn run_sampling(job: &SamplingJob) -> Result<SamplingOutcome> {
    job.params.validate()?;
    let seed = job.resolve_seed()?;
    info!("Sampling seed: {}", seed_to_hex(&seed));

    let edges = job.source.load()?;
    let prepared = prepare_edges(&edges, &job.params)?;
    let merchants = MerchantList::load(&job.merchants)?;

    let mut sampler = EndpointSampler::from_seed(&seed);
    let transactions = sampler.sample(&prepared, &merchants, &job.params)?;

    let transactions_csv = job.output_dir.join("transactions.csv");
    write_transactions(&transactions_csv, &transactions)?;

    // record the seed actually used so the run can be repeated
    let mut params = job.params.clone();
    params.seed = Some(seed_to_hex(&seed));
    params.save_json(&job.output_dir.join("params.json"))?;

    if let Some(simulator) = &job.simulator {
        simulator.hand_off(&prepared, &params, &job.output_dir, job.hyperjson.as_deref())?;
    } else if let Some(hyper) = &job.hyperjson {
        warn!(
            "hyperjson {} is only used by the external simulator, ignoring it",
            hyper.display()
        );
    }

    Ok(SamplingOutcome {
        seed,
        prepared_edges: prepared.len(),
        transactions: transactions.len(),
        transactions_csv,
    })
}

// ============================================================================
// Topology export
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Split each node's incident channel capacity over its memberships
    pub use_edge_capacity: bool,
    /// Also expand the hyperedges into `<prefix>_edges.csv`
    pub to_clique: bool,
    pub max_clique_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            use_edge_capacity: true,
            to_clique: false,
            max_clique_size: DEFAULT_MAX_CLIQUE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologyExport {
    pub hypergraph: Hypergraph,
    pub hyperjson: PathBuf,
    pub edges_csv: Option<PathBuf>,
    pub clique_rows: usize,
}

/// Build one topology over `table` and write it next to `out_prefix`
pub fn export_topology(
    table: &EdgeTable,
    spec: &TopologySpec,
    options: &ExportOptions,
    out_prefix: &Path,
) -> Result<TopologyExport> {
    let graph = table.to_graph();
    if graph.node_count() == 0 {
        return Err(LnError::EmptyTopology("edge table has no nodes".into()));
    }
    let mut hypergraph = spec.build(&graph)?;

    if options.use_edge_capacity {
        if table.has_capacity {
            let totals = table.node_capacity_totals();
            hypergraph.assign_caps(CapacityPolicy::NodeTotals(&totals));
        } else {
            warn!("No capacity column in the edge table, falling back to uniform deposits");
            hypergraph.assign_caps(CapacityPolicy::Uniform);
        }
    }

    let hyperjson = with_suffix(out_prefix, "_hyper.json");
    hypergraph.save(&hyperjson)?;
    if let Some(stats) = hypergraph.size_stats() {
        info!("{} hyperedge sizes: {}", spec, stats);
    }

    let mut export = TopologyExport {
        hypergraph,
        hyperjson,
        edges_csv: None,
        clique_rows: 0,
    };
    if options.to_clique {
        let fee_profile = table.fee_profile();
        let rows = export
            .hypergraph
            .to_clique_rows(Some(options.max_clique_size), fee_profile.as_ref())?;
        let edges_csv = with_suffix(out_prefix, "_edges.csv");
        write_clique_edges(&edges_csv, &rows)?;
        export.clique_rows = rows.len();
        export.edges_csv = Some(edges_csv);
    }
    Ok(export)
}

/// Convert a clique edge file to the LN schema and run the simulator on it
///
/// Results land in `<prefix>_results`.
pub fn simulate_export(
    export: &TopologyExport,
    out_prefix: &Path,
    params_file: &Path,
    simulator: &ExternalSimulator,
    fixer: &mut EdgeFixer,
) -> Result<PathBuf> {
    let Some(edges_csv) = &export.edges_csv else {
        return Err(LnError::InvalidParams(format!(
            "{} has no clique edge file to simulate",
            export.hyperjson.display()
        )));
    };
    let rows: Vec<CliqueEdge> = read_rows(edges_csv)?;
    let fixed = fixer.fix_clique(&rows);
    let fixed_csv = with_suffix(out_prefix, "_edges_fixed.csv");
    write_edges(&fixed_csv, &fixed)?;

    let results = with_suffix(out_prefix, "_results");
    simulator.run(&fixed_csv, params_file, &results, Some(&export.hyperjson))?;
    Ok(results)
}

// ============================================================================
// hyperjson tools
// ============================================================================

/// Expand every hyperedge of a hyperjson file into clique edges
pub fn hyper_to_edges(hyperjson: &Path, out: &Path) -> Result<usize> {
    let hypergraph = Hypergraph::load(hyperjson)?;
    let rows = hypergraph.to_clique_rows(None, None)?;
    write_clique_edges(out, &rows)?;
    Ok(rows.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    pub small_edges: Option<PathBuf>,
    pub small_rows: usize,
    pub big_hyperjson: Option<PathBuf>,
    pub big_hyperedges: usize,
}

/// Expand hyperedges up to `threshold` into `<prefix>_small_edges.csv` and
/// keep larger ones in `<prefix>_big_hyper.json`; empty halves are not written
pub fn split_hyperjson(hyperjson: &Path, out_prefix: &Path, threshold: usize) -> Result<SplitOutcome> {
    let hypergraph = Hypergraph::load(hyperjson)?;
    let (rows, big) = hypergraph.split(threshold);

    let mut outcome = SplitOutcome {
        small_edges: None,
        small_rows: rows.len(),
        big_hyperjson: None,
        big_hyperedges: big.len(),
    };

    if rows.is_empty() {
        info!("No hyperedge of size <= {}, no clique edges written", threshold);
    } else {
        let path = with_suffix(out_prefix, "_small_edges.csv");
        write_clique_edges(&path, &rows)?;
        outcome.small_edges = Some(path);
    }

    if big.is_empty() {
        info!("No hyperedge larger than {}, no big hyperjson written", threshold);
    } else {
        let path = with_suffix(out_prefix, "_big_hyper.json");
        big.save(&path)?;
        outcome.big_hyperjson = Some(path);
    }

    info!(
        "Split {} hyperedges: {} clique rows, {} kept as hyperedges",
        hypergraph.len(),
        outcome.small_rows,
        outcome.big_hyperedges
    );
    Ok(outcome)
}
