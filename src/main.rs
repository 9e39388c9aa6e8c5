use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use ln_traffic::ln_export::read_transactions;
use ln_traffic::ln_fixup::{default_fixed_path, fix_edge_file, EdgeFixer};
use ln_traffic::ln_params::stream_rng;
use ln_traffic::ln_pipeline::{
    export_topology, hyper_to_edges, run_sampling, split_hyperjson, ExportOptions, SamplingJob,
};
use ln_traffic::ln_topologies::{DEFAULT_MAX_SEARCH_DEPTH, DEFAULT_MAX_STATES};
use ln_traffic::{
    parse_seed_hex, resolve_seed, seed_to_hex, EdgeTable, ExperimentParams, ExternalSimulator,
    LnError, MerchantList, Result, TopologySource, TopologySpec, TrafficSummary,
};

#[derive(Parser)]
#[command(author, version, about = "Lightning Network traffic dataset tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InputMode {
    /// Graph dump in describegraph JSON form
    Raw,
    /// Edge CSV path or snapshot id
    Preprocessed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TopologyKind {
    Rollup,
    Supernode,
    Nch,
    Fhs,
}

#[derive(Subcommand)]
enum Command {
    /// Sample transactions over a topology
    Sample {
        mode: InputMode,
        /// JSON dump (raw) or edge CSV / snapshot id (preprocessed)
        input: String,
        params: PathBuf,
        output_dir: PathBuf,
        /// hyperjson handed to the external simulator
        hyperjson: Option<PathBuf>,
        /// Merchant list [default: <data-dir>/1ml_meta_data.csv]
        #[arg(long)]
        merchants: Option<PathBuf>,
        #[arg(long, default_value = "../ln_data")]
        data_dir: PathBuf,
        /// 32-byte hex seed; overrides the parameter file
        #[arg(long)]
        seed: Option<String>,
        /// Run this external traffic simulator on the prepared edges
        #[arg(long)]
        simulate: Option<String>,
        /// Leading argument for the simulator program (repeatable)
        #[arg(long = "simulate-arg", requires = "simulate")]
        simulate_args: Vec<String>,
    },

    /// Build a hypergraph topology from an LN edge table
    MakeTopology {
        kind: TopologyKind,
        #[arg(long, default_value = "../ln_data/ln_edges.csv")]
        ln_edges: PathBuf,
        /// Output prefix, e.g. runs/fhs_5
        #[arg(long)]
        out_prefix: PathBuf,
        /// Hyperedge size for fhs
        #[arg(long, required_if_eq("kind", "fhs"))]
        m_max: Option<usize>,
        #[arg(long)]
        max_cover_size: Option<usize>,
        #[arg(long, default_value_t = DEFAULT_MAX_SEARCH_DEPTH)]
        max_search_depth: usize,
        #[arg(long, default_value_t = DEFAULT_MAX_STATES)]
        max_states: usize,
        /// Node deposits from channel capacities instead of the construction default
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        use_edge_capacity: bool,
        /// Ignore disabled channel directions
        #[arg(long)]
        enabled_only: bool,
        /// Also write <prefix>_edges.csv with every hyperedge expanded to a clique
        #[arg(long)]
        to_clique: bool,
        #[arg(long, default_value_t = ln_traffic::ln_interface::DEFAULT_MAX_CLIQUE_SIZE)]
        max_clique_size: usize,
    },

    /// Expand a hyperjson file into clique edges
    HyperToEdges {
        #[arg(long)]
        hyperjson: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Split a hyperjson file into small clique edges and big hyperedges
    SplitHyper {
        #[arg(long)]
        hyper: PathBuf,
        #[arg(long)]
        out_prefix: PathBuf,
        #[arg(long, default_value_t = 500)]
        threshold: usize,
    },

    /// Rewrite a clique edge CSV in the LN edge schema
    FixEdges {
        input: PathBuf,
        /// [default: <input>_fixed.csv]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<String>,
        /// Unix timestamp for every row [default: now]
        #[arg(long)]
        last_update: Option<u64>,
    },

    /// Summarize a transaction table
    Inspect {
        transactions: PathBuf,
        #[arg(long)]
        merchants: Option<PathBuf>,
    },
}

fn parse_seed_arg(seed: Option<&str>) -> Result<Option<[u8; 32]>> {
    seed.map(parse_seed_hex).transpose()
}

fn topology_spec(
    kind: TopologyKind,
    m_max: Option<usize>,
    max_cover_size: Option<usize>,
    max_search_depth: usize,
    max_states: usize,
) -> Result<TopologySpec> {
    Ok(match kind {
        TopologyKind::Rollup => TopologySpec::Rollup,
        TopologyKind::Supernode => TopologySpec::Supernode {
            max_search_depth,
            max_states,
        },
        TopologyKind::Nch => TopologySpec::Nch { max_cover_size },
        TopologyKind::Fhs => TopologySpec::Fhs {
            m_max: m_max.ok_or_else(|| LnError::InvalidParams("fhs needs --m-max".into()))?,
        },
    })
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sample {
            mode,
            input,
            params,
            output_dir,
            hyperjson,
            merchants,
            data_dir,
            seed,
            simulate,
            simulate_args,
        } => {
            let source = match mode {
                InputMode::Raw => TopologySource::Raw(PathBuf::from(&input)),
                InputMode::Preprocessed => TopologySource::preprocessed(&input, &data_dir)?,
            };
            let job = SamplingJob {
                source,
                merchants: merchants.unwrap_or_else(|| data_dir.join("1ml_meta_data.csv")),
                params: ExperimentParams::load(&params)?,
                output_dir,
                hyperjson,
                seed: parse_seed_arg(seed.as_deref())?,
                simulator: simulate.map(|program| ExternalSimulator::new(program).with_args(simulate_args)),
            };
            let outcome = run_sampling(&job)?;
            info!(
                "Done: {} transactions in {} (seed {})",
                outcome.transactions,
                outcome.transactions_csv.display(),
                seed_to_hex(&outcome.seed)
            );
        }

        Command::MakeTopology {
            kind,
            ln_edges,
            out_prefix,
            m_max,
            max_cover_size,
            max_search_depth,
            max_states,
            use_edge_capacity,
            enabled_only,
            to_clique,
            max_clique_size,
        } => {
            let spec = topology_spec(kind, m_max, max_cover_size, max_search_depth, max_states)?;
            let mut table = EdgeTable::load(&ln_edges)?;
            if enabled_only {
                table = table.enabled_only();
            }
            info!("Loaded {} edge rows from {}", table.rows.len(), ln_edges.display());
            let options = ExportOptions {
                use_edge_capacity,
                to_clique,
                max_clique_size,
            };
            let export = export_topology(&table, &spec, &options, &out_prefix)?;
            if let Some(edges_csv) = &export.edges_csv {
                info!("Clique edges: {} rows in {}", export.clique_rows, edges_csv.display());
            }
        }

        Command::HyperToEdges { hyperjson, out } => {
            let rows = hyper_to_edges(&hyperjson, &out)?;
            info!("{} -> {} ({} rows)", hyperjson.display(), out.display(), rows);
        }

        Command::SplitHyper {
            hyper,
            out_prefix,
            threshold,
        } => {
            split_hyperjson(&hyper, &out_prefix, threshold)?;
        }

        Command::FixEdges {
            input,
            output,
            seed,
            last_update,
        } => {
            let seed = resolve_seed(parse_seed_arg(seed.as_deref())?);
            info!("Channel id seed: {}", seed_to_hex(&seed));
            let output = output.unwrap_or_else(|| default_fixed_path(&input));
            let mut fixer = EdgeFixer::new(stream_rng(&seed, "fixup"), last_update);
            fix_edge_file(&input, &output, &mut fixer)?;
        }

        Command::Inspect {
            transactions,
            merchants,
        } => {
            let txs = read_transactions(&transactions)?;
            let merchants = merchants.as_deref().map(MerchantList::load).transpose()?;
            print_summary(&transactions, &TrafficSummary::of(&txs, merchants.as_ref()));
        }
    }
    Ok(())
}

fn print_summary(path: &Path, summary: &TrafficSummary) {
    println!("\n{}", path.display());
    println!("{}\n", summary);
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("logger: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
