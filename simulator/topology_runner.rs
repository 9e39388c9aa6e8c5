// Topology Runner - Build every topology of a scenario YAML file
//
// Usage:
//   cargo run --bin topology_runner scenarios/all_topologies.yaml
//   cargo run --bin topology_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin topology_runner scenarios/all_topologies.yaml --seed 0x1234...
//
// For each topology: <output_dir>/<label>_hyper.json, the clique edge CSV
// (when no hyperedge exceeds max_clique_size), and, with a simulator
// configured, the LN-schema edge file and <output_dir>/<label>_results.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use simple_logger::SimpleLogger;

use ln_traffic::ln_fixup::EdgeFixer;
use ln_traffic::ln_params::stream_rng;
use ln_traffic::ln_pipeline::{export_topology, simulate_export, ExportOptions, TopologyExport};
use ln_traffic::{
    parse_seed_hex, resolve_seed, seed_to_hex, EdgeTable, ExternalSimulator, LnError, Result,
    TopologySpec,
};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    config: ScenarioConfig,

    /// Topologies to build, in order
    topologies: Vec<TopologySpec>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ScenarioConfig {
    #[serde(default = "default_ln_edges")]
    ln_edges: PathBuf,

    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,

    /// Parameter file handed to the simulator
    #[serde(default = "default_params")]
    params: PathBuf,

    #[serde(default = "default_true")]
    use_edge_capacity: bool,

    #[serde(default)]
    enabled_only: bool,

    #[serde(default = "default_max_clique_size")]
    max_clique_size: usize,

    // External simulator (optional)
    #[serde(default)]
    simulator: Option<SimulatorConfig>,
}

#[derive(Debug, serde::Deserialize)]
struct SimulatorConfig {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

fn default_ln_edges() -> PathBuf {
    PathBuf::from("../ln_data/ln_edges.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_params() -> PathBuf {
    PathBuf::from("params.json")
}

fn default_true() -> bool {
    true
}

fn default_max_clique_size() -> usize {
    ln_traffic::ln_interface::DEFAULT_MAX_CLIQUE_SIZE
}

/// One row of the closing summary
struct TopologyOutcome {
    label: String,
    hyperedges: usize,
    max_size: usize,
    clique_rows: Option<usize>,
    results: Option<PathBuf>,
    seconds: f64,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/all_topologies.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/all_topologies.yaml --seed 0x123456...", args[0]);
        std::process::exit(1);
    }

    if let Err(e) = SimpleLogger::new().with_level(log::LevelFilter::Info).init() {
        eprintln!("logger: {}", e);
    }

    let path = Path::new(&args[1]);

    // Parse optional seed
    let seed: Option<[u8; 32]> = if args.len() >= 4 && args[2] == "--seed" {
        match parse_seed_hex(&args[3]) {
            Ok(seed) => Some(seed),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let result = if path.is_file() {
        run_scenario_file(path, seed)
    } else if path.is_dir() {
        run_scenario_directory(path, seed)
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<[u8; 32]>) -> Result<()> {
    let mut scenarios = Vec::new();

    // Find all .yaml files
    for entry in fs::read_dir(dir).map_err(|e| LnError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(_) => continue,
        };
        let ext = path.extension().and_then(|s| s.to_str());
        if ext == Some("yaml") || ext == Some("yml") {
            scenarios.push(path);
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        return Err(LnError::InvalidParams(format!(
            "no .yaml files found in {}",
            dir.display()
        )));
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  TOPOLOGY RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        run_scenario_file(scenario_path, seed)?;
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    Ok(())
}

fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let yaml_content = fs::read_to_string(path).map_err(|e| LnError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_yaml::from_str(&yaml_content).map_err(|e| LnError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}

fn run_scenario_file(path: &Path, seed: Option<[u8; 32]>) -> Result<()> {
    println!("Loading scenario from: {}", path.display());
    let scenario = load_scenario(path)?;

    // Print scenario header
    println!("\n╔════════════════════════════════════════════════════════╗");
    if let Some(ref name) = scenario.meta.name {
        println!("║  {}  {}", name, " ".repeat(54_usize.saturating_sub(name.len())));
    } else {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("?");
        println!("║  Scenario: {}  ", stem);
    }
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    let config = &scenario.config;
    let seed = resolve_seed(seed);

    println!("Configuration:");
    println!("  LN edges: {}", config.ln_edges.display());
    println!("  Output: {}", config.output_dir.display());
    println!("  Edge capacity deposits: {}", config.use_edge_capacity);
    println!("  Max clique size: {}", config.max_clique_size);
    match &config.simulator {
        Some(sim) => println!("  Simulator: {} {}", sim.program, sim.args.join(" ")),
        None => println!("  Simulator: none (export only)"),
    }
    println!("  Topologies: {}", scenario.topologies.len());
    println!("  Seed: {}", seed_to_hex(&seed));
    println!("\nBuilding topologies...\n");

    let mut table = EdgeTable::load(&config.ln_edges)?;
    if config.enabled_only {
        table = table.enabled_only();
    }
    info!("Loaded {} edge rows from {}", table.rows.len(), config.ln_edges.display());

    let simulator = config
        .simulator
        .as_ref()
        .map(|s| ExternalSimulator::new(s.program.clone()).with_args(s.args.clone()));
    let mut fixer = EdgeFixer::new(stream_rng(&seed, "fixup"), None);

    let mut outcomes = Vec::new();
    for spec in &scenario.topologies {
        let start = Instant::now();
        let prefix = config.output_dir.join(spec.label());
        let export = export_with_fallback(&table, spec, config, &prefix)?;

        let results = match (&simulator, &export.edges_csv) {
            (Some(sim), Some(_)) => {
                Some(simulate_export(&export, &prefix, &config.params, sim, &mut fixer)?)
            }
            (Some(_), None) => {
                warn!("{}: no clique edges, not simulated", spec);
                None
            }
            (None, _) => None,
        };

        outcomes.push(TopologyOutcome {
            label: spec.label(),
            hyperedges: export.hypergraph.len(),
            max_size: export.hypergraph.max_size(),
            clique_rows: export.edges_csv.as_ref().map(|_| export.clique_rows),
            results,
            seconds: start.elapsed().as_secs_f64(),
        });
    }

    print_summary(&outcomes);
    println!("\n✓ Scenario complete!\n");
    Ok(())
}

/// Export with clique edges; hyperjson only when a hyperedge is too large
fn export_with_fallback(
    table: &EdgeTable,
    spec: &TopologySpec,
    config: &ScenarioConfig,
    prefix: &Path,
) -> Result<TopologyExport> {
    let mut options = ExportOptions {
        use_edge_capacity: config.use_edge_capacity,
        to_clique: true,
        max_clique_size: config.max_clique_size,
    };
    match export_topology(table, spec, &options, prefix) {
        Err(LnError::CliqueTooLarge { size, limit }) => {
            warn!(
                "{}: hyperedge of size {} exceeds clique limit {}, writing hyperjson only",
                spec, size, limit
            );
            options.to_clique = false;
            export_topology(table, spec, &options, prefix)
        }
        other => other,
    }
}

fn print_summary(outcomes: &[TopologyOutcome]) {
    println!("\n{:<14} {:>12} {:>10} {:>14} {:>10}  {}",
             "Topology", "Hyperedges", "Max size", "Clique rows", "Time (s)", "Results");
    println!("{}", "-".repeat(80));
    for o in outcomes {
        let rows = o
            .clique_rows
            .map_or_else(|| "-".to_string(), |r| r.to_string());
        let results = o
            .results
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());
        println!("{:<14} {:>12} {:>10} {:>14} {:>10.2}  {}",
                 o.label, o.hyperedges, o.max_size, rows, o.seconds, results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_scenario_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/all_topologies.yaml");
        let scenario = load_scenario(&path).unwrap();

        let labels: Vec<String> = scenario.topologies.iter().map(|t| t.label()).collect();
        assert_eq!(
            labels,
            vec!["lnrollup", "supernode", "nch", "fhs_3", "fhs_5", "fhs_20", "fhs_5000"]
        );
        assert_eq!(scenario.config.max_clique_size, 500);
        assert!(scenario.config.use_edge_capacity);
    }

    #[test]
    fn test_directory_without_scenarios_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "nothing to run").unwrap();

        let result = run_scenario_directory(dir.path(), Some([0u8; 32]));
        assert!(matches!(result, Err(LnError::InvalidParams(_))));
    }

    #[test]
    fn test_minimal_scenario_uses_defaults() {
        let scenario: ScenarioFile =
            serde_yaml::from_str("config: {}\ntopologies:\n  - kind: fhs\n    m_max: 4\n").unwrap();

        assert_eq!(scenario.config.output_dir, PathBuf::from("runs"));
        assert!(scenario.config.simulator.is_none());
        assert_eq!(scenario.topologies, vec![TopologySpec::Fhs { m_max: 4 }]);
    }

    #[test]
    fn test_rollup_falls_back_to_hyperjson_only() {
        let dir = tempfile::tempdir().unwrap();
        let edges = dir.path().join("ln_edges.csv");
        fs::write(&edges, "src,trg,capacity\na,b,10\nb,c,10\nc,d,10\n").unwrap();
        let table = EdgeTable::load(&edges).unwrap();
        let config: ScenarioConfig = serde_yaml::from_str("max_clique_size: 2").unwrap();

        let export =
            export_with_fallback(&table, &TopologySpec::Rollup, &config, &dir.path().join("lnrollup")).unwrap();

        assert!(export.edges_csv.is_none());
        assert!(export.hyperjson.exists());
    }
}
