// Hand-off to the external traffic simulator
//
// Routing, fee accounting and depletion are not done in this crate. This stage
// only lays out the files the simulator expects and runs it:
//
//   <program> <args..> preprocessed <edges.csv> <params.json> <out_dir> [hyperjson]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{info, warn};

use crate::ln_error::{LnError, Result};
use crate::ln_export::write_edges;
use crate::ln_interface::DirectedEdge;
use crate::ln_params::ExperimentParams;

/// External simulator invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSimulator {
    pub program: String,
    /// Leading arguments, e.g. the script path when `program` is an interpreter
    pub args: Vec<String>,
}

impl ExternalSimulator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(
        &self,
        edges_csv: &Path,
        params_file: &Path,
        out_dir: &Path,
        hyperjson: Option<&Path>,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("preprocessed")
            .arg(edges_csv)
            .arg(params_file)
            .arg(out_dir);
        if let Some(hyper) = hyperjson {
            cmd.arg(hyper);
        }
        cmd
    }

    /// Run the simulator on files already on disk
    pub fn run(
        &self,
        edges_csv: &Path,
        params_file: &Path,
        out_dir: &Path,
        hyperjson: Option<&Path>,
    ) -> Result<()> {
        fs::create_dir_all(out_dir).map_err(LnError::io(out_dir))?;
        if let Some(hyper) = hyperjson.filter(|h| !h.exists()) {
            warn!("hyperjson {} does not exist, passing it anyway", hyper.display());
        }

        let mut cmd = self.command(edges_csv, params_file, out_dir, hyperjson);
        info!("Running {:?}", cmd);
        let status = cmd.status().map_err(|e| LnError::External {
            program: self.program.clone(),
            status: e.to_string(),
        })?;

        if !status.success() {
            return Err(LnError::External {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        info!("{} finished, results in {}", self.program, out_dir.display());
        Ok(())
    }

    /// Write the prepared edges and parameters into `out_dir`, then run
    ///
    /// Returns the paths of the edge and parameter files handed over.
    pub fn hand_off(
        &self,
        edges: &[DirectedEdge],
        params: &ExperimentParams,
        out_dir: &Path,
        hyperjson: Option<&Path>,
    ) -> Result<(PathBuf, PathBuf)> {
        let edges_csv = out_dir.join("edges.csv");
        let params_file = out_dir.join("params.json");
        write_edges(&edges_csv, edges)?;
        params.save_json(&params_file)?;
        self.run(&edges_csv, &params_file, out_dir, hyperjson)?;
        Ok((edges_csv, params_file))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn edges() -> Vec<DirectedEdge> {
        vec![DirectedEdge {
            snapshot_id: 0,
            src: "a".to_string(),
            trg: "b".to_string(),
            last_update: 0,
            channel_id: 1,
            capacity: 100_000.0,
            disabled: false,
            fee_base_msat: 1000.0,
            fee_rate_milli_msat: 1.0,
            min_htlc: 1000.0,
        }]
    }

    #[test]
    fn test_command_line_layout() {
        let sim = ExternalSimulator::new("python3").with_args(["run_simulator.py"]);
        let cmd = sim.command(
            Path::new("e.csv"),
            Path::new("p.json"),
            Path::new("out"),
            Some(Path::new("h.json")),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "python3");
        assert_eq!(
            args,
            vec!["run_simulator.py", "preprocessed", "e.csv", "p.json", "out", "h.json"]
        );
    }

    #[test]
    fn test_hand_off_writes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sim");

        let (edges_csv, params_file) = ExternalSimulator::new("true")
            .hand_off(&edges(), &ExperimentParams::default(), &out, None)
            .unwrap();

        assert!(edges_csv.exists());
        let params = ExperimentParams::load(&params_file).unwrap();
        assert_eq!(params, ExperimentParams::default());
    }

    #[test]
    fn test_failing_simulator_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ExternalSimulator::new("false").hand_off(
            &edges(),
            &ExperimentParams::default(),
            dir.path(),
            None,
        );
        assert!(matches!(result, Err(LnError::External { .. })));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ExternalSimulator::new("/nonexistent/simulator").run(
            Path::new("e.csv"),
            Path::new("p.json"),
            dir.path(),
            None,
        );
        assert!(matches!(result, Err(LnError::External { .. })));
    }
}
