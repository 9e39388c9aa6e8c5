// Experiment parameters and run seeds
//
// Parameter files are YAML. The JSON parameter files handed to the external
// traffic simulator parse unchanged, since JSON is a subset of YAML.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ln_error::{LnError, Result};
use crate::ln_interface::Satoshi;

// ============================================================================
// Experiment Parameters
// ============================================================================

/// Parameters of one traffic sampling experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentParams {
    /// Payment size for every sampled transaction (satoshi)
    pub amount: Satoshi,

    /// Number of transactions to draw
    pub count: usize,

    /// Fraction of draws whose target is a merchant (0.0 to 1.0)
    pub epsilon: f64,

    /// Drop channel directions flagged as disabled
    pub drop_disabled: bool,

    /// Drop channel directions whose capacity is below `amount`
    pub drop_low_cap: bool,

    /// Passed through to the external simulator (channel balance depletion)
    pub with_depletion: bool,

    /// Discard draws whose source is itself a merchant
    pub exclude_merchants: bool,

    /// Hex seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            amount: 60_000,
            count: 7_000,
            epsilon: 0.8,
            drop_disabled: true,
            drop_low_cap: true,
            with_depletion: true,
            exclude_merchants: true,
            seed: None,
        }
    }
}

impl ExperimentParams {
    /// Load and validate a parameter file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(LnError::io(path))?;
        let params: ExperimentParams = serde_yaml::from_str(&text).map_err(LnError::yaml(path))?;
        params.validate()?;
        Ok(params)
    }

    /// Write the parameters as JSON, the format the external simulator reads
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(LnError::json(path))?;
        fs::write(path, text).map_err(LnError::io(path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(LnError::InvalidParams("count must be positive".into()));
        }
        if self.amount == 0 {
            return Err(LnError::InvalidParams("amount must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(LnError::InvalidParams(format!(
                "epsilon must lie in [0, 1], got {}",
                self.epsilon
            )));
        }
        Ok(())
    }

    /// Number of draws that target a merchant
    pub fn merchant_draws(&self) -> usize {
        (self.epsilon * self.count as f64).floor() as usize
    }
}

// ============================================================================
// Seeds
// ============================================================================

/// Decode a 32-byte seed from hex (optional `0x` prefix, short input zero-padded)
pub fn parse_seed_hex(hex: &str) -> Result<[u8; 32]> {
    let hex = hex.trim();
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if hex.is_empty() || hex.len() > 64 || hex.len() % 2 != 0 {
        return Err(LnError::InvalidSeed(format!(
            "expected an even number of hex digits (at most 64), got {}",
            hex.len()
        )));
    }

    let mut seed = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str =
            std::str::from_utf8(chunk).map_err(|e| LnError::InvalidSeed(e.to_string()))?;
        seed[i] = u8::from_str_radix(byte_str, 16)
            .map_err(|e| LnError::InvalidSeed(format!("{}: {}", byte_str, e)))?;
    }

    Ok(seed)
}

pub fn seed_to_hex(seed: &[u8; 32]) -> String {
    let mut hex = String::with_capacity(66);
    hex.push_str("0x");
    for byte in seed {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Get or generate seed
pub fn resolve_seed(seed: Option<[u8; 32]>) -> [u8; 32] {
    seed.unwrap_or_else(|| {
        let mut temp_rng = StdRng::from_entropy();
        let mut seed = [0u8; 32];
        temp_rng.fill_bytes(&mut seed);
        seed
    })
}

/// Independent RNG stream for one pipeline stage
///
/// Every stage derives its own seed as Blake3(seed || label), so adding draws in
/// one stage never shifts the numbers another stage sees.
pub fn stream_rng(seed: &[u8; 32], label: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed);
    hasher.update(label.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}
