// Merchant allowlist
//
// Either a plain list of node public keys (one per line, `#` comments) or a
// CSV export with a `pub_key` column, such as the 1ML node metadata file.

use std::path::Path;

use indexmap::IndexSet;
use log::{info, warn};

use crate::ln_error::{LnError, Result};
use crate::ln_interface::NodeId;
use crate::ln_topology::read_input;

/// Ordered, duplicate-free set of merchant node ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MerchantList {
    merchants: IndexSet<NodeId>,
}

impl MerchantList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            merchants: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_input(path)?;
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));

        let list = if is_csv {
            Self::parse_csv(&bytes, path)?
        } else {
            Self::parse_text(&String::from_utf8_lossy(&bytes))
        };

        if list.is_empty() {
            warn!("Merchant list {} is empty", path.display());
        }
        info!("Loaded {} merchants from {}", list.len(), path.display());
        Ok(list)
    }

    fn parse_text(text: &str) -> Self {
        Self::from_ids(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    fn parse_csv(bytes: &[u8], path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(bytes);
        let column = reader
            .headers()
            .map_err(LnError::csv(path))?
            .iter()
            .position(|h| h == "pub_key")
            .ok_or_else(|| LnError::MissingColumn {
                path: path.to_path_buf(),
                column: "pub_key".to_string(),
            })?;

        let mut merchants = IndexSet::new();
        for record in reader.records() {
            let record = record.map_err(LnError::csv(path))?;
            if let Some(key) = record.get(column).map(str::trim).filter(|k| !k.is_empty()) {
                merchants.insert(key.to_string());
            }
        }
        Ok(Self { merchants })
    }

    pub fn len(&self) -> usize {
        self.merchants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merchants.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.merchants.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.merchants.iter()
    }

    /// Merchants that occur among `nodes`, in allowlist order
    pub fn active_in<'a>(&self, nodes: impl IntoIterator<Item = &'a str>) -> Vec<NodeId> {
        let present: hashbrown::HashSet<&str> = nodes.into_iter().collect();
        self.merchants
            .iter()
            .filter(|m| present.contains(m.as_str()))
            .cloned()
            .collect()
    }
}
