// =============================================================================
// Shared types used across the sector heat tool
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Members of a single basket as written in `baskets.yml`.
///
/// Both shapes appear in the wild:
///
/// ```yaml
/// AI: [FET, TAO, RNDR]
/// RWA:
///   ONDO: 0.5
///   POLYX: 0.5
/// ```
///
/// Weights are accepted but not used; baskets always average with equal
/// weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BasketMembers {
    List(Vec<String>),
    Weighted(BTreeMap<String, f64>),
}

impl BasketMembers {
    /// Member symbols, upper-cased, in declaration order (list form) or
    /// sorted order (mapping form).
    pub fn symbols(&self) -> Vec<String> {
        match self {
            Self::List(v) => v.iter().map(|s| s.trim().to_uppercase()).collect(),
            Self::Weighted(m) => m.keys().map(|s| s.trim().to_uppercase()).collect(),
        }
    }
}

/// Basket name -> member symbols. Immutable for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baskets {
    inner: BTreeMap<String, Vec<String>>,
}

impl Baskets {
    /// Build from an already-normalised mapping.
    #[cfg(test)]
    pub fn new(inner: BTreeMap<String, Vec<String>>) -> Self {
        Self { inner }
    }

    /// Parse the YAML basket document.
    pub fn from_yaml(s: &str) -> Result<Self> {
        let raw: BTreeMap<String, BasketMembers> =
            serde_yaml::from_str(s).context("failed to parse basket YAML")?;
        let inner = raw
            .into_iter()
            .map(|(name, members)| (name, members.symbols()))
            .collect();
        Ok(Self { inner })
    }

    /// Load `baskets.yml` from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read baskets from {}", path.display()))?;
        let baskets = Self::from_yaml(&content)
            .with_context(|| format!("invalid basket file {}", path.display()))?;

        if baskets.is_empty() {
            warn!(path = %path.display(), "basket file defines no baskets");
        }
        info!(
            path = %path.display(),
            baskets = baskets.len(),
            tokens = baskets.all_tokens().len(),
            "baskets loaded"
        );
        Ok(baskets)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.inner.iter()
    }

    #[cfg(test)]
    pub fn members(&self, basket: &str) -> Option<&[String]> {
        self.inner.get(basket).map(Vec::as_slice)
    }

    /// Every distinct token across all baskets, sorted.
    pub fn all_tokens(&self) -> BTreeSet<String> {
        self.inner.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// The independent sub-signals that make up a heat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Price,
    Funding,
    Tvl,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Price => write!(f, "price"),
            Self::Funding => write!(f, "funding"),
            Self::Tvl => write!(f, "tvl"),
        }
    }
}
