// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — State Space (Embedding Table)
// ─────────────────────────────────────────────────────────────────────
//! Symbolic state embeddings and the forbidden-transition set.
//!
//! The in-memory table carries the reference configuration and serves
//! tests and local embedding. Deployments with their own state catalogue
//! can plug it in through the `StateSpace` trait.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use concord_types::{ConcordError, ConcordResult};

/// Trait for state catalogue backends.
pub trait StateSpace: Send + Sync {
    /// Vector for the named state, or `None` if it is not configured.
    fn embedding(&self, name: &str) -> Option<&[f64]>;

    /// Whether the ordered pair `from → to` is explicitly forbidden.
    fn is_forbidden(&self, from: &str, to: &str) -> bool;

    /// All configured state names, sorted.
    fn state_names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.embedding(name).is_some()
    }
}

/// In-memory embedding table with an exact-match forbidden-pair set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStateTable", into = "RawStateTable")]
pub struct StateTable {
    states: BTreeMap<String, Vec<f64>>,
    forbidden: BTreeMap<String, BTreeSet<String>>,
}

/// Serialized shape of a state table: `{"states": {..}, "forbidden": [[from, to], ..]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStateTable {
    pub states: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub forbidden: Vec<(String, String)>,
}

impl Default for StateTable {
    fn default() -> Self {
        let mut states = BTreeMap::new();
        states.insert("chaos".to_string(), vec![0.9, 0.1, 0.8, 0.2]);
        states.insert("conflict".to_string(), vec![0.7, 0.3, 0.6, 0.2]);
        states.insert("tension".to_string(), vec![0.6, 0.4, 0.5, 0.4]);
        states.insert("order".to_string(), vec![0.2, 0.8, 0.3, 0.7]);
        states.insert("harmony".to_string(), vec![0.1, 0.9, 0.2, 0.8]);
        states.insert("peace".to_string(), vec![0.0, 1.0, 0.1, 0.9]);

        let mut forbidden: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (from, to) in [
            ("chaos", "peace"),
            ("chaos", "harmony"),
            ("conflict", "peace"),
        ] {
            forbidden
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string());
        }
        Self { states, forbidden }
    }
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with no states and no forbidden pairs.
    pub fn empty() -> Self {
        Self {
            states: BTreeMap::new(),
            forbidden: BTreeMap::new(),
        }
    }

    /// Build a table from named vectors, with no forbidden pairs.
    pub fn with_states(states: BTreeMap<String, Vec<f64>>) -> ConcordResult<Self> {
        let mut table = Self::empty();
        for (name, vector) in states {
            table.add_state(name, vector)?;
        }
        Ok(table)
    }

    /// Add or replace a state.
    pub fn add_state(&mut self, name: impl Into<String>, vector: Vec<f64>) -> ConcordResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConcordError::Config("state name must not be empty".into()));
        }
        if vector.is_empty() {
            return Err(ConcordError::Config(format!(
                "state '{name}' has an empty embedding"
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(ConcordError::Config(format!(
                "state '{name}' has a non-finite embedding component"
            )));
        }
        self.states.insert(name, vector);
        Ok(())
    }

    /// Forbid the ordered transition `from → to`. Both states must exist.
    pub fn forbid(&mut self, from: &str, to: &str) -> ConcordResult<()> {
        for name in [from, to] {
            if !self.states.contains_key(name) {
                return Err(ConcordError::unknown_state(name, self.state_names()));
            }
        }
        self.forbidden
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        Ok(())
    }

    /// Ordered list of every forbidden pair.
    pub fn forbidden_pairs(&self) -> Vec<(String, String)> {
        self.forbidden
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from.clone(), to.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Load from JSON string, validating every vector and pair.
    pub fn from_json(json: &str) -> ConcordResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConcordError::Config(format!("state table parse error: {e}")))
    }
}

impl TryFrom<RawStateTable> for StateTable {
    type Error = ConcordError;

    fn try_from(raw: RawStateTable) -> Result<Self, Self::Error> {
        let mut table = Self::with_states(raw.states)?;
        for (from, to) in &raw.forbidden {
            table.forbid(from, to)?;
        }
        Ok(table)
    }
}

impl From<StateTable> for RawStateTable {
    fn from(table: StateTable) -> Self {
        let forbidden = table.forbidden_pairs();
        Self {
            states: table.states,
            forbidden,
        }
    }
}

impl StateSpace for StateTable {
    fn embedding(&self, name: &str) -> Option<&[f64]> {
        self.states.get(name).map(Vec::as_slice)
    }

    fn is_forbidden(&self, from: &str, to: &str) -> bool {
        self.forbidden
            .get(from)
            .is_some_and(|targets| targets.contains(to))
    }

    fn state_names(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }
}
