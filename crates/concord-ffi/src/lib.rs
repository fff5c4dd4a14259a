// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied. PyO3 proc macros generate
// unsafe blocks internally. All hand-written code in this crate is safe.
//! Python-callable wrappers around the Concord transition gate.
//!
//! Exposes `ConcordConfig` and `TransitionGate` to Python via PyO3.
//! Results cross the boundary as plain dicts with snake_case keys.
//! Unknown states, malformed requests and invalid configuration raise
//! `ValueError`.
//!
//! Install: `pip install -e crates/concord-ffi` (requires maturin).
//!
//! Usage from Python:
//! ```python
//! from concord_kernel import TransitionGate
//!
//! gate = TransitionGate()
//! out = gate.transition("chaos", "conflict", actor_a="alice", actor_b="bob")
//! assert out["ok"] and out["proof_index"] == 0
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use concord_core::{
    ChainVerification, DetectReport, IntegritySummary, ProofNode, StateSpace, StateTable,
    TransitionGate, TransitionOutcome, TransitionRequest,
};
use concord_types::{ConcordConfig, ConcordError};

fn value_error(e: ConcordError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

// ─── PyConcordConfig ────────────────────────────────────────────────

/// Python-visible configuration for the Concord Kernel.
#[pyclass(name = "ConcordConfig")]
#[derive(Clone)]
struct PyConcordConfig {
    inner: ConcordConfig,
}

#[pymethods]
impl PyConcordConfig {
    #[new]
    #[pyo3(signature = (
        temporal_cap = 5.0,
        w_logic = 0.6,
        w_temporal = 0.4,
        context_weight = 0.25,
        reject_threshold = 0.85,
        suspicious_threshold = 0.65,
        caution_threshold = 0.45,
        smoothing_alpha = 0.2,
        cold_start_threshold = 5,
        min_penalty_weight = 0.3,
        integrity_floor = 0.05,
        default_domain = "general".to_string(),
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        temporal_cap: f64,
        w_logic: f64,
        w_temporal: f64,
        context_weight: f64,
        reject_threshold: f64,
        suspicious_threshold: f64,
        caution_threshold: f64,
        smoothing_alpha: f64,
        cold_start_threshold: u64,
        min_penalty_weight: f64,
        integrity_floor: f64,
        default_domain: String,
    ) -> PyResult<Self> {
        let config = ConcordConfig {
            temporal_cap,
            w_logic,
            w_temporal,
            context_weight,
            reject_threshold,
            suspicious_threshold,
            caution_threshold,
            smoothing_alpha,
            cold_start_threshold,
            min_penalty_weight,
            integrity_floor,
            default_domain,
            ..ConcordConfig::default()
        };
        config.validate().map_err(value_error)?;
        Ok(Self { inner: config })
    }

    /// Construct from JSON string; omitted fields take their defaults.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let config = ConcordConfig::from_json(json).map_err(value_error)?;
        config.validate().map_err(value_error)?;
        Ok(Self { inner: config })
    }

    #[getter]
    fn reject_threshold(&self) -> f64 {
        self.inner.reject_threshold
    }

    #[getter]
    fn smoothing_alpha(&self) -> f64 {
        self.inner.smoothing_alpha
    }

    #[getter]
    fn default_domain(&self) -> &str {
        &self.inner.default_domain
    }

    fn __repr__(&self) -> String {
        format!(
            "ConcordConfig(temporal_cap={}, reject_threshold={}, alpha={})",
            self.inner.temporal_cap, self.inner.reject_threshold, self.inner.smoothing_alpha
        )
    }
}

// ─── Dict conversion ────────────────────────────────────────────────

fn delta_dict<'py>(
    py: Python<'py>,
    logic: f64,
    temporal: f64,
    divergence: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("logic_residual", logic)?;
    dict.set_item("temporal_residual", temporal)?;
    dict.set_item("divergence", divergence)?;
    Ok(dict)
}

fn detect_dict<'py>(py: Python<'py>, report: &DetectReport) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("from", &report.from)?;
    dict.set_item("to", &report.to)?;
    dict.set_item("domain", &report.domain)?;
    dict.set_item("dist", report.dist)?;
    dict.set_item(
        "delta",
        delta_dict(
            py,
            report.delta.logic_residual,
            report.delta.temporal_residual,
            report.delta.divergence,
        )?,
    )?;
    dict.set_item("verdict", report.verdict.as_str())?;
    dict.set_item("consensus_strength", report.consensus_strength)?;
    dict.set_item("reasons", report.reasons.clone())?;

    let actors = PyDict::new(py);
    for (actor, standing) in &report.actors {
        let entry = PyDict::new(py);
        entry.set_item("integrity", standing.integrity)?;
        entry.set_item("interactions", standing.interactions)?;
        entry.set_item("average_divergence", standing.average_divergence)?;
        actors.set_item(actor, entry)?;
    }
    dict.set_item("actors", actors)?;
    Ok(dict)
}

fn outcome_dict<'py>(py: Python<'py>, out: &TransitionOutcome) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("ok", out.ok)?;
    dict.set_item("status", out.status)?;
    dict.set_item("from", &out.from)?;
    dict.set_item("to", &out.to)?;
    dict.set_item("new_state", out.new_state.clone())?;
    dict.set_item("proof_hash", out.proof_hash.clone())?;
    dict.set_item("proof_index", out.proof_index)?;
    dict.set_item("dist", out.dist)?;
    dict.set_item(
        "delta",
        delta_dict(
            py,
            out.delta.logic_residual,
            out.delta.temporal_residual,
            out.delta.divergence,
        )?,
    )?;
    dict.set_item("verdict", out.verdict.as_str())?;
    dict.set_item("consensus_strength", out.consensus_strength)?;
    dict.set_item("reasons", out.reasons.clone())?;

    let updates = PyDict::new(py);
    for (actor, change) in &out.integrity_updates {
        let entry = PyDict::new(py);
        entry.set_item("before", change.before)?;
        entry.set_item("after", change.after)?;
        entry.set_item("change", change.change)?;
        updates.set_item(actor, entry)?;
    }
    dict.set_item("integrity_updates", updates)?;
    dict.set_item("chain_extended", out.chain_extended)?;
    dict.set_item("chain_length", out.chain_length)?;
    Ok(dict)
}

fn node_dict<'py>(py: Python<'py>, node: &ProofNode) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("idx", node.idx)?;
    dict.set_item("from", &node.from)?;
    dict.set_item("to", &node.to)?;
    dict.set_item("delta", node.delta)?;
    dict.set_item("prev_hash", &node.prev_hash)?;
    dict.set_item("delta_logic", node.delta_logic)?;
    dict.set_item("delta_temporal", node.delta_temporal)?;
    dict.set_item("divergence", node.divergence)?;
    dict.set_item("hash", &node.hash)?;
    Ok(dict)
}

fn verification_dict<'py>(
    py: Python<'py>,
    v: &ChainVerification,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("valid", v.valid)?;
    dict.set_item("total_nodes", v.total_nodes)?;
    dict.set_item("verified_nodes", v.verified_nodes)?;
    dict.set_item("first_invalid_index", v.first_invalid_index)?;
    dict.set_item("reason", v.reason.clone())?;
    Ok(dict)
}

fn summary_dict<'py>(py: Python<'py>, s: &IntegritySummary) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("actor", &s.actor)?;
    let domains = PyList::empty(py);
    for d in &s.domains {
        let entry = PyDict::new(py);
        entry.set_item("domain", &d.domain)?;
        entry.set_item("integrity", d.integrity)?;
        entry.set_item("interactions", d.interaction_count)?;
        entry.set_item("average_divergence", d.average_divergence)?;
        domains.append(entry)?;
    }
    dict.set_item("domains", domains)?;
    dict.set_item("weighted_average_integrity", s.weighted_average_integrity)?;
    dict.set_item("total_interactions", s.total_interactions)?;
    Ok(dict)
}

// ─── PyTransitionGate ───────────────────────────────────────────────

/// Python-visible transition gate owning integrity and ledger state.
#[pyclass(name = "TransitionGate")]
struct PyTransitionGate {
    inner: TransitionGate,
}

impl PyTransitionGate {
    fn request(
        from_state: &str,
        to_state: &str,
        actor_a: Option<String>,
        actor_b: Option<String>,
        domain: Option<String>,
        context: Option<BTreeMap<String, f64>>,
    ) -> TransitionRequest {
        TransitionRequest {
            from: from_state.to_string(),
            to: to_state.to_string(),
            actor_a,
            actor_b,
            domain,
            context,
        }
    }
}

#[pymethods]
impl PyTransitionGate {
    /// `states_json` replaces the reference state table:
    /// `{"states": {"name": [..]}, "forbidden": [["from", "to"]]}`.
    #[new]
    #[pyo3(signature = (config = None, states_json = None))]
    fn new(config: Option<PyRef<'_, PyConcordConfig>>, states_json: Option<&str>) -> PyResult<Self> {
        let cfg = config.map(|c| c.inner.clone()).unwrap_or_default();
        let states: Arc<dyn StateSpace> = match states_json {
            Some(json) => Arc::new(StateTable::from_json(json).map_err(value_error)?),
            None => Arc::new(StateTable::default()),
        };
        let inner = TransitionGate::new(cfg, states).map_err(value_error)?;
        Ok(Self { inner })
    }

    /// Score a transition without mutating any state.
    #[pyo3(signature = (from_state, to_state, actor_a = None, actor_b = None, domain = None, context = None))]
    #[allow(clippy::too_many_arguments)]
    fn detect<'py>(
        &self,
        py: Python<'py>,
        from_state: &str,
        to_state: &str,
        actor_a: Option<String>,
        actor_b: Option<String>,
        domain: Option<String>,
        context: Option<BTreeMap<String, f64>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let req = Self::request(from_state, to_state, actor_a, actor_b, domain, context);
        let report = self.inner.detect(&req).map_err(value_error)?;
        detect_dict(py, &report)
    }

    /// Attempt a transition. A rejection returns `ok == False`, not an
    /// exception.
    #[pyo3(signature = (from_state, to_state, actor_a = None, actor_b = None, domain = None, context = None))]
    #[allow(clippy::too_many_arguments)]
    fn transition<'py>(
        &self,
        py: Python<'py>,
        from_state: &str,
        to_state: &str,
        actor_a: Option<String>,
        actor_b: Option<String>,
        domain: Option<String>,
        context: Option<BTreeMap<String, f64>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let req = Self::request(from_state, to_state, actor_a, actor_b, domain, context);
        let outcome = self.inner.transition(&req).map_err(value_error)?;
        outcome_dict(py, &outcome)
    }

    fn chain<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyList>> {
        let list = PyList::empty(py);
        for node in self.inner.chain() {
            list.append(node_dict(py, &node)?)?;
        }
        Ok(list)
    }

    /// Ledger as a JSON array in wire format (camelCase keys).
    fn chain_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner.chain())
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn verify_chain<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        verification_dict(py, &self.inner.verify_chain())
    }

    /// Current integrity (prior value when no record exists).
    fn integrity(&self, actor: &str, domain: &str) -> f64 {
        self.inner.integrity().read(actor, domain)
    }

    fn summarize<'py>(&self, py: Python<'py>, actor: &str) -> PyResult<Bound<'py, PyDict>> {
        summary_dict(py, &self.inner.summarize(actor))
    }

    fn trend(&self, actor: &str, domain: &str) -> f64 {
        self.inner.trend(actor, domain)
    }

    fn reset_integrity(&self, actor: &str, domain: &str) -> bool {
        self.inner.reset_integrity(actor, domain)
    }

    fn reset_chain(&self) {
        self.inner.reset_chain();
    }

    fn state_names(&self) -> Vec<String> {
        self.inner.state_names()
    }

    fn __len__(&self) -> usize {
        self.inner.ledger().len()
    }

    fn __repr__(&self) -> String {
        format!(
            "TransitionGate(states={}, chain_length={}, tracked={})",
            self.inner.state_names().len(),
            self.inner.ledger().len(),
            self.inner.integrity().len()
        )
    }
}

// ─── Module ─────────────────────────────────────────────────────────

#[pymodule]
fn concord_kernel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyConcordConfig>()?;
    m.add_class::<PyTransitionGate>()?;
    m.add("GENESIS_SENTINEL", concord_core::GENESIS_SENTINEL)?;
    Ok(())
}
