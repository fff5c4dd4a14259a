// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Residual Engine (Dual-Baseline Divergence)
// ─────────────────────────────────────────────────────────────────────
//! Dual-baseline residual engine for symbolic state transitions.
//!
//! Scores a proposed transition against two independent baselines:
//! - **Logic baseline** (L): 1.0 if the ordered pair is forbidden.
//! - **Temporal baseline** (T): embedding distance over `temporal_cap`,
//!   hard-clamped to 1.0.
//!
//! The divergence is `sqrt(w_logic * L² + w_temporal * T² + Σ w_ctx * c²)`
//! and drives the verdict cascade. The engine holds no mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use concord_types::{
    clamp_score, ConcordConfig, ConcordError, ConcordResult, ResidualResult, Verdict,
};

use crate::state_space::StateSpace;

/// Optional named divergence dimensions supplied by the caller.
pub type Context = BTreeMap<String, f64>;

/// Everything the engine derives for one `from → to` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidualReport {
    pub from: String,
    pub to: String,
    /// Euclidean distance between the two embeddings.
    pub raw_distance: f64,
    pub residual: ResidualResult,
    pub consensus_strength: f64,
    /// Logic line, temporal line, then the combined summary.
    pub reasons: Vec<String>,
}

impl ResidualReport {
    pub fn verdict(&self) -> Verdict {
        self.residual.verdict
    }

    pub fn divergence(&self) -> f64 {
        self.residual.divergence
    }
}

/// Euclidean distance over the common prefix of two vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        log::debug!(
            "embedding length mismatch ({} vs {}), comparing common prefix",
            a.len(),
            b.len()
        );
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Stateless dual-baseline scorer.
///
/// Thread-safe: shares the state space behind an `Arc` and never mutates.
#[derive(Clone)]
pub struct ResidualEngine {
    config: ConcordConfig,
    states: Arc<dyn StateSpace>,
}

impl ResidualEngine {
    pub fn new(config: ConcordConfig, states: Arc<dyn StateSpace>) -> Self {
        Self { config, states }
    }

    /// Score the transition `from → to`.
    ///
    /// Fails with `UnknownState` before computing anything if either
    /// name is not configured.
    pub fn evaluate(
        &self,
        from: &str,
        to: &str,
        context: Option<&Context>,
    ) -> ConcordResult<ResidualReport> {
        let from_vec = self.lookup(from)?;
        let to_vec = self.lookup(to)?;
        if let Some(ctx) = context {
            validate_context(ctx)?;
        }

        let raw_distance = euclidean_distance(from_vec, to_vec);
        let logic_residual = self.logic_residual(from, to);
        let temporal_residual = self.temporal_residual(raw_distance);
        let divergence = self.combine(logic_residual, temporal_residual, context);
        let verdict = self.classify(divergence, logic_residual);

        let residual = ResidualResult {
            logic_residual,
            temporal_residual,
            divergence,
            verdict,
        };
        let consensus_strength = residual.consensus_strength();
        let reasons = self.reasons(from, to, raw_distance, &residual);

        Ok(ResidualReport {
            from: from.to_string(),
            to: to.to_string(),
            raw_distance,
            residual,
            consensus_strength,
            reasons,
        })
    }

    /// 1.0 for a forbidden ordered pair, else 0.0.
    pub fn logic_residual(&self, from: &str, to: &str) -> f64 {
        if self.states.is_forbidden(from, to) {
            1.0
        } else {
            0.0
        }
    }

    /// `min(1, distance / temporal_cap)`; a hard clamp, not a sigmoid.
    pub fn temporal_residual(&self, raw_distance: f64) -> f64 {
        clamp_score(raw_distance / self.config.temporal_cap, 0.0, 1.0)
    }

    /// Weighted root-sum-square of both residuals and any context terms.
    pub fn combine(&self, logic: f64, temporal: f64, context: Option<&Context>) -> f64 {
        let context_sum: f64 = context
            .map(|ctx| {
                ctx.values()
                    .map(|v| self.config.context_weight * v * v)
                    .sum()
            })
            .unwrap_or(0.0);
        (self.config.w_logic * logic * logic
            + self.config.w_temporal * temporal * temporal
            + context_sum)
            .sqrt()
    }

    /// Ordered threshold cascade. A hard logic violation always rejects.
    pub fn classify(&self, divergence: f64, logic_residual: f64) -> Verdict {
        if logic_residual >= 1.0 {
            Verdict::Reject
        } else if divergence > self.config.reject_threshold {
            Verdict::Reject
        } else if divergence > self.config.suspicious_threshold {
            Verdict::Suspicious
        } else if divergence > self.config.caution_threshold {
            Verdict::Caution
        } else {
            Verdict::Valid
        }
    }

    /// Read-only access to config.
    pub fn config(&self) -> &ConcordConfig {
        &self.config
    }

    pub fn states(&self) -> &Arc<dyn StateSpace> {
        &self.states
    }

    fn lookup(&self, name: &str) -> ConcordResult<&[f64]> {
        self.states
            .embedding(name)
            .ok_or_else(|| ConcordError::unknown_state(name, self.states.state_names()))
    }

    fn reasons(
        &self,
        from: &str,
        to: &str,
        raw_distance: f64,
        residual: &ResidualResult,
    ) -> Vec<String> {
        let logic = if residual.logic_residual >= 1.0 {
            format!("logic baseline: {from} -> {to} is a forbidden transition")
        } else {
            format!("logic baseline: {from} -> {to} is permitted")
        };
        let temporal = format!(
            "temporal baseline: distance {raw_distance:.3} gives residual {:.3} (cap {})",
            residual.temporal_residual, self.config.temporal_cap
        );
        let summary = format!(
            "combined divergence {:.3}, consensus {:.0}%",
            residual.divergence,
            residual.consensus_strength() * 100.0
        );
        vec![logic, temporal, summary]
    }
}

fn validate_context(context: &Context) -> ConcordResult<()> {
    match context.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, value)) => Err(ConcordError::Validation(format!(
            "context dimension '{name}' must be finite, got {value}"
        ))),
        None => Ok(()),
    }
}
