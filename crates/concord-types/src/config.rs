// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{ConcordError, ConcordResult};

/// Runtime configuration for the Concord Kernel.
///
/// Covers the residual engine, the integrity tracker and the transition
/// gate. The state embedding table is configured separately because it
/// is data, not tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcordConfig {
    /// Distance at which the temporal residual saturates to 1.0.
    /// Default: 5.0.
    pub temporal_cap: f64,

    /// Weight of the squared logic residual in the divergence.
    /// Default: 0.6.
    pub w_logic: f64,

    /// Weight of the squared temporal residual in the divergence.
    /// Default: 0.4.
    pub w_temporal: f64,

    /// Weight of each squared named context dimension.
    /// Default: 0.25.
    pub context_weight: f64,

    /// Divergence strictly above this rejects. Default: 0.85.
    pub reject_threshold: f64,

    /// Divergence strictly above this is suspicious. Default: 0.65.
    pub suspicious_threshold: f64,

    /// Divergence strictly above this warrants caution. Default: 0.45.
    pub caution_threshold: f64,

    /// EWMA smoothing factor for integrity and average divergence.
    /// Default: 0.2.
    pub smoothing_alpha: f64,

    /// Interactions needed before penalties apply at full weight.
    /// Default: 5.
    pub cold_start_threshold: u64,

    /// Penalty weight applied to an actor with no history.
    /// Default: 0.3.
    pub min_penalty_weight: f64,

    /// Lowest reachable integrity. Default: 0.05.
    pub integrity_floor: f64,

    /// Integrity assumed for an actor without a record. Default: 0.85.
    pub integrity_prior: f64,

    /// Average divergence assumed for a fresh record. Default: 0.3.
    pub divergence_prior: f64,

    /// Interactions needed before `trend` reports anything. Default: 3.
    pub trend_min_interactions: u64,

    /// Share of the divergence charged to the counterpart actor when
    /// the transition is rejected. Default: 0.3.
    pub counterpart_share_rejected: f64,

    /// Share of the divergence charged to the counterpart actor when
    /// the transition is accepted. Default: 0.5.
    pub counterpart_share_accepted: f64,

    /// Primary actor used when a request omits one.
    pub default_actor_a: String,

    /// Counterpart actor used when a request omits one.
    pub default_actor_b: String,

    /// Domain used when a request omits one.
    pub default_domain: String,
}

impl Default for ConcordConfig {
    fn default() -> Self {
        Self {
            temporal_cap: 5.0,
            w_logic: 0.6,
            w_temporal: 0.4,
            context_weight: 0.25,
            reject_threshold: 0.85,
            suspicious_threshold: 0.65,
            caution_threshold: 0.45,
            smoothing_alpha: 0.2,
            cold_start_threshold: 5,
            min_penalty_weight: 0.3,
            integrity_floor: 0.05,
            integrity_prior: 0.85,
            divergence_prior: 0.3,
            trend_min_interactions: 3,
            counterpart_share_rejected: 0.3,
            counterpart_share_accepted: 0.5,
            default_actor_a: "agent_a".to_string(),
            default_actor_b: "agent_b".to_string(),
            default_domain: "general".to_string(),
        }
    }
}

impl ConcordConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> ConcordResult<()> {
        if !(self.temporal_cap.is_finite() && self.temporal_cap > 0.0) {
            return Err(ConcordError::Config(format!(
                "temporal_cap must be finite and > 0, got {}",
                self.temporal_cap
            )));
        }
        for (name, weight) in [
            ("w_logic", self.w_logic),
            ("w_temporal", self.w_temporal),
            ("context_weight", self.context_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConcordError::Config(format!(
                    "{name} must be finite and >= 0, got {weight}"
                )));
            }
        }
        if !(0.0 <= self.caution_threshold
            && self.caution_threshold <= self.suspicious_threshold
            && self.suspicious_threshold <= self.reject_threshold)
        {
            return Err(ConcordError::Config(format!(
                "thresholds must satisfy 0 <= caution <= suspicious <= reject, got {} / {} / {}",
                self.caution_threshold, self.suspicious_threshold, self.reject_threshold
            )));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConcordError::Config(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if self.cold_start_threshold == 0 {
            return Err(ConcordError::Config(
                "cold_start_threshold must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_penalty_weight) {
            return Err(ConcordError::Config(format!(
                "min_penalty_weight must be in [0, 1], got {}",
                self.min_penalty_weight
            )));
        }
        if !(self.integrity_floor > 0.0 && self.integrity_floor <= 1.0) {
            return Err(ConcordError::Config(format!(
                "integrity_floor must be in (0, 1], got {}",
                self.integrity_floor
            )));
        }
        if !(self.integrity_floor..=1.0).contains(&self.integrity_prior) {
            return Err(ConcordError::Config(format!(
                "integrity_prior must be in [{}, 1], got {}",
                self.integrity_floor, self.integrity_prior
            )));
        }
        if !(0.0..=1.0).contains(&self.divergence_prior) {
            return Err(ConcordError::Config(format!(
                "divergence_prior must be in [0, 1], got {}",
                self.divergence_prior
            )));
        }
        for (name, share) in [
            ("counterpart_share_rejected", self.counterpart_share_rejected),
            ("counterpart_share_accepted", self.counterpart_share_accepted),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(ConcordError::Config(format!(
                    "{name} must be in [0, 1], got {share}"
                )));
            }
        }
        for (name, id) in [
            ("default_actor_a", &self.default_actor_a),
            ("default_actor_b", &self.default_actor_b),
            ("default_domain", &self.default_domain),
        ] {
            if id.is_empty() {
                return Err(ConcordError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ConcordResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConcordError::Config(format!("JSON parse error: {e}")))
    }
}
