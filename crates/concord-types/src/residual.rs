// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Residual and Verdict Types
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use serde::{Deserialize, Serialize};

/// Clamp a value to [lo, hi], mapping NaN to lo and Inf to nearest bound.
#[inline]
pub fn clamp_score(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        log::warn!("clamp_score: NaN detected, clamping to {lo:.4}");
        return lo;
    }
    if value.is_infinite() {
        let boundary = if value > 0.0 { hi } else { lo };
        log::warn!("clamp_score: Inf detected, clamping to {boundary:.4}");
        return boundary;
    }
    value.clamp(lo, hi)
}

/// Discrete trust classification of a proposed transition.
///
/// Ordered from most to least trustworthy, so `Verdict::Caution <
/// Verdict::Reject` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    Caution,
    Suspicious,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "VALID",
            Verdict::Caution => "CAUTION",
            Verdict::Suspicious => "SUSPICIOUS",
            Verdict::Reject => "REJECT",
        }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Verdict::Reject)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two baseline residuals and their combined divergence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidualResult {
    /// 1.0 when the transition is a forbidden pair, else 0.0.
    pub logic_residual: f64,
    /// Clamped distance ratio in [0, 1].
    pub temporal_residual: f64,
    /// Weighted root-sum-square of the residuals and context terms.
    pub divergence: f64,
    pub verdict: Verdict,
}

impl ResidualResult {
    /// Display-only agreement between the baselines, in [0, 1].
    pub fn consensus_strength(&self) -> f64 {
        clamp_score(1.0 - self.divergence, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_nan() {
        assert_eq!(clamp_score(f64::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_clamp_pos_inf() {
        assert_eq!(clamp_score(f64::INFINITY, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_clamp_neg_inf() {
        assert_eq!(clamp_score(f64::NEG_INFINITY, 0.05, 1.0), 0.05);
    }

    #[test]
    fn test_clamp_normal() {
        assert_eq!(clamp_score(0.75, 0.0, 1.0), 0.75);
    }

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::Valid < Verdict::Caution);
        assert!(Verdict::Caution < Verdict::Suspicious);
        assert!(Verdict::Suspicious < Verdict::Reject);
    }

    #[test]
    fn test_verdict_serializes_uppercase() {
        let json = serde_json::to_string(&Verdict::Suspicious).unwrap();
        assert_eq!(json, "\"SUSPICIOUS\"");
        let back: Verdict = serde_json::from_str("\"REJECT\"").unwrap();
        assert_eq!(back, Verdict::Reject);
    }

    #[test]
    fn test_consensus_strength_clamped() {
        let result = ResidualResult {
            logic_residual: 1.0,
            temporal_residual: 1.0,
            divergence: 1.3,
            verdict: Verdict::Reject,
        };
        assert_eq!(result.consensus_strength(), 0.0);
    }

    #[test]
    fn test_residual_result_camel_case() {
        let result = ResidualResult {
            logic_residual: 0.0,
            temporal_residual: 0.5,
            divergence: 0.3162,
            verdict: Verdict::Valid,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["temporalResidual"], 0.5);
        assert_eq!(json["verdict"], "VALID");
    }
}
