// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Transition Gate
// ─────────────────────────────────────────────────────────────────────
//! Service object tying the residual engine, the integrity tracker and
//! the proof ledger together.
//!
//! - `detect` scores a transition and reads actor standing; no mutation.
//! - `transition` scores, always updates both actors' integrity, and
//!   appends to the ledger only when the verdict is not `REJECT`.
//!
//! A rejected transition is a successful call with `ok == false`; only
//! unknown states and malformed requests produce errors, and those
//! leave every table untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use concord_types::{ConcordConfig, ConcordError, ConcordResult, Verdict};

use crate::integrity::{IntegrityChange, IntegritySummary, IntegrityTracker};
use crate::ledger::{ChainVerification, ProofDraft, ProofLedger, ProofNode};
use crate::residual::{Context, ResidualEngine, ResidualReport};
use crate::state_space::{StateSpace, StateTable};

/// Input to both `detect` and `transition`. Omitted actors and domain
/// fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub actor_a: Option<String>,
    #[serde(default)]
    pub actor_b: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub context: Option<Context>,
}

impl TransitionRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn actors(mut self, actor_a: impl Into<String>, actor_b: impl Into<String>) -> Self {
        self.actor_a = Some(actor_a.into());
        self.actor_b = Some(actor_b.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn context(mut self, name: impl Into<String>, value: f64) -> Self {
        self.context
            .get_or_insert_with(Context::new)
            .insert(name.into(), value);
        self
    }
}

/// The three residual numbers as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub logic_residual: f64,
    pub temporal_residual: f64,
    pub divergence: f64,
}

impl From<&ResidualReport> for Delta {
    fn from(report: &ResidualReport) -> Self {
        Self {
            logic_residual: report.residual.logic_residual,
            temporal_residual: report.residual.temporal_residual,
            divergence: report.residual.divergence,
        }
    }
}

/// Current standing of one actor in the request's domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorStanding {
    pub integrity: f64,
    pub interactions: u64,
    pub average_divergence: f64,
}

/// Read-only scoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectReport {
    pub from: String,
    pub to: String,
    pub domain: String,
    pub dist: f64,
    pub delta: Delta,
    pub verdict: Verdict,
    pub consensus_strength: f64,
    pub reasons: Vec<String>,
    pub actors: BTreeMap<String, ActorStanding>,
}

/// Result of a mutating transition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub ok: bool,
    /// HTTP-equivalent status: 200 accepted, 400 rejected.
    pub status: u16,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_index: Option<u64>,
    pub dist: f64,
    pub delta: Delta,
    pub verdict: Verdict,
    pub consensus_strength: f64,
    pub reasons: Vec<String>,
    pub integrity_updates: BTreeMap<String, IntegrityChange>,
    pub chain_extended: bool,
    pub chain_length: usize,
}

struct Resolved<'a> {
    actor_a: &'a str,
    actor_b: &'a str,
    domain: &'a str,
}

/// Owner of every piece of mutable kernel state.
///
/// Thread-safe: the engine is immutable, and the tracker and ledger each
/// serialize their own mutations.
pub struct TransitionGate {
    config: ConcordConfig,
    engine: ResidualEngine,
    integrity: IntegrityTracker,
    ledger: ProofLedger,
}

impl TransitionGate {
    /// Build a gate with an empty integrity table and an empty ledger.
    pub fn new(config: ConcordConfig, states: Arc<dyn StateSpace>) -> ConcordResult<Self> {
        let integrity = IntegrityTracker::new(config.clone());
        Self::from_parts(config, states, integrity, ProofLedger::new())
    }

    /// Reference state table and default tuning.
    pub fn with_defaults() -> Self {
        let config = ConcordConfig::default();
        Self::assemble(
            config.clone(),
            Arc::new(StateTable::default()),
            IntegrityTracker::new(config),
            ProofLedger::new(),
        )
    }

    /// Assemble a gate around pre-built (e.g. restored) state. The
    /// tracker must have been built with the same configuration.
    pub fn from_parts(
        config: ConcordConfig,
        states: Arc<dyn StateSpace>,
        integrity: IntegrityTracker,
        ledger: ProofLedger,
    ) -> ConcordResult<Self> {
        config.validate()?;
        if integrity.config() != &config {
            return Err(ConcordError::Config(
                "integrity tracker configuration differs from gate configuration".into(),
            ));
        }
        Ok(Self::assemble(config, states, integrity, ledger))
    }

    fn assemble(
        config: ConcordConfig,
        states: Arc<dyn StateSpace>,
        integrity: IntegrityTracker,
        ledger: ProofLedger,
    ) -> Self {
        Self {
            engine: ResidualEngine::new(config.clone(), states),
            config,
            integrity,
            ledger,
        }
    }

    /// Score a transition and report both actors' standing without
    /// touching any record.
    pub fn detect(&self, request: &TransitionRequest) -> ConcordResult<DetectReport> {
        let resolved = self.resolve(request)?;
        let report = self
            .engine
            .evaluate(&request.from, &request.to, request.context.as_ref())?;

        let mut actors = BTreeMap::new();
        for actor in [resolved.actor_a, resolved.actor_b] {
            actors.insert(actor.to_string(), self.standing(actor, resolved.domain));
        }

        Ok(DetectReport {
            from: report.from.clone(),
            to: report.to.clone(),
            domain: resolved.domain.to_string(),
            dist: report.raw_distance,
            delta: Delta::from(&report),
            verdict: report.verdict(),
            consensus_strength: report.consensus_strength,
            reasons: report.reasons,
            actors,
        })
    }

    /// Score a transition, charge both actors, and extend the ledger
    /// unless the verdict is `REJECT`.
    pub fn transition(&self, request: &TransitionRequest) -> ConcordResult<TransitionOutcome> {
        let resolved = self.resolve(request)?;
        let report = self
            .engine
            .evaluate(&request.from, &request.to, request.context.as_ref())?;

        let verdict = report.verdict();
        let divergence = report.divergence();
        let share = if verdict.is_reject() {
            self.config.counterpart_share_rejected
        } else {
            self.config.counterpart_share_accepted
        };

        let draft = if verdict.is_reject() {
            None
        } else {
            let draft = ProofDraft::from_report(&report);
            draft.validate()?;
            Some(draft)
        };

        let mut integrity_updates = BTreeMap::new();
        let primary = self
            .integrity
            .apply(resolved.actor_a, resolved.domain, divergence);
        integrity_updates.insert(resolved.actor_a.to_string(), primary);

        let counterpart = self.integrity.apply(
            resolved.actor_b,
            resolved.domain,
            (share * divergence).min(1.0),
        );
        integrity_updates
            .entry(resolved.actor_b.to_string())
            .and_modify(|c: &mut IntegrityChange| {
                *c = IntegrityChange::new(c.before, counterpart.after)
            })
            .or_insert(counterpart);

        let (proof, chain_length) = if let Some(draft) = draft {
            let (node, length) = self.ledger.append(draft)?;
            (Some(node), length)
        } else {
            log::error!(
                "TRANSITION REJECTED. {} -> {} by {}: divergence {divergence:.4}, logic residual {}",
                report.from,
                report.to,
                resolved.actor_a,
                report.residual.logic_residual
            );
            (None, self.ledger.len())
        };

        Ok(TransitionOutcome {
            ok: proof.is_some(),
            status: if proof.is_some() { 200 } else { 400 },
            new_state: proof.as_ref().map(|_| report.to.clone()),
            proof_hash: proof.as_ref().map(|n| n.hash.clone()),
            proof_index: proof.as_ref().map(|n| n.idx),
            chain_extended: proof.is_some(),
            from: report.from.clone(),
            to: report.to.clone(),
            dist: report.raw_distance,
            delta: Delta::from(&report),
            verdict,
            consensus_strength: report.consensus_strength,
            reasons: report.reasons,
            integrity_updates,
            chain_length,
        })
    }

    /// Snapshot of the whole ledger.
    pub fn chain(&self) -> Vec<ProofNode> {
        self.ledger.read().into_nodes()
    }

    pub fn verify_chain(&self) -> ChainVerification {
        self.ledger.verify()
    }

    pub fn summarize(&self, actor: &str) -> IntegritySummary {
        self.integrity.summarize(actor)
    }

    pub fn trend(&self, actor: &str, domain: &str) -> f64 {
        self.integrity.trend(actor, domain)
    }

    /// Administrative: delete one integrity record.
    pub fn reset_integrity(&self, actor: &str, domain: &str) -> bool {
        self.integrity.reset(actor, domain)
    }

    /// Administrative: clear the ledger.
    pub fn reset_chain(&self) {
        self.ledger.reset();
    }

    pub fn state_names(&self) -> Vec<String> {
        self.engine.states().state_names()
    }

    pub fn config(&self) -> &ConcordConfig {
        &self.config
    }

    pub fn engine(&self) -> &ResidualEngine {
        &self.engine
    }

    pub fn integrity(&self) -> &IntegrityTracker {
        &self.integrity
    }

    pub fn ledger(&self) -> &ProofLedger {
        &self.ledger
    }

    fn standing(&self, actor: &str, domain: &str) -> ActorStanding {
        match self.integrity.record(actor, domain) {
            Some(r) => ActorStanding {
                integrity: r.integrity,
                interactions: r.interaction_count,
                average_divergence: r.average_divergence,
            },
            None => ActorStanding {
                integrity: self.config.integrity_prior,
                interactions: 0,
                average_divergence: self.config.divergence_prior,
            },
        }
    }

    fn resolve<'a>(&'a self, request: &'a TransitionRequest) -> ConcordResult<Resolved<'a>> {
        let actor_a = request
            .actor_a
            .as_deref()
            .unwrap_or(self.config.default_actor_a.as_str());
        let actor_b = request
            .actor_b
            .as_deref()
            .unwrap_or(self.config.default_actor_b.as_str());
        let domain = request
            .domain
            .as_deref()
            .unwrap_or(self.config.default_domain.as_str());

        for (field, value) in [("actorA", actor_a), ("actorB", actor_b), ("domain", domain)] {
            if value.is_empty() {
                return Err(ConcordError::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(Resolved {
            actor_a,
            actor_b,
            domain,
        })
    }
}

impl Default for TransitionGate {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::GENESIS_SENTINEL;

    fn request(from: &str, to: &str) -> TransitionRequest {
        TransitionRequest::new(from, to)
            .actors("alice", "bob")
            .domain("diplomacy")
    }

    #[test]
    fn test_detect_does_not_mutate() {
        let gate = TransitionGate::default();
        let report = gate.detect(&request("chaos", "conflict")).unwrap();
        assert_eq!(report.verdict, Verdict::Valid);
        assert!((report.dist - 0.346).abs() < 1e-3);
        assert_eq!(report.actors["alice"].integrity, 0.85);
        assert_eq!(report.actors["bob"].interactions, 0);
        assert_eq!(report.actors["bob"].average_divergence, 0.3);
        assert!(gate.integrity().is_empty());
        assert!(gate.chain().is_empty());
    }

    #[test]
    fn test_detect_applies_defaults() {
        let gate = TransitionGate::default();
        let report = gate.detect(&TransitionRequest::new("order", "peace")).unwrap();
        assert_eq!(report.domain, "general");
        assert!(report.actors.contains_key("agent_a"));
        assert!(report.actors.contains_key("agent_b"));
    }

    #[test]
    fn test_unknown_state_mutates_nothing() {
        let gate = TransitionGate::default();
        let err = gate.transition(&request("chaos", "limbo")).unwrap_err();
        assert!(matches!(err, ConcordError::UnknownState { ref valid, .. } if valid.len() == 6));
        assert!(gate.integrity().is_empty());
        assert!(gate.chain().is_empty());
    }

    #[test]
    fn test_empty_actor_is_validation_error() {
        let gate = TransitionGate::default();
        let req = TransitionRequest::new("chaos", "conflict").actors("", "bob");
        assert!(matches!(
            gate.transition(&req),
            Err(ConcordError::Validation(_))
        ));
        assert!(gate.integrity().is_empty());
    }

    #[test]
    fn test_rejected_transition_updates_both_actors() {
        let gate = TransitionGate::default();
        let outcome = gate.transition(&request("chaos", "peace")).unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.status, 400);
        assert_eq!(outcome.verdict, Verdict::Reject);
        assert!(!outcome.chain_extended);
        assert_eq!(outcome.chain_length, 0);
        assert!(outcome.proof_hash.is_none());
        assert!(outcome.new_state.is_none());

        let d = outcome.delta.divergence;
        let alice = gate.integrity().record("alice", "diplomacy").unwrap();
        let bob = gate.integrity().record("bob", "diplomacy").unwrap();
        assert_eq!(alice.interaction_count, 1);
        assert_eq!(bob.interaction_count, 1);
        assert!((alice.average_divergence - (0.8 * 0.3 + 0.2 * d)).abs() < 1e-12);
        assert!((bob.average_divergence - (0.8 * 0.3 + 0.2 * 0.3 * d)).abs() < 1e-12);

        let change = outcome.integrity_updates["alice"];
        assert_eq!(change.before, 0.85);
        assert!((change.change - (change.after - change.before)).abs() < 1e-15);
        assert!(change.after < change.before);
    }

    #[test]
    fn test_accepted_transition_extends_chain() {
        let gate = TransitionGate::default();
        let first = gate.transition(&request("chaos", "conflict")).unwrap();
        assert!(first.ok);
        assert_eq!(first.status, 200);
        assert_eq!(first.new_state.as_deref(), Some("conflict"));
        assert_eq!(first.proof_index, Some(0));
        assert_eq!(first.chain_length, 1);

        let second = gate.transition(&request("conflict", "tension")).unwrap();
        assert_eq!(second.proof_index, Some(1));

        let chain = gate.chain();
        assert_eq!(chain[0].prev_hash, GENESIS_SENTINEL);
        assert_eq!(chain[1].prev_hash, chain[0].hash);
        assert_eq!(chain[1].hash, second.proof_hash.unwrap());
        assert!(gate.verify_chain().valid);

        let bob = gate.integrity().record("bob", "diplomacy").unwrap();
        let d0 = first.delta.divergence;
        let d1 = second.delta.divergence;
        let expected = 0.8 * (0.8 * 0.3 + 0.2 * 0.5 * d0) + 0.2 * 0.5 * d1;
        assert!((bob.average_divergence - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rejection_leaves_chain_untouched() {
        let gate = TransitionGate::default();
        gate.transition(&request("chaos", "conflict")).unwrap();
        let before = gate.chain();
        let outcome = gate.transition(&request("conflict", "peace")).unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.chain_length, 1);
        assert_eq!(gate.chain(), before);
    }

    #[test]
    fn test_same_actor_on_both_sides() {
        let gate = TransitionGate::default();
        let req = TransitionRequest::new("chaos", "peace").actors("solo", "solo");
        let outcome = gate.transition(&req).unwrap();
        assert_eq!(outcome.integrity_updates.len(), 1);
        let change = outcome.integrity_updates["solo"];
        assert_eq!(change.before, 0.85);
        assert_eq!(change.after, gate.integrity().read("solo", "general"));
        assert_eq!(
            gate.integrity().record("solo", "general").unwrap().interaction_count,
            2
        );
    }

    #[test]
    fn test_context_can_push_to_reject() {
        let gate = TransitionGate::default();
        let req = request("chaos", "conflict").context("urgency", 2.0);
        let outcome = gate.transition(&req).unwrap();
        assert_eq!(outcome.verdict, Verdict::Reject);
        assert!(gate.chain().is_empty());
    }

    #[test]
    fn test_reset_operations() {
        let gate = TransitionGate::default();
        gate.transition(&request("chaos", "conflict")).unwrap();
        gate.transition(&request("chaos", "peace")).unwrap();
        assert!(gate.reset_integrity("alice", "diplomacy"));
        assert_eq!(gate.integrity().read("alice", "diplomacy"), 0.85);
        gate.reset_chain();
        assert!(gate.chain().is_empty());
        let outcome = gate.transition(&request("order", "harmony")).unwrap();
        assert_eq!(outcome.proof_index, Some(0));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ConcordConfig {
            temporal_cap: -1.0,
            ..Default::default()
        };
        assert!(TransitionGate::new(config, Arc::new(StateTable::default())).is_err());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: TransitionRequest = serde_json::from_str(
            r#"{"from": "chaos", "to": "order", "actorA": "x", "context": {"load": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(req.actor_a.as_deref(), Some("x"));
        assert!(req.actor_b.is_none());
        assert_eq!(req.context.unwrap()["load"], 0.5);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let gate = TransitionGate::default();
        let rejected = gate.transition(&request("chaos", "peace")).unwrap();
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["chainExtended"], false);
        assert!(json.get("proofHash").is_none());
        assert!(json["integrityUpdates"]["bob"]["change"].is_number());
        assert_eq!(json["verdict"], "REJECT");
    }

    #[test]
    fn test_concurrent_transitions_keep_chain_valid() {
        let gate = Arc::new(TransitionGate::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let req = TransitionRequest::new("tension", "order")
                            .actors(format!("worker-{t}"), "hub");
                        gate.transition(&req).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(gate.chain().len(), 80);
        assert!(gate.verify_chain().valid);
        assert_eq!(
            gate.integrity().record("hub", "general").unwrap().interaction_count,
            80
        );
    }

    #[test]
    fn test_concurrent_outcomes_report_their_own_update() {
        let config = ConcordConfig {
            cold_start_threshold: 1,
            ..Default::default()
        };
        let gate = Arc::new(TransitionGate::new(config, Arc::new(StateTable::default())).unwrap());
        gate.integrity().update("hub", "general", 0.1);

        let routes = [("chaos", "peace"), ("tension", "order"), ("chaos", "conflict")];
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| {
                            let (from, to) = routes[(t + i) % routes.len()];
                            let req = TransitionRequest::new(from, to)
                                .actors(format!("worker-{t}"), "hub");
                            gate.transition(&req).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for outcome in handle.join().unwrap() {
                let share = if outcome.ok { 0.5 } else { 0.3 };
                let penalty = (share * outcome.delta.divergence).min(1.0);
                let hub = outcome.integrity_updates["hub"];
                let expected = (0.8 * hub.before + 0.2 * (1.0 - penalty)).clamp(0.05, 1.0);
                assert!((hub.after - expected).abs() < 1e-12, "{hub:?}");
                if let Some(idx) = outcome.proof_index {
                    assert_eq!(outcome.chain_length as u64, idx + 1);
                }
            }
        }
        assert!(gate.verify_chain().valid);
    }

    #[test]
    fn test_from_parts_checks_configuration() {
        let states: Arc<dyn StateSpace> = Arc::new(StateTable::default());
        let strict = ConcordConfig {
            integrity_prior: 0.5,
            ..Default::default()
        };
        let mismatched = TransitionGate::from_parts(
            ConcordConfig::default(),
            Arc::clone(&states),
            IntegrityTracker::new(strict.clone()),
            ProofLedger::new(),
        );
        assert!(matches!(mismatched, Err(ConcordError::Config(_))));

        let invalid = ConcordConfig {
            smoothing_alpha: 0.0,
            ..Default::default()
        };
        assert!(TransitionGate::from_parts(
            invalid.clone(),
            Arc::clone(&states),
            IntegrityTracker::new(invalid),
            ProofLedger::new(),
        )
        .is_err());

        let gate = TransitionGate::from_parts(
            strict.clone(),
            states,
            IntegrityTracker::new(strict),
            ProofLedger::new(),
        )
        .unwrap();
        let report = gate.detect(&TransitionRequest::new("order", "peace")).unwrap();
        assert_eq!(report.actors["agent_a"].integrity, 0.5);
        assert_eq!(gate.integrity().read("agent_a", "general"), 0.5);
    }
}
