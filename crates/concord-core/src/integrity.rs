// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Integrity Tracker
// ─────────────────────────────────────────────────────────────────────
//! Per-(actor, domain) trust scores smoothed by an EWMA over observed
//! divergence, with cold-start dampening for actors with little history.
//!
//! Update rule, with α = `smoothing_alpha` and n the prior interaction count:
//!
//! ```text
//! cold      = min(1, n / cold_start_threshold)
//! adjusted  = min(1, d) * (w_min + (1 - w_min) * cold)
//! integrity = clamp((1 - α) * integrity + α * (1 - adjusted), floor, 1)
//! avg_div   = (1 - α) * avg_div + α * d
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use concord_types::{clamp_score, ConcordConfig, ConcordError, ConcordResult};

/// Structured (actor, domain) key. Identifiers are compared as values,
/// so no delimiter inside either part can collide with another key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntegrityKey {
    pub actor: String,
    pub domain: String,
}

impl IntegrityKey {
    pub fn new(actor: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            domain: domain.into(),
        }
    }
}

/// Trust state for one (actor, domain) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityRecord {
    pub integrity: f64,
    pub last_updated: DateTime<Utc>,
    pub interaction_count: u64,
    pub average_divergence: f64,
}

/// Per-domain line of an actor summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainIntegrity {
    pub domain: String,
    pub integrity: f64,
    pub interaction_count: u64,
    pub average_divergence: f64,
}

/// Aggregate trust for one actor across every domain it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySummary {
    pub actor: String,
    pub domains: Vec<DomainIntegrity>,
    pub weighted_average_integrity: f64,
    pub total_interactions: u64,
}

/// Integrity movement produced by one update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrityChange {
    pub before: f64,
    pub after: f64,
    pub change: f64,
}

impl IntegrityChange {
    pub fn new(before: f64, after: f64) -> Self {
        Self {
            before,
            after,
            change: after - before,
        }
    }
}

/// Owner of the integrity table.
///
/// Thread-safe: a single `parking_lot::Mutex` guards the whole table, so
/// each update is an atomic read-modify-write of one record.
pub struct IntegrityTracker {
    config: ConcordConfig,
    records: Mutex<HashMap<IntegrityKey, IntegrityRecord>>,
}

impl IntegrityTracker {
    pub fn new(config: ConcordConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Current integrity, or the optimistic prior if no record exists.
    /// Never creates a record.
    pub fn read(&self, actor: &str, domain: &str) -> f64 {
        self.records
            .lock()
            .get(&IntegrityKey::new(actor, domain))
            .map(|r| r.integrity)
            .unwrap_or(self.config.integrity_prior)
    }

    /// Snapshot of the record for a key, if any.
    pub fn record(&self, actor: &str, domain: &str) -> Option<IntegrityRecord> {
        self.records
            .lock()
            .get(&IntegrityKey::new(actor, domain))
            .cloned()
    }

    /// Fold one observed divergence into the record and return the new
    /// integrity. Creates the record with prior values on first use.
    pub fn update(&self, actor: &str, domain: &str, observed_divergence: f64) -> f64 {
        self.apply(actor, domain, observed_divergence).after
    }

    /// Same as `update`, but reports the integrity read and written
    /// inside the one critical section.
    pub fn apply(&self, actor: &str, domain: &str, observed_divergence: f64) -> IntegrityChange {
        let observed = if observed_divergence.is_finite() && observed_divergence >= 0.0 {
            observed_divergence
        } else {
            log::warn!(
                "integrity update for {actor}/{domain}: invalid divergence {observed_divergence}, clamping"
            );
            clamp_score(observed_divergence, 0.0, 1.0)
        };

        let alpha = self.config.smoothing_alpha;
        let key = IntegrityKey::new(actor, domain);
        let mut records = self.records.lock();
        let prior = records
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.fresh_record());

        let penalty = observed.min(1.0);
        let adjusted = self.adjusted_penalty(penalty, prior.interaction_count);
        let integrity = clamp_score(
            (1.0 - alpha) * prior.integrity + alpha * (1.0 - adjusted),
            self.config.integrity_floor,
            1.0,
        );
        let average_divergence = (1.0 - alpha) * prior.average_divergence + alpha * observed;

        records.insert(
            key,
            IntegrityRecord {
                integrity,
                last_updated: Utc::now(),
                interaction_count: prior.interaction_count + 1,
                average_divergence,
            },
        );
        IntegrityChange::new(prior.integrity, integrity)
    }

    /// Share of full penalty weight earned after `interaction_count`
    /// observations, in [0, 1].
    pub fn cold_start_factor(&self, interaction_count: u64) -> f64 {
        (interaction_count as f64 / self.config.cold_start_threshold as f64).min(1.0)
    }

    /// Penalty after cold-start dampening. Brand-new actors still take
    /// `min_penalty_weight` of it.
    pub fn adjusted_penalty(&self, penalty: f64, interaction_count: u64) -> f64 {
        let w_min = self.config.min_penalty_weight;
        penalty * (w_min + (1.0 - w_min) * self.cold_start_factor(interaction_count))
    }

    /// Current integrity minus what the actor's average divergence alone
    /// would imply. Positive means recent behaviour beats the average.
    /// Zero until `trend_min_interactions` observations exist.
    pub fn trend(&self, actor: &str, domain: &str) -> f64 {
        match self.record(actor, domain) {
            Some(r) if r.interaction_count >= self.config.trend_min_interactions => {
                r.integrity - (1.0 - r.average_divergence)
            }
            _ => 0.0,
        }
    }

    /// Interaction-weighted integrity across every domain of an actor.
    pub fn summarize(&self, actor: &str) -> IntegritySummary {
        let records = self.records.lock();
        let mut domains: Vec<DomainIntegrity> = records
            .iter()
            .filter(|(key, _)| key.actor == actor)
            .map(|(key, r)| DomainIntegrity {
                domain: key.domain.clone(),
                integrity: r.integrity,
                interaction_count: r.interaction_count,
                average_divergence: r.average_divergence,
            })
            .collect();
        drop(records);

        let total_interactions: u64 = domains.iter().map(|d| d.interaction_count).sum();
        if total_interactions == 0 {
            return IntegritySummary {
                actor: actor.to_string(),
                domains: Vec::new(),
                weighted_average_integrity: self.config.integrity_prior,
                total_interactions: 0,
            };
        }

        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        let weighted_average_integrity: f64 = domains
            .iter()
            .map(|d| d.integrity * d.interaction_count as f64 / total_interactions as f64)
            .sum();

        IntegritySummary {
            actor: actor.to_string(),
            domains,
            weighted_average_integrity,
            total_interactions,
        }
    }

    /// Delete the record for a key. Returns whether one existed.
    pub fn reset(&self, actor: &str, domain: &str) -> bool {
        let removed = self
            .records
            .lock()
            .remove(&IntegrityKey::new(actor, domain))
            .is_some();
        if removed {
            log::info!("integrity record reset for {actor}/{domain}");
        }
        removed
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.lock().clear();
        log::info!("integrity table cleared");
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Every record, sorted by key, for external persistence.
    pub fn snapshot(&self) -> Vec<(IntegrityKey, IntegrityRecord)> {
        let mut entries: Vec<_> = self
            .records
            .lock()
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Replace the table with externally persisted records. The table is
    /// left untouched if any record is out of bounds or a key repeats.
    pub fn restore(&self, entries: Vec<(IntegrityKey, IntegrityRecord)>) -> ConcordResult<()> {
        let mut table = HashMap::with_capacity(entries.len());
        for (key, record) in entries {
            self.check_record(&key, &record)?;
            if table.contains_key(&key) {
                return Err(ConcordError::Validation(format!(
                    "restored snapshot repeats {}/{}",
                    key.actor, key.domain
                )));
            }
            table.insert(key, record);
        }
        let count = table.len();
        *self.records.lock() = table;
        log::info!("integrity table restored with {count} records");
        Ok(())
    }

    pub fn config(&self) -> &ConcordConfig {
        &self.config
    }

    fn fresh_record(&self) -> IntegrityRecord {
        IntegrityRecord {
            integrity: self.config.integrity_prior,
            last_updated: Utc::now(),
            interaction_count: 0,
            average_divergence: self.config.divergence_prior,
        }
    }

    fn check_record(&self, key: &IntegrityKey, record: &IntegrityRecord) -> ConcordResult<()> {
        if key.actor.is_empty() || key.domain.is_empty() {
            return Err(ConcordError::Validation(
                "restored record has an empty actor or domain".into(),
            ));
        }
        if !(self.config.integrity_floor..=1.0).contains(&record.integrity) {
            return Err(ConcordError::Validation(format!(
                "restored integrity for {}/{} out of range: {}",
                key.actor, key.domain, record.integrity
            )));
        }
        if !(record.average_divergence.is_finite() && record.average_divergence >= 0.0) {
            return Err(ConcordError::Validation(format!(
                "restored average divergence for {}/{} invalid: {}",
                key.actor, key.domain, record.average_divergence
            )));
        }
        Ok(())
    }
}

impl Default for IntegrityTracker {
    fn default() -> Self {
        Self::new(ConcordConfig::default())
    }
}
