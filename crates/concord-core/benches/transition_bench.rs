// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Transition Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the scoring path, integrity updates, and
//! ledger growth.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use concord_core::{
    IntegrityTracker, ProofDraft, ProofLedger, ResidualEngine, StateTable, TransitionGate,
    TransitionRequest,
};
use concord_types::ConcordConfig;

// ── ResidualEngine.evaluate() ───────────────────────────────────────

fn bench_residual_evaluate(c: &mut Criterion) {
    let engine = ResidualEngine::new(ConcordConfig::default(), Arc::new(StateTable::default()));
    c.bench_function("residual_evaluate", |b| {
        b.iter(|| engine.evaluate(black_box("chaos"), black_box("conflict"), None))
    });
}

fn bench_residual_evaluate_context(c: &mut Criterion) {
    let engine = ResidualEngine::new(ConcordConfig::default(), Arc::new(StateTable::default()));
    let context = (0..8).map(|i| (format!("signal_{i}"), 0.1)).collect();
    c.bench_function("residual_evaluate_ctx8", |b| {
        b.iter(|| engine.evaluate(black_box("tension"), black_box("order"), Some(&context)))
    });
}

// ── IntegrityTracker.update() ───────────────────────────────────────

fn bench_integrity_update(c: &mut Criterion) {
    let tracker = IntegrityTracker::default();
    c.bench_function("integrity_update", |b| {
        b.iter(|| tracker.update(black_box("alice"), black_box("trade"), black_box(0.4)))
    });
}

// ── ProofLedger.append() ────────────────────────────────────────────

fn bench_ledger_append(c: &mut Criterion) {
    let ledger = ProofLedger::new();
    c.bench_function("ledger_append", |b| {
        b.iter(|| ledger.append(ProofDraft::new("chaos", "conflict", black_box(0.04))))
    });
}

fn bench_ledger_verify_1000(c: &mut Criterion) {
    let ledger = ProofLedger::new();
    for _ in 0..1000 {
        ledger
            .append(ProofDraft::new("order", "harmony", 0.02))
            .expect("reference draft encodes");
    }
    c.bench_function("ledger_verify_1000", |b| b.iter(|| ledger.verify()));
}

// ── TransitionGate.transition() ─────────────────────────────────────

fn bench_gate_transition(c: &mut Criterion) {
    let gate = TransitionGate::default();
    let request = TransitionRequest::new("tension", "order").actors("alice", "bob");
    c.bench_function("gate_transition", |b| {
        b.iter(|| gate.transition(black_box(&request)))
    });
}

fn bench_gate_detect(c: &mut Criterion) {
    let gate = TransitionGate::default();
    let request = TransitionRequest::new("chaos", "peace").actors("alice", "bob");
    c.bench_function("gate_detect", |b| b.iter(|| gate.detect(black_box(&request))));
}

criterion_group!(
    benches,
    bench_residual_evaluate,
    bench_residual_evaluate_context,
    bench_integrity_update,
    bench_ledger_append,
    bench_ledger_verify_1000,
    bench_gate_transition,
    bench_gate_detect,
);
criterion_main!(benches);
