//! Behavioral tests for the hound pool against the real worker binary

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracehound_core::{generate_signature, sha256_hex, Evidence, Severity, ThreatCategory};
use tracehound_hound::{
    ExhaustionPolicy, HoundOutcome, HoundPool, HoundPoolConfig, HoundProcess, ProcessConstraints,
    WorkerSpec,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn worker_program() -> PathBuf {
    init_tracing();
    PathBuf::from(env!("CARGO_BIN_EXE_hound-worker"))
}

fn lax_constraints() -> ProcessConstraints {
    init_tracing();
    // No rlimit in tests; the worker shares the test allocator budget.
    ProcessConstraints {
        max_memory_bytes: None,
        ..ProcessConstraints::default()
    }
}

fn worker(mode: &str) -> WorkerSpec {
    WorkerSpec::new(worker_program())
        .with_args(if mode == "complete" {
            Vec::new()
        } else {
            vec![mode.to_string()]
        })
        .with_constraints(lax_constraints())
}

fn evidence(label: &str) -> Evidence {
    let bytes = format!("evidence:{}", label).into_bytes();
    let hash = sha256_hex(&bytes);
    let signature = generate_signature(ThreatCategory::Malware, &bytes);
    Evidence::new(bytes, signature, hash, Severity::High).unwrap()
}

fn fast_config(pool_size: usize) -> HoundPoolConfig {
    HoundPoolConfig {
        pool_size,
        timeout_ms: 5_000,
        rotation_jitter_ms: 0,
        on_pool_exhausted: ExhaustionPolicy::Defer,
        defer_queue_limit: 100,
    }
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<HoundOutcome>, n: usize) -> Vec<HoundOutcome> {
    let mut outcomes = Vec::with_capacity(n);
    for _ in 0..n {
        let outcome = tokio::time::timeout(Duration::from_secs(20), rx.recv())
            .await
            .expect("outcome within deadline")
            .expect("channel open");
        outcomes.push(outcome);
    }
    outcomes
}

#[tokio::test]
async fn spawn_send_and_kill_a_worker() {
    let mut process = HoundProcess::spawn(&worker_program(), &[], &lax_constraints()).unwrap();
    assert!(process.pid() > 0);
    process.send(b"evidence bytes").await.unwrap();
    process.kill().await.unwrap();
}

#[tokio::test]
async fn crash_worker_exit_code_is_observable() {
    let mut process = HoundProcess::spawn(
        &worker_program(),
        &["crash".to_string()],
        &lax_constraints(),
    )
    .unwrap();
    process.send(b"trigger").await.unwrap();
    let code = process.wait().await.unwrap();
    assert_eq!(code, 7);
}

#[tokio::test]
async fn spawn_missing_program_fails() {
    let err = HoundProcess::spawn(
        Path::new("/nonexistent/hound-worker"),
        &[],
        &lax_constraints(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "PROCESS_SPAWN_FAILED");
}

#[tokio::test]
async fn activation_processes_to_completion() {
    let mut pool = HoundPool::new(fast_config(2), worker("complete"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("one"));
    let outcomes = drain(&mut rx, 1).await;
    assert!(
        matches!(&outcomes[0], HoundOutcome::Processed { .. }),
        "got {:?}",
        outcomes[0]
    );

    let stats = pool.stats();
    assert_eq!(stats.total_activations, 1);
    assert_eq!(stats.total_processed, 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn five_activations_on_three_slots_all_process() {
    let mut pool = HoundPool::new(fast_config(3), worker("complete"));
    let mut rx = pool.subscribe();

    for i in 0..5 {
        pool.activate(&evidence(&format!("item-{}", i)));
    }
    let outcomes = drain(&mut rx, 5).await;
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, HoundOutcome::Processed { .. })));

    let stats = pool.stats();
    assert_eq!(stats.total_activations, 5);
    assert_eq!(stats.total_processed, 5);
    assert_eq!(stats.total_timeouts, 0);
    assert_eq!(stats.active_processes, 0);
    assert!(stats.active_processes <= stats.total_processes);
    pool.shutdown().await;
}

#[tokio::test]
async fn activate_does_not_block_on_ipc() {
    let mut pool = HoundPool::new(fast_config(1), worker("complete"));
    let mut rx = pool.subscribe();

    let started = std::time::Instant::now();
    pool.activate(&evidence("nb"));
    let returned_after = started.elapsed();

    // The result arrives strictly after activate returned.
    let outcomes = drain(&mut rx, 1).await;
    assert!(matches!(&outcomes[0], HoundOutcome::Processed { .. }));
    assert!(returned_after < Duration::from_millis(500));
    pool.shutdown().await;
}

#[tokio::test]
async fn worker_error_emits_error_outcome() {
    let mut pool = HoundPool::new(fast_config(1), worker("error"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("bad"));
    let outcomes = drain(&mut rx, 1).await;
    match &outcomes[0] {
        HoundOutcome::Error { error, .. } => assert!(error.contains("analysis")),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(pool.stats().total_errors, 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn hanging_worker_times_out_and_slot_recovers() {
    let config = HoundPoolConfig {
        timeout_ms: 300,
        ..fast_config(1)
    };
    let mut pool = HoundPool::new(config, worker("hang"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("stuck"));
    let outcomes = drain(&mut rx, 1).await;
    assert!(matches!(&outcomes[0], HoundOutcome::Timeout { .. }));
    assert_eq!(pool.stats().total_timeouts, 1);

    // The slot respawns a child on next use; a hang worker times out
    // again, which still proves the respawn happened.
    pool.activate(&evidence("next"));
    let outcomes = drain(&mut rx, 1).await;
    assert!(matches!(&outcomes[0], HoundOutcome::Timeout { .. }));
    pool.shutdown().await;
}

#[tokio::test]
async fn crashing_worker_reports_exit_code() {
    let mut pool = HoundPool::new(fast_config(1), worker("crash"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("boom"));
    let outcomes = drain(&mut rx, 1).await;
    match &outcomes[0] {
        HoundOutcome::Error { error, .. } => assert_eq!(error, "process_exit_7"),
        other => panic!("expected error, got {:?}", other),
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn drop_policy_rejects_when_exhausted() {
    let config = HoundPoolConfig {
        on_pool_exhausted: ExhaustionPolicy::Drop,
        ..fast_config(1)
    };
    let mut pool = HoundPool::new(config, worker("hang"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("occupies-slot"));
    pool.activate(&evidence("rejected"));

    let outcomes = drain(&mut rx, 1).await;
    match &outcomes[0] {
        HoundOutcome::Error { error, .. } => assert!(error.contains("Pool exhausted")),
        other => panic!("expected exhaustion, got {:?}", other),
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn escalate_policy_counts_fatal_exhaustions() {
    let config = HoundPoolConfig {
        on_pool_exhausted: ExhaustionPolicy::Escalate,
        ..fast_config(1)
    };
    let mut pool = HoundPool::new(config, worker("hang"));
    pool.activate(&evidence("occupies-slot"));
    pool.activate(&evidence("escalated"));

    assert_eq!(pool.stats().fatal_exhaustions, 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn deferred_activations_run_after_slot_frees() {
    let mut pool = HoundPool::new(fast_config(1), worker("complete"));
    let mut rx = pool.subscribe();

    for i in 0..3 {
        pool.activate(&evidence(&format!("queued-{}", i)));
    }
    let outcomes = drain(&mut rx, 3).await;
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, HoundOutcome::Processed { .. })));
    assert_eq!(pool.stats().deferred_depth, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn defer_queue_overflow_emits_error() {
    let config = HoundPoolConfig {
        defer_queue_limit: 1,
        ..fast_config(1)
    };
    let mut pool = HoundPool::new(config, worker("hang"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("busy"));
    pool.activate(&evidence("deferred"));
    pool.activate(&evidence("overflow"));

    let outcomes = drain(&mut rx, 1).await;
    match &outcomes[0] {
        HoundOutcome::Error { error, .. } => assert!(error.contains("Defer queue full")),
        other => panic!("expected overflow error, got {:?}", other),
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn terminate_kills_in_flight_activation() {
    let mut pool = HoundPool::new(fast_config(1), worker("hang"));
    let mut rx = pool.subscribe();

    let ev = evidence("doomed");
    let signature = ev.signature().to_string();
    pool.activate(&ev);
    // Let the slot pick the job up and enter its read loop.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(pool.terminate(&signature));
    let outcomes = drain(&mut rx, 1).await;
    match &outcomes[0] {
        HoundOutcome::Error { error, signature: s } => {
            assert_eq!(error, "terminated");
            assert_eq!(*s, signature);
        }
        other => panic!("expected termination, got {:?}", other),
    }
    assert!(!pool.terminate("malware:unknown"));
    pool.shutdown().await;
}

#[tokio::test]
async fn terminate_removes_deferred_activation() {
    let mut pool = HoundPool::new(fast_config(1), worker("hang"));
    let mut rx = pool.subscribe();

    pool.activate(&evidence("busy"));
    let deferred = evidence("waiting");
    let signature = deferred.signature().to_string();
    pool.activate(&deferred);
    assert_eq!(pool.stats().deferred_depth, 1);

    assert!(pool.terminate(&signature));
    let outcomes = drain(&mut rx, 1).await;
    assert_eq!(outcomes[0].signature(), signature);
    assert_eq!(pool.stats().deferred_depth, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_clears_children_and_queue() {
    let mut pool = HoundPool::new(fast_config(2), worker("hang"));
    for i in 0..4 {
        pool.activate(&evidence(&format!("s-{}", i)));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    pool.shutdown().await;
    let stats = pool.stats();
    assert_eq!(stats.live_children, 0);
    assert_eq!(stats.deferred_depth, 0);
}

#[tokio::test]
async fn disposed_evidence_activation_errors() {
    let mut pool = HoundPool::new(fast_config(1), worker("complete"));
    let mut rx = pool.subscribe();

    let mut ev = evidence("gone");
    ev.transfer().unwrap();
    pool.activate(&ev);

    let outcomes = drain(&mut rx, 1).await;
    assert!(matches!(&outcomes[0], HoundOutcome::Error { .. }));
    pool.shutdown().await;
}
