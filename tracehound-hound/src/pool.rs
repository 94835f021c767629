//! Hound pool: process-isolated evidence analysis
//!
//! Each slot is a task owning at most one child process. Activation is
//! fire-and-forget: the caller's thread only does bookkeeping and hands
//! the job to an idle slot over a channel; all IPC happens on the slot
//! task. Children are spawned lazily, killed on timeout or error, and
//! respawned (with rotation jitter) on next use. Results fan out over
//! typed channels; a dropped subscriber never disturbs pool state.

use crate::error::HoundError;
use crate::ipc::{FrameParser, HoundMessage, HoundState};
use crate::process::{HoundProcess, ProcessConstraints};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracehound_core::Evidence;
use tracing::{debug, info, warn};

/// Policy when every slot is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Reject the activation immediately
    Drop,
    /// Reject and count a fatal exhaustion
    Escalate,
    /// Queue the activation up to the defer limit
    Defer,
}

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoundPoolConfig {
    pub pool_size: usize,
    /// Per-activation deadline in milliseconds
    pub timeout_ms: u64,
    /// Random delay bound before respawning a replacement child
    pub rotation_jitter_ms: u64,
    pub on_pool_exhausted: ExhaustionPolicy,
    pub defer_queue_limit: usize,
}

impl Default for HoundPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            timeout_ms: 30_000,
            rotation_jitter_ms: 1_000,
            on_pool_exhausted: ExhaustionPolicy::Defer,
            defer_queue_limit: 100,
        }
    }
}

/// How to launch the analysis worker
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub constraints: ProcessConstraints,
}

impl WorkerSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            constraints: ProcessConstraints::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_constraints(mut self, constraints: ProcessConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Result of one activation, delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoundOutcome {
    Processed { signature: String, duration_ms: u64 },
    Error { signature: String, error: String },
    Timeout { signature: String },
}

impl HoundOutcome {
    pub fn signature(&self) -> &str {
        match self {
            HoundOutcome::Processed { signature, .. }
            | HoundOutcome::Error { signature, .. }
            | HoundOutcome::Timeout { signature } => signature,
        }
    }
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Slot count; the ceiling for concurrent analyses
    pub total_processes: usize,
    /// Slots currently analyzing; never exceeds `total_processes`
    pub active_processes: usize,
    /// Children currently alive
    pub live_children: usize,
    pub total_activations: u64,
    pub total_processed: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
    pub fatal_exhaustions: u64,
    pub deferred_depth: usize,
}

#[derive(Debug)]
struct PendingJob {
    signature: String,
    payload: Vec<u8>,
}

#[derive(Debug)]
enum SlotCommand {
    Job(PendingJob),
    Cancel { signature: String },
    Shutdown,
}

#[derive(Debug, Default)]
struct SlotHandle {
    busy: bool,
    current: Option<String>,
    live_child: bool,
}

#[derive(Debug, Default)]
struct PoolShared {
    slots: Vec<SlotHandle>,
    deferred: VecDeque<PendingJob>,
    subscribers: Vec<mpsc::UnboundedSender<HoundOutcome>>,
    shutdown: bool,
    total_activations: u64,
    total_processed: u64,
    total_timeouts: u64,
    total_errors: u64,
    fatal_exhaustions: u64,
}

impl PoolShared {
    fn emit(&mut self, outcome: HoundOutcome) {
        match &outcome {
            HoundOutcome::Processed { .. } => self.total_processed += 1,
            HoundOutcome::Error { .. } => self.total_errors += 1,
            HoundOutcome::Timeout { .. } => self.total_timeouts += 1,
        }
        self.subscribers.retain(|tx| tx.send(outcome.clone()).is_ok());
    }
}

/// Pool of hound processes dispatching evidence for analysis
///
/// Dropping the pool closes every slot channel; the slot tasks then kill
/// their children and stop. `shutdown` does the same but also awaits them.
#[derive(Debug)]
pub struct HoundPool {
    config: HoundPoolConfig,
    shared: Arc<Mutex<PoolShared>>,
    slot_txs: Vec<mpsc::UnboundedSender<SlotCommand>>,
    tasks: Vec<JoinHandle<()>>,
}

impl HoundPool {
    /// Build the pool and start its slot tasks; must run inside a tokio
    /// runtime
    pub fn new(config: HoundPoolConfig, worker: WorkerSpec) -> Self {
        let shared = Arc::new(Mutex::new(PoolShared::default()));
        let mut slot_txs = Vec::with_capacity(config.pool_size);
        let mut tasks = Vec::with_capacity(config.pool_size);

        if let Ok(mut guard) = shared.lock() {
            for index in 0..config.pool_size {
                let (tx, rx) = mpsc::unbounded_channel();
                guard.slots.push(SlotHandle::default());
                slot_txs.push(tx);
                let runtime = SlotRuntime {
                    index,
                    shared: Arc::clone(&shared),
                    config: config.clone(),
                    worker: worker.clone(),
                    process: None,
                    stdout: None,
                    parser: FrameParser::new(),
                    ever_spawned: false,
                };
                tasks.push(tokio::spawn(runtime.run(rx)));
            }
        }

        info!(pool_size = config.pool_size, "hound pool started");
        Self {
            config,
            shared,
            slot_txs,
            tasks,
        }
    }

    /// Dispatch evidence for analysis; fire-and-forget, never blocks on IPC
    pub fn activate(&self, evidence: &Evidence) {
        let signature = evidence.signature().to_string();
        let payload = match evidence.bytes() {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                self.with_shared(|shared| {
                    shared.total_activations += 1;
                    shared.emit(HoundOutcome::Error {
                        signature: signature.clone(),
                        error: err.to_string(),
                    });
                });
                return;
            }
        };
        self.activate_raw(signature, payload);
    }

    /// Dispatch raw bytes under a signature
    pub fn activate_raw(&self, signature: String, payload: Vec<u8>) {
        self.with_shared(|shared| {
            shared.total_activations += 1;
            if shared.shutdown {
                shared.emit(HoundOutcome::Error {
                    signature: signature.clone(),
                    error: "pool is shut down".to_string(),
                });
                return;
            }

            let job = PendingJob {
                signature: signature.clone(),
                payload,
            };
            if let Some(index) = shared.slots.iter().position(|slot| !slot.busy) {
                let slot = &mut shared.slots[index];
                slot.busy = true;
                slot.current = Some(job.signature.clone());
                let _ = self.slot_txs[index].send(SlotCommand::Job(job));
                debug!(%signature, slot = index, "activation dispatched");
                return;
            }

            match self.config.on_pool_exhausted {
                ExhaustionPolicy::Drop => {
                    shared.emit(HoundOutcome::Error {
                        signature,
                        error: HoundError::PoolExhausted("no idle slot".to_string()).to_string(),
                    });
                }
                ExhaustionPolicy::Escalate => {
                    shared.fatal_exhaustions += 1;
                    shared.emit(HoundOutcome::Error {
                        signature,
                        error: HoundError::PoolExhausted("no idle slot".to_string()).to_string(),
                    });
                }
                ExhaustionPolicy::Defer => {
                    if shared.deferred.len() < self.config.defer_queue_limit {
                        shared.deferred.push_back(job);
                        debug!(%signature, depth = shared.deferred.len(), "activation deferred");
                    } else {
                        shared.emit(HoundOutcome::Error {
                            signature,
                            error: HoundError::DeferQueueFull(format!(
                                "limit {}",
                                self.config.defer_queue_limit
                            ))
                            .to_string(),
                        });
                    }
                }
            }
        });
    }

    /// Cancel an in-flight or deferred activation by signature
    pub fn terminate(&self, signature: &str) -> bool {
        let mut cancelled = false;
        self.with_shared(|shared| {
            if let Some(pos) = shared
                .deferred
                .iter()
                .position(|job| job.signature == signature)
            {
                if let Some(job) = shared.deferred.remove(pos) {
                    shared.emit(HoundOutcome::Error {
                        signature: job.signature,
                        error: "terminated".to_string(),
                    });
                    cancelled = true;
                }
                return;
            }
            for (index, slot) in shared.slots.iter().enumerate() {
                if slot.busy && slot.current.as_deref() == Some(signature) {
                    let _ = self.slot_txs[index].send(SlotCommand::Cancel {
                        signature: signature.to_string(),
                    });
                    cancelled = true;
                    return;
                }
            }
        });
        cancelled
    }

    /// Open a result subscription
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<HoundOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_shared(|shared| shared.subscribers.push(tx));
        rx
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total_processes: self.config.pool_size,
            active_processes: 0,
            live_children: 0,
            total_activations: 0,
            total_processed: 0,
            total_timeouts: 0,
            total_errors: 0,
            fatal_exhaustions: 0,
            deferred_depth: 0,
        };
        self.with_shared(|shared| {
            stats.active_processes = shared.slots.iter().filter(|s| s.busy).count();
            stats.live_children = shared.slots.iter().filter(|s| s.live_child).count();
            stats.total_activations = shared.total_activations;
            stats.total_processed = shared.total_processed;
            stats.total_timeouts = shared.total_timeouts;
            stats.total_errors = shared.total_errors;
            stats.fatal_exhaustions = shared.fatal_exhaustions;
            stats.deferred_depth = shared.deferred.len();
        });
        stats
    }

    /// Kill every child, clear the pending queue, and stop the slot tasks
    pub async fn shutdown(&mut self) {
        self.with_shared(|shared| {
            shared.shutdown = true;
            shared.deferred.clear();
        });
        for tx in &self.slot_txs {
            let _ = tx.send(SlotCommand::Shutdown);
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("hound pool shut down");
    }

    fn with_shared<F: FnOnce(&mut PoolShared)>(&self, f: F) {
        match self.shared.lock() {
            Ok(mut shared) => f(&mut shared),
            Err(_) => warn!("hound pool state poisoned; operation skipped"),
        }
    }
}

struct SlotRuntime {
    index: usize,
    shared: Arc<Mutex<PoolShared>>,
    config: HoundPoolConfig,
    worker: WorkerSpec,
    process: Option<HoundProcess>,
    stdout: Option<ChildStdout>,
    parser: FrameParser,
    ever_spawned: bool,
}

impl SlotRuntime {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<SlotCommand>) {
        loop {
            let Some(command) = cmd_rx.recv().await else {
                break;
            };
            match command {
                SlotCommand::Shutdown => break,
                // Idle slot: nothing in flight to cancel.
                SlotCommand::Cancel { .. } => continue,
                SlotCommand::Job(job) => {
                    let mut next = Some(job);
                    while let Some(job) = next.take() {
                        match self.run_job(job, &mut cmd_rx).await {
                            ControlFlow::Break(()) => {
                                self.teardown().await;
                                return;
                            }
                            ControlFlow::Continue(outcome) => {
                                // The slot is idle (or claims the next
                                // deferred job) before the result lands.
                                next = self.finish_and_claim();
                                self.emit(outcome);
                            }
                        }
                    }
                }
            }
        }
        self.teardown().await;
    }

    /// Run one activation to its terminal outcome
    async fn run_job(
        &mut self,
        job: PendingJob,
        cmd_rx: &mut mpsc::UnboundedReceiver<SlotCommand>,
    ) -> ControlFlow<(), HoundOutcome> {
        if let Err(err) = self.ensure_child().await {
            return ControlFlow::Continue(HoundOutcome::Error {
                signature: job.signature,
                error: err.to_string(),
            });
        }

        let send_result = match self.process.as_mut() {
            Some(process) => process.send(&job.payload).await,
            None => Err(HoundError::Ipc("no child after spawn".to_string())),
        };
        if let Err(err) = send_result {
            self.kill_child().await;
            return ControlFlow::Continue(HoundOutcome::Error {
                signature: job.signature,
                error: err.to_string(),
            });
        }

        let started = tokio::time::Instant::now();
        let deadline = started + Duration::from_millis(self.config.timeout_ms);
        let mut chunk = vec![0u8; 4096];

        loop {
            let Some(stdout) = self.stdout.as_mut() else {
                self.kill_child().await;
                return ControlFlow::Continue(HoundOutcome::Error {
                    signature: job.signature,
                    error: "child stdout unavailable".to_string(),
                });
            };

            tokio::select! {
                command = cmd_rx.recv() => match command {
                    None | Some(SlotCommand::Shutdown) => {
                        self.kill_child().await;
                        self.emit(HoundOutcome::Error {
                            signature: job.signature,
                            error: "pool shutdown".to_string(),
                        });
                        return ControlFlow::Break(());
                    }
                    Some(SlotCommand::Cancel { signature }) if signature == job.signature => {
                        self.kill_child().await;
                        return ControlFlow::Continue(HoundOutcome::Error {
                            signature: job.signature,
                            error: "terminated".to_string(),
                        });
                    }
                    Some(other) => {
                        // Stale cancel for a previous occupant; drop it.
                        debug!(slot = self.index, ?other, "ignoring stale slot command");
                        continue;
                    }
                },
                read = tokio::time::timeout_at(deadline, stdout.read(&mut chunk)) => match read {
                    Err(_) => {
                        self.kill_child().await;
                        return ControlFlow::Continue(HoundOutcome::Timeout {
                            signature: job.signature,
                        });
                    }
                    Ok(Err(err)) => {
                        self.kill_child().await;
                        return ControlFlow::Continue(HoundOutcome::Error {
                            signature: job.signature,
                            error: format!("read from child: {}", err),
                        });
                    }
                    Ok(Ok(0)) => {
                        // Unexpected exit while busy; the slot respawns on
                        // next use.
                        let code = match self.process.as_mut() {
                            Some(process) => process.wait().await.unwrap_or(-1),
                            None => -1,
                        };
                        self.clear_child();
                        return ControlFlow::Continue(HoundOutcome::Error {
                            signature: job.signature,
                            error: format!("process_exit_{}", code),
                        });
                    }
                    Ok(Ok(n)) => {
                        if let Some(outcome) =
                            self.handle_chunk(&chunk[..n], &job.signature, started).await
                        {
                            return ControlFlow::Continue(outcome);
                        }
                    }
                },
            }
        }
    }

    /// Feed received bytes through the parser; `Some` on a terminal message
    async fn handle_chunk(
        &mut self,
        chunk: &[u8],
        signature: &str,
        started: tokio::time::Instant,
    ) -> Option<HoundOutcome> {
        let frames = match self.parser.feed(chunk) {
            Ok(frames) => frames,
            Err(err) => {
                self.kill_child().await;
                return Some(HoundOutcome::Error {
                    signature: signature.to_string(),
                    error: err.to_string(),
                });
            }
        };

        for frame in frames {
            match HoundMessage::decode(&frame) {
                Err(err) => {
                    self.kill_child().await;
                    return Some(HoundOutcome::Error {
                        signature: signature.to_string(),
                        error: err.to_string(),
                    });
                }
                Ok(HoundMessage::Metrics {
                    processing_time_ms,
                    memory_used_bytes,
                }) => {
                    debug!(
                        slot = self.index,
                        processing_time_ms, memory_used_bytes, "hound metrics"
                    );
                }
                Ok(HoundMessage::Status {
                    state: HoundState::Processing,
                    ..
                }) => {}
                Ok(HoundMessage::Status {
                    state: HoundState::Complete,
                    ..
                }) => {
                    return Some(HoundOutcome::Processed {
                        signature: signature.to_string(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Ok(HoundMessage::Status {
                    state: HoundState::Error,
                    error,
                }) => {
                    self.kill_child().await;
                    return Some(HoundOutcome::Error {
                        signature: signature.to_string(),
                        error: error.unwrap_or_else(|| "analysis error".to_string()),
                    });
                }
            }
        }
        None
    }

    async fn ensure_child(&mut self) -> Result<(), HoundError> {
        if self.process.is_some() {
            return Ok(());
        }
        if self.ever_spawned && self.config.rotation_jitter_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=self.config.rotation_jitter_ms);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
        let mut process = HoundProcess::spawn(
            &self.worker.program,
            &self.worker.args,
            &self.worker.constraints,
        )?;
        self.stdout = process.take_stdout();
        self.parser.reset();
        self.process = Some(process);
        self.ever_spawned = true;
        self.set_live_child(true);
        Ok(())
    }

    async fn kill_child(&mut self) {
        if let Some(process) = self.process.as_mut() {
            if let Err(err) = process.kill().await {
                debug!(slot = self.index, %err, "child kill raced its exit");
            }
        }
        self.clear_child();
    }

    fn clear_child(&mut self) {
        self.process = None;
        self.stdout = None;
        self.parser.reset();
        self.set_live_child(false);
    }

    async fn teardown(&mut self) {
        self.kill_child().await;
        debug!(slot = self.index, "slot task stopped");
    }

    /// Mark the slot idle, or claim the next deferred job while still busy
    fn finish_and_claim(&mut self) -> Option<PendingJob> {
        let Ok(mut shared) = self.shared.lock() else {
            return None;
        };
        let next = shared.deferred.pop_front();
        let slot = &mut shared.slots[self.index];
        match &next {
            Some(job) => {
                slot.current = Some(job.signature.clone());
            }
            None => {
                slot.busy = false;
                slot.current = None;
            }
        }
        next
    }

    fn set_live_child(&mut self, live: bool) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.slots[self.index].live_child = live;
        }
    }

    fn emit(&self, outcome: HoundOutcome) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.emit(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_match_contract() {
        let config = HoundPoolConfig::default();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.rotation_jitter_ms, 1_000);
        assert_eq!(config.on_pool_exhausted, ExhaustionPolicy::Defer);
        assert_eq!(config.defer_queue_limit, 100);
    }

    #[test]
    fn test_outcome_signature_accessor() {
        let outcomes = [
            HoundOutcome::Processed {
                signature: "a:1".to_string(),
                duration_ms: 5,
            },
            HoundOutcome::Error {
                signature: "a:1".to_string(),
                error: "x".to_string(),
            },
            HoundOutcome::Timeout {
                signature: "a:1".to_string(),
            },
        ];
        for outcome in &outcomes {
            assert_eq!(outcome.signature(), "a:1");
        }
    }

    #[test]
    fn test_worker_spec_builder() {
        let spec = WorkerSpec::new("/usr/bin/hound")
            .with_args(vec!["error".to_string()])
            .with_constraints(ProcessConstraints {
                max_memory_bytes: None,
                ..ProcessConstraints::default()
            });
        assert_eq!(spec.program, PathBuf::from("/usr/bin/hound"));
        assert_eq!(spec.args, vec!["error".to_string()]);
        assert!(spec.constraints.max_memory_bytes.is_none());
    }
}
