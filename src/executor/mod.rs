//! Precondition checks, sequential and parallel execution, and rollback.

pub mod checkpoint;

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::operation::{Operation, OperationId, OperationKind};
use crate::pipeline::CancellationToken;
use crate::plan::{ExecutionResult, Plan};
use checkpoint::{Checkpoint, CheckpointId, CheckpointStore, InMemoryCheckpointStore};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Plain-counter instrumentation, matching the level of ambient metrics the
/// core's own transaction engine carries (no external metrics crate).
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    pub executions_total: AtomicU64,
    pub executions_success: AtomicU64,
    pub executions_failed: AtomicU64,
    pub operations_executed: AtomicU64,
    pub operations_failed: AtomicU64,
    pub operations_rolled_back: AtomicU64,
    pub operations_queued: AtomicU64,
    durations_seconds: Mutex<Vec<f64>>,
    parallel_batches: Mutex<Vec<usize>>,
}

impl ExecutorMetrics {
    pub fn observe_duration(&self, seconds: f64) {
        self.durations_seconds.lock().unwrap().push(seconds);
    }

    pub fn observe_batches(&self, count: usize) {
        self.parallel_batches.lock().unwrap().push(count);
    }
}

/// Runs prepared plans to completion, with checkpointing and rollback on
/// failure.
pub struct Executor {
    fs: Arc<dyn Filesystem>,
    checkpoints: Arc<dyn CheckpointStore>,
    pub metrics: Arc<ExecutorMetrics>,
}

impl Executor {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs, checkpoints: Arc::new(InMemoryCheckpointStore::new()), metrics: Arc::new(ExecutorMetrics::default()) }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    #[instrument(skip(self, plan))]
    pub fn execute(&self, plan: &Plan, token: &CancellationToken) -> Result<ExecutionResult> {
        if plan.is_empty() {
            return Err(Error::EmptyPlan);
        }
        plan.validate()?;
        self.prepare(plan)?;

        self.metrics.executions_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.operations_queued.store(plan.operations.len() as u64, Ordering::Relaxed);
        let started = Instant::now();

        let checkpoint = self.checkpoints.create()?;
        let result = match &plan.batches {
            Some(batches) => {
                self.metrics.observe_batches(batches.len());
                self.execute_parallel(batches, &checkpoint.id, token)
            }
            None => self.execute_sequential(&plan.operations, &checkpoint.id, token),
        };

        self.metrics.observe_duration(started.elapsed().as_secs_f64());
        self.metrics.operations_queued.store(0, Ordering::Relaxed);
        match &result {
            Ok(r) if r.success() => {
                self.metrics.executions_success.fetch_add(1, Ordering::Relaxed);
                let _ = self.checkpoints.delete(&checkpoint.id);
            }
            _ => {
                self.metrics.executions_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Walks the plan in order, checking each operation's precondition
    /// against the filesystem plus the set of paths earlier operations in
    /// this same plan will create. Fails before any side effect.
    fn prepare(&self, plan: &Plan) -> Result<()> {
        let mut pending_files: HashSet<PathBuf> = HashSet::new();
        let mut pending_dirs: HashSet<PathBuf> = HashSet::new();

        for op in &plan.operations {
            match op.kind() {
                OperationKind::FileMove { source, dest } => {
                    if !self.fs.exists(source.as_path()) {
                        return Err(Error::SourceNotFound { path: source.as_path().to_path_buf() });
                    }
                    if let Some(parent) = dest.as_path().parent() {
                        if !self.fs.exists(parent) && !pending_dirs.contains(parent) {
                            return Err(Error::ParentNotFound { path: dest.as_path().to_path_buf() });
                        }
                    }
                    pending_files.insert(dest.as_path().to_path_buf());
                }
                OperationKind::LinkCreate { source, .. } => {
                    if !self.fs.exists(source.as_path()) && !pending_files.contains(source.as_path()) {
                        return Err(Error::SourceNotFound { path: source.as_path().to_path_buf() });
                    }
                }
                OperationKind::DirCreate { path } => {
                    if let Some(parent) = path.as_path().parent() {
                        if !self.fs.exists(parent) && !pending_dirs.contains(parent) {
                            return Err(Error::ParentNotFound { path: path.as_path().to_path_buf() });
                        }
                    }
                    pending_dirs.insert(path.as_path().to_path_buf());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn execute_sequential(
        &self,
        operations: &[Operation],
        checkpoint_id: &CheckpointId,
        token: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let mut executed = Vec::new();
        for op in operations {
            if token.is_cancelled() {
                self.rollback_recorded(checkpoint_id, &mut executed);
                return Err(Error::ExecutionCancelled { operation: op.id().to_string() });
            }
            match op.execute(self.fs.as_ref()) {
                Ok(()) => {
                    self.checkpoints.record(checkpoint_id, op.clone())?;
                    executed.push(op.clone());
                    self.metrics.operations_executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.metrics.operations_failed.fetch_add(1, Ordering::Relaxed);
                    error!(operation = %op, error = %e, "operation failed, rolling back");
                    let mut errors = vec![e];
                    let rolled_back = self.rollback(&mut executed, &mut errors);
                    return Err(Error::ExecutionFailed {
                        executed: executed.iter().map(|o| o.id().clone()).collect(),
                        failed: vec![op.id().clone()],
                        rolled_back,
                        errors,
                    });
                }
            }
        }
        Ok(ExecutionResult {
            executed: executed.iter().map(|o| o.id().clone()).collect(),
            failed: Vec::new(),
            rolled_back: Vec::new(),
            errors: Vec::new(),
        })
    }

    fn execute_parallel(
        &self,
        batches: &[Vec<Operation>],
        checkpoint_id: &CheckpointId,
        token: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let mut executed: Vec<Operation> = Vec::new();

        for batch in batches {
            if token.is_cancelled() {
                self.rollback_recorded(checkpoint_id, &mut executed);
                return Err(Error::ExecutionCancelled { operation: "batch".to_string() });
            }

            let outcomes: Vec<(Operation, Result<()>)> = batch
                .par_iter()
                .map(|op| (op.clone(), op.execute(self.fs.as_ref())))
                .collect();

            let mut batch_failed: Option<(OperationId, Error)> = None;
            for (op, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        self.checkpoints.record(checkpoint_id, op.clone())?;
                        executed.push(op.clone());
                        self.metrics.operations_executed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.metrics.operations_failed.fetch_add(1, Ordering::Relaxed);
                        warn!(operation = %op, error = %e, "operation in batch failed");
                        if batch_failed.is_none() {
                            batch_failed = Some((op.id().clone(), e));
                        }
                    }
                }
            }

            if let Some((failed_id, first_error)) = batch_failed {
                let mut errors = vec![first_error];
                let rolled_back = self.rollback(&mut executed, &mut errors);
                return Err(Error::ExecutionFailed {
                    executed: executed.iter().map(|o| o.id().clone()).collect(),
                    failed: vec![failed_id],
                    rolled_back,
                    errors,
                });
            }
        }

        Ok(ExecutionResult {
            executed: executed.iter().map(|o| o.id().clone()).collect(),
            failed: Vec::new(),
            rolled_back: Vec::new(),
            errors: Vec::new(),
        })
    }

    /// Rolls back `executed` in strict reverse order. Best-effort: a
    /// rollback failure is appended to `errors` but never aborts the pass.
    fn rollback(&self, executed: &mut Vec<Operation>, errors: &mut Vec<Error>) -> Vec<OperationId> {
        let mut rolled_back = Vec::new();
        while let Some(op) = executed.pop() {
            match op.rollback(self.fs.as_ref()) {
                Ok(()) => {
                    self.metrics.operations_rolled_back.fetch_add(1, Ordering::Relaxed);
                    rolled_back.push(op.id().clone());
                }
                Err(e) => {
                    warn!(operation = %op, error = %e, "rollback failed, continuing");
                    errors.push(e);
                }
            }
        }
        rolled_back
    }

    fn rollback_recorded(&self, _checkpoint_id: &CheckpointId, executed: &mut Vec<Operation>) {
        let mut errors = Vec::new();
        let rolled_back = self.rollback(executed, &mut errors);
        info!(count = rolled_back.len(), "rolled back after cancellation");
    }

    pub fn restore_checkpoint(&self, id: &CheckpointId) -> Result<Checkpoint> {
        self.checkpoints.restore(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFilesystem;
    use crate::operation::OperationKind;
    use crate::path::{FilePath, TargetPath};
    use std::path::Path;

    fn executor() -> (Executor, Arc<InMemoryFilesystem>) {
        let fs = Arc::new(InMemoryFilesystem::with_root("/"));
        let executor = Executor::new(fs.clone());
        (executor, fs)
    }

    #[test]
    fn empty_plan_is_rejected() {
        let (executor, _fs) = executor();
        let token = CancellationToken::new();
        let err = executor.execute(&Plan::default(), &token).unwrap_err();
        assert!(matches!(err, Error::EmptyPlan));
    }

    #[test]
    fn missing_parent_directory_fails_in_prepare_without_side_effects() {
        let (executor, fs) = executor();
        let plan = Plan {
            operations: vec![Operation::new(
                OperationId::new("d2"),
                OperationKind::DirCreate { path: FilePath::new("/b/c").unwrap() },
            )],
            ..Default::default()
        };
        let token = CancellationToken::new();
        let err = executor.execute(&plan, &token).unwrap_err();
        assert!(matches!(err, Error::ParentNotFound { .. }));
        assert!(!fs.exists(Path::new("/b")));
    }

    #[test]
    fn sequential_execution_rolls_back_on_failure() {
        let (executor, fs) = executor();
        fs.write_file(Path::new("/pkg/a"), b"1", 0o644).unwrap();
        fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
        // /home/taken already exists as a regular file: the DirCreate passes
        // prepare (its parent /home exists) but fails at execute time.
        fs.write_file(Path::new("/home/taken"), b"x", 0o644).unwrap();
        let ops = vec![
            Operation::new(
                OperationId::new("l1"),
                OperationKind::LinkCreate {
                    source: FilePath::new("/pkg/a").unwrap(),
                    target: TargetPath::new("/home/.a").unwrap(),
                },
            ),
            Operation::new(
                OperationId::new("d1"),
                OperationKind::DirCreate { path: FilePath::new("/home/taken").unwrap() },
            ),
        ];
        let plan = Plan { operations: ops, ..Default::default() };
        let token = CancellationToken::new();
        let err = executor.execute(&plan, &token).unwrap_err();
        match err {
            Error::ExecutionFailed { rolled_back, .. } => assert_eq!(rolled_back.len(), 1),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
        assert!(!fs.exists(Path::new("/home/.a")));
    }
}
