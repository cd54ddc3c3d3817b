//! The plan produced by the planner and consumed by the executor.

use crate::error::{Error, Result};
use crate::operation::{Operation, OperationId};
use crate::planner::conflict::{Conflict, Warning};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct PlanMetadata {
    pub package_count: usize,
    pub operation_count: usize,
    pub conflict_infos: Vec<Conflict>,
    pub warning_infos: Vec<Warning>,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub operations: Vec<Operation>,
    pub batches: Option<Vec<Vec<Operation>>>,
    pub package_operations: HashMap<String, Vec<OperationId>>,
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for op in &self.operations {
            op.validate()?;
            if !seen.insert(op.id().clone()) {
                return Err(Error::InvalidPath {
                    path: op.id().to_string(),
                    reason: "duplicate operation id in plan".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Outcome of running a plan through the executor.
#[derive(Debug, Default)]
pub struct ExecutionResult {
    pub executed: Vec<OperationId>,
    pub failed: Vec<OperationId>,
    pub rolled_back: Vec<OperationId>,
    pub errors: Vec<Error>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }

    pub fn partial_failure(&self) -> bool {
        !self.executed.is_empty() && !self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::path::FilePath;

    #[test]
    fn validate_rejects_duplicate_ids() {
        let op = |id: &str| {
            Operation::new(OperationId::new(id), OperationKind::FileDelete { path: FilePath::new("/a").unwrap() })
        };
        let plan = Plan { operations: vec![op("1"), op("1")], ..Default::default() };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn success_iff_no_failures_or_errors() {
        let result = ExecutionResult { executed: vec![OperationId::new("1")], ..Default::default() };
        assert!(result.success());
        assert!(!result.partial_failure());
    }
}
