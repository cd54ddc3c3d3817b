//! Pluggable health checks with sequential or parallel dispatch.

pub mod checks;

use crate::error::Result;
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Skipped,
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
    pub path: Option<String>,
    pub context: HashMap<String, String>,
    pub remediation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub check_name: String,
    pub status: Status,
    pub issues: Vec<Issue>,
    pub stats: HashMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn pass(check_name: impl Into<String>) -> Self {
        Self { check_name: check_name.into(), status: Status::Pass, issues: Vec::new(), stats: HashMap::new() }
    }
}

pub trait DiagnosticCheck: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn run(&self) -> Result<CheckResult>;
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Empty means run every registered check.
    pub include_checks: Vec<String>,
    pub parallel: bool,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub overall: Status,
    pub results: Vec<CheckResult>,
}

pub struct DiagnosticEngine {
    checks: Vec<Box<dyn DiagnosticCheck>>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn register(&mut self, check: Box<dyn DiagnosticCheck>) {
        self.checks.push(check);
    }

    pub fn run(&self, opts: &RunOptions) -> Report {
        let selected: Vec<&Box<dyn DiagnosticCheck>> = self
            .checks
            .iter()
            .filter(|c| opts.include_checks.is_empty() || opts.include_checks.iter().any(|n| n == c.name()))
            .collect();

        let run_one = |check: &Box<dyn DiagnosticCheck>| -> CheckResult {
            match check.run() {
                Ok(result) => result,
                Err(e) => CheckResult {
                    check_name: check.name().to_string(),
                    status: Status::Fail,
                    issues: vec![Issue {
                        code: "CHECK_EXECUTION_ERROR".to_string(),
                        message: e.to_string(),
                        severity: IssueSeverity::Error,
                        path: None,
                        context: HashMap::new(),
                        remediation: None,
                    }],
                    stats: HashMap::new(),
                },
            }
        };

        let results: Vec<CheckResult> = if opts.parallel {
            selected.par_iter().map(|c| run_one(c)).collect()
        } else {
            selected.iter().map(|c| run_one(c)).collect()
        };

        let overall = results.iter().map(|r| r.status).max().unwrap_or(Status::Skipped);
        Report { overall, results }
    }
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new()
    }
}
