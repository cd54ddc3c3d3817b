//! Conflict detection, resolution policies, and suggestion generation.

use crate::operation::{Operation, OperationId, OperationKind};
use crate::planner::desired_state::{CurrentState, DesiredState};
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    FileExists,
    WrongLink,
    Permission,
    Circular,
    DirExpected,
    FileExpected,
}

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub action: String,
    pub explanation: String,
    pub example: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub path: PathBuf,
    pub details: String,
    pub context: HashMap<String, String>,
    pub suggestions: Vec<Suggestion>,
}

impl Conflict {
    fn new(kind: ConflictKind, path: PathBuf, details: impl Into<String>) -> Self {
        let suggestions = suggestions_for(kind);
        Self { kind, path, details: details.into(), context: HashMap::new(), suggestions }
    }
}

fn suggestions_for(kind: ConflictKind) -> Vec<Suggestion> {
    match kind {
        ConflictKind::FileExists => vec![
            Suggestion {
                action: "backup".to_string(),
                explanation: "move the existing file aside before linking".to_string(),
                example: Some("dotman manage --on-conflict=backup <package>".to_string()),
            },
            Suggestion {
                action: "adopt".to_string(),
                explanation: "move the existing file into the package instead of overwriting it"
                    .to_string(),
                example: Some("dotman adopt <package> <file>".to_string()),
            },
        ],
        ConflictKind::WrongLink => vec![
            Suggestion {
                action: "unmanage".to_string(),
                explanation: "unmanage whichever package currently owns this link".to_string(),
                example: None,
            },
            Suggestion {
                action: "overwrite".to_string(),
                explanation: "repoint the link at this package's file".to_string(),
                example: Some("dotman manage --on-conflict=overwrite <package>".to_string()),
            },
        ],
        ConflictKind::Permission => vec![
            Suggestion {
                action: "chmod".to_string(),
                explanation: "grant write access to the target directory".to_string(),
                example: None,
            },
            Suggestion {
                action: "run as owner".to_string(),
                explanation: "re-run as the user that owns the target path".to_string(),
                example: None,
            },
        ],
        ConflictKind::Circular => vec![
            Suggestion {
                action: "break the cycle".to_string(),
                explanation: "remove one of the circular dependency edges from the plan"
                    .to_string(),
                example: None,
            },
            Suggestion {
                action: "split the package".to_string(),
                explanation: "separate the conflicting paths into independent packages"
                    .to_string(),
                example: None,
            },
        ],
        ConflictKind::DirExpected => vec![
            Suggestion {
                action: "remove the file".to_string(),
                explanation: "delete the regular file occupying the expected directory path"
                    .to_string(),
                example: None,
            },
            Suggestion {
                action: "rename".to_string(),
                explanation: "move the conflicting file out of the way manually".to_string(),
                example: None,
            },
        ],
        ConflictKind::FileExpected => vec![
            Suggestion {
                action: "remove the directory".to_string(),
                explanation: "delete the directory occupying the expected file path".to_string(),
                example: None,
            },
            Suggestion {
                action: "adopt".to_string(),
                explanation: "fold the directory's contents into the package manually"
                    .to_string(),
                example: None,
            },
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fail,
    Skip,
    Backup,
    Overwrite,
}

/// Maps each conflict kind to a resolution policy. Defaults to `Fail` for
/// every kind, the safest behavior.
#[derive(Debug, Clone)]
pub struct ResolutionPolicies {
    per_kind: HashMap<ConflictKind, Policy>,
    pub backup_dir: PathBuf,
}

impl Default for ResolutionPolicies {
    fn default() -> Self {
        Self { per_kind: HashMap::new(), backup_dir: PathBuf::from("/tmp/dotman-backup") }
    }
}

impl ResolutionPolicies {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self { per_kind: HashMap::new(), backup_dir: backup_dir.into() }
    }

    pub fn set(&mut self, kind: ConflictKind, policy: Policy) {
        self.per_kind.insert(kind, policy);
    }

    pub fn get(&self, kind: ConflictKind) -> Policy {
        self.per_kind.get(&kind).copied().unwrap_or(Policy::Fail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub operations: Vec<Operation>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<Warning>,
}

/// Detects a pre-execution conflict for a single `LinkCreate` target, if
/// any, by comparing against the probed current state.
fn detect_link_conflict(target: &crate::path::TargetPath, source: &crate::path::FilePath, current: &CurrentState) -> Option<Conflict> {
    if let Some(existing_target) = current.links.get(target) {
        if existing_target == &source.string() {
            return None; // already points here: no-op, not a conflict
        }
        // Covers the ambiguous "symlink that resolves to a directory" case:
        // an existing symlink is always judged by its literal target string.
        return Some(Conflict::new(
            ConflictKind::WrongLink,
            target.as_path().to_path_buf(),
            format!("existing link points to {existing_target}, expected {source}"),
        ));
    }
    if current.files.contains_key(target) {
        return Some(Conflict::new(
            ConflictKind::FileExists,
            target.as_path().to_path_buf(),
            "a regular file already exists at this path".to_string(),
        ));
    }
    None
}

/// Outcome of checking one desired directory against the probed current
/// state: already present (nothing to do), absent (needs a `DirCreate`),
/// or blocked by something else occupying the path.
enum DirOutcome {
    Skip,
    Emit,
    Conflict(Conflict),
}

fn detect_dir_conflict(path: &crate::path::FilePath, current: &CurrentState) -> DirOutcome {
    let Ok(target) = crate::path::TargetPath::new(path.as_path()) else {
        return DirOutcome::Emit;
    };
    if current.dirs.contains(&target) {
        return DirOutcome::Skip;
    }
    if current.files.contains_key(&target) {
        return DirOutcome::Conflict(Conflict::new(
            ConflictKind::FileExpected,
            path.as_path().to_path_buf(),
            "a regular file occupies this directory's path".to_string(),
        ));
    }
    DirOutcome::Emit
}

fn backup_path(backup_dir: &std::path::Path, target: &crate::path::TargetPath, counter: &mut HashMap<String, u32>) -> PathBuf {
    let basename = target
        .as_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let stem = format!("{basename}.{timestamp}");
    let n = counter.entry(stem.clone()).or_insert(0);
    let path = if *n == 0 {
        backup_dir.join(&stem)
    } else {
        backup_dir.join(format!("{stem}.{n}"))
    };
    *n += 1;
    path
}

/// Detects conflicts for the whole desired state and applies resolution
/// policies, producing the final operation list plus unresolved conflicts
/// and informational warnings.
pub fn resolve(
    desired: &DesiredState,
    current: &CurrentState,
    policies: &ResolutionPolicies,
) -> ResolveResult {
    let mut result = ResolveResult::default();
    let mut id_counter = 0usize;
    let mut backup_counter: HashMap<String, u32> = HashMap::new();
    let mut next_id = |prefix: &str| {
        id_counter += 1;
        OperationId::new(format!("{prefix}-{id_counter}"))
    };

    let mut dir_targets: Vec<_> = desired.dirs.values().collect();
    dir_targets.sort_by(|a, b| a.path.as_path().cmp(b.path.as_path()));
    for dir_spec in dir_targets {
        match detect_dir_conflict(&dir_spec.path, current) {
            DirOutcome::Skip => {}
            DirOutcome::Emit => {
                result.operations.push(Operation::new(
                    next_id("dircreate"),
                    OperationKind::DirCreate { path: dir_spec.path.clone() },
                ));
            }
            DirOutcome::Conflict(conflict) => {
                apply_policy(conflict, &mut result, policies, &mut next_id, &mut backup_counter);
            }
        }
    }

    let mut link_targets: Vec<_> = desired.links.values().collect();
    link_targets.sort_by(|a, b| a.target.as_path().cmp(b.target.as_path()));
    for link_spec in link_targets {
        match detect_link_conflict(&link_spec.target, &link_spec.source, current) {
            None => {
                result.operations.push(Operation::new(
                    next_id("linkcreate"),
                    OperationKind::LinkCreate {
                        source: link_spec.source.clone(),
                        target: link_spec.target.clone(),
                    },
                ));
            }
            Some(conflict) => {
                apply_policy_for_link(conflict, link_spec, &mut result, policies, &mut next_id, &mut backup_counter);
            }
        }
    }

    result
}

fn apply_policy(
    conflict: Conflict,
    result: &mut ResolveResult,
    policies: &ResolutionPolicies,
    next_id: &mut impl FnMut(&str) -> OperationId,
    _backup_counter: &mut HashMap<String, u32>,
) {
    match policies.get(conflict.kind) {
        Policy::Fail => result.conflicts.push(conflict),
        Policy::Skip => {
            result.warnings.push(Warning {
                severity: Severity::Info,
                message: format!("skipped {}: {}", conflict.path.display(), conflict.details),
            });
        }
        Policy::Overwrite | Policy::Backup => {
            // Dir-level conflicts have no overwrite/backup analogue in this
            // core; treat as the conflict being unresolved.
            let _ = next_id;
            result.conflicts.push(conflict);
        }
    }
}

fn apply_policy_for_link(
    conflict: Conflict,
    link_spec: &crate::planner::desired_state::LinkSpec,
    result: &mut ResolveResult,
    policies: &ResolutionPolicies,
    next_id: &mut impl FnMut(&str) -> OperationId,
    backup_counter: &mut HashMap<String, u32>,
) {
    match policies.get(conflict.kind) {
        Policy::Fail => result.conflicts.push(conflict),
        Policy::Skip => {
            result.warnings.push(Warning {
                severity: Severity::Info,
                message: format!("skipped {}: {}", conflict.path.display(), conflict.details),
            });
        }
        Policy::Backup if conflict.kind == ConflictKind::FileExists => {
            let backup = backup_path(&policies.backup_dir, &link_spec.target, backup_counter);
            let backup_path = crate::path::FilePath::new(backup).expect("backup_dir must be absolute");
            let target_file: crate::path::FilePath = link_spec.target.clone().into();
            result.operations.push(Operation::new(
                next_id("filebackup"),
                OperationKind::FileBackup { source: target_file.clone(), backup: backup_path },
            ));
            result.operations.push(Operation::new(
                next_id("filedelete"),
                OperationKind::FileDelete { path: target_file },
            ));
            result.operations.push(Operation::new(
                next_id("linkcreate"),
                OperationKind::LinkCreate { source: link_spec.source.clone(), target: link_spec.target.clone() },
            ));
        }
        Policy::Overwrite => {
            let target_file: crate::path::FilePath = link_spec.target.clone().into();
            result.operations.push(Operation::new(
                next_id("filedelete"),
                OperationKind::FileDelete { path: target_file },
            ));
            result.operations.push(Operation::new(
                next_id("linkcreate"),
                OperationKind::LinkCreate { source: link_spec.source.clone(), target: link_spec.target.clone() },
            ));
        }
        Policy::Backup => {
            // Backup only applies to FileExists on LinkCreate; any other
            // kind reaching here (e.g. WrongLink) is left unresolved.
            result.conflicts.push(conflict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{FilePath, TargetPath};
    use crate::planner::desired_state::FileState;

    #[test]
    fn file_exists_with_backup_policy_emits_three_ops() {
        let mut desired = DesiredState::default();
        let target = TargetPath::new("/home/.vimrc").unwrap();
        let source = FilePath::new("/pkg/vim/dot-vimrc").unwrap();
        desired.links.insert(
            target.clone(),
            crate::planner::desired_state::LinkSpec { source, target: target.clone() },
        );
        let mut current = CurrentState::default();
        current.files.insert(target.clone(), FileState { size: 3, mode: 0o644 });

        let mut policies = ResolutionPolicies::new("/backup");
        policies.set(ConflictKind::FileExists, Policy::Backup);

        let result = resolve(&desired, &current, &policies);
        assert_eq!(result.operations.len(), 3);
        assert!(result.conflicts.is_empty());
        assert!(matches!(result.operations[0].kind(), OperationKind::FileBackup { .. }));
        assert!(matches!(result.operations[1].kind(), OperationKind::FileDelete { .. }));
        assert!(matches!(result.operations[2].kind(), OperationKind::LinkCreate { .. }));
    }

    #[test]
    fn default_policy_is_fail() {
        let mut desired = DesiredState::default();
        let target = TargetPath::new("/home/.vimrc").unwrap();
        let source = FilePath::new("/pkg/vim/dot-vimrc").unwrap();
        desired.links.insert(
            target.clone(),
            crate::planner::desired_state::LinkSpec { source, target: target.clone() },
        );
        let mut current = CurrentState::default();
        current.files.insert(target.clone(), FileState { size: 3, mode: 0o644 });

        let result = resolve(&desired, &current, &ResolutionPolicies::default());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::FileExists);
        assert!(result.conflicts[0].suggestions.len() >= 2);
    }

    #[test]
    fn existing_correct_link_is_a_noop() {
        let mut desired = DesiredState::default();
        let target = TargetPath::new("/home/.vimrc").unwrap();
        let source = FilePath::new("/pkg/vim/dot-vimrc").unwrap();
        desired.links.insert(
            target.clone(),
            crate::planner::desired_state::LinkSpec { source: source.clone(), target: target.clone() },
        );
        let mut current = CurrentState::default();
        current.links.insert(target, source.string());

        let result = resolve(&desired, &current, &ResolutionPolicies::default());
        assert!(result.operations.is_empty());
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn existing_directory_produces_no_dircreate_op() {
        let mut desired = DesiredState::default();
        let dir_path = FilePath::new("/home/.config").unwrap();
        desired.dirs.insert(dir_path.clone(), crate::planner::desired_state::DirSpec { path: dir_path.clone() });

        let mut current = CurrentState::default();
        current.dirs.insert(TargetPath::new(dir_path.as_path()).unwrap());

        let result = resolve(&desired, &current, &ResolutionPolicies::default());
        assert!(result.operations.is_empty());
        assert!(result.conflicts.is_empty());
    }
}
