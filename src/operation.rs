//! The closed set of filesystem mutations the planner can emit.
//!
//! Represented as a tagged enum rather than open polymorphism/dyn dispatch:
//! every case is known ahead of time, and a `match` in each of
//! `execute`/`rollback`/`validate` is exhaustive and easy to audit.

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::path::{FilePath, TargetPath};
use std::fmt;
use std::path::Path;

/// A stable identifier for one operation within a plan. IDs are assigned at
/// plan-construction time and must be unique within a `Plan`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum OperationKindTag {
    LinkCreate,
    LinkDelete,
    DirCreate,
    DirDelete,
    DirRemoveAll,
    DirCopy,
    FileMove,
    FileBackup,
    FileDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    LinkCreate { source: FilePath, target: TargetPath },
    LinkDelete { target: TargetPath },
    DirCreate { path: FilePath },
    DirDelete { path: FilePath },
    DirRemoveAll { path: FilePath },
    DirCopy { source: FilePath, dest: FilePath },
    FileMove { source: TargetPath, dest: FilePath },
    FileBackup { source: FilePath, backup: FilePath },
    FileDelete { path: FilePath },
}

/// One planned filesystem mutation, with the dependency edges (on other
/// operation IDs within the same plan) established by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    depends_on: Vec<OperationId>,
}

impl Operation {
    pub fn new(id: OperationId, kind: OperationKind) -> Self {
        Self { id, kind, depends_on: Vec::new() }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<OperationId>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn add_dependency(&mut self, id: OperationId) {
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn kind_tag(&self) -> OperationKindTag {
        match &self.kind {
            OperationKind::LinkCreate { .. } => OperationKindTag::LinkCreate,
            OperationKind::LinkDelete { .. } => OperationKindTag::LinkDelete,
            OperationKind::DirCreate { .. } => OperationKindTag::DirCreate,
            OperationKind::DirDelete { .. } => OperationKindTag::DirDelete,
            OperationKind::DirRemoveAll { .. } => OperationKindTag::DirRemoveAll,
            OperationKind::DirCopy { .. } => OperationKindTag::DirCopy,
            OperationKind::FileMove { .. } => OperationKindTag::FileMove,
            OperationKind::FileBackup { .. } => OperationKindTag::FileBackup,
            OperationKind::FileDelete { .. } => OperationKindTag::FileDelete,
        }
    }

    pub fn dependencies(&self) -> &[OperationId] {
        &self.depends_on
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.0.is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "operation id must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn equals(&self, other: &Operation) -> bool {
        self == other
    }

    pub fn string(&self) -> String {
        format!("{self}")
    }

    pub fn execute(&self, fs: &dyn Filesystem) -> Result<()> {
        match &self.kind {
            OperationKind::LinkCreate { source, target } => {
                fs.symlink(source.as_path(), target.as_path())
            }
            OperationKind::LinkDelete { target } => {
                if fs.exists(target.as_path()) {
                    fs.remove(target.as_path())
                } else {
                    Ok(())
                }
            }
            OperationKind::DirCreate { path } => fs.mkdir(path.as_path(), 0o755),
            OperationKind::DirDelete { path } => fs.remove(path.as_path()),
            OperationKind::DirRemoveAll { path } => fs.remove_all(path.as_path()),
            OperationKind::DirCopy { source, dest } => copy_recursive(fs, source.as_path(), dest.as_path()),
            OperationKind::FileMove { source, dest } => fs.rename(source.as_path(), dest.as_path()),
            OperationKind::FileBackup { source, backup } => {
                let bytes = fs.read_file(source.as_path())?;
                let mode = fs.stat(source.as_path())?.mode;
                fs.write_file(backup.as_path(), &bytes, mode)
            }
            OperationKind::FileDelete { path } => fs.remove(path.as_path()),
        }
    }

    pub fn rollback(&self, fs: &dyn Filesystem) -> Result<()> {
        match &self.kind {
            OperationKind::LinkCreate { target, .. } => {
                if fs.exists(target.as_path()) {
                    fs.remove(target.as_path())
                } else {
                    Ok(())
                }
            }
            OperationKind::LinkDelete { .. } => Ok(()),
            OperationKind::DirCreate { path } => {
                if fs.exists(path.as_path()) {
                    fs.remove(path.as_path())
                } else {
                    Ok(())
                }
            }
            OperationKind::DirDelete { path } => fs.mkdir(path.as_path(), 0o755),
            OperationKind::DirRemoveAll { .. } => Ok(()),
            OperationKind::DirCopy { dest, .. } => {
                if fs.exists(dest.as_path()) {
                    fs.remove_all(dest.as_path())
                } else {
                    Ok(())
                }
            }
            OperationKind::FileMove { source, dest } => fs.rename(dest.as_path(), source.as_path()),
            OperationKind::FileBackup { backup, .. } => {
                if fs.exists(backup.as_path()) {
                    fs.remove(backup.as_path())
                } else {
                    Ok(())
                }
            }
            OperationKind::FileDelete { .. } => Ok(()),
        }
    }
}

fn copy_recursive(fs: &dyn Filesystem, source: &Path, dest: &Path) -> Result<()> {
    let meta = fs.lstat(source)?;
    match meta.kind {
        crate::fs::FileKind::Dir => {
            fs.mkdir_all(dest, meta.mode)?;
            for entry in fs.read_dir(source)? {
                copy_recursive(fs, &source.join(&entry.name), &dest.join(&entry.name))?;
            }
            Ok(())
        }
        crate::fs::FileKind::Symlink => {
            let target = fs.read_link(source)?;
            fs.symlink(Path::new(&target), dest)
        }
        crate::fs::FileKind::File => {
            let bytes = fs.read_file(source)?;
            fs.write_file(dest, &bytes, meta.mode)
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::LinkCreate { source, target } => {
                write!(f, "LinkCreate({target} -> {source})")
            }
            OperationKind::LinkDelete { target } => write!(f, "LinkDelete({target})"),
            OperationKind::DirCreate { path } => write!(f, "DirCreate({path})"),
            OperationKind::DirDelete { path } => write!(f, "DirDelete({path})"),
            OperationKind::DirRemoveAll { path } => write!(f, "DirRemoveAll({path})"),
            OperationKind::DirCopy { source, dest } => write!(f, "DirCopy({source} -> {dest})"),
            OperationKind::FileMove { source, dest } => write!(f, "FileMove({source} -> {dest})"),
            OperationKind::FileBackup { source, backup } => {
                write!(f, "FileBackup({source} -> {backup})")
            }
            OperationKind::FileDelete { path } => write!(f, "FileDelete({path})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFilesystem;

    #[test]
    fn validate_rejects_empty_id() {
        let op = Operation::new(
            OperationId::new(""),
            OperationKind::FileDelete { path: FilePath::new("/a").unwrap() },
        );
        assert!(op.validate().is_err());
    }

    #[test]
    fn link_create_then_rollback_leaves_no_trace() {
        let fs = InMemoryFilesystem::with_root("/");
        fs.write_file(std::path::Path::new("/src"), b"x", 0o644).unwrap();
        let op = Operation::new(
            OperationId::new("1"),
            OperationKind::LinkCreate {
                source: FilePath::new("/src").unwrap(),
                target: TargetPath::new("/home/.x").unwrap(),
            },
        );
        op.execute(&fs).unwrap();
        assert!(fs.exists(std::path::Path::new("/home/.x")));
        op.rollback(&fs).unwrap();
        assert!(!fs.exists(std::path::Path::new("/home/.x")));
    }

    #[test]
    fn file_backup_preserves_source_and_mode() {
        let fs = InMemoryFilesystem::with_root("/");
        fs.write_file(std::path::Path::new("/home/.vimrc"), b"old", 0o600)
            .unwrap();
        let op = Operation::new(
            OperationId::new("1"),
            OperationKind::FileBackup {
                source: FilePath::new("/home/.vimrc").unwrap(),
                backup: FilePath::new("/backup/.vimrc.20260101-000000").unwrap(),
            },
        );
        op.execute(&fs).unwrap();
        assert_eq!(
            fs.read_file(std::path::Path::new("/backup/.vimrc.20260101-000000")).unwrap(),
            b"old"
        );
        assert_eq!(fs.read_file(std::path::Path::new("/home/.vimrc")).unwrap(), b"old");
        assert_eq!(fs.stat(std::path::Path::new("/backup/.vimrc.20260101-000000")).unwrap().mode, 0o600);
    }
}
