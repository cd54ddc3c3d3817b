//! Typed, absolute, lexically-cleaned path values.
//!
//! Three distinguishable kinds share one invariant (absolute + cleaned) but
//! are never interchangeable at the type level: [`PackagePath`] roots a
//! package in the source repository, [`TargetPath`] is a location under the
//! user's target directory, and [`FilePath`] is a generic absolute path used
//! as an operation argument. Construction fails for empty or relative input.
//!
//! Rust's own `Result<T, Error>` already satisfies the monadic `Result`
//! component.A calls for (`map`, `and_then`, `unwrap_or`, and
//! `collect::<Result<Vec<_>, _>>()`), so no parallel sum type is introduced
//! here — see DESIGN.md.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), None | Some(Component::RootDir)) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn construct(kind: &'static str, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidPath {
            path: String::new(),
            reason: format!("{kind} path must not be empty"),
        });
    }
    if !path.is_absolute() {
        return Err(Error::InvalidPath {
            path: path.display().to_string(),
            reason: format!("{kind} path must be absolute"),
        });
    }
    Ok(clean(path))
}

macro_rules! typed_path {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(PathBuf);

        impl $name {
            pub fn new(path: impl AsRef<Path>) -> Result<Self> {
                Ok(Self(construct($kind, path)?))
            }

            pub fn as_path(&self) -> &Path {
                &self.0
            }

            pub fn join(&self, segment: impl AsRef<Path>) -> Result<Self> {
                Self::new(self.0.join(segment))
            }

            pub fn parent(&self) -> Option<Self> {
                self.0.parent().map(|p| Self(p.to_path_buf()))
            }

            pub fn equals(&self, other: &Self) -> bool {
                self == other
            }

            pub fn string(&self) -> String {
                self.0.display().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.display())
            }
        }

        impl AsRef<Path> for $name {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }
    };
}

typed_path!(PackagePath, "package");
typed_path!(TargetPath, "target");
typed_path!(FilePath, "file");

impl From<TargetPath> for FilePath {
    fn from(value: TargetPath) -> Self {
        FilePath(value.0)
    }
}

impl From<PackagePath> for FilePath {
    fn from(value: PackagePath) -> Self {
        FilePath(value.0)
    }
}

/// Sanitize a relative path coming from package-scan data (untrusted in the
/// sense that it may contain `..`) and join it under `root`, refusing to
/// let the result escape `root`.
pub fn safe_join(root: &Path, relative: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath {
                    path: relative.display().to_string(),
                    reason: "path traversal (..) is not allowed".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(root.join(normalized))
}
