//! Walks a package directory into a [`Node`] tree, applying ignores and
//! dotfile name translation.

use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::ignore::{IgnoreSet, LargeFilePrompter, SizeDecision};
use crate::path::PackagePath;
use tracing::{debug, warn};

pub const DOTIGNORE_FILENAME: &str = ".dotignore";

/// Operational suffixes that make `dot-<suffix>` collide with core filenames
/// once translated, and are therefore reserved.
const RESERVED_SUFFIXES: &[&str] = &["ignore", "manifest", "lock"];

/// A filesystem entry discovered by scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File { name: String },
    Dir { name: String, children: Vec<Node> },
    Symlink { name: String, raw_target: String },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File { name } | Node::Dir { name, .. } | Node::Symlink { name, .. } => name,
        }
    }
}

/// The scanned result for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub path: PackagePath,
    pub tree: Node,
}

/// Non-fatal counters gathered while scanning, surfaced as operator
/// feedback rather than as a hard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    pub ignored_count: usize,
}

/// Is `name` reserved and therefore unusable as a package name?
pub fn is_reserved_package_name(name: &str) -> bool {
    if name == "dot" || name == "." || name == ".." {
        return true;
    }
    match name.strip_prefix("dot-") {
        Some(suffix) => RESERVED_SUFFIXES.contains(&suffix),
        None => false,
    }
}

/// `dot-vimrc` -> `.vimrc`, applied to a single path segment.
pub fn translate_dotfile_name(segment: &str) -> String {
    match segment.strip_prefix("dot-") {
        Some(rest) => format!(".{rest}"),
        None => segment.to_string(),
    }
}

/// Inverse of [`translate_dotfile_name`]: `.vimrc` -> `dot-vimrc`.
pub fn untranslate_dotfile_name(segment: &str) -> String {
    match segment.strip_prefix('.') {
        Some(rest) if !rest.is_empty() => format!("dot-{rest}"),
        _ => segment.to_string(),
    }
}

/// Configuration governing one scan pass.
pub struct ScanOptions<'a> {
    pub ignore: &'a IgnoreSet,
    pub max_file_size: u64,
    pub prompter: &'a dyn LargeFilePrompter,
}

pub fn scan_package(
    fs: &dyn Filesystem,
    name: &str,
    path: PackagePath,
) -> Result<(Package, ScanStats)> {
    scan_package_with(fs, name, path, &ScanOptions {
        ignore: &IgnoreSet::new(),
        max_file_size: 0,
        prompter: &crate::ignore::BatchPrompter,
    })
}

pub fn scan_package_with(
    fs: &dyn Filesystem,
    name: &str,
    path: PackagePath,
    opts: &ScanOptions<'_>,
) -> Result<(Package, ScanStats)> {
    if !fs.exists(path.as_path()) {
        return Err(Error::PackageNotFound {
            name: name.to_string(),
        });
    }

    let mut ignore = opts.ignore.clone();
    let dotignore_path = path.join(DOTIGNORE_FILENAME)?;
    if fs.exists(dotignore_path.as_path()) {
        let contents = fs.read_file(dotignore_path.as_path())?;
        let contents = String::from_utf8_lossy(&contents);
        ignore.load_dotignore(dotignore_path.as_path(), &contents)?;
    }

    let mut stats = ScanStats::default();
    let root = walk_dir(fs, path.as_path(), "", &ignore, opts, &mut stats)?;
    let root = prune_empty_dirs(root);

    debug!(package = name, ignored = stats.ignored_count, "scanned package");
    Ok((
        Package {
            name: name.to_string(),
            path,
            tree: root,
        },
        stats,
    ))
}

fn walk_dir(
    fs: &dyn Filesystem,
    dir: &std::path::Path,
    relative_prefix: &str,
    ignore: &IgnoreSet,
    opts: &ScanOptions<'_>,
    stats: &mut ScanStats,
) -> Result<Node> {
    let mut children = Vec::new();
    let entries = fs.read_dir(dir)?;
    for entry in entries {
        if entry.name == DOTIGNORE_FILENAME || entry.name == crate::manifest::MANIFEST_FILENAME {
            continue;
        }
        let relative = if relative_prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{relative_prefix}/{}", entry.name)
        };
        if ignore.should_ignore(&relative) {
            stats.ignored_count += 1;
            continue;
        }
        let child_path = dir.join(&entry.name);
        let node = match entry.kind {
            crate::fs::FileKind::Dir => {
                walk_dir(fs, &child_path, &relative, ignore, opts, stats)?
            }
            crate::fs::FileKind::Symlink => Node::Symlink {
                name: entry.name.clone(),
                raw_target: fs.read_link(&child_path)?,
            },
            crate::fs::FileKind::File => {
                let meta = fs.lstat(&child_path)?;
                if opts.max_file_size != 0 && meta.size > opts.max_file_size {
                    match opts.prompter.prompt(&child_path, meta.size) {
                        SizeDecision::Skip => {
                            stats.ignored_count += 1;
                            continue;
                        }
                        SizeDecision::Include => {}
                    }
                }
                Node::File {
                    name: entry.name.clone(),
                }
            }
        };
        children.push(node);
    }
    children.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(Node::Dir {
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        children,
    })
}

/// Bottom-up: drop directories left with no children once their own
/// subtrees have been pruned. The root directory is always kept.
fn prune_empty_dirs(node: Node) -> Node {
    match node {
        Node::Dir { name, children } => {
            let pruned: Vec<Node> = children
                .into_iter()
                .filter_map(|child| match child {
                    Node::Dir { name, children } => {
                        let inner = prune_empty_dirs(Node::Dir { name, children });
                        match &inner {
                            Node::Dir { children, .. } if children.is_empty() => {
                                warn!("pruned empty directory after ignore filtering");
                                None
                            }
                            _ => Some(inner),
                        }
                    }
                    other => Some(other),
                })
                .collect();
            Node::Dir { name, children: pruned }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFilesystem;
    use std::path::Path;

    fn setup() -> InMemoryFilesystem {
        let fs = InMemoryFilesystem::with_root("/");
        fs.mkdir_all(Path::new("/pkg/vim"), 0o755).unwrap();
        fs.write_file(Path::new("/pkg/vim/dot-vimrc"), b"set nu", 0o644)
            .unwrap();
        fs
    }

    #[test]
    fn scans_flat_package() {
        let fs = setup();
        let (pkg, _) = scan_package(&fs, "vim", PackagePath::new("/pkg/vim").unwrap()).unwrap();
        match pkg.tree {
            Node::Dir { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name(), "dot-vimrc");
            }
            _ => panic!("expected dir"),
        }
    }

    #[test]
    fn missing_package_errors() {
        let fs = InMemoryFilesystem::with_root("/");
        let err = scan_package(&fs, "ghost", PackagePath::new("/pkg/ghost").unwrap()).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }

    #[test]
    fn dotfile_translation_round_trips() {
        let translated = translate_dotfile_name("dot-vimrc");
        assert_eq!(translated, ".vimrc");
        assert_eq!(untranslate_dotfile_name(&translated), "dot-vimrc");
    }

    #[test]
    fn reserved_names_rejected() {
        assert!(is_reserved_package_name("dot"));
        assert!(is_reserved_package_name("dot-manifest"));
        assert!(!is_reserved_package_name("dot-gnupg"));
    }

    #[test]
    fn empty_directories_are_pruned_after_ignore() {
        let fs = setup();
        fs.mkdir_all(Path::new("/pkg/vim/.git"), 0o755).unwrap();
        fs.write_file(Path::new("/pkg/vim/.git/HEAD"), b"ref", 0o644)
            .unwrap();
        let ignore = IgnoreSet::with_defaults().unwrap();
        let opts = ScanOptions {
            ignore: &ignore,
            max_file_size: 0,
            prompter: &crate::ignore::BatchPrompter,
        };
        let (pkg, stats) = scan_package_with(
            &fs,
            "vim",
            PackagePath::new("/pkg/vim").unwrap(),
            &opts,
        )
        .unwrap();
        assert!(stats.ignored_count >= 1);
        match pkg.tree {
            Node::Dir { children, .. } => {
                assert!(children.iter().all(|c| c.name() != ".git"));
            }
            _ => panic!("expected dir"),
        }
    }
}
