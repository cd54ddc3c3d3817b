// tests/scenarios.rs

//! End-to-end scenarios against an in-memory filesystem, covering the
//! client façade's public contract: install, conflict resolution, cyclic
//! rejection, adopt, remanage, and failure rollback.

use dotman::fs::{Filesystem, InMemoryFilesystem};
use dotman::manifest::{self, SourceKind};
use dotman::planner::conflict::{ConflictKind, Policy};
use dotman::{Client, ClientConfig, Error};
use std::path::Path;
use std::sync::Arc;

fn client(package_dir: &str, target_dir: &str, fs: Arc<InMemoryFilesystem>) -> Client {
    Client::new(ClientConfig::new(package_dir, target_dir, fs))
}

#[test]
fn happy_path_install() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg/vim"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/vim/dot-vimrc"), b"set nu", 0o644).unwrap();
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();

    let c = client("/pkg", "/home", fs.clone());
    c.manage(&["vim"]).unwrap();

    assert!(fs.is_symlink(Path::new("/home/.vimrc")).unwrap());
    assert_eq!(fs.read_link(Path::new("/home/.vimrc")).unwrap(), "/pkg/vim/dot-vimrc");

    let manifest = manifest::load(fs.as_ref(), Path::new("/home")).unwrap();
    let record = &manifest.packages["vim"];
    assert_eq!(record.links, vec![".vimrc".to_string()]);
    assert_eq!(record.source_kind, SourceKind::Managed);
}

#[test]
fn second_package_sharing_an_existing_parent_directory_does_not_fail() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg/alacritty/dot-config"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/alacritty/dot-config/alacritty.toml"), b"a", 0o644).unwrap();
    fs.mkdir_all(Path::new("/pkg/nvim/dot-config/nvim"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/nvim/dot-config/nvim/init.lua"), b"b", 0o644).unwrap();
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();

    let c = client("/pkg", "/home", fs.clone());
    c.manage(&["alacritty"]).unwrap();
    // Both packages share the already-created /home/.config parent; this
    // used to fail because a pre-existing directory still produced a
    // DirCreate op, and `mkdir` on an existing path errors.
    c.manage(&["nvim"]).unwrap();

    assert!(fs.is_symlink(Path::new("/home/.config/alacritty.toml")).unwrap());
    assert!(fs.is_symlink(Path::new("/home/.config/nvim/init.lua")).unwrap());
}

#[test]
fn conflict_with_backup_policy() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg/vim"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/vim/dot-vimrc"), b"new", 0o644).unwrap();
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
    fs.write_file(Path::new("/home/.vimrc"), b"old", 0o644).unwrap();
    fs.mkdir_all(Path::new("/backup"), 0o755).unwrap();

    let mut config = ClientConfig::new("/pkg", "/home", fs.clone());
    config.policies = {
        let mut p = dotman::planner::conflict::ResolutionPolicies::new("/backup");
        p.set(ConflictKind::FileExists, Policy::Backup);
        p
    };
    let c = Client::new(config);

    let plan = c.plan_manage(&["vim"]).unwrap();
    assert_eq!(plan.operations.len(), 3);

    c.manage(&["vim"]).unwrap();

    assert!(fs.is_symlink(Path::new("/home/.vimrc")).unwrap());
    assert_eq!(fs.read_link(Path::new("/home/.vimrc")).unwrap(), "/pkg/vim/dot-vimrc");

    let backup_entries: Vec<_> = fs.read_dir(Path::new("/backup")).unwrap();
    assert_eq!(backup_entries.len(), 1);
    let backup_path = Path::new("/backup").join(&backup_entries[0].name);
    assert_eq!(fs.read_file(&backup_path).unwrap(), b"old");
}

#[test]
fn cyclic_dependency_rejection() {
    use dotman::operation::{Operation, OperationId, OperationKind};
    use dotman::path::FilePath;
    use dotman::planner::graph::{build_graph, topological_sort};

    let a = Operation::new(OperationId::new("A"), OperationKind::DirCreate { path: FilePath::new("/a").unwrap() })
        .with_dependencies(vec![OperationId::new("B")]);
    let b = Operation::new(OperationId::new("B"), OperationKind::DirCreate { path: FilePath::new("/b").unwrap() })
        .with_dependencies(vec![OperationId::new("A")]);
    let ops = vec![a, b];

    let graph = build_graph(&ops);
    let err = topological_sort(&graph, &ops).unwrap_err();
    match err {
        Error::CyclicDependency { cycle } => {
            assert!(cycle.contains(&"A".to_string()));
            assert!(cycle.contains(&"B".to_string()));
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn adopt_moves_file_into_package_and_links_it_back() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
    fs.write_file(Path::new("/home/.gitconfig"), b"x", 0o644).unwrap();
    fs.mkdir_all(Path::new("/pkg/git"), 0o755).unwrap();

    let c = client("/pkg", "/home", fs.clone());
    c.adopt(Some("git"), &["/home/.gitconfig"]).unwrap();

    assert_eq!(fs.read_file(Path::new("/pkg/git/dot-gitconfig")).unwrap(), b"x");
    assert!(fs.is_symlink(Path::new("/home/.gitconfig")).unwrap());
    assert_eq!(fs.read_link(Path::new("/home/.gitconfig")).unwrap(), "/pkg/git/dot-gitconfig");

    let manifest = manifest::load(fs.as_ref(), Path::new("/home")).unwrap();
    assert_eq!(manifest.packages["git"].source_kind, SourceKind::Adopted);
}

#[test]
fn remanage_after_source_change_refreshes_hash_but_keeps_link() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg/vim"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/vim/dot-vimrc"), b"set nu", 0o644).unwrap();
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();

    let c = client("/pkg", "/home", fs.clone());
    c.manage(&["vim"]).unwrap();
    let before = manifest::load(fs.as_ref(), Path::new("/home")).unwrap();
    let hash_before = before.packages["vim"].content_hash.clone();

    fs.write_file(Path::new("/pkg/vim/dot-vimrc"), b"new", 0o644).unwrap();
    c.remanage(&["vim"]).unwrap();

    assert_eq!(fs.read_link(Path::new("/home/.vimrc")).unwrap(), "/pkg/vim/dot-vimrc");
    assert_eq!(fs.read_file(Path::new("/pkg/vim/dot-vimrc")).unwrap(), b"new");

    let after = manifest::load(fs.as_ref(), Path::new("/home")).unwrap();
    assert_ne!(after.packages["vim"].content_hash, hash_before);
}

#[test]
fn rollback_on_failure_leaves_no_partial_state() {
    use dotman::executor::Executor;
    use dotman::operation::{Operation, OperationId, OperationKind};
    use dotman::path::{FilePath, TargetPath};
    use dotman::pipeline::CancellationToken;
    use dotman::plan::Plan;

    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/x"), b"x", 0o644).unwrap();
    fs.mkdir_all(Path::new("/a"), 0o755).unwrap();

    let ops = vec![
        Operation::new(OperationId::new("D1"), OperationKind::DirCreate { path: FilePath::new("/a").unwrap() }),
        Operation::new(
            OperationId::new("L1"),
            OperationKind::LinkCreate { source: FilePath::new("/pkg/x").unwrap(), target: TargetPath::new("/a/x").unwrap() },
        ),
        Operation::new(OperationId::new("D2"), OperationKind::DirCreate { path: FilePath::new("/b/c").unwrap() }),
    ];
    let plan = Plan { operations: ops, ..Default::default() };

    let executor = Executor::new(fs.clone());
    let token = CancellationToken::new();
    let err = executor.execute(&plan, &token).unwrap_err();

    assert!(matches!(err, Error::ParentNotFound { .. }));
    assert!(!fs.exists(Path::new("/a/x")));
    assert!(!fs.exists(Path::new("/b")));
}

#[test]
fn parallel_batch_one_failure_rolls_back_the_other() {
    use dotman::executor::Executor;
    use dotman::operation::{Operation, OperationId, OperationKind};
    use dotman::path::{FilePath, TargetPath};
    use dotman::pipeline::CancellationToken;
    use dotman::plan::Plan;

    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/pkg"), 0o755).unwrap();
    fs.write_file(Path::new("/pkg/a"), b"a", 0o644).unwrap();
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
    // Occupied by a regular file ahead of time: `prepare` only checks a
    // DirCreate's *parent*, so this passes prepare but fails at execute
    // time when `mkdir` hits an already-existing path.
    fs.write_file(Path::new("/home/occupied"), b"x", 0o644).unwrap();

    let link_op = Operation::new(
        OperationId::new("LA"),
        OperationKind::LinkCreate { source: FilePath::new("/pkg/a").unwrap(), target: TargetPath::new("/home/.a").unwrap() },
    );
    let dir_op = Operation::new(
        OperationId::new("DB"),
        OperationKind::DirCreate { path: FilePath::new("/home/occupied").unwrap() },
    );

    let plan = Plan {
        operations: vec![link_op.clone(), dir_op.clone()],
        batches: Some(vec![vec![link_op, dir_op]]),
        ..Default::default()
    };

    let executor = Executor::new(fs.clone());
    let token = CancellationToken::new();
    let err = executor.execute(&plan, &token).unwrap_err();

    match err {
        Error::ExecutionFailed { failed, rolled_back, .. } => {
            assert_eq!(failed, vec![OperationId::new("DB")]);
            assert_eq!(rolled_back, vec![OperationId::new("LA")]);
        }
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    assert!(!fs.exists(Path::new("/home/.a")));
}

#[test]
fn empty_package_list_yields_empty_plan_error() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
    let c = client("/pkg", "/home", fs);
    let err = c.manage(&[]).unwrap_err();
    assert!(matches!(err, Error::EmptyPlan));
}

#[test]
fn missing_package_directory_errors() {
    let fs = Arc::new(InMemoryFilesystem::with_root("/"));
    fs.mkdir_all(Path::new("/home"), 0o755).unwrap();
    let c = client("/pkg", "/home", fs);
    let err = c.manage(&["ghost"]).unwrap_err();
    assert!(matches!(err, Error::PackageNotFound { .. }));
}
