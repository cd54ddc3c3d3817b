//! Dependency graph construction, topological sort, and level-based
//! parallel batching over a plan's operations.

use crate::error::{Error, Result};
use crate::operation::{Operation, OperationId, OperationKind};
use std::collections::{HashMap, VecDeque};

/// Nodes are operation IDs; an edge `a -> b` in `depends_on` means "a
/// depends on b" (b must run first).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub ids: Vec<OperationId>,
    pub depends_on: HashMap<OperationId, Vec<OperationId>>,
}

impl DependencyGraph {
    fn dependents_of(&self, id: &OperationId) -> Vec<OperationId> {
        self.depends_on
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(op, _)| op.clone())
            .collect()
    }
}

fn path_of(op: &Operation) -> Option<&std::path::Path> {
    match op.kind() {
        OperationKind::DirCreate { path } => Some(path.as_path()),
        _ => None,
    }
}

fn target_of(op: &Operation) -> Option<&std::path::Path> {
    match op.kind() {
        OperationKind::LinkCreate { target, .. } => Some(target.as_path()),
        _ => None,
    }
}

/// Builds the dependency graph: explicit edges declared on each operation,
/// plus implicit parent-before-child edges between `DirCreate` operations,
/// plus `LinkCreate -> DirCreate` edges for a link's immediate parent
/// directory.
pub fn build_graph(operations: &[Operation]) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    graph.ids = operations.iter().map(|o| o.id().clone()).collect();

    let dir_ops_by_path: HashMap<&std::path::Path, &OperationId> = operations
        .iter()
        .filter_map(|op| path_of(op).map(|p| (p, op.id())))
        .collect();

    for op in operations {
        let mut deps: Vec<OperationId> = op.dependencies().to_vec();

        if let Some(path) = path_of(op) {
            if let Some(parent) = path.parent() {
                if let Some(&parent_op) = dir_ops_by_path.get(parent) {
                    if parent_op != op.id() && !deps.contains(parent_op) {
                        deps.push(parent_op.clone());
                    }
                }
            }
        }

        if let Some(target) = target_of(op) {
            if let Some(parent) = target.parent() {
                if let Some(&parent_op) = dir_ops_by_path.get(parent) {
                    if !deps.contains(parent_op) {
                        deps.push(parent_op.clone());
                    }
                }
            }
        }

        graph.depends_on.insert(op.id().clone(), deps);
    }

    graph
}

/// Kahn-style topological sort. Fails with `CyclicDependency` naming the
/// cycle's participants when the graph is not a DAG.
pub fn topological_sort(graph: &DependencyGraph, operations: &[Operation]) -> Result<Vec<Operation>> {
    let by_id: HashMap<&OperationId, &Operation> =
        operations.iter().map(|o| (o.id(), o)).collect();

    let mut in_degree: HashMap<OperationId, usize> = HashMap::new();
    for id in &graph.ids {
        let count = graph.depends_on.get(id).map(|d| d.len()).unwrap_or(0);
        in_degree.insert(id.clone(), count);
    }

    // Deterministic order among ready nodes: plan order.
    let position: HashMap<&OperationId, usize> =
        graph.ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let mut ready: Vec<OperationId> = in_degree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(id, _)| id.clone())
        .collect();
    ready.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
    let mut queue: VecDeque<OperationId> = ready.into();

    let mut sorted = Vec::with_capacity(graph.ids.len());
    let mut remaining = in_degree.clone();

    while let Some(id) = queue.pop_front() {
        sorted.push(id.clone());
        for dependent in graph.dependents_of(&id) {
            if let Some(count) = remaining.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    let pos = position.get(&dependent).copied().unwrap_or(usize::MAX);
                    let idx = queue
                        .iter()
                        .position(|q| position.get(q).copied().unwrap_or(usize::MAX) > pos)
                        .unwrap_or(queue.len());
                    queue.insert(idx, dependent);
                }
            }
        }
    }

    if sorted.len() != graph.ids.len() {
        let cycle = find_cycle(graph);
        return Err(Error::CyclicDependency { cycle });
    }

    Ok(sorted
        .into_iter()
        .map(|id| (*by_id.get(&id).expect("sorted id must exist in operations")).clone())
        .collect())
}

/// DFS-based cycle extraction used only for error reporting once Kahn's
/// algorithm has detected that a cycle exists.
fn find_cycle(graph: &DependencyGraph) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: HashMap<OperationId, Mark> =
        graph.ids.iter().map(|id| (id.clone(), Mark::Unvisited)).collect();
    let mut stack = Vec::new();

    fn visit(
        id: &OperationId,
        graph: &DependencyGraph,
        marks: &mut HashMap<OperationId, Mark>,
        stack: &mut Vec<OperationId>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|s| s == id).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.0.clone()).collect();
                cycle.push(id.0.clone());
                return Some(cycle);
            }
            _ => {}
        }
        marks.insert(id.clone(), Mark::InProgress);
        stack.push(id.clone());
        if let Some(deps) = graph.depends_on.get(id) {
            for dep in deps {
                if let Some(cycle) = visit(dep, graph, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(id.clone(), Mark::Done);
        None
    }

    for id in &graph.ids {
        if let Some(cycle) = visit(id, graph, &mut marks, &mut stack) {
            return cycle;
        }
    }
    Vec::new()
}

/// Level-based parallel batching: `level(op) = 0` with no dependencies,
/// else `1 + max(level(dep))`. Operations at the same level are returned
/// as one batch; batches must run in order, operations within a batch may
/// run concurrently.
pub fn schedule_batches(graph: &DependencyGraph, sorted: &[Operation]) -> Vec<Vec<Operation>> {
    let mut levels: HashMap<OperationId, usize> = HashMap::new();
    for op in sorted {
        let deps = graph.depends_on.get(op.id()).cloned().unwrap_or_default();
        let level = deps
            .iter()
            .map(|d| levels.get(d).copied().unwrap_or(0))
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        levels.insert(op.id().clone(), level);
    }

    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut batches: Vec<Vec<Operation>> = vec![Vec::new(); max_level + 1];
    for op in sorted {
        let level = levels[op.id()];
        batches[level].push(op.clone());
    }
    batches.retain(|b| !b.is_empty());
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FilePath;

    fn dircreate(id: &str, path: &str) -> Operation {
        Operation::new(OperationId::new(id), OperationKind::DirCreate { path: FilePath::new(path).unwrap() })
    }

    #[test]
    fn sorts_parent_before_child_directories() {
        let ops = vec![dircreate("child", "/a/b"), dircreate("parent", "/a")];
        let graph = build_graph(&ops);
        let sorted = topological_sort(&graph, &ops).unwrap();
        let parent_idx = sorted.iter().position(|o| o.id().0 == "parent").unwrap();
        let child_idx = sorted.iter().position(|o| o.id().0 == "child").unwrap();
        assert!(parent_idx < child_idx);
    }

    #[test]
    fn explicit_cycle_is_rejected() {
        let a = Operation::new(OperationId::new("A"), OperationKind::DirCreate { path: FilePath::new("/a").unwrap() })
            .with_dependencies(vec![OperationId::new("B")]);
        let b = Operation::new(OperationId::new("B"), OperationKind::DirCreate { path: FilePath::new("/b").unwrap() })
            .with_dependencies(vec![OperationId::new("A")]);
        let ops = vec![a, b];
        let graph = build_graph(&ops);
        let err = topological_sort(&graph, &ops).unwrap_err();
        match err {
            Error::CyclicDependency { cycle } => assert!(cycle.len() >= 2),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn batches_respect_levels() {
        let ops = vec![dircreate("parent", "/a"), dircreate("child", "/a/b")];
        let graph = build_graph(&ops);
        let sorted = topological_sort(&graph, &ops).unwrap();
        let batches = schedule_batches(&graph, &sorted);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].id().0, "parent");
        assert_eq!(batches[1][0].id().0, "child");
    }
}
