pub mod conflict;
pub mod desired_state;
pub mod graph;

pub use conflict::{Conflict, ConflictKind, Policy, ResolutionPolicies, ResolveResult, Suggestion};
pub use desired_state::{compute_desired_state, CurrentState, DesiredState, DirSpec, LinkSpec};
pub use graph::{build_graph, schedule_batches, topological_sort, DependencyGraph};
