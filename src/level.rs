//! Level progression policy.
//!
//! A participant's level is derived from their lifetime completed-task
//! count and is recomputed inside the settlement transaction from the
//! freshly incremented count, never from a cached value.

/// Completed tasks required per level step.
pub const TASKS_PER_LEVEL: i32 = 5;

/// One level per five completions, starting at level 1.
/// Integer division truncates, which equals floor for the non-negative
/// counts the schema allows.
pub fn level_for(completed_tasks: i32) -> i32 {
    completed_tasks / TASKS_PER_LEVEL + 1
}
