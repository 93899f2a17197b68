//! Deterministic topological scheduling of update blocks.
//!
//! Kahn's algorithm with a min-heap of ready blocks: whenever several blocks
//! are ready, the one declared first runs first. The result depends only on
//! the block count and the edge set, so an unchanged design always yields
//! the same schedule.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::error::ScheduleError;
use crate::registry::Dependency;
use crate::types::BlockId;

/// Orders `block_count` blocks so that every dependency's `before` precedes its `after`.
///
/// On failure the error names one concrete cycle using `names`.
pub fn compute_schedule(
    block_count: usize,
    dependencies: &[Dependency],
    names: &[String],
) -> Result<Vec<BlockId>, ScheduleError> {
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); block_count];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); block_count];
    for dep in dependencies {
        let (from, to) = (dep.before.index(), dep.after.index());
        if !succs[from].contains(&to) {
            succs[from].push(to);
            preds[to].push(from);
        }
    }

    let mut in_degree: Vec<usize> = preds.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(block_count);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(BlockId(node));
        for &next in &succs[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != block_count {
        let cycle = find_cycle(&in_degree, &preds);
        let cycle: Vec<String> = cycle.into_iter().map(|b| names[b].clone()).collect();
        debug!(blocks = cycle.len(), "dependency cycle detected");
        return Err(ScheduleError::Cycle { cycle });
    }

    Ok(order)
}

/// Finds a cycle among the blocks Kahn's algorithm could not release.
///
/// Every unreleased block still has an unreleased predecessor, so walking
/// predecessors from any of them must revisit a block. The walk starts at
/// the lowest unreleased index and always picks the lowest predecessor.
fn find_cycle(in_degree: &[usize], preds: &[Vec<usize>]) -> Vec<usize> {
    let stuck = |n: usize| in_degree[n] > 0;
    let Some(start) = (0..in_degree.len()).find(|&n| stuck(n)) else {
        return Vec::new();
    };

    let mut position = vec![usize::MAX; in_degree.len()];
    let mut walk = Vec::new();
    let mut cur = start;
    while position[cur] == usize::MAX {
        position[cur] = walk.len();
        walk.push(cur);
        cur = match preds[cur].iter().copied().filter(|&p| stuck(p)).min() {
            Some(p) => p,
            None => return walk,
        };
    }

    // The walk follows predecessors; reverse it into execution order.
    let mut cycle = walk.split_off(position[cur]);
    cycle.reverse();
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DependencyOrigin;

    fn dep(before: usize, after: usize) -> Dependency {
        Dependency {
            before: BlockId(before),
            after: BlockId(after),
            origin: DependencyOrigin::Explicit,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("b{i}")).collect()
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let order = compute_schedule(4, &[], &names(4)).unwrap();
        assert_eq!(order, vec![BlockId(0), BlockId(1), BlockId(2), BlockId(3)]);
    }

    #[test]
    fn test_respects_dependencies() {
        let deps = [dep(3, 0), dep(2, 3), dep(1, 2)];
        let order = compute_schedule(4, &deps, &names(4)).unwrap();
        assert_eq!(order, vec![BlockId(1), BlockId(2), BlockId(3), BlockId(0)]);
    }

    #[test]
    fn test_lowest_ready_first() {
        // 2 -> 0 leaves 1 and 2 ready at the start; 1 goes first.
        let deps = [dep(2, 0)];
        let order = compute_schedule(3, &deps, &names(3)).unwrap();
        assert_eq!(order, vec![BlockId(1), BlockId(2), BlockId(0)]);
    }

    #[test]
    fn test_cycle_reported_in_execution_order() {
        // 0 -> 1 -> 2 -> 0, plus a bystander 3 fed by the cycle.
        let deps = [dep(0, 1), dep(1, 2), dep(2, 0), dep(2, 3)];
        let err = compute_schedule(4, &deps, &names(4)).unwrap_err();
        let ScheduleError::Cycle { cycle } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, vec!["b1", "b2", "b0"]);
    }

    #[test]
    fn test_cycle_excludes_tail() {
        // 0 feeds the 1 <-> 2 loop but is not part of it.
        let deps = [dep(0, 1), dep(1, 2), dep(2, 1)];
        let err = compute_schedule(3, &deps, &names(3)).unwrap_err();
        let ScheduleError::Cycle { cycle } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&"b1".to_string()));
        assert!(cycle.contains(&"b2".to_string()));
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let deps = [dep(1, 0), dep(1, 0)];
        let order = compute_schedule(2, &deps, &names(2)).unwrap();
        assert_eq!(order, vec![BlockId(1), BlockId(0)]);
    }
}
