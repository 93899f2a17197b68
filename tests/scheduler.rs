//! Scheduling properties over whole designs.
//!
//! These tests verify:
//! - Every inferred and explicit constraint is respected
//! - Elaboration is deterministic
//! - Cycles are reported with the blocks involved
//! - Explicit constraints override inferred ones

mod common;

use common::XorShift;
use tickhdl::{
    BlockId, BlockSpec, ConstraintError, ConstraintTarget, DataType, DesignBuilder, ElabError,
    Expr, ScheduleError, SignalId, Stmt,
};

fn position(schedule: &[BlockId], block: BlockId) -> usize {
    schedule.iter().position(|b| *b == block).expect("block is scheduled")
}

/// `n` comb blocks where block `i` writes `w{i}` and reads a random subset
/// of lower-numbered wires. Blocks are declared in a shuffled order.
fn random_chain(seed: u64, n: usize) -> (DesignBuilder, Vec<BlockId>, Vec<Vec<usize>>) {
    let mut rng = XorShift::new(seed);
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let seed_in = b.add_input(top, "seed", DataType::bits(8));
    let wires: Vec<SignalId> = (0..n)
        .map(|i| b.add_wire(top, format!("w{i}"), DataType::bits(8)))
        .collect();

    let reads: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..i).filter(|_| rng.below(3) == 0).collect())
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        order.swap(i, rng.below(i as u64 + 1) as usize);
    }

    let mut ids = vec![BlockId(0); n];
    for &i in &order {
        let value = reads[i]
            .iter()
            .fold(Expr::sig(seed_in), |acc, &j| acc ^ wires[j]);
        ids[i] = b.add_block(
            top,
            BlockSpec::comb(format!("up_w{i}"), vec![Stmt::assign(wires[i], value)]),
        );
    }
    (b, ids, reads)
}

#[test]
fn test_random_dags_respect_every_dependency() {
    for seed in 1..=20 {
        let (b, ids, reads) = random_chain(seed, 24);
        let design = b.elaborate().unwrap();
        let schedule = design.schedule();
        assert_eq!(schedule.len(), ids.len());

        for (i, deps) in reads.iter().enumerate() {
            for &j in deps {
                assert!(
                    position(schedule, ids[j]) < position(schedule, ids[i]),
                    "seed {seed}: up_w{j} must precede up_w{i}"
                );
            }
        }
    }
}

#[test]
fn test_elaboration_is_deterministic() {
    let first = random_chain(7, 30).0.elaborate().unwrap().schedule_paths();
    let second = random_chain(7, 30).0.elaborate().unwrap().schedule_paths();
    assert_eq!(first, second);
}

#[test]
fn test_independent_blocks_keep_declaration_order() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    for name in ["c", "a", "b"] {
        let w = b.add_wire(top, format!("w_{name}"), DataType::bits(1));
        b.add_block(top, BlockSpec::comb(name, vec![Stmt::assign(w, Expr::lit(1, 1))]));
    }
    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule_paths(), ["top.c", "top.a", "top.b"]);
}

#[test]
fn test_comb_cycle_reports_both_blocks() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let p = b.add_wire(top, "p", DataType::bits(4));
    let q = b.add_wire(top, "q", DataType::bits(4));
    b.add_block(top, BlockSpec::comb("x", vec![Stmt::assign(q, Expr::sig(p) + Expr::lit(4, 1))]));
    b.add_block(top, BlockSpec::comb("y", vec![Stmt::assign(p, q)]));

    match b.elaborate() {
        Err(ElabError::Schedule(ScheduleError::Cycle { cycle })) => {
            assert!(cycle.contains(&"top.x".to_string()), "{cycle:?}");
            assert!(cycle.contains(&"top.y".to_string()), "{cycle:?}");
        }
        other => panic!("expected a cycle, got {:?}", other.map(|d| d.schedule_paths())),
    }
}

#[test]
fn test_cycle_through_hierarchy() {
    // Two children whose comb outputs feed each other's inputs.
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let mut ports = Vec::new();
    for name in ["left", "right"] {
        let c = b.add_component(top, name, "Echo");
        let i = b.add_input(c, "i", DataType::bits(2));
        let o = b.add_output(c, "o", DataType::bits(2));
        b.add_block(c, BlockSpec::comb("up_echo", vec![Stmt::assign(o, i)]));
        ports.push((i, o));
    }
    b.connect(ports[0].1, ports[1].0);
    b.connect(ports[1].1, ports[0].0);

    match b.elaborate() {
        Err(ElabError::Schedule(ScheduleError::Cycle { cycle })) => {
            assert_eq!(cycle.len(), 2);
            assert!(cycle.contains(&"top.left.up_echo".to_string()), "{cycle:?}");
            assert!(cycle.contains(&"top.right.up_echo".to_string()), "{cycle:?}");
        }
        other => panic!("expected a cycle, got {:?}", other.map(|d| d.schedule_paths())),
    }
}

#[test]
fn test_sequential_feedback_is_not_a_cycle() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let a = b.add_wire(top, "a", DataType::bits(4));
    let c = b.add_wire(top, "c", DataType::bits(4));
    let seq_a = b.add_block(top, BlockSpec::seq("up_a", vec![Stmt::assign(a, c)]));
    let seq_c = b.add_block(top, BlockSpec::seq("up_c", vec![Stmt::assign(c, a)]));
    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule(), [seq_a, seq_c]);
}

// ============================================================================
// Explicit constraints
// ============================================================================

#[test]
fn test_explicit_constraints_reorder_blocks() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let x = b.add_wire(top, "x", DataType::bits(1));
    let y = b.add_wire(top, "y", DataType::bits(1));
    let first = b.add_block(top, BlockSpec::comb("first", vec![Stmt::assign(x, Expr::lit(1, 0))]));
    let second = b.add_block(top, BlockSpec::comb("second", vec![Stmt::assign(y, Expr::lit(1, 1))]));
    b.add_constraint(second, first);

    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule(), [second, first]);
}

#[test]
fn test_signal_event_constraints() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let r = b.add_wire(top, "r", DataType::bits(8));
    let s = b.add_wire(top, "s", DataType::bits(8));
    let reader = b.add_block(top, BlockSpec::seq("reader", vec![Stmt::assign(s, r)]));
    let writer = b.add_block(top, BlockSpec::seq("writer", vec![Stmt::assign(r, Expr::lit(8, 3))]));
    // Every block writing `r` runs before every block reading it.
    b.add_constraint(ConstraintTarget::write_path("top.r"), ConstraintTarget::read(r));

    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule(), [writer, reader]);
}

#[test]
fn test_explicit_overrides_inferred() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let w = b.add_wire(top, "w", DataType::bits(8));
    let o = b.add_output(top, "o", DataType::bits(8));
    let writer = b.add_block(top, BlockSpec::comb("writer", vec![Stmt::assign(w, Expr::lit(8, 9))]));
    let reader = b.add_block(top, BlockSpec::comb("reader", vec![Stmt::assign(o, w)]));
    b.add_constraint(ConstraintTarget::block_path("top.reader"), writer);

    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule(), [reader, writer]);
}

#[test]
fn test_contradictory_constraints_are_fatal() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let w = b.add_wire(top, "w", DataType::bits(1));
    let v = b.add_wire(top, "v", DataType::bits(1));
    let a = b.add_block(top, BlockSpec::comb("a", vec![Stmt::assign(w, Expr::lit(1, 0))]));
    let c = b.add_block(top, BlockSpec::comb("c", vec![Stmt::assign(v, Expr::lit(1, 0))]));
    b.add_constraint(a, c);
    b.add_constraint(c, a);

    assert!(matches!(
        b.elaborate(),
        Err(ElabError::Schedule(ScheduleError::Contradiction { .. }))
    ));
}

#[test]
fn test_bad_constraint_references() {
    let build = |before: ConstraintTarget, after: ConstraintTarget| {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let w = b.add_wire(top, "w", DataType::bits(1));
        b.add_block(top, BlockSpec::comb("only", vec![Stmt::assign(w, Expr::lit(1, 1))]));
        b.add_constraint(before, after);
        b.elaborate().err()
    };

    assert_eq!(
        build(ConstraintTarget::block_path("top.missing"), ConstraintTarget::block_path("top.only")),
        Some(ElabError::Constraint(ConstraintError::UnknownBlock("top.missing".to_string())))
    );
    assert_eq!(
        build(ConstraintTarget::read_path("top.nope"), ConstraintTarget::block_path("top.only")),
        Some(ElabError::Constraint(ConstraintError::UnknownSignal("top.nope".to_string())))
    );
    assert_eq!(
        build(ConstraintTarget::block_path("top.only"), ConstraintTarget::block_path("top.only")),
        Some(ElabError::Constraint(ConstraintError::SelfOrdering("top.only".to_string())))
    );
}

#[test]
fn test_event_constraint_without_matching_blocks() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let unused = b.add_wire(top, "unused", DataType::bits(1));
    let w = b.add_wire(top, "w", DataType::bits(1));
    let v = b.add_wire(top, "v", DataType::bits(1));
    let first = b.add_block(top, BlockSpec::comb("first", vec![Stmt::assign(w, Expr::lit(1, 1))]));
    let second = b.add_block(top, BlockSpec::comb("second", vec![Stmt::assign(v, Expr::lit(1, 0))]));
    // Nothing reads or writes `unused`, so neither constraint orders anything.
    b.add_constraint(second, ConstraintTarget::read(unused));
    b.add_constraint(ConstraintTarget::write(unused), first);

    let design = b.elaborate().unwrap();
    assert_eq!(design.schedule(), [first, second]);
}
