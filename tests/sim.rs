//! Integration tests for the simulator.
//!
//! These tests verify:
//! - Reset sequencing and phases
//! - Non-blocking sequential semantics
//! - Combinational settling with and without `settle_after_tick`
//! - The top-level poke/peek surface and its errors
//! - Timeouts, line traces and statistics

use tickhdl::config::FrameworkConfig;
use tickhdl::{
    Bits, BlockSpec, DataType, Design, DesignBuilder, Expr, LValue, Phase, SignalId, SimError,
    Simulator, Stmt, Timer,
};

/// An 8-bit counter with enable and a combinational `double` output.
struct Counter {
    design: Design,
    en: SignalId,
    count: SignalId,
    double: SignalId,
}

fn counter() -> Counter {
    let mut b = DesignBuilder::new("top", "Counter");
    let top = b.top();
    let en = b.add_input(top, "en", DataType::bits(1));
    let count = b.add_output(top, "count", DataType::bits(8));
    let double = b.add_output(top, "double", DataType::bits(8));
    let reset = b.reset(top);
    b.add_block(
        top,
        BlockSpec::seq(
            "up_count",
            vec![Stmt::when_else(
                reset,
                vec![Stmt::assign(count, Expr::lit(8, 0))],
                vec![Stmt::when(en, vec![Stmt::assign(count, Expr::sig(count) + Expr::lit(8, 1))])],
            )],
        ),
    );
    b.add_block(
        top,
        BlockSpec::comb("up_double", vec![Stmt::assign(double, Expr::sig(count) << Expr::lit(8, 1))]),
    );
    b.set_line_trace(top, move |v| format!("{}", v.peek(count)));
    Counter {
        design: b.elaborate().unwrap(),
        en,
        count,
        double,
    }
}

// ============================================================================
// Reset and ticking
// ============================================================================

#[test]
fn test_reset_sequence() {
    let c = counter();
    let mut sim = Simulator::new(c.design);
    assert_eq!(sim.phase(), Phase::Unreset);

    sim.reset();
    assert_eq!(sim.phase(), Phase::Running);
    assert_eq!(sim.cycle(), 2);
    assert_eq!(sim.peek(c.count).value(), 0);
    assert!(!sim.peek_path("top.reset").unwrap().is_nonzero());

    sim.poke(c.en, Bits::from_bool(true)).unwrap();
    sim.run_for(5);
    assert_eq!(sim.peek(c.count).value(), 5);
    assert_eq!(sim.peek(c.double).value(), 10);

    // Reset again mid-run.
    sim.reset();
    assert_eq!(sim.peek(c.count).value(), 0);
    assert_eq!(sim.collect_stats().engine.resets, 2);
}

#[test]
fn test_configured_reset_length() {
    let config = FrameworkConfig::from_yaml("simulation:\n  reset_ticks: 4\n  max_ticks: 20\n").unwrap();
    let c = counter();
    let mut sim = Simulator::with_config(c.design, &config.simulation);
    sim.reset();
    assert_eq!(sim.cycle(), 4);

    let err = sim.run_until_done(|s| s.peek(c.count).value() == 1).unwrap_err();
    assert_eq!(err, SimError::Timeout { max_ticks: 20, cycle: 24 });

    // Shorter resets are raised to the minimum so registers still latch.
    let c = counter();
    let params = tickhdl::SimulationParams {
        reset_ticks: 0,
        ..Default::default()
    };
    assert!(params.validate().is_err());
    let mut sim = Simulator::with_config(c.design, &params);
    sim.poke(c.en, Bits::from_bool(true)).unwrap();
    sim.run_for(3);
    assert_eq!(sim.peek(c.count).value(), 3);
    sim.reset();
    assert_eq!(sim.cycle(), 3 + tickhdl::config::MIN_RESET_TICKS);
    assert_eq!(sim.peek(c.count).value(), 0);
}

#[test]
fn test_registers_swap_without_races() {
    let mut b = DesignBuilder::new("top", "Swap");
    let top = b.top();
    let x = b.add_output(top, "x", DataType::bits(4));
    let y = b.add_output(top, "y", DataType::bits(4));
    let reset = b.reset(top);
    b.add_block(
        top,
        BlockSpec::seq(
            "up_x",
            vec![Stmt::when_else(reset, vec![Stmt::assign(x, Expr::lit(4, 1))], vec![Stmt::assign(x, y)])],
        ),
    );
    b.add_block(
        top,
        BlockSpec::seq(
            "up_y",
            vec![Stmt::when_else(reset, vec![Stmt::assign(y, Expr::lit(4, 2))], vec![Stmt::assign(y, x)])],
        ),
    );
    let mut sim = Simulator::new(b.elaborate().unwrap());
    sim.reset();
    assert_eq!((sim.peek(x).value(), sim.peek(y).value()), (1, 2));
    sim.tick();
    assert_eq!((sim.peek(x).value(), sim.peek(y).value()), (2, 1));
    sim.tick();
    assert_eq!((sim.peek(x).value(), sim.peek(y).value()), (1, 2));
}

#[test]
fn test_without_settling_comb_outputs_lag() {
    let c = counter();
    let mut params = tickhdl::SimulationParams::default();
    params.settle_after_tick = false;
    let mut sim = Simulator::with_config(c.design, &params);
    sim.reset();
    sim.poke(c.en, Bits::from_bool(true)).unwrap();

    sim.tick();
    assert_eq!(sim.peek(c.count).value(), 1);
    assert_eq!(sim.peek(c.double).value(), 0);
    sim.eval_combinational();
    assert_eq!(sim.peek(c.double).value(), 2);
}

// ============================================================================
// Top-level access
// ============================================================================

#[test]
fn test_poke_rules() {
    let c = counter();
    let mut sim = Simulator::new(c.design);

    assert_eq!(
        sim.poke(c.count, Bits::new(8, 1)),
        Err(SimError::NotTopLevelInput {
            path: "top.count".to_string(),
        })
    );
    assert_eq!(
        sim.poke(c.en, Bits::new(2, 1)),
        Err(SimError::WidthMismatch {
            path: "top.en".to_string(),
            expected: 1,
            actual: 2,
        })
    );
    assert!(sim.poke_path("top.missing", Bits::from_bool(true)).is_err());
    assert!(sim.poke_path("top.en", Bits::from_bool(true)).is_ok());
}

#[test]
fn test_dynamic_index_out_of_range() {
    let mut b = DesignBuilder::new("top", "Table");
    let top = b.top();
    let idx = b.add_input(top, "idx", DataType::bits(3));
    let data = b.add_input(top, "data", DataType::bits(8));
    let out = b.add_output(top, "out", DataType::bits(8));
    let table = b.add_wire(top, "table", DataType::array(DataType::bits(8), vec![5]));
    let reset = b.reset(top);
    b.add_block(
        top,
        BlockSpec::seq(
            "up_table",
            vec![Stmt::when_else(
                reset,
                vec![Stmt::assign(table, Expr::lit(40, 0))],
                vec![Stmt::assign(LValue::from(table).index(idx), data)],
            )],
        ),
    );
    b.add_block(
        top,
        BlockSpec::comb("up_out", vec![Stmt::assign(out, Expr::sig(table).index(idx))]),
    );

    let mut sim = Simulator::new(b.elaborate().unwrap());
    sim.reset();
    sim.poke(idx, Bits::new(3, 4)).unwrap();
    sim.poke(data, Bits::new(8, 0xab)).unwrap();
    sim.tick();
    assert_eq!(sim.peek(out).value(), 0xab);
    let before = sim.peek(table);

    // Index 6 is past the five elements: reads give zero, writes are dropped.
    sim.poke(idx, Bits::new(3, 6)).unwrap();
    sim.eval_combinational();
    assert_eq!(sim.peek(out).value(), 0);
    sim.tick();
    assert_eq!(sim.peek(table), before);
}

#[test]
fn test_native_blocks_with_declared_access() {
    let mut b = DesignBuilder::new("top", "Top");
    let top = b.top();
    let a = b.add_input(top, "a", DataType::bits(16));
    let sq = b.add_output(top, "sq", DataType::bits(16));
    b.add_block(
        top,
        BlockSpec::native_comb("up_square", move |io| {
            let v = io.read(a).value();
            io.write(sq, Bits::new(16, v * v));
        })
        .reads([a])
        .writes([sq]),
    );
    let mut sim = Simulator::new(b.elaborate().unwrap());
    sim.reset();
    sim.poke(a, Bits::new(16, 12)).unwrap();
    sim.eval_combinational();
    assert_eq!(sim.peek(sq).value(), 144);
}

// ============================================================================
// Timeouts, traces, statistics
// ============================================================================

#[test]
fn test_run_until_counts_ticks() {
    let c = counter();
    let mut sim = Simulator::new(c.design);
    sim.reset();
    sim.poke(c.en, Bits::from_bool(true)).unwrap();

    assert_eq!(sim.run_until(|s| s.peek(c.count).value() == 7, 100), Ok(7));
    // Already satisfied: no ticks.
    assert_eq!(sim.run_until(|s| s.peek(c.count).value() == 7, 100), Ok(0));

    sim.poke(c.en, Bits::from_bool(false)).unwrap();
    let err = sim.run_until(|s| s.peek(c.count).value() == 8, 3).unwrap_err();
    assert!(matches!(err, SimError::Timeout { max_ticks: 3, .. }));
    // Still usable.
    sim.poke(c.en, Bits::from_bool(true)).unwrap();
    assert_eq!(sim.run_until(|s| s.peek(c.count).value() == 8, 3), Ok(1));
}

#[test]
fn test_line_trace_and_stats() {
    let c = counter();
    let mut sim = Simulator::new(c.design);
    sim.reset();
    sim.poke(c.en, Bits::from_bool(true)).unwrap();

    let timer = Timer::start();
    sim.run_for(10);
    assert_eq!(sim.line_trace(), "0a");

    let mut stats = sim.collect_stats();
    stats.compute_timing(timer.elapsed_ms());
    assert_eq!(stats.metadata.top, "top");
    assert_eq!(stats.engine.cycles, 12);
    assert_eq!(stats.engine.schedule_len, 2);
    assert_eq!(stats.engine.comb_blocks, 1);
    assert_eq!(stats.blocks[0].path, "top.up_count");
    assert_eq!(stats.blocks[0].invocations, 12);

    let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
    assert_eq!(json["engine"]["cycles"], 12);
    assert!(stats.to_csv().contains("top.up_double"));
}
