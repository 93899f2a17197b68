//! Tick-driven simulation of an elaborated design.
//!
//! The `Simulator` owns one value slot per net and executes the design's
//! fixed schedule once per tick. Combinational writes land in their slot
//! immediately; sequential writes are staged and committed together after
//! the whole schedule has run, so every sequential block observes the
//! values from the start of the tick.

use tracing::{debug, enabled, info, trace, warn, Level};

use crate::bits::Bits;
use crate::block::{SignalAccess, SignalPeek, UpdateKind};
use crate::config::{SimulationParams, MIN_RESET_TICKS};
use crate::design::Design;
use crate::error::SimError;
use crate::ir::LStmt;
use crate::registry::{BlockAccess, BlockBody};
use crate::signal::Direction;
use crate::stats::{BlockStats, SimulationStats};
use crate::types::{BlockId, NetId, SignalId, Tick};

/// Lifecycle of a simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; sequential state has not been cleared.
    Unreset,
    /// Inside `reset()`, reset held high.
    Resetting,
    Running,
}

/// Net value storage shared by every block in a tick.
struct NetState {
    values: Vec<Bits>,
    pending: Vec<Option<Bits>>,
    dirty: Vec<NetId>,
}

impl NetState {
    fn commit(&mut self) {
        for net in self.dirty.drain(..) {
            if let Some(value) = self.pending[net.index()].take() {
                self.values[net.index()] = value;
            }
        }
    }
}

/// What a running block sees.
struct BlockCtx<'a> {
    design: &'a Design,
    state: &'a mut NetState,
    kind: UpdateKind,
    access: &'a BlockAccess,
}

impl BlockCtx<'_> {
    fn net(&self, sig: SignalId) -> NetId {
        self.design.nets.net_of(sig)
    }
}

impl SignalPeek for BlockCtx<'_> {
    fn peek(&self, sig: SignalId) -> Bits {
        self.read(sig)
    }
}

impl SignalAccess for BlockCtx<'_> {
    fn read(&self, sig: SignalId) -> Bits {
        let net = self.net(sig);
        debug_assert!(
            self.access.may_read(net),
            "block reads undeclared signal {}",
            self.design.hierarchy.signal_path(sig)
        );
        self.state.values[net.index()]
    }

    fn write(&mut self, sig: SignalId, value: Bits) {
        let net = self.net(sig);
        debug_assert!(
            self.access.may_write(net),
            "block writes undeclared signal {}",
            self.design.hierarchy.signal_path(sig)
        );
        let width = self.state.values[net.index()].width();
        let value = value.resize(width);
        match self.kind {
            UpdateKind::Comb => self.state.values[net.index()] = value,
            UpdateKind::Seq => {
                let slot = &mut self.state.pending[net.index()];
                if slot.is_none() {
                    self.state.dirty.push(net);
                }
                *slot = Some(value);
            }
        }
    }

    fn write_base(&self, sig: SignalId) -> Bits {
        let net = self.net(sig);
        self.state.pending[net.index()].unwrap_or(self.state.values[net.index()])
    }
}

fn exec(stmts: &[LStmt], ctx: &mut BlockCtx<'_>) {
    for stmt in stmts {
        match stmt {
            LStmt::Assign { target, value } => {
                let value = value.eval(&*ctx);
                if target.is_whole() {
                    ctx.write(target.sig, value);
                } else if let Some(offset) = target.offset(&*ctx) {
                    let merged = ctx.write_base(target.sig).set_slice(offset, value);
                    ctx.write(target.sig, merged);
                }
                // An out-of-range dynamic index writes nothing.
            }
            LStmt::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(&*ctx).is_nonzero() {
                    exec(then, ctx);
                } else {
                    exec(otherwise, ctx);
                }
            }
        }
    }
}

fn run_block(design: &Design, state: &mut NetState, block: BlockId) {
    let registered = &design.blocks[block.index()];
    let mut ctx = BlockCtx {
        design,
        state,
        kind: registered.kind,
        access: &registered.access,
    };
    match &registered.body {
        BlockBody::Behavioral(stmts) => exec(stmts, &mut ctx),
        BlockBody::Native(f) => (f.lock())(&mut ctx),
    }
}

/// Cycle-accurate simulator for a [`Design`].
///
/// Top-level ports can be read and written only between ticks, which the
/// `&mut self` receivers of the stepping methods guarantee.
pub struct Simulator {
    design: Design,
    state: NetState,
    params: SimulationParams,
    phase: Phase,
    cycle: Tick,
    resets: u64,
    comb_evals: u64,
    invocations: Vec<u64>,
    comb_order: Vec<BlockId>,
    warned_unreset: bool,
}

impl Simulator {
    /// Creates a simulator with default parameters. All nets start at zero.
    pub fn new(design: Design) -> Self {
        Self::with_config(design, &SimulationParams::default())
    }

    pub fn with_config(design: Design, params: &SimulationParams) -> Self {
        let hier = &design.hierarchy;
        let mut values = vec![Bits::zero(1); design.nets.len()];
        for net in 0..design.nets.len() {
            if let Some(&sig) = design.nets.members(NetId(net)).first() {
                values[net] = Bits::zero(hier.signal(sig).ty.bit_width());
            }
        }
        let comb_order = design
            .schedule
            .iter()
            .copied()
            .filter(|b| design.blocks[b.index()].kind == UpdateKind::Comb)
            .collect();
        let nets = design.nets.len();
        let blocks = design.blocks.len();
        if params.reset_ticks < MIN_RESET_TICKS {
            warn!(
                reset_ticks = params.reset_ticks,
                "reset_ticks below {MIN_RESET_TICKS}; reset will hold for {MIN_RESET_TICKS} ticks"
            );
        }

        debug!(nets, blocks, "simulator created");

        Self {
            state: NetState {
                values,
                pending: vec![None; nets],
                dirty: Vec::new(),
            },
            params: params.clone(),
            phase: Phase::Unreset,
            cycle: 0,
            resets: 0,
            comb_evals: 0,
            invocations: vec![0; blocks],
            comb_order,
            warned_unreset: false,
            design,
        }
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed ticks, including those spent in reset.
    pub fn cycle(&self) -> Tick {
        self.cycle
    }

    /// Executes the schedule once and commits sequential state.
    pub fn tick(&mut self) {
        if self.phase == Phase::Unreset && !self.warned_unreset {
            warn!("ticking a design that has not been reset");
            self.warned_unreset = true;
        }

        for &block in &self.design.schedule {
            run_block(&self.design, &mut self.state, block);
            self.invocations[block.index()] += 1;
        }
        self.state.commit();

        if self.params.settle_after_tick {
            self.settle();
        }
        self.cycle += 1;

        if self.params.line_trace {
            info!(cycle = self.cycle, "{}", self.line_trace());
        } else if enabled!(Level::TRACE) && !self.design.line_traces.is_empty() {
            trace!(cycle = self.cycle, "{}", self.line_trace());
        }
    }

    fn settle(&mut self) {
        for &block in &self.comb_order {
            run_block(&self.design, &mut self.state, block);
            self.invocations[block.index()] += 1;
        }
        self.comb_evals += 1;
    }

    /// Re-evaluates every combinational block in schedule order.
    ///
    /// Call after `poke` so that outputs reflect the new inputs without
    /// advancing sequential state.
    pub fn eval_combinational(&mut self) {
        self.settle();
    }

    /// Holds the top-level reset high for the configured number of ticks,
    /// and never fewer than [`MIN_RESET_TICKS`].
    pub fn reset(&mut self) {
        let reset = self.design.hierarchy.component(self.design.top()).reset;
        let net = self.design.net_of(reset).index();

        self.phase = Phase::Resetting;
        self.state.values[net] = Bits::from_bool(true);
        let ticks = self.params.reset_ticks.max(MIN_RESET_TICKS);
        for _ in 0..ticks {
            self.tick();
        }
        self.state.values[net] = Bits::from_bool(false);
        self.eval_combinational();

        self.phase = Phase::Running;
        self.resets += 1;
        debug!(cycle = self.cycle, ticks, "reset complete");
    }

    /// Ticks `n` times.
    pub fn run_for(&mut self, n: Tick) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Ticks until `done` holds, checking it before every tick.
    ///
    /// # Returns
    /// The number of ticks executed, or [`SimError::Timeout`] if `done`
    /// still fails after `max_ticks` ticks. The simulator stays usable
    /// after a timeout.
    pub fn run_until<F>(&mut self, mut done: F, max_ticks: Tick) -> Result<Tick, SimError>
    where
        F: FnMut(&Simulator) -> bool,
    {
        let mut ticks = 0;
        loop {
            if done(self) {
                return Ok(ticks);
            }
            if ticks >= max_ticks {
                return Err(SimError::Timeout {
                    max_ticks,
                    cycle: self.cycle,
                });
            }
            self.tick();
            ticks += 1;
        }
    }

    /// [`run_until`](Self::run_until) bounded by the configured `max_ticks`.
    pub fn run_until_done<F>(&mut self, done: F) -> Result<Tick, SimError>
    where
        F: FnMut(&Simulator) -> bool,
    {
        let max_ticks = self.params.max_ticks;
        self.run_until(done, max_ticks)
    }

    /// Current value of a signal's net.
    pub fn peek(&self, sig: SignalId) -> Bits {
        self.state.values[self.design.net_of(sig).index()]
    }

    pub fn peek_path(&self, path: &str) -> Option<Bits> {
        self.design.signal(path).map(|sig| self.peek(sig))
    }

    /// Sets a top-level input port. The value is zero-extended or must match
    /// the port width exactly.
    pub fn poke(&mut self, sig: SignalId, value: Bits) -> Result<(), SimError> {
        let hier = &self.design.hierarchy;
        let info = hier.signal(sig);
        if info.owner != hier.root() || info.dir != Direction::In {
            return Err(SimError::NotTopLevelInput {
                path: hier.signal_path(sig),
            });
        }
        let expected = info.ty.bit_width();
        if value.width() != expected {
            return Err(SimError::WidthMismatch {
                path: hier.signal_path(sig),
                expected,
                actual: value.width(),
            });
        }
        let net = self.design.net_of(sig);
        self.state.values[net.index()] = value;
        Ok(())
    }

    pub fn poke_path(&mut self, path: &str, value: Bits) -> Result<(), SimError> {
        let sig = self
            .design
            .signal(path)
            .ok_or_else(|| SimError::NotTopLevelInput {
                path: path.to_string(),
            })?;
        self.poke(sig, value)
    }

    /// One line summarizing the design state, from every registered
    /// line-trace callback in hierarchy order.
    pub fn line_trace(&self) -> String {
        self.design
            .line_traces
            .iter()
            .map(|(_, f)| f(self))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// How many times each block has run.
    pub fn invocations(&self, block: BlockId) -> u64 {
        self.invocations[block.index()]
    }

    /// Snapshot of engine counters.
    pub fn collect_stats(&self) -> SimulationStats {
        let hier = &self.design.hierarchy;
        let mut stats = SimulationStats::new();
        stats.metadata.top = hier.component_path(self.design.top());
        stats.metadata.version = env!("CARGO_PKG_VERSION").to_string();

        stats.engine.cycles = self.cycle;
        stats.engine.resets = self.resets;
        stats.engine.comb_evals = self.comb_evals;
        stats.engine.schedule_len = self.design.schedule.len();
        stats.engine.comb_blocks = self.comb_order.len();
        stats.engine.seq_blocks = self.design.schedule.len() - self.comb_order.len();
        stats.engine.nets = self.design.nets.len();
        stats.engine.components = hier.component_count();

        stats.blocks = self
            .design
            .schedule
            .iter()
            .map(|&b| BlockStats {
                path: hier.block_path(b),
                kind: match self.design.block_kind(b) {
                    UpdateKind::Comb => "comb".to_string(),
                    UpdateKind::Seq => "seq".to_string(),
                },
                invocations: self.invocations[b.index()],
            })
            .collect();
        stats
    }
}

impl SignalPeek for Simulator {
    fn peek(&self, sig: SignalId) -> Bits {
        Simulator::peek(self, sig)
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("design", &self.design)
            .field("phase", &self.phase)
            .field("cycle", &self.cycle)
            .finish()
    }
}
