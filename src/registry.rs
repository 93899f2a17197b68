//! Update-block registry and constraint collection.
//!
//! For every block the registry determines the signals it reads and writes,
//! checks that its writes are legal, and then turns net-level data
//! dependencies plus the user's explicit constraints into the dependency
//! edges the scheduler orders.

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::block::{BlockSpec, NativeFn, UpdateBody, UpdateKind};
use crate::component::{ConstraintTarget, Hierarchy, SignalRef};
use crate::connect::{NetDriver, NetList};
use crate::error::{ConstraintError, ElabError, ScheduleError, StructuralError};
use crate::ir::{self, LStmt, Lowerer};
use crate::signal::Direction;
use crate::types::{BlockId, NetId, SignalId};

/// Signals a block touches.
#[derive(Clone, Debug, Default)]
pub struct BlockAccess {
    pub reads: Vec<SignalId>,
    pub writes: Vec<SignalId>,
    pub(crate) read_nets: Vec<NetId>,
    pub(crate) write_nets: Vec<NetId>,
}

impl BlockAccess {
    pub(crate) fn may_read(&self, net: NetId) -> bool {
        self.read_nets.binary_search(&net).is_ok() || self.write_nets.binary_search(&net).is_ok()
    }

    pub(crate) fn may_write(&self, net: NetId) -> bool {
        self.write_nets.binary_search(&net).is_ok()
    }
}

pub(crate) enum BlockBody {
    Behavioral(Vec<LStmt>),
    Native(Mutex<NativeFn>),
}

pub(crate) struct RegisteredBlock {
    pub kind: UpdateKind,
    pub access: BlockAccess,
    pub body: BlockBody,
}

/// Why one block must precede another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyOrigin {
    Explicit,
    /// The earlier block combinationally writes a net the later one reads.
    Inferred { net: NetId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub before: BlockId,
    pub after: BlockId,
    pub origin: DependencyOrigin,
}

pub(crate) struct BlockRegistry {
    pub blocks: Vec<RegisteredBlock>,
    readers: Vec<Vec<BlockId>>,
    writer: Vec<Option<BlockId>>,
}

fn sorted(mut v: Vec<SignalId>) -> Vec<SignalId> {
    v.sort_unstable();
    v.dedup();
    v
}

impl BlockRegistry {
    /// Lowers bodies, determines access sets and checks write legality.
    pub(crate) fn register(
        hier: &Hierarchy,
        nets: &NetList,
        specs: Vec<BlockSpec>,
    ) -> Result<Self, ElabError> {
        let mut registry = Self {
            blocks: Vec::with_capacity(specs.len()),
            readers: vec![Vec::new(); nets.len()],
            writer: vec![None; nets.len()],
        };
        let lowerer = Lowerer::new(hier);

        for (idx, spec) in specs.into_iter().enumerate() {
            let id = BlockId(idx);
            let behavior = |detail: String| ElabError::Behavior {
                block: hier.block_path(id),
                detail,
            };

            let (mut reads, mut writes) = (spec.reads, spec.writes);
            let body = match spec.body {
                UpdateBody::Behavioral(stmts) => {
                    let lowered = lowerer.lower(&stmts).map_err(behavior)?;
                    ir::collect_access(&stmts, &mut reads, &mut writes);
                    BlockBody::Behavioral(lowered)
                }
                UpdateBody::Native(f) => {
                    if reads.is_empty() && writes.is_empty() {
                        warn!(
                            block = %hier.block_path(id),
                            "native block declares no signal access and will not be ordered by data dependencies"
                        );
                    }
                    BlockBody::Native(Mutex::new(f))
                }
            };

            let reads = sorted(reads);
            let writes = sorted(writes);
            if let Some(bad) = reads.iter().chain(&writes).find(|s| s.index() >= hier.signal_count()) {
                return Err(behavior(format!("references unknown signal {bad:?}")));
            }

            for &sig in &writes {
                registry.check_write(hier, nets, id, sig)?;
            }

            let mut read_nets: Vec<NetId> = reads.iter().map(|s| nets.net_of(*s)).collect();
            read_nets.sort_unstable();
            read_nets.dedup();
            let mut write_nets: Vec<NetId> = writes.iter().map(|s| nets.net_of(*s)).collect();
            write_nets.sort_unstable();
            write_nets.dedup();

            for &net in &read_nets {
                registry.readers[net.index()].push(id);
            }
            for &net in &write_nets {
                registry.writer[net.index()] = Some(id);
            }

            registry.blocks.push(RegisteredBlock {
                kind: spec.kind,
                access: BlockAccess {
                    reads,
                    writes,
                    read_nets,
                    write_nets,
                },
                body,
            });
        }
        Ok(registry)
    }

    fn check_write(
        &self,
        hier: &Hierarchy,
        nets: &NetList,
        block: BlockId,
        sig: SignalId,
    ) -> Result<(), StructuralError> {
        let owner = hier.block(block).owner;
        let info = hier.signal(sig);
        let legal = match info.dir {
            Direction::Out | Direction::Wire => info.owner == owner,
            Direction::In => hier.parent(info.owner) == Some(owner),
        };
        if !legal {
            return Err(StructuralError::IllegalWrite {
                block: hier.block_path(block),
                signal: hier.signal_path(sig),
            });
        }

        let net = nets.net_of(sig);
        let elsewhere = |driver: String| StructuralError::DrivenElsewhere {
            block: hier.block_path(block),
            signal: hier.signal_path(sig),
            driver,
        };
        match nets.driver(net) {
            NetDriver::External => return Err(elsewhere("a top-level input".to_string())),
            NetDriver::Component(c) if c != owner => {
                return Err(elsewhere(hier.component_path(c)));
            }
            _ => {}
        }
        // An input of the writing component or of an enclosing one is driven from outside.
        if let Some(&port) = nets.members(net).iter().find(|&&m| {
            let other = hier.signal(m);
            other.dir == Direction::In
                && (other.owner == owner || hier.is_ancestor(other.owner, owner))
        }) {
            return Err(elsewhere(hier.signal_path(port)));
        }

        if let Some(prev) = self.writer[net.index()] {
            if prev != block {
                return Err(StructuralError::ConflictingWriters {
                    signal: hier.signal_path(sig),
                    blocks: vec![hier.block_path(prev), hier.block_path(block)],
                });
            }
        }
        Ok(())
    }

    pub(crate) fn writer(&self, net: NetId) -> Option<BlockId> {
        self.writer[net.index()]
    }

    fn resolve_signal(hier: &Hierarchy, sig: &SignalRef) -> Result<SignalId, ConstraintError> {
        match sig {
            SignalRef::Id(id) if id.index() < hier.signal_count() => Ok(*id),
            SignalRef::Id(id) => Err(ConstraintError::UnknownSignal(format!("{id:?}"))),
            SignalRef::Path(path) => hier
                .find_signal(path)
                .ok_or_else(|| ConstraintError::UnknownSignal(path.clone())),
        }
    }

    /// Blocks named by a constraint endpoint, and whether it named a block directly.
    fn resolve_target(
        &self,
        hier: &Hierarchy,
        nets: &NetList,
        target: &ConstraintTarget,
    ) -> Result<(Vec<BlockId>, bool), ConstraintError> {
        match target {
            ConstraintTarget::Block(id) if id.index() < self.blocks.len() => Ok((vec![*id], true)),
            ConstraintTarget::Block(id) => Err(ConstraintError::UnknownBlock(format!("{id:?}"))),
            ConstraintTarget::BlockPath(path) => hier
                .find_block(path)
                .map(|b| (vec![b], true))
                .ok_or_else(|| ConstraintError::UnknownBlock(path.clone())),
            ConstraintTarget::Read(sig) => {
                let sig = Self::resolve_signal(hier, sig)?;
                let blocks = self.readers[nets.net_of(sig).index()].clone();
                if blocks.is_empty() {
                    warn!(signal = %hier.signal_path(sig), "no block reads this signal; read constraint has no effect");
                }
                Ok((blocks, false))
            }
            ConstraintTarget::Write(sig) => {
                let sig = Self::resolve_signal(hier, sig)?;
                let blocks: Vec<BlockId> = self.writer[nets.net_of(sig).index()].into_iter().collect();
                if blocks.is_empty() {
                    warn!(signal = %hier.signal_path(sig), "no block writes this signal; write constraint has no effect");
                }
                Ok((blocks, false))
            }
        }
    }

    /// Merges explicit constraints with inferred data dependencies.
    ///
    /// Explicit edges come first, in declaration order. An inferred edge is
    /// dropped when an explicit edge orders the same pair the other way.
    pub(crate) fn dependencies(
        &self,
        hier: &Hierarchy,
        nets: &NetList,
        constraints: &[(ConstraintTarget, ConstraintTarget)],
    ) -> Result<Vec<Dependency>, ElabError> {
        let mut edges: IndexMap<(BlockId, BlockId), DependencyOrigin> = IndexMap::new();

        for (before, after) in constraints {
            let (firsts, first_direct) = self.resolve_target(hier, nets, before)?;
            let (seconds, second_direct) = self.resolve_target(hier, nets, after)?;
            for &x in &firsts {
                for &y in &seconds {
                    if x == y {
                        if first_direct && second_direct {
                            return Err(ConstraintError::SelfOrdering(hier.block_path(x)).into());
                        }
                        continue;
                    }
                    if edges.get(&(y, x)) == Some(&DependencyOrigin::Explicit) {
                        return Err(ScheduleError::Contradiction {
                            a: hier.block_path(x),
                            b: hier.block_path(y),
                        }
                        .into());
                    }
                    edges.insert((x, y), DependencyOrigin::Explicit);
                }
            }
        }
        let explicit = edges.len();

        for net in 0..nets.len() {
            let net = NetId(net);
            let Some(writer) = self.writer[net.index()] else {
                continue;
            };
            if self.blocks[writer.index()].kind != UpdateKind::Comb {
                continue;
            }
            for &reader in &self.readers[net.index()] {
                if reader == writer {
                    continue;
                }
                if edges.get(&(reader, writer)) == Some(&DependencyOrigin::Explicit) {
                    debug!(
                        writer = %hier.block_path(writer),
                        reader = %hier.block_path(reader),
                        "explicit constraint overrides inferred dependency"
                    );
                    continue;
                }
                edges
                    .entry((writer, reader))
                    .or_insert(DependencyOrigin::Inferred { net });
            }
        }

        debug!(
            explicit,
            inferred = edges.len() - explicit,
            "collected dependencies"
        );
        Ok(edges
            .into_iter()
            .map(|((before, after), origin)| Dependency {
                before,
                after,
                origin,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::block::BlockSpec;
    use crate::component::{ConstraintTarget, DesignBuilder};
    use crate::dtype::DataType;
    use crate::error::{ElabError, StructuralError};
    use crate::ir::{Expr, Stmt};

    #[test]
    fn test_inferred_access_sets() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        let y = b.add_output(top, "y", DataType::bits(8));
        let blk = b.add_block(top, BlockSpec::comb("up", vec![Stmt::assign(y, Expr::sig(a) + a)]));
        let design = b.elaborate().unwrap();

        let access = design.block_access(blk);
        assert_eq!(access.reads, vec![a]);
        assert_eq!(access.writes, vec![y]);
    }

    #[test]
    fn test_write_to_own_input_rejected() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        b.add_block(top, BlockSpec::comb("up", vec![Stmt::assign(a, Expr::lit(8, 1))]));

        let err = b.elaborate().unwrap_err();
        assert!(matches!(
            err,
            ElabError::Structural(StructuralError::IllegalWrite { .. })
        ));
    }

    #[test]
    fn test_two_writers_rejected() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let w = b.add_wire(top, "w", DataType::bits(1));
        b.add_block(top, BlockSpec::comb("one", vec![Stmt::assign(w, Expr::lit(1, 0))]));
        b.add_block(top, BlockSpec::seq("two", vec![Stmt::assign(w, Expr::lit(1, 1))]));

        let err = b.elaborate().unwrap_err();
        assert!(matches!(
            err,
            ElabError::Structural(StructuralError::ConflictingWriters { .. })
        ));
    }

    #[test]
    fn test_write_to_child_output_rejected() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let child = b.add_component(top, "child", "Child");
        let out = b.add_output(child, "out", DataType::bits(4));
        b.add_block(top, BlockSpec::comb("up", vec![Stmt::assign(out, Expr::lit(4, 3))]));

        let err = b.elaborate().unwrap_err();
        assert!(matches!(
            err,
            ElabError::Structural(StructuralError::IllegalWrite { .. })
        ));
    }

    #[test]
    fn test_parent_may_drive_child_input() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let child = b.add_component(top, "child", "Child");
        let x = b.add_input(child, "x", DataType::bits(4));
        b.add_block(top, BlockSpec::comb("drive", vec![Stmt::assign(x, Expr::lit(4, 3))]));
        assert!(b.elaborate().is_ok());
    }

    #[test]
    fn test_write_event_constraint_targets_writer() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let w = b.add_wire(top, "w", DataType::bits(1));
        let late = b.add_block(top, BlockSpec::native_comb("late", |_| {}));
        let early = b.add_block(top, BlockSpec::comb("early", vec![Stmt::assign(w, Expr::lit(1, 1))]));
        b.add_constraint(ConstraintTarget::write(w), late);
        let design = b.elaborate().unwrap();

        assert_eq!(design.schedule(), &[early, late]);
    }
}
