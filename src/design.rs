//! The elaborated, frozen design.

use tracing::info;

use crate::block::UpdateKind;
use crate::component::{BlockInfo, ConstraintTarget, Connection, Hierarchy, LineTraceFn};
use crate::connect::{self, NetList};
use crate::error::ElabError;
use crate::metadata::MetadataTable;
use crate::registry::{BlockAccess, BlockRegistry, RegisteredBlock};
use crate::schedule;
use crate::types::{BlockId, ComponentId, NetId, SignalId};

/// A fully resolved and scheduled component hierarchy.
///
/// Structure is immutable once elaborated. Passes attach their results
/// through [`Design::metadata`].
pub struct Design {
    pub(crate) hierarchy: Hierarchy,
    pub(crate) nets: NetList,
    pub(crate) blocks: Vec<RegisteredBlock>,
    pub(crate) schedule: Vec<BlockId>,
    pub(crate) line_traces: Vec<(ComponentId, LineTraceFn)>,
    pub(crate) metadata: MetadataTable,
}

pub(crate) fn elaborate(
    mut hierarchy: Hierarchy,
    specs: Vec<crate::block::BlockSpec>,
    connections: Vec<Connection>,
    constraints: Vec<(ConstraintTarget, ConstraintTarget)>,
    mut line_traces: Vec<(ComponentId, LineTraceFn)>,
) -> Result<Design, ElabError> {
    hierarchy.freeze()?;
    let nets = connect::resolve(&hierarchy, &connections)?;
    let registry = BlockRegistry::register(&hierarchy, &nets, specs)?;
    let dependencies = registry.dependencies(&hierarchy, &nets, &constraints)?;

    let names: Vec<String> = (0..hierarchy.block_count())
        .map(|b| hierarchy.block_path(BlockId(b)))
        .collect();
    let schedule = schedule::compute_schedule(names.len(), &dependencies, &names)?;

    line_traces.sort_by_key(|(comp, _)| *comp);

    info!(
        top = %hierarchy.component_path(hierarchy.root()),
        components = hierarchy.component_count(),
        signals = hierarchy.signal_count(),
        nets = nets.len(),
        blocks = schedule.len(),
        dependencies = dependencies.len(),
        "design elaborated"
    );

    Ok(Design {
        hierarchy,
        nets,
        blocks: registry.blocks,
        schedule,
        line_traces,
        metadata: MetadataTable::new(),
    })
}

impl Design {
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn nets(&self) -> &NetList {
        &self.nets
    }

    pub fn top(&self) -> ComponentId {
        self.hierarchy.root()
    }

    /// Per-tick execution order.
    pub fn schedule(&self) -> &[BlockId] {
        &self.schedule
    }

    /// Schedule as hierarchical block paths.
    pub fn schedule_paths(&self) -> Vec<String> {
        self.schedule
            .iter()
            .map(|b| self.hierarchy.block_path(*b))
            .collect()
    }

    pub fn block_info(&self, block: BlockId) -> &BlockInfo {
        self.hierarchy.block(block)
    }

    pub fn block_kind(&self, block: BlockId) -> UpdateKind {
        self.blocks[block.index()].kind
    }

    pub fn block_access(&self, block: BlockId) -> &BlockAccess {
        &self.blocks[block.index()].access
    }

    pub fn net_of(&self, sig: SignalId) -> NetId {
        self.nets.net_of(sig)
    }

    pub fn signal(&self, path: &str) -> Option<SignalId> {
        self.hierarchy.find_signal(path)
    }

    pub fn component(&self, path: &str) -> Option<ComponentId> {
        self.hierarchy.find_component(path)
    }

    pub fn block(&self, path: &str) -> Option<BlockId> {
        self.hierarchy.find_block(path)
    }

    /// Side-table for pass inputs and results.
    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    /// Exports structural counts as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let comb = self
            .blocks
            .iter()
            .filter(|b| b.kind == UpdateKind::Comb)
            .count();
        serde_json::json!({
            "top": self.hierarchy.component_path(self.top()),
            "components": self.hierarchy.component_count(),
            "signals": self.hierarchy.signal_count(),
            "nets": self.nets.len(),
            "blocks": {
                "total": self.blocks.len(),
                "comb": comb,
                "seq": self.blocks.len() - comb,
            },
            "schedule": self.schedule_paths(),
        })
    }
}

impl std::fmt::Debug for Design {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Design")
            .field("top", &self.hierarchy.component_path(self.top()))
            .field("components", &self.hierarchy.component_count())
            .field("nets", &self.nets.len())
            .field("schedule", &self.schedule_paths())
            .finish()
    }
}
