//! Component hierarchy and the declaration pass.
//!
//! A design is declared up front through [`DesignBuilder`]: every component,
//! port, wire, interface, connection and update block is registered
//! explicitly and addressed afterwards by typed id or by hierarchical path.
//! [`DesignBuilder::elaborate`] freezes the declarations into a
//! [`Design`](crate::Design).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bits::MAX_WIDTH;
use crate::block::{BlockSpec, SignalPeek, UpdateKind};
use crate::design::{self, Design};
use crate::dtype::DataType;
use crate::error::{ElabError, StructuralError};
use crate::signal::{
    Direction, IfcSlot, InterfaceDesc, InterfaceInfo, InterfaceMember, Polarity, SignalInfo,
};
use crate::types::{BlockId, ComponentId, InterfaceId, SignalId};

/// Renders a component's state for the per-cycle line trace.
pub type LineTraceFn = Box<dyn Fn(&dyn SignalPeek) -> String + Send + Sync>;

/// A node of the component tree.
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    pub name: String,
    /// Module kind. Components of one kind with identical structure share a
    /// generated module.
    pub kind: String,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
    pub signals: Vec<SignalId>,
    pub interfaces: Vec<InterfaceId>,
    pub blocks: Vec<BlockId>,
    pub clk: SignalId,
    pub reset: SignalId,
}

/// Declared name, owner and kind of an update block.
#[derive(Clone, Debug)]
pub struct BlockInfo {
    pub name: String,
    pub owner: ComponentId,
    pub kind: UpdateKind,
}

/// Lookup table over everything declared in a design.
#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    pub(crate) components: Vec<ComponentInfo>,
    pub(crate) signals: Vec<SignalInfo>,
    pub(crate) interfaces: Vec<InterfaceInfo>,
    pub(crate) blocks: Vec<BlockInfo>,
    component_paths: HashMap<String, ComponentId>,
    signal_paths: HashMap<String, SignalId>,
    block_paths: HashMap<String, BlockId>,
}

impl Hierarchy {
    pub fn root(&self) -> ComponentId {
        ComponentId(0)
    }

    pub fn component(&self, id: ComponentId) -> &ComponentInfo {
        &self.components[id.index()]
    }

    pub fn signal(&self, id: SignalId) -> &SignalInfo {
        &self.signals[id.index()]
    }

    pub fn interface(&self, id: InterfaceId) -> &InterfaceInfo {
        &self.interfaces[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BlockInfo {
        &self.blocks[id.index()]
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// All component ids in declaration order (parents before children).
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.components.len()).map(ComponentId)
    }

    pub fn component_path(&self, id: ComponentId) -> String {
        let comp = self.component(id);
        match comp.parent {
            Some(parent) => format!("{}.{}", self.component_path(parent), comp.name),
            None => comp.name.clone(),
        }
    }

    pub fn signal_path(&self, id: SignalId) -> String {
        let sig = self.signal(id);
        format!("{}.{}", self.component_path(sig.owner), sig.name)
    }

    pub fn interface_path(&self, id: InterfaceId) -> String {
        let ifc = self.interface(id);
        format!("{}.{}", self.component_path(ifc.owner), ifc.name)
    }

    pub fn block_path(&self, id: BlockId) -> String {
        let blk = self.block(id);
        format!("{}.{}", self.component_path(blk.owner), blk.name)
    }

    pub fn find_component(&self, path: &str) -> Option<ComponentId> {
        self.component_paths.get(path).copied()
    }

    pub fn find_signal(&self, path: &str) -> Option<SignalId> {
        self.signal_paths.get(path).copied()
    }

    pub fn find_block(&self, path: &str) -> Option<BlockId> {
        self.block_paths.get(path).copied()
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        let mut cur = self.component(id).parent;
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.component(c).parent;
        }
        false
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.component(id).parent
    }

    /// Looks up an interface member (`"msg"`, or `"sub.msg"` for nested interfaces).
    pub fn interface_member(&self, ifc: InterfaceId, member: &str) -> Option<SignalId> {
        let (head, rest) = match member.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (member, None),
        };
        let slot = self
            .interface(ifc)
            .members
            .iter()
            .find(|(name, _)| name == head)
            .map(|(_, slot)| *slot)?;
        match (slot, rest) {
            (IfcSlot::Signal(sig), None) => Some(sig),
            (IfcSlot::Interface(sub), Some(rest)) => self.interface_member(sub, rest),
            _ => None,
        }
    }

    /// Builds the path indices and checks declaration-level invariants.
    pub(crate) fn freeze(&mut self) -> Result<(), StructuralError> {
        for comp in self.component_ids() {
            let info = self.component(comp);
            let mut seen = HashSet::new();
            let names = info
                .children
                .iter()
                .map(|c| self.component(*c).name.as_str())
                .chain(
                    info.signals
                        .iter()
                        .filter(|s| self.signal(**s).interface.is_none())
                        .map(|s| self.signal(*s).name.as_str()),
                )
                .chain(info.interfaces.iter().map(|i| self.interface(*i).name.as_str()))
                .chain(info.blocks.iter().map(|b| self.block(*b).name.as_str()));
            for name in names {
                if !seen.insert(name) {
                    return Err(StructuralError::DuplicateName {
                        component: self.component_path(comp),
                        name: name.to_string(),
                    });
                }
            }
        }

        for (idx, sig) in self.signals.iter().enumerate() {
            // Every field and element must hold bits, not only the whole signal.
            if let Some(part) = sig.ty.empty_part() {
                return Err(StructuralError::InvalidWidth {
                    path: format!("{}{part}", self.signal_path(SignalId(idx))),
                    width: 0,
                });
            }
            let width = sig.ty.bit_width();
            if !(1..=MAX_WIDTH).contains(&width) {
                return Err(StructuralError::InvalidWidth {
                    path: self.signal_path(SignalId(idx)),
                    width,
                });
            }
        }

        self.component_paths = self
            .component_ids()
            .map(|c| (self.component_path(c), c))
            .collect();
        self.signal_paths = (0..self.signals.len())
            .map(|s| (self.signal_path(SignalId(s)), SignalId(s)))
            .collect();
        self.block_paths = (0..self.blocks.len())
            .map(|b| (self.block_path(BlockId(b)), BlockId(b)))
            .collect();
        Ok(())
    }
}

/// One declared connection.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Connection {
    Signals(SignalId, SignalId),
    Interfaces(InterfaceId, InterfaceId),
}

/// One side of an explicit ordering constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstraintTarget {
    Block(BlockId),
    BlockPath(String),
    /// Every block reading the signal's net.
    Read(SignalRef),
    /// Every block writing the signal's net.
    Write(SignalRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalRef {
    Id(SignalId),
    Path(String),
}

impl ConstraintTarget {
    pub fn block_path(path: impl Into<String>) -> Self {
        ConstraintTarget::BlockPath(path.into())
    }

    pub fn read(sig: SignalId) -> Self {
        ConstraintTarget::Read(SignalRef::Id(sig))
    }

    pub fn write(sig: SignalId) -> Self {
        ConstraintTarget::Write(SignalRef::Id(sig))
    }

    pub fn read_path(path: impl Into<String>) -> Self {
        ConstraintTarget::Read(SignalRef::Path(path.into()))
    }

    pub fn write_path(path: impl Into<String>) -> Self {
        ConstraintTarget::Write(SignalRef::Path(path.into()))
    }
}

impl From<BlockId> for ConstraintTarget {
    fn from(id: BlockId) -> Self {
        ConstraintTarget::Block(id)
    }
}

/// Collects declarations for one design.
pub struct DesignBuilder {
    hier: Hierarchy,
    specs: Vec<BlockSpec>,
    connections: Vec<Connection>,
    constraints: Vec<(ConstraintTarget, ConstraintTarget)>,
    line_traces: Vec<(ComponentId, LineTraceFn)>,
}

impl DesignBuilder {
    /// Starts a design whose root component is `name` of module kind `kind`.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut builder = Self {
            hier: Hierarchy::default(),
            specs: Vec::new(),
            connections: Vec::new(),
            constraints: Vec::new(),
            line_traces: Vec::new(),
        };
        builder.push_component(None, name.into(), kind.into());
        builder
    }

    pub fn top(&self) -> ComponentId {
        ComponentId(0)
    }

    /// The declarations made so far.
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hier
    }

    fn push_component(&mut self, parent: Option<ComponentId>, name: String, kind: String) -> ComponentId {
        let id = ComponentId(self.hier.components.len());
        self.hier.components.push(ComponentInfo {
            name,
            kind,
            parent,
            children: Vec::new(),
            signals: Vec::new(),
            interfaces: Vec::new(),
            blocks: Vec::new(),
            clk: SignalId(usize::MAX),
            reset: SignalId(usize::MAX),
        });
        if let Some(parent) = parent {
            self.hier.components[parent.index()].children.push(id);
        }
        let clk = self.add_input(id, "clk", DataType::bits(1));
        let reset = self.add_input(id, "reset", DataType::bits(1));
        let comp = &mut self.hier.components[id.index()];
        comp.clk = clk;
        comp.reset = reset;
        if let Some(parent) = parent {
            let (pclk, preset) = {
                let p = self.hier.component(parent);
                (p.clk, p.reset)
            };
            self.connect(pclk, clk);
            self.connect(preset, reset);
        }
        id
    }

    /// Adds a child component. Its `clk` and `reset` inputs are connected to the parent's.
    pub fn add_component(
        &mut self,
        parent: ComponentId,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> ComponentId {
        self.push_component(Some(parent), name.into(), kind.into())
    }

    fn push_signal(
        &mut self,
        owner: ComponentId,
        name: String,
        dir: Direction,
        ty: DataType,
        interface: Option<InterfaceId>,
    ) -> SignalId {
        let id = SignalId(self.hier.signals.len());
        self.hier.signals.push(SignalInfo {
            name,
            owner,
            dir,
            ty,
            interface,
        });
        self.hier.components[owner.index()].signals.push(id);
        id
    }

    pub fn add_port(
        &mut self,
        comp: ComponentId,
        name: impl Into<String>,
        dir: Direction,
        ty: DataType,
    ) -> SignalId {
        self.push_signal(comp, name.into(), dir, ty, None)
    }

    pub fn add_input(&mut self, comp: ComponentId, name: impl Into<String>, ty: DataType) -> SignalId {
        self.add_port(comp, name, Direction::In, ty)
    }

    pub fn add_output(&mut self, comp: ComponentId, name: impl Into<String>, ty: DataType) -> SignalId {
        self.add_port(comp, name, Direction::Out, ty)
    }

    /// Adds a wire, visible only inside `comp`.
    pub fn add_wire(&mut self, comp: ComponentId, name: impl Into<String>, ty: DataType) -> SignalId {
        self.add_port(comp, name, Direction::Wire, ty)
    }

    /// Adds `count` ports named `name[0]`, `name[1]`, ...
    pub fn add_port_array(
        &mut self,
        comp: ComponentId,
        name: &str,
        dir: Direction,
        ty: DataType,
        count: usize,
    ) -> Vec<SignalId> {
        (0..count)
            .map(|i| self.add_port(comp, format!("{name}[{i}]"), dir, ty.clone()))
            .collect()
    }

    /// Instantiates an interface on `comp`. Member ports are named `name.member`.
    pub fn add_interface(
        &mut self,
        comp: ComponentId,
        name: impl Into<String>,
        desc: &InterfaceDesc,
        polarity: Polarity,
    ) -> InterfaceId {
        let id = self.instantiate(comp, name.into(), desc, polarity);
        self.hier.components[comp.index()].interfaces.push(id);
        id
    }

    pub fn add_interface_array(
        &mut self,
        comp: ComponentId,
        name: &str,
        desc: &InterfaceDesc,
        polarity: Polarity,
        count: usize,
    ) -> Vec<InterfaceId> {
        (0..count)
            .map(|i| self.add_interface(comp, format!("{name}[{i}]"), desc, polarity))
            .collect()
    }

    fn instantiate(
        &mut self,
        comp: ComponentId,
        name: String,
        desc: &InterfaceDesc,
        polarity: Polarity,
    ) -> InterfaceId {
        let id = InterfaceId(self.hier.interfaces.len());
        self.hier.interfaces.push(InterfaceInfo {
            name: name.clone(),
            owner: comp,
            kind: desc.kind.clone(),
            polarity,
            members: Vec::new(),
        });
        let mut members = Vec::with_capacity(desc.members.len());
        for member in &desc.members {
            let slot = match member {
                InterfaceMember::Port { name: m, dir, ty } => IfcSlot::Signal(self.push_signal(
                    comp,
                    format!("{name}.{m}"),
                    polarity.apply(*dir),
                    ty.clone(),
                    Some(id),
                )),
                InterfaceMember::Sub {
                    name: m,
                    desc: sub,
                    polarity: inner,
                } => IfcSlot::Interface(self.instantiate(
                    comp,
                    format!("{name}.{m}"),
                    sub,
                    polarity.compose(*inner),
                )),
            };
            members.push((member.name().to_string(), slot));
        }
        self.hier.interfaces[id.index()].members = members;
        id
    }

    /// Member port of an interface instance.
    ///
    /// # Panics
    /// Panics if the interface has no such member; this is a declaration bug.
    pub fn port(&self, ifc: InterfaceId, member: &str) -> SignalId {
        match self.hier.interface_member(ifc, member) {
            Some(sig) => sig,
            None => panic!(
                "interface {} has no member '{member}'",
                self.hier.interface_path(ifc)
            ),
        }
    }

    pub fn clk(&self, comp: ComponentId) -> SignalId {
        self.hier.component(comp).clk
    }

    pub fn reset(&self, comp: ComponentId) -> SignalId {
        self.hier.component(comp).reset
    }

    /// Joins two signals into one net. Checked at elaboration.
    pub fn connect(&mut self, a: SignalId, b: SignalId) {
        self.connections.push(Connection::Signals(a, b));
    }

    /// Connects two like-shaped interfaces member by member.
    pub fn connect_interfaces(&mut self, a: InterfaceId, b: InterfaceId) {
        self.connections.push(Connection::Interfaces(a, b));
    }

    pub fn add_block(&mut self, comp: ComponentId, spec: BlockSpec) -> BlockId {
        let id = BlockId(self.hier.blocks.len());
        self.hier.blocks.push(BlockInfo {
            name: spec.name.clone(),
            owner: comp,
            kind: spec.kind,
        });
        self.hier.components[comp.index()].blocks.push(id);
        self.specs.push(spec);
        id
    }

    /// Requires every block in `before` to run before every block in `after` within a tick.
    pub fn add_constraint(&mut self, before: impl Into<ConstraintTarget>, after: impl Into<ConstraintTarget>) {
        self.constraints.push((before.into(), after.into()));
    }

    pub fn set_line_trace<F>(&mut self, comp: ComponentId, trace: F)
    where
        F: Fn(&dyn SignalPeek) -> String + Send + Sync + 'static,
    {
        self.line_traces.retain(|(c, _)| *c != comp);
        self.line_traces.push((comp, Box::new(trace)));
    }

    /// Resolves connections, registers blocks and computes the schedule.
    pub fn elaborate(self) -> Result<Design, ElabError> {
        debug!(
            components = self.hier.components.len(),
            signals = self.hier.signals.len(),
            blocks = self.specs.len(),
            connections = self.connections.len(),
            "elaborating design"
        );
        design::elaborate(
            self.hier,
            self.specs,
            self.connections,
            self.constraints,
            self.line_traces,
        )
    }
}
