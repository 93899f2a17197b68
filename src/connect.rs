//! Connection resolution: pairwise connect declarations to nets.
//!
//! Connections are merged with a union-find. Interface connections expand
//! into one signal connection per member, recursively. Every pair is checked
//! for type equality, adjacency and direction before it is merged, and each
//! finished net is checked for competing structural drivers.

use tracing::debug;

use crate::component::{Connection, Hierarchy};
use crate::error::StructuralError;
use crate::signal::{Direction, IfcSlot};
use crate::types::{ComponentId, InterfaceId, NetId, SignalId};

/// Who structurally drives a net.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetDriver {
    /// Nothing outside a block drives it; a block may.
    Undriven,
    /// A top-level input, set from outside the design.
    External,
    /// Output ports of this component, which must be written by one of its blocks.
    Component(ComponentId),
}

/// The partition of all signals into nets.
#[derive(Clone, Debug)]
pub struct NetList {
    net_of: Vec<NetId>,
    members: Vec<Vec<SignalId>>,
    drivers: Vec<NetDriver>,
}

impl NetList {
    pub fn net_of(&self, sig: SignalId) -> NetId {
        self.net_of[sig.index()]
    }

    /// Member signals in id order.
    pub fn members(&self, net: NetId) -> &[SignalId] {
        &self.members[net.index()]
    }

    pub fn driver(&self, net: NetId) -> NetDriver {
        self.drivers[net.index()]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn same_net(&self, a: SignalId, b: SignalId) -> bool {
        self.net_of(a) == self.net_of(b)
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Relation {
    Same,
    Siblings,
    /// The first endpoint's owner is the parent of the second's.
    ParentOf,
    ChildOf,
}

fn relation(hier: &Hierarchy, a: ComponentId, b: ComponentId) -> Option<Relation> {
    if a == b {
        return Some(Relation::Same);
    }
    let (pa, pb) = (hier.parent(a), hier.parent(b));
    if pa.is_some() && pa == pb {
        Some(Relation::Siblings)
    } else if pb == Some(a) {
        Some(Relation::ParentOf)
    } else if pa == Some(b) {
        Some(Relation::ChildOf)
    } else {
        None
    }
}

/// Checks one signal-to-signal connection.
fn check_pair(hier: &Hierarchy, a: SignalId, b: SignalId) -> Result<(), StructuralError> {
    let (sa, sb) = (hier.signal(a), hier.signal(b));
    let path = |s: SignalId| hier.signal_path(s);

    if sa.ty != sb.ty {
        return Err(StructuralError::TypeMismatch {
            a: path(a),
            b: path(b),
            a_ty: sa.ty.to_string(),
            b_ty: sb.ty.to_string(),
        });
    }

    let rel = relation(hier, sa.owner, sb.owner).ok_or_else(|| StructuralError::NotAdjacent {
        a: path(a),
        b: path(b),
    })?;

    // A wire may join its own component's signals or its children's ports.
    let wire_ok = |dir: Direction, rel_from_wire: Relation| {
        dir != Direction::Wire || matches!(rel_from_wire, Relation::Same | Relation::ParentOf)
    };
    let flip = |r: Relation| match r {
        Relation::ParentOf => Relation::ChildOf,
        Relation::ChildOf => Relation::ParentOf,
        other => other,
    };
    if !wire_ok(sa.dir, rel) {
        return Err(StructuralError::PrivateWire {
            wire: path(a),
            other: path(b),
        });
    }
    if !wire_ok(sb.dir, flip(rel)) {
        return Err(StructuralError::PrivateWire {
            wire: path(b),
            other: path(a),
        });
    }

    let conflict = match (rel, sa.dir, sb.dir) {
        (Relation::Same, Direction::Out, Direction::Out) => Some("both are outputs of one component"),
        (Relation::Siblings, Direction::Out, Direction::Out) => Some("both are sibling outputs"),
        (Relation::ParentOf, Direction::In, Direction::Out)
        | (Relation::ChildOf, Direction::Out, Direction::In) => {
            Some("a child output cannot drive its parent's input")
        }
        _ => None,
    };
    match conflict {
        Some(reason) => Err(StructuralError::DirectionConflict {
            a: path(a),
            b: path(b),
            reason,
        }),
        None => Ok(()),
    }
}

/// Expands an interface connection into member pairs.
fn expand_interfaces(
    hier: &Hierarchy,
    a: InterfaceId,
    b: InterfaceId,
    out: &mut Vec<(SignalId, SignalId)>,
) -> Result<(), StructuralError> {
    let (ia, ib) = (hier.interface(a), hier.interface(b));
    let mismatch = |detail: String| StructuralError::InterfaceMismatch {
        a: hier.interface_path(a),
        b: hier.interface_path(b),
        detail,
    };

    if ia.members.len() != ib.members.len() {
        return Err(mismatch(format!(
            "{} members vs {}",
            ia.members.len(),
            ib.members.len()
        )));
    }
    for (name, slot_a) in &ia.members {
        let slot_b = ib
            .members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
            .ok_or_else(|| mismatch(format!("member '{name}' missing")))?;
        match (*slot_a, slot_b) {
            (IfcSlot::Signal(x), IfcSlot::Signal(y)) => out.push((x, y)),
            (IfcSlot::Interface(x), IfcSlot::Interface(y)) => expand_interfaces(hier, x, y, out)?,
            _ => return Err(mismatch(format!("member '{name}' has different shapes"))),
        }
    }
    Ok(())
}

/// Partitions every declared signal into nets.
pub(crate) fn resolve(hier: &Hierarchy, connections: &[Connection]) -> Result<NetList, StructuralError> {
    let unknown = |endpoint: String| StructuralError::UnknownEndpoint { endpoint };
    let mut pairs = Vec::with_capacity(connections.len());
    for conn in connections {
        match *conn {
            Connection::Signals(a, b) => {
                if let Some(bad) = [a, b].into_iter().find(|s| s.index() >= hier.signal_count()) {
                    return Err(unknown(format!("{bad:?}")));
                }
                pairs.push((a, b));
            }
            Connection::Interfaces(a, b) => {
                if let Some(bad) = [a, b].into_iter().find(|i| i.index() >= hier.interface_count()) {
                    return Err(unknown(format!("{bad:?}")));
                }
                expand_interfaces(hier, a, b, &mut pairs)?;
            }
        }
    }

    let n = hier.signal_count();
    let mut uf = UnionFind::new(n);
    for &(a, b) in &pairs {
        if a == b {
            continue;
        }
        check_pair(hier, a, b)?;
        uf.union(a.index(), b.index());
    }

    // Net ids follow the lowest member id.
    let mut root_net: Vec<Option<NetId>> = vec![None; n];
    let mut net_of = Vec::with_capacity(n);
    let mut members: Vec<Vec<SignalId>> = Vec::new();
    for s in 0..n {
        let root = uf.find(s);
        let net = *root_net[root].get_or_insert_with(|| {
            members.push(Vec::new());
            NetId(members.len() - 1)
        });
        members[net.index()].push(SignalId(s));
        net_of.push(net);
    }

    let drivers = members
        .iter()
        .map(|m| net_driver(hier, m))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        signals = n,
        nets = members.len(),
        connections = pairs.len(),
        "resolved nets"
    );
    Ok(NetList {
        net_of,
        members,
        drivers,
    })
}

fn net_driver(hier: &Hierarchy, members: &[SignalId]) -> Result<NetDriver, StructuralError> {
    let root = hier.root();
    let mut parties: Vec<(NetDriver, SignalId)> = Vec::new();

    for &s in members {
        let info = hier.signal(s);
        let party = match info.dir {
            Direction::In if info.owner == root => NetDriver::External,
            Direction::Out => {
                let shadowed = members.iter().any(|&o| {
                    let other = hier.signal(o);
                    o != s && other.dir == Direction::Out && hier.is_ancestor(info.owner, other.owner)
                });
                if shadowed {
                    continue;
                }
                NetDriver::Component(info.owner)
            }
            _ => continue,
        };
        if !parties.iter().any(|(p, _)| *p == party) {
            parties.push((party, s));
        }
    }

    match parties.as_slice() {
        [] => Ok(NetDriver::Undriven),
        [(party, _)] => Ok(*party),
        _ => Err(StructuralError::MultipleDrivers {
            net: hier.signal_path(members[0]),
            drivers: parties
                .iter()
                .map(|(_, s)| hier.signal_path(*s))
                .collect(),
        }),
    }
}
