//! Ports, wires and interfaces.

use serde::{Deserialize, Serialize};

use crate::dtype::DataType;
use crate::types::{ComponentId, InterfaceId, SignalId};

/// Direction of a signal relative to its owning component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
    /// Internal storage or net, invisible outside the component.
    Wire,
}

impl Direction {
    /// Swaps `In` and `Out`. Wires are unaffected.
    pub fn flip(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
            Direction::Wire => Direction::Wire,
        }
    }

    pub fn is_port(self) -> bool {
        !matches!(self, Direction::Wire)
    }
}

/// How an interface instance is oriented relative to its descriptor.
///
/// A receiver instantiates the descriptor as written; the matching sender
/// instantiates it `Flipped`, so every member direction is inverted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    Normal,
    Flipped,
}

impl Polarity {
    pub fn apply(self, dir: Direction) -> Direction {
        match self {
            Polarity::Normal => dir,
            Polarity::Flipped => dir.flip(),
        }
    }

    pub fn compose(self, inner: Polarity) -> Polarity {
        if self == inner {
            Polarity::Normal
        } else {
            Polarity::Flipped
        }
    }

    pub fn opposite(self) -> Polarity {
        self.compose(Polarity::Flipped)
    }
}

/// A reusable bundle of ports, possibly containing nested bundles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceDesc {
    pub kind: String,
    pub members: Vec<InterfaceMember>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceMember {
    Port {
        name: String,
        dir: Direction,
        ty: DataType,
    },
    Sub {
        name: String,
        desc: InterfaceDesc,
        polarity: Polarity,
    },
}

impl InterfaceMember {
    pub fn name(&self) -> &str {
        match self {
            InterfaceMember::Port { name, .. } | InterfaceMember::Sub { name, .. } => name,
        }
    }
}

impl InterfaceDesc {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            members: Vec::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, ty: DataType) -> Self {
        self.members.push(InterfaceMember::Port {
            name: name.into(),
            dir: Direction::In,
            ty,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, ty: DataType) -> Self {
        self.members.push(InterfaceMember::Port {
            name: name.into(),
            dir: Direction::Out,
            ty,
        });
        self
    }

    /// Nests another interface under `name`.
    pub fn sub(mut self, name: impl Into<String>, desc: InterfaceDesc, polarity: Polarity) -> Self {
        self.members.push(InterfaceMember::Sub {
            name: name.into(),
            desc,
            polarity,
        });
        self
    }

    /// Finds a direct port member.
    pub fn port(&self, name: &str) -> Option<(Direction, &DataType)> {
        self.members.iter().find_map(|m| match m {
            InterfaceMember::Port { name: n, dir, ty } if n == name => Some((*dir, ty)),
            _ => None,
        })
    }
}

/// A declared port or wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalInfo {
    /// Name local to the owner. Interface members are named `ifc.member`.
    pub name: String,
    pub owner: ComponentId,
    pub dir: Direction,
    pub ty: DataType,
    pub interface: Option<InterfaceId>,
}

/// An interface instance on a component.
#[derive(Clone, Debug)]
pub struct InterfaceInfo {
    pub name: String,
    pub owner: ComponentId,
    pub kind: String,
    pub polarity: Polarity,
    pub members: Vec<(String, IfcSlot)>,
}

/// What an interface member resolved to at instantiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IfcSlot {
    Signal(SignalId),
    Interface(InterfaceId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip() {
        assert_eq!(Direction::In.flip(), Direction::Out);
        assert_eq!(Direction::Out.flip(), Direction::In);
        assert_eq!(Direction::Wire.flip(), Direction::Wire);
    }

    #[test]
    fn test_polarity_compose() {
        let p = Polarity::Flipped;
        assert_eq!(p.compose(Polarity::Flipped), Polarity::Normal);
        assert_eq!(p.compose(Polarity::Normal), Polarity::Flipped);
        assert_eq!(Polarity::Flipped.apply(Direction::In), Direction::Out);
        assert_eq!(Polarity::Normal.opposite(), Polarity::Flipped);
    }

    #[test]
    fn test_desc_builder() {
        let desc = InterfaceDesc::new("ValRdy")
            .input("msg", DataType::bits(8))
            .input("val", DataType::bits(1))
            .output("rdy", DataType::bits(1));
        assert_eq!(desc.members.len(), 3);
        assert_eq!(desc.port("rdy"), Some((Direction::Out, &DataType::bits(1))));
        assert!(desc.port("en").is_none());
    }
}
