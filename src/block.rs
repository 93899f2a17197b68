//! Update blocks: units of behavior attached to a component.

use serde::{Deserialize, Serialize};

use crate::bits::Bits;
use crate::ir::Stmt;
use crate::types::SignalId;

/// When a block runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Runs every evaluation; writes are visible immediately.
    Comb,
    /// Runs once per clock edge; writes take effect at the end of the tick.
    Seq,
}

/// Read-only view of current signal values.
pub trait SignalPeek {
    fn peek(&self, sig: SignalId) -> Bits;
}

/// The view of signal values a running block gets.
pub trait SignalAccess {
    /// Current value of the signal's net.
    fn read(&self, sig: SignalId) -> Bits;

    /// Writes the whole signal. Sequential blocks stage the value until the tick commits.
    fn write(&mut self, sig: SignalId, value: Bits);

    /// The value a partial write should be merged into. For sequential blocks
    /// this includes values staged earlier in the same tick.
    fn write_base(&self, sig: SignalId) -> Bits {
        self.read(sig)
    }
}

/// Simulation-only behavior. It cannot be inspected, so its access sets must be declared.
pub type NativeFn = Box<dyn FnMut(&mut dyn SignalAccess) + Send>;

pub enum UpdateBody {
    Behavioral(Vec<Stmt>),
    Native(NativeFn),
}

impl std::fmt::Debug for UpdateBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateBody::Behavioral(stmts) => f.debug_tuple("Behavioral").field(&stmts.len()).finish(),
            UpdateBody::Native(_) => f.write_str("Native"),
        }
    }
}

/// A block as declared, before elaboration.
#[derive(Debug)]
pub struct BlockSpec {
    pub name: String,
    pub kind: UpdateKind,
    pub body: UpdateBody,
    pub reads: Vec<SignalId>,
    pub writes: Vec<SignalId>,
}

impl BlockSpec {
    fn with_body(name: impl Into<String>, kind: UpdateKind, body: UpdateBody) -> Self {
        Self {
            name: name.into(),
            kind,
            body,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn comb(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self::with_body(name, UpdateKind::Comb, UpdateBody::Behavioral(stmts))
    }

    pub fn seq(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self::with_body(name, UpdateKind::Seq, UpdateBody::Behavioral(stmts))
    }

    pub fn native_comb<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut dyn SignalAccess) + Send + 'static,
    {
        Self::with_body(name, UpdateKind::Comb, UpdateBody::Native(Box::new(f)))
    }

    pub fn native_seq<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut dyn SignalAccess) + Send + 'static,
    {
        Self::with_body(name, UpdateKind::Seq, UpdateBody::Native(Box::new(f)))
    }

    /// Declares signals the block reads, in addition to any inferred from its body.
    pub fn reads(mut self, sigs: impl IntoIterator<Item = SignalId>) -> Self {
        self.reads.extend(sigs);
        self
    }

    /// Declares signals the block writes.
    pub fn writes(mut self, sigs: impl IntoIterator<Item = SignalId>) -> Self {
        self.writes.extend(sigs);
        self
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, UpdateBody::Native(_))
    }
}
