//! Generic method-call adapter.
//!
//! A [`MethodAdapter`] sits next to a component's handshake interface and
//! turns it into a method a test can call between ticks: the adapter drives
//! the enable and argument ports for one cycle and hands back the return
//! ports. It is configured entirely by a [`MethodSpec`], so one adapter
//! type serves every interface shape.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::bits::Bits;
use crate::block::{BlockSpec, SignalPeek};
use crate::component::{ConstraintTarget, DesignBuilder};
use crate::dtype::DataType;
use crate::signal::{Direction, InterfaceDesc, InterfaceMember, Polarity};
use crate::sim::Simulator;
use crate::types::{ComponentId, InterfaceId, SignalId, Tick};

/// Decides whether a method may be called in the current state.
pub type Guard = Arc<dyn Fn(&dyn SignalPeek) -> bool + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    #[error("method {method} is not ready")]
    NotReady { method: String },

    #[error("method {method} takes {expected} argument(s), got {got}")]
    ArityMismatch {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("method {method} was already called in cycle {cycle}")]
    AlreadyCalled { method: String, cycle: Tick },
}

/// The shape of one method, derived from an interface descriptor.
#[derive(Clone, Debug)]
pub struct MethodSpec {
    pub name: String,
    pub desc: InterfaceDesc,
    /// Polarity of the interface on the component being called.
    pub polarity: Polarity,
    pub enable: String,
    pub ready: String,
    /// Data members flowing into the callee, in declaration order.
    pub args: Vec<(String, DataType)>,
    /// Data members flowing out of the callee.
    pub rets: Vec<(String, DataType)>,
}

impl MethodSpec {
    /// Builds a spec for calling an interface instantiated with `polarity`.
    ///
    /// `enable` and `ready` name the handshake members; every other direct
    /// port member becomes an argument or a return value depending on which
    /// way it points. Nested sub-interfaces are not part of the method.
    pub fn from_interface(
        name: impl Into<String>,
        desc: &InterfaceDesc,
        polarity: Polarity,
        enable: impl Into<String>,
        ready: impl Into<String>,
    ) -> Self {
        let (enable, ready) = (enable.into(), ready.into());
        let mut args = Vec::new();
        let mut rets = Vec::new();
        for member in &desc.members {
            let InterfaceMember::Port { name, dir, ty } = member else {
                continue;
            };
            if *name == enable || *name == ready {
                continue;
            }
            match polarity.apply(*dir) {
                Direction::In => args.push((name.clone(), ty.clone())),
                Direction::Out => rets.push((name.clone(), ty.clone())),
                Direction::Wire => {}
            }
        }
        Self {
            name: name.into(),
            desc: desc.clone(),
            polarity,
            enable,
            ready,
            args,
            rets,
        }
    }
}

#[derive(Debug, Default)]
struct CallState {
    staged: Option<Vec<Bits>>,
    last_call: Option<Tick>,
}

/// Caller-side handle of a built adapter.
#[derive(Clone)]
pub struct MethodPort {
    name: String,
    enable: SignalId,
    args: Vec<SignalId>,
    rets: Vec<SignalId>,
    guard: Guard,
    state: Arc<Mutex<CallState>>,
}

impl MethodPort {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enable(&self) -> SignalId {
        self.enable
    }

    /// Replaces the guard. The default guard checks the ready port.
    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&dyn SignalPeek) -> bool + Send + Sync + 'static,
    {
        self.guard = Arc::new(guard);
        self
    }

    pub fn is_ready(&self, sim: &Simulator) -> bool {
        (self.guard)(sim as &dyn SignalPeek)
    }

    /// Calls the method for the current cycle.
    ///
    /// The arguments are driven until the next tick commits; the returned
    /// values are the return ports after combinational settling.
    pub fn call(&self, sim: &mut Simulator, args: &[Bits]) -> Result<Vec<Bits>, MethodError> {
        if args.len() != self.args.len() {
            return Err(MethodError::ArityMismatch {
                method: self.name.clone(),
                expected: self.args.len(),
                got: args.len(),
            });
        }
        let cycle = sim.cycle();
        if self.state.lock().last_call == Some(cycle) {
            return Err(MethodError::AlreadyCalled {
                method: self.name.clone(),
                cycle,
            });
        }
        if !self.is_ready(sim) {
            return Err(MethodError::NotReady {
                method: self.name.clone(),
            });
        }

        {
            let mut state = self.state.lock();
            state.staged = Some(args.to_vec());
            state.last_call = Some(cycle);
        }
        sim.eval_combinational();
        Ok(self.rets.iter().map(|r| sim.peek(*r)).collect())
    }
}

impl std::fmt::Debug for MethodPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodPort")
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("rets", &self.rets.len())
            .finish()
    }
}

/// A built adapter component.
#[derive(Clone, Debug)]
pub struct MethodAdapter {
    pub comp: ComponentId,
    /// Mirror of the callee's interface; connect it to the callee.
    pub ifc: InterfaceId,
    pub port: MethodPort,
}

impl MethodAdapter {
    pub fn build(b: &mut DesignBuilder, parent: ComponentId, name: &str, spec: &MethodSpec) -> Self {
        let comp = b.add_component(parent, name, "MethodAdapter");
        let ifc = b.add_interface(comp, &spec.name, &spec.desc, spec.polarity.opposite());
        let enable = b.port(ifc, &spec.enable);
        let ready = b.port(ifc, &spec.ready);
        let args: Vec<SignalId> = spec.args.iter().map(|(n, _)| b.port(ifc, n)).collect();
        let rets: Vec<SignalId> = spec.rets.iter().map(|(n, _)| b.port(ifc, n)).collect();

        let state = Arc::new(Mutex::new(CallState::default()));

        let shared = Arc::clone(&state);
        let arg_sigs = args.clone();
        let drive = b.add_block(
            comp,
            BlockSpec::native_comb("drive", move |io| {
                let state = shared.lock();
                match &state.staged {
                    Some(values) => {
                        io.write(enable, Bits::from_bool(true));
                        for (sig, value) in arg_sigs.iter().zip(values) {
                            io.write(*sig, *value);
                        }
                    }
                    None => io.write(enable, Bits::from_bool(false)),
                }
            })
            .writes(std::iter::once(enable).chain(args.iter().copied())),
        );

        let shared = Arc::clone(&state);
        let clear = b.add_block(
            comp,
            BlockSpec::native_seq("clear", move |_| {
                shared.lock().staged = None;
            })
            .reads([enable]),
        );

        b.add_constraint(drive, clear);
        b.add_constraint(drive, ConstraintTarget::read(enable));

        let port = MethodPort {
            name: spec.name.clone(),
            enable,
            args,
            rets,
            guard: Arc::new(move |v: &dyn SignalPeek| v.peek(ready).is_nonzero()),
            state,
        };
        Self { comp, ifc, port }
    }
}
