//! Message source and sink for val/rdy test harnesses.
//!
//! Both are native (simulation-only) components. Their state lives behind a
//! shared handle, so a test can keep the handle and ask whether the run is
//! done after the design has moved into a simulator.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bits::Bits;
use crate::block::BlockSpec;
use crate::component::DesignBuilder;
use crate::dtype::DataType;
use crate::signal::Polarity;
use crate::stdlib::ifcs::{in_val_rdy, valrdy_to_str};
use crate::types::{ComponentId, InterfaceId};

/// Idle cycles before the first transfer and between transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delays {
    pub initial: u64,
    pub interval: u64,
}

impl Delays {
    pub fn new(initial: u64, interval: u64) -> Self {
        Self { initial, interval }
    }
}

#[derive(Debug)]
struct SourceState {
    msgs: Vec<Bits>,
    pending: VecDeque<Bits>,
    delay: u64,
}

/// Sends a fixed list of messages over a flipped `InValRdy` interface.
#[derive(Clone, Debug)]
pub struct TestSource {
    pub comp: ComponentId,
    pub send: InterfaceId,
    state: Arc<Mutex<SourceState>>,
}

impl TestSource {
    pub fn build(
        b: &mut DesignBuilder,
        parent: ComponentId,
        name: &str,
        ty: DataType,
        msgs: Vec<Bits>,
        delays: Delays,
    ) -> Self {
        let comp = b.add_component(parent, name, "TestSource");
        let send = b.add_interface(comp, "send", &in_val_rdy(ty), Polarity::Flipped);
        let (msg, val, rdy) = (b.port(send, "msg"), b.port(send, "val"), b.port(send, "rdy"));
        let reset = b.reset(comp);

        let state = Arc::new(Mutex::new(SourceState {
            pending: msgs.iter().copied().collect(),
            msgs,
            delay: delays.initial,
        }));

        let shared = Arc::clone(&state);
        b.add_block(
            comp,
            BlockSpec::native_comb("up_send", move |io| {
                let st = shared.lock();
                let front = st.pending.front().copied();
                match front {
                    Some(m) if !io.read(reset).is_nonzero() && st.delay == 0 => {
                        io.write(msg, m);
                        io.write(val, Bits::from_bool(true));
                    }
                    _ => io.write(val, Bits::from_bool(false)),
                }
            })
            .reads([reset])
            .writes([msg, val]),
        );

        let shared = Arc::clone(&state);
        b.add_block(
            comp,
            BlockSpec::native_seq("up_tick", move |io| {
                let mut st = shared.lock();
                if io.read(reset).is_nonzero() {
                    st.pending = st.msgs.iter().copied().collect();
                    st.delay = delays.initial;
                } else if io.read(val).is_nonzero() && io.read(rdy).is_nonzero() {
                    st.pending.pop_front();
                    st.delay = delays.interval;
                } else if st.delay > 0 {
                    st.delay -= 1;
                }
            })
            .reads([reset, val, rdy]),
        );

        b.set_line_trace(comp, move |v| {
            valrdy_to_str(v.peek(msg), v.peek(val).is_nonzero(), v.peek(rdy).is_nonzero())
        });

        Self { comp, send, state }
    }

    /// All messages have been accepted.
    pub fn done(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// A received message that did not match the expected one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    /// `None` when more messages arrived than were expected.
    pub expected: Option<Bits>,
    pub actual: Bits,
}

#[derive(Debug)]
struct SinkState {
    expected: Vec<Bits>,
    received: Vec<Bits>,
    mismatches: Vec<Mismatch>,
    delay: u64,
}

/// Accepts messages over an `InValRdy` interface and checks them in order.
///
/// Mismatches are recorded rather than raised, so a test can report all of
/// them once the run ends.
#[derive(Clone, Debug)]
pub struct TestSink {
    pub comp: ComponentId,
    pub recv: InterfaceId,
    state: Arc<Mutex<SinkState>>,
}

impl TestSink {
    pub fn build(
        b: &mut DesignBuilder,
        parent: ComponentId,
        name: &str,
        ty: DataType,
        expected: Vec<Bits>,
        delays: Delays,
    ) -> Self {
        let comp = b.add_component(parent, name, "TestSink");
        let recv = b.add_interface(comp, "recv", &in_val_rdy(ty), Polarity::Normal);
        let (msg, val, rdy) = (b.port(recv, "msg"), b.port(recv, "val"), b.port(recv, "rdy"));
        let reset = b.reset(comp);

        let state = Arc::new(Mutex::new(SinkState {
            expected,
            received: Vec::new(),
            mismatches: Vec::new(),
            delay: delays.initial,
        }));

        let shared = Arc::clone(&state);
        b.add_block(
            comp,
            BlockSpec::native_comb("up_recv_rdy", move |io| {
                let ready = !io.read(reset).is_nonzero() && shared.lock().delay == 0;
                io.write(rdy, Bits::from_bool(ready));
            })
            .reads([reset])
            .writes([rdy]),
        );

        let shared = Arc::clone(&state);
        b.add_block(
            comp,
            BlockSpec::native_seq("up_tick", move |io| {
                let mut st = shared.lock();
                if io.read(reset).is_nonzero() {
                    st.received.clear();
                    st.mismatches.clear();
                    st.delay = delays.initial;
                } else if io.read(val).is_nonzero() && io.read(rdy).is_nonzero() {
                    let actual = io.read(msg);
                    let index = st.received.len();
                    let expected = st.expected.get(index).copied();
                    if expected != Some(actual) {
                        st.mismatches.push(Mismatch {
                            index,
                            expected,
                            actual,
                        });
                    }
                    st.received.push(actual);
                    st.delay = delays.interval;
                } else if st.delay > 0 {
                    st.delay -= 1;
                }
            })
            .reads([reset, msg, val, rdy]),
        );

        b.set_line_trace(comp, move |v| {
            valrdy_to_str(v.peek(msg), v.peek(val).is_nonzero(), v.peek(rdy).is_nonzero())
        });

        Self { comp, recv, state }
    }

    /// Every expected message has arrived.
    pub fn done(&self) -> bool {
        let st = self.state.lock();
        st.received.len() >= st.expected.len()
    }

    pub fn received(&self) -> Vec<Bits> {
        self.state.lock().received.clone()
    }

    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.state.lock().mismatches.clone()
    }
}
