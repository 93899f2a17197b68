//! Library components: handshake interfaces, a queue, test sources and
//! sinks, and the method-call adapter.

pub mod adapter;
pub mod ifcs;
pub mod queue;
pub mod test_src_sink;

pub use adapter::{MethodAdapter, MethodError, MethodPort, MethodSpec};
pub use ifcs::{enrdy_to_str, in_val_rdy, recv_en_rdy, valrdy_to_str};
pub use queue::PipeQueue;
pub use test_src_sink::{Delays, Mismatch, TestSink, TestSource};
