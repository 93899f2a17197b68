//! Single-entry pipelined queue.

use crate::block::BlockSpec;
use crate::component::DesignBuilder;
use crate::dtype::DataType;
use crate::ir::{Expr, Stmt};
use crate::signal::Polarity;
use crate::stdlib::ifcs::{in_val_rdy, valrdy_to_str};
use crate::types::{ComponentId, InterfaceId};

/// A one-entry val/rdy queue that can accept a new message in the same
/// cycle its current message leaves. Written in behavioral IR, so it
/// translates.
#[derive(Clone, Copy, Debug)]
pub struct PipeQueue {
    pub comp: ComponentId,
    /// Receiving side.
    pub enq: InterfaceId,
    /// Sending side (`InValRdy`, flipped).
    pub deq: InterfaceId,
}

impl PipeQueue {
    pub fn build(b: &mut DesignBuilder, parent: ComponentId, name: &str, ty: DataType) -> Self {
        let comp = b.add_component(parent, name, "PipeQueue");
        let desc = in_val_rdy(ty);
        let enq = b.add_interface(comp, "enq", &desc, Polarity::Normal);
        let deq = b.add_interface(comp, "deq", &desc, Polarity::Flipped);

        let enq_msg = b.port(enq, "msg");
        let enq_val = b.port(enq, "val");
        let enq_rdy = b.port(enq, "rdy");
        let deq_msg = b.port(deq, "msg");
        let deq_val = b.port(deq, "val");
        let deq_rdy = b.port(deq, "rdy");
        let reset = b.reset(comp);

        b.add_block(
            comp,
            BlockSpec::comb(
                "up_enq_rdy",
                vec![Stmt::assign(enq_rdy, !Expr::sig(deq_val) | deq_rdy)],
            ),
        );
        b.add_block(
            comp,
            BlockSpec::seq(
                "up_state",
                vec![Stmt::when_else(
                    reset,
                    vec![Stmt::assign(deq_val, Expr::lit(1, 0))],
                    vec![Stmt::when(
                        enq_rdy,
                        vec![
                            Stmt::assign(deq_val, enq_val),
                            Stmt::assign(deq_msg, enq_msg),
                        ],
                    )],
                )],
            ),
        );

        b.set_line_trace(comp, move |v| {
            format!(
                "{}({})",
                valrdy_to_str(v.peek(enq_msg), v.peek(enq_val).is_nonzero(), v.peek(enq_rdy).is_nonzero()),
                valrdy_to_str(v.peek(deq_msg), v.peek(deq_val).is_nonzero(), v.peek(deq_rdy).is_nonzero()),
            )
        });

        Self { comp, enq, deq }
    }
}
