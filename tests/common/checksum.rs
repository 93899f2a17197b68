//! Checksum unit built from behavioral blocks.
//!
//! Eight 16-bit words arrive one at a time on a val/rdy input. A word
//! accumulator packs them into one message, a chain of registered stages
//! folds them into Fletcher-style sums, and a pipe queue buffers the 32-bit
//! result.

use tickhdl::stdlib::{in_val_rdy, Delays, PipeQueue, TestSink, TestSource};
use tickhdl::{
    Bits, BlockSpec, ComponentId, DataType, DesignBuilder, Expr, InterfaceDesc, InterfaceId,
    LValue, Polarity, SignalId, SimError, Simulator, Stmt, StructType, Tick,
};

pub const WORDS: usize = 8;

pub fn words_type() -> DataType {
    DataType::array(DataType::bits(16), vec![WORDS as u32])
}

pub fn sums_type() -> DataType {
    DataType::Struct(
        StructType::new("Sums")
            .field("sum2", DataType::bits(16))
            .field("sum1", DataType::bits(16)),
    )
}

/// val/rdy channel carrying the packed words and the partial sums.
pub fn state_ifc() -> InterfaceDesc {
    InterfaceDesc::new("ChecksumState")
        .input("words", words_type())
        .input("sums", sums_type())
        .input("val", DataType::bits(1))
        .output("rdy", DataType::bits(1))
}

/// Reference model.
pub fn checksum(words: &[u16]) -> u32 {
    let (mut sum1, mut sum2) = (0u32, 0u32);
    for &w in words {
        sum1 = (sum1 + u32::from(w)) & 0xffff;
        sum2 = (sum2 + sum1) & 0xffff;
    }
    (sum2 << 16) | sum1
}

struct Ports {
    msg: SignalId,
    val: SignalId,
    rdy: SignalId,
}

fn val_rdy(b: &DesignBuilder, ifc: InterfaceId) -> Ports {
    Ports {
        msg: b.port(ifc, "msg"),
        val: b.port(ifc, "val"),
        rdy: b.port(ifc, "rdy"),
    }
}

/// Collects eight words into the `words` field of its output.
pub fn word_accumulator(b: &mut DesignBuilder, parent: ComponentId, name: &str) -> (ComponentId, InterfaceId, InterfaceId) {
    let comp = b.add_component(parent, name, "WordAccumulator");
    let recv = b.add_interface(comp, "recv", &in_val_rdy(DataType::bits(16)), Polarity::Normal);
    let send = b.add_interface(comp, "send", &state_ifc(), Polarity::Flipped);
    let count = b.add_wire(comp, "count", DataType::bits(3));
    let inp = val_rdy(b, recv);
    let words = b.port(send, "words");
    let sums = b.port(send, "sums");
    let val = b.port(send, "val");
    let rdy = b.port(send, "rdy");
    let reset = b.reset(comp);

    b.add_block(
        comp,
        BlockSpec::comb("up_recv_rdy", vec![Stmt::assign(inp.rdy, !Expr::sig(val) | rdy)]),
    );
    b.add_block(
        comp,
        BlockSpec::seq(
            "up_accumulate",
            vec![Stmt::when_else(
                reset,
                vec![
                    Stmt::assign(count, Expr::lit(3, 0)),
                    Stmt::assign(val, Expr::lit(1, 0)),
                    Stmt::assign(sums, Expr::lit(32, 0)),
                ],
                vec![
                    Stmt::when(Expr::sig(val) & rdy, vec![Stmt::assign(val, Expr::lit(1, 0))]),
                    Stmt::when(
                        Expr::sig(inp.val) & inp.rdy,
                        vec![
                            Stmt::assign(LValue::from(words).index(count), inp.msg),
                            Stmt::assign(count, Expr::sig(count) + Expr::lit(3, 1)),
                            Stmt::when(
                                Expr::sig(count).equals(Expr::lit(3, 7)),
                                vec![Stmt::assign(val, Expr::lit(1, 1))],
                            ),
                        ],
                    ),
                ],
            )],
        ),
    );
    (comp, recv, send)
}

/// Folds words `lo..hi` into the running sums.
pub fn checksum_stage(
    b: &mut DesignBuilder,
    parent: ComponentId,
    name: &str,
    lo: usize,
    hi: usize,
) -> (ComponentId, InterfaceId, InterfaceId) {
    let comp = b.add_component(parent, name, "ChecksumStage");
    let recv = b.add_interface(comp, "recv", &state_ifc(), Polarity::Normal);
    let send = b.add_interface(comp, "send", &state_ifc(), Polarity::Flipped);
    let (in_words, in_sums, in_val, in_rdy) = (
        b.port(recv, "words"),
        b.port(recv, "sums"),
        b.port(recv, "val"),
        b.port(recv, "rdy"),
    );
    let (out_words, out_sums, out_val, out_rdy) = (
        b.port(send, "words"),
        b.port(send, "sums"),
        b.port(send, "val"),
        b.port(send, "rdy"),
    );
    let reset = b.reset(comp);

    let mut sum1 = Expr::sig(in_sums).field("sum1");
    let mut sum2 = Expr::sig(in_sums).field("sum2");
    for i in lo..hi {
        sum1 = sum1 + Expr::sig(in_words).index(Expr::lit(3, i as u128));
        sum2 = sum2 + sum1.clone();
    }

    b.add_block(
        comp,
        BlockSpec::comb("up_recv_rdy", vec![Stmt::assign(in_rdy, !Expr::sig(out_val) | out_rdy)]),
    );
    b.add_block(
        comp,
        BlockSpec::seq(
            "up_stage",
            vec![Stmt::when_else(
                reset,
                vec![Stmt::assign(out_val, Expr::lit(1, 0))],
                vec![Stmt::when(
                    in_rdy,
                    vec![
                        Stmt::assign(out_val, in_val),
                        Stmt::assign(out_words, in_words),
                        Stmt::assign(LValue::from(out_sums).field("sum1"), sum1),
                        Stmt::assign(LValue::from(out_sums).field("sum2"), sum2),
                    ],
                )],
            )],
        ),
    );
    (comp, recv, send)
}

/// Presents the finished sums as a 32-bit val/rdy message.
pub fn checksum_output(b: &mut DesignBuilder, parent: ComponentId, name: &str) -> (ComponentId, InterfaceId, InterfaceId) {
    let comp = b.add_component(parent, name, "ChecksumOutput");
    let recv = b.add_interface(comp, "recv", &state_ifc(), Polarity::Normal);
    let send = b.add_interface(comp, "send", &in_val_rdy(DataType::bits(32)), Polarity::Flipped);
    let out = val_rdy(b, send);
    let (sums, val, rdy) = (b.port(recv, "sums"), b.port(recv, "val"), b.port(recv, "rdy"));

    b.add_block(
        comp,
        BlockSpec::comb(
            "up_forward",
            vec![
                Stmt::assign(out.msg, sums),
                Stmt::assign(out.val, val),
                Stmt::assign(rdy, out.rdy),
            ],
        ),
    );
    (comp, recv, send)
}

/// The whole unit: accumulator, `stages` folding stages, output and queue.
#[derive(Clone, Copy, Debug)]
pub struct ChecksumUnit {
    pub comp: ComponentId,
    pub recv: InterfaceId,
    pub send: InterfaceId,
}

impl ChecksumUnit {
    pub fn build(b: &mut DesignBuilder, parent: ComponentId, name: &str, stages: usize) -> Self {
        assert!((1..=WORDS).contains(&stages));
        let comp = b.add_component(parent, name, "ChecksumUnit");
        let recv = b.add_interface(comp, "recv", &in_val_rdy(DataType::bits(16)), Polarity::Normal);
        let send = b.add_interface(comp, "send", &in_val_rdy(DataType::bits(32)), Polarity::Flipped);

        let (_, acc_recv, mut prev) = word_accumulator(b, comp, "acc");
        b.connect_interfaces(recv, acc_recv);
        for k in 0..stages {
            let (lo, hi) = (WORDS * k / stages, WORDS * (k + 1) / stages);
            let (_, stage_recv, stage_send) = checksum_stage(b, comp, &format!("stage{k}"), lo, hi);
            b.connect_interfaces(prev, stage_recv);
            prev = stage_send;
        }
        let (_, out_recv, out_send) = checksum_output(b, comp, "out");
        b.connect_interfaces(prev, out_recv);

        let queue = PipeQueue::build(b, comp, "queue", DataType::bits(32));
        b.connect_interfaces(out_send, queue.enq);
        b.connect_interfaces(queue.deq, send);

        Self { comp, recv, send }
    }
}

pub fn word_bits(msgs: &[[u16; WORDS]]) -> Vec<Bits> {
    msgs.iter()
        .flat_map(|m| m.iter().map(|w| Bits::new(16, u128::from(*w))))
        .collect()
}

pub fn checksum_bits(msgs: &[[u16; WORDS]]) -> Vec<Bits> {
    msgs.iter()
        .map(|m| Bits::new(32, u128::from(checksum(m))))
        .collect()
}

/// Source, checksum unit and sink wired together and reset.
pub struct Harness {
    pub sim: Simulator,
    pub src: TestSource,
    pub sink: TestSink,
}

impl Harness {
    pub fn new(stages: usize, msgs: &[[u16; WORDS]], src_delays: Delays, sink_delays: Delays) -> Self {
        let mut b = DesignBuilder::new("top", "ChecksumHarness");
        let top = b.top();
        let src = TestSource::build(&mut b, top, "src", DataType::bits(16), word_bits(msgs), src_delays);
        let unit = ChecksumUnit::build(&mut b, top, "dut", stages);
        let sink = TestSink::build(&mut b, top, "sink", DataType::bits(32), checksum_bits(msgs), sink_delays);
        b.connect_interfaces(src.send, unit.recv);
        b.connect_interfaces(unit.send, sink.recv);

        let mut sim = Simulator::new(b.elaborate().expect("checksum harness elaborates"));
        sim.reset();
        Self { sim, src, sink }
    }

    pub fn run(&mut self, max_ticks: Tick) -> Result<Tick, SimError> {
        let (src, sink) = (&self.src, &self.sink);
        self.sim.run_until(|_| src.done() && sink.done(), max_ticks)
    }
}
