//! Standard handshake interfaces.
//!
//! Both descriptors are written from the receiver's side. A sender
//! instantiates them with [`Polarity::Flipped`](crate::signal::Polarity).

use crate::bits::Bits;
use crate::dtype::DataType;
use crate::signal::InterfaceDesc;

/// Latency-insensitive val/rdy: a message transfers on every cycle where
/// both `val` and `rdy` are high.
pub fn in_val_rdy(ty: DataType) -> InterfaceDesc {
    InterfaceDesc::new("InValRdy")
        .input("msg", ty)
        .input("val", DataType::bits(1))
        .output("rdy", DataType::bits(1))
}

/// en/rdy: the sender may only raise `en` while `rdy` is high, and a
/// message transfers on every cycle `en` is high.
pub fn recv_en_rdy(ty: DataType) -> InterfaceDesc {
    InterfaceDesc::new("RecvEnRdy")
        .input("msg", ty)
        .input("en", DataType::bits(1))
        .output("rdy", DataType::bits(1))
}

/// Fixed-width trace of a val/rdy channel: the message on a transfer, `#`
/// when stalled by the receiver, blank when the receiver waits, `.` when idle.
pub fn valrdy_to_str(msg: Bits, val: bool, rdy: bool) -> String {
    let width = msg.to_string().len();
    match (val, rdy) {
        (true, true) => msg.to_string(),
        (true, false) => format!("{:<width$}", "#"),
        (false, true) => " ".repeat(width),
        (false, false) => format!("{:<width$}", "."),
    }
}

/// Fixed-width trace of an en/rdy channel: the message when enabled, `#`
/// when the receiver is not ready, blank otherwise.
pub fn enrdy_to_str(msg: Bits, en: bool, rdy: bool) -> String {
    let width = msg.to_string().len();
    if en {
        msg.to_string()
    } else if !rdy {
        format!("{:<width$}", "#")
    } else {
        " ".repeat(width)
    }
}
