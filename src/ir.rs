//! Behavioral intermediate representation for update-block bodies.
//!
//! Bodies are written as a small typed AST ([`Expr`], [`LValue`], [`Stmt`]).
//! Elaboration checks them against the declared signal types and lowers them
//! to an offset-resolved form that both the simulator and the translator
//! consume. Width rules:
//!
//! - arithmetic and bitwise operators produce the wider operand width,
//!   operands are zero-extended and the result wraps;
//! - shifts keep the width of the left operand;
//! - comparisons, logical operators and reductions are one bit;
//! - an assignment truncates or zero-extends the value to the target.

use std::ops;

use crate::bits::{Bits, MAX_WIDTH};
use crate::block::SignalPeek;
use crate::component::Hierarchy;
use crate::dtype::DataType;
use crate::types::SignalId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    LogicNot,
    ReduceAnd,
    ReduceOr,
    ReduceXor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicAnd,
    LogicOr,
}

impl BinaryOp {
    /// Result is a single bit regardless of operand widths.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::LogicAnd
                | BinaryOp::LogicOr
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }
}

/// An expression over signal values.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Sig(SignalId),
    Const(Bits),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Mux {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Static part-select of `width` bits starting at `lo`.
    Slice {
        base: Box<Expr>,
        lo: u32,
        width: u32,
    },
    /// Operands from most to least significant.
    Concat(Vec<Expr>),
    Field {
        base: Box<Expr>,
        name: String,
    },
    /// Element select on an array, or bit select on a vector.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Resize {
        expr: Box<Expr>,
        width: u32,
    },
}

impl From<SignalId> for Expr {
    fn from(sig: SignalId) -> Self {
        Expr::Sig(sig)
    }
}

impl From<Bits> for Expr {
    fn from(value: Bits) -> Self {
        Expr::Const(value)
    }
}

impl Expr {
    pub fn sig(sig: SignalId) -> Self {
        Expr::Sig(sig)
    }

    pub fn lit(width: u32, value: u128) -> Self {
        Expr::Const(Bits::new(width, value))
    }

    pub fn mux(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Expr::Mux {
            cond: Box::new(cond.into()),
            then: Box::new(then.into()),
            otherwise: Box::new(otherwise.into()),
        }
    }

    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Concat(parts.into_iter().collect())
    }

    pub fn binary(op: BinaryOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Expr::Binary(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    fn unary(self, op: UnaryOp) -> Self {
        Expr::Unary(op, Box::new(self))
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Ne, self, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Le, self, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn logic_and(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LogicAnd, self, rhs)
    }

    pub fn logic_or(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LogicOr, self, rhs)
    }

    pub fn logic_not(self) -> Self {
        self.unary(UnaryOp::LogicNot)
    }

    pub fn reduce_and(self) -> Self {
        self.unary(UnaryOp::ReduceAnd)
    }

    pub fn reduce_or(self) -> Self {
        self.unary(UnaryOp::ReduceOr)
    }

    pub fn reduce_xor(self) -> Self {
        self.unary(UnaryOp::ReduceXor)
    }

    pub fn slice(self, lo: u32, width: u32) -> Self {
        Expr::Slice {
            base: Box::new(self),
            lo,
            width,
        }
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        Expr::Field {
            base: Box::new(self),
            name: name.into(),
        }
    }

    pub fn index(self, index: impl Into<Expr>) -> Self {
        Expr::Index {
            base: Box::new(self),
            index: Box::new(index.into()),
        }
    }

    pub fn resize(self, width: u32) -> Self {
        Expr::Resize {
            expr: Box::new(self),
            width,
        }
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<R: Into<Expr>> ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::$op, self, rhs)
            }
        }
    };
}

binary_operator!(Add, add, Add);
binary_operator!(Sub, sub, Sub);
binary_operator!(Mul, mul, Mul);
binary_operator!(BitAnd, bitand, And);
binary_operator!(BitOr, bitor, Or);
binary_operator!(BitXor, bitxor, Xor);
binary_operator!(Shl, shl, Shl);
binary_operator!(Shr, shr, Shr);

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.unary(UnaryOp::Not)
    }
}

/// Assignment target.
#[derive(Clone, Debug, PartialEq)]
pub enum LValue {
    Sig(SignalId),
    Slice {
        base: Box<LValue>,
        lo: u32,
        width: u32,
    },
    Field {
        base: Box<LValue>,
        name: String,
    },
    Index {
        base: Box<LValue>,
        index: Expr,
    },
}

impl From<SignalId> for LValue {
    fn from(sig: SignalId) -> Self {
        LValue::Sig(sig)
    }
}

impl LValue {
    pub fn slice(self, lo: u32, width: u32) -> Self {
        LValue::Slice {
            base: Box::new(self),
            lo,
            width,
        }
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        LValue::Field {
            base: Box::new(self),
            name: name.into(),
        }
    }

    pub fn index(self, index: impl Into<Expr>) -> Self {
        LValue::Index {
            base: Box::new(self),
            index: index.into(),
        }
    }

    fn root(&self) -> SignalId {
        match self {
            LValue::Sig(sig) => *sig,
            LValue::Slice { base, .. } | LValue::Field { base, .. } | LValue::Index { base, .. } => {
                base.root()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign { target: LValue, value: Expr },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn assign(target: impl Into<LValue>, value: impl Into<Expr>) -> Self {
        Stmt::Assign {
            target: target.into(),
            value: value.into(),
        }
    }

    pub fn when(cond: impl Into<Expr>, then: Vec<Stmt>) -> Self {
        Stmt::If {
            cond: cond.into(),
            then,
            otherwise: Vec::new(),
        }
    }

    pub fn when_else(cond: impl Into<Expr>, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If {
            cond: cond.into(),
            then,
            otherwise,
        }
    }
}

/// Adds every signal the statements read or write to the given sets.
pub fn collect_access(stmts: &[Stmt], reads: &mut Vec<SignalId>, writes: &mut Vec<SignalId>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, value } => {
                writes.push(target.root());
                lvalue_reads(target, reads);
                expr_reads(value, reads);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                expr_reads(cond, reads);
                collect_access(then, reads, writes);
                collect_access(otherwise, reads, writes);
            }
        }
    }
}

fn lvalue_reads(target: &LValue, reads: &mut Vec<SignalId>) {
    match target {
        LValue::Sig(_) => {}
        LValue::Slice { base, .. } | LValue::Field { base, .. } => lvalue_reads(base, reads),
        LValue::Index { base, index } => {
            lvalue_reads(base, reads);
            expr_reads(index, reads);
        }
    }
}

fn expr_reads(expr: &Expr, reads: &mut Vec<SignalId>) {
    match expr {
        Expr::Sig(sig) => reads.push(*sig),
        Expr::Const(_) => {}
        Expr::Unary(_, arg) => expr_reads(arg, reads),
        Expr::Binary(_, lhs, rhs) => {
            expr_reads(lhs, reads);
            expr_reads(rhs, reads);
        }
        Expr::Mux {
            cond,
            then,
            otherwise,
        } => {
            expr_reads(cond, reads);
            expr_reads(then, reads);
            expr_reads(otherwise, reads);
        }
        Expr::Slice { base, .. } | Expr::Field { base, .. } => expr_reads(base, reads),
        Expr::Index { base, index } => {
            expr_reads(base, reads);
            expr_reads(index, reads);
        }
        Expr::Concat(parts) => parts.iter().for_each(|p| expr_reads(p, reads)),
        Expr::Resize { expr, .. } => expr_reads(expr, reads),
    }
}

// ---------------------------------------------------------------------------
// Lowered form
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) enum IndexKind {
    Static(u32),
    Dynamic(Box<LExpr>),
}

/// One step of a select chain rooted at a signal.
#[derive(Clone, Debug)]
pub(crate) enum SelStep {
    Field { name: String, offset: u32 },
    Index { index: IndexKind, stride: u32, count: u32 },
    /// Part-select. `on_array` records whether the base was an array type.
    Range { lo: u32, width: u32, on_array: bool },
}

/// A typed, offset-resolved view into a signal.
#[derive(Clone, Debug)]
pub(crate) struct Select {
    pub sig: SignalId,
    pub steps: Vec<SelStep>,
    pub width: u32,
}

impl Select {
    /// Bit offset into the signal, or `None` if a dynamic index is out of range.
    pub(crate) fn offset<P: SignalPeek + ?Sized>(&self, src: &P) -> Option<u32> {
        let mut offset = 0u32;
        for step in &self.steps {
            offset += match step {
                SelStep::Field { offset, .. } => *offset,
                SelStep::Range { lo, .. } => *lo,
                SelStep::Index {
                    index,
                    stride,
                    count,
                } => {
                    let idx = match index {
                        IndexKind::Static(i) => u128::from(*i),
                        IndexKind::Dynamic(expr) => expr.eval(src).value(),
                    };
                    if idx >= u128::from(*count) {
                        return None;
                    }
                    idx as u32 * stride
                }
            };
        }
        Some(offset)
    }

    pub(crate) fn is_whole(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Debug)]
pub(crate) enum LExpr {
    Select(Select),
    Const(Bits),
    Unary {
        op: UnaryOp,
        arg: Box<LExpr>,
        width: u32,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<LExpr>,
        rhs: Box<LExpr>,
        width: u32,
    },
    Mux {
        cond: Box<LExpr>,
        then: Box<LExpr>,
        otherwise: Box<LExpr>,
        width: u32,
    },
    /// Part-select of a computed value.
    Slice {
        base: Box<LExpr>,
        lo: u32,
        width: u32,
    },
    Concat {
        parts: Vec<LExpr>,
        width: u32,
    },
    Resize {
        arg: Box<LExpr>,
        width: u32,
    },
}

#[derive(Clone, Debug)]
pub(crate) enum LStmt {
    Assign { target: Select, value: LExpr },
    If {
        cond: LExpr,
        then: Vec<LStmt>,
        otherwise: Vec<LStmt>,
    },
}

fn mask_of(width: u32) -> u128 {
    Bits::new(width, u128::MAX).value()
}

impl LExpr {
    pub(crate) fn width(&self) -> u32 {
        match self {
            LExpr::Select(sel) => sel.width,
            LExpr::Const(bits) => bits.width(),
            LExpr::Unary { width, .. }
            | LExpr::Binary { width, .. }
            | LExpr::Mux { width, .. }
            | LExpr::Slice { width, .. }
            | LExpr::Concat { width, .. }
            | LExpr::Resize { width, .. } => *width,
        }
    }

    pub(crate) fn eval<P: SignalPeek + ?Sized>(&self, src: &P) -> Bits {
        match self {
            LExpr::Select(sel) => match sel.offset(src) {
                Some(offset) => src.peek(sel.sig).slice(offset, sel.width),
                None => Bits::zero(sel.width),
            },
            LExpr::Const(bits) => *bits,
            LExpr::Unary { op, arg, width } => {
                let a = arg.eval(src);
                let value = match op {
                    UnaryOp::Not => !a.value(),
                    UnaryOp::LogicNot => u128::from(!a.is_nonzero()),
                    UnaryOp::ReduceAnd => u128::from(a.value() == mask_of(a.width())),
                    UnaryOp::ReduceOr => u128::from(a.is_nonzero()),
                    UnaryOp::ReduceXor => u128::from(a.value().count_ones() % 2 == 1),
                };
                Bits::new(*width, value)
            }
            LExpr::Binary { op, lhs, rhs, width } => {
                let a = lhs.eval(src).value();
                let b = rhs.eval(src).value();
                let value = match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::And => a & b,
                    BinaryOp::Or => a | b,
                    BinaryOp::Xor => a ^ b,
                    BinaryOp::Shl => {
                        if b >= u128::from(*width) {
                            0
                        } else {
                            a << b
                        }
                    }
                    BinaryOp::Shr => {
                        if b >= u128::from(MAX_WIDTH) {
                            0
                        } else {
                            a >> b
                        }
                    }
                    BinaryOp::Eq => u128::from(a == b),
                    BinaryOp::Ne => u128::from(a != b),
                    BinaryOp::Lt => u128::from(a < b),
                    BinaryOp::Le => u128::from(a <= b),
                    BinaryOp::Gt => u128::from(a > b),
                    BinaryOp::Ge => u128::from(a >= b),
                    BinaryOp::LogicAnd => u128::from(a != 0 && b != 0),
                    BinaryOp::LogicOr => u128::from(a != 0 || b != 0),
                };
                Bits::new(*width, value)
            }
            LExpr::Mux {
                cond,
                then,
                otherwise,
                width,
            } => {
                let chosen = if cond.eval(src).is_nonzero() {
                    then.eval(src)
                } else {
                    otherwise.eval(src)
                };
                chosen.resize(*width)
            }
            LExpr::Slice { base, lo, width } => base.eval(src).slice(*lo, *width),
            LExpr::Concat { parts, .. } => {
                let values: Vec<Bits> = parts.iter().map(|p| p.eval(src)).collect();
                Bits::concat(&values)
            }
            LExpr::Resize { arg, width } => arg.eval(src).resize(*width),
        }
    }
}

/// Collects the signals a lowered statement list references.
pub(crate) fn lowered_signals(stmts: &[LStmt], out: &mut Vec<SignalId>) {
    fn select(sel: &Select, out: &mut Vec<SignalId>) {
        out.push(sel.sig);
        for step in &sel.steps {
            if let SelStep::Index {
                index: IndexKind::Dynamic(expr),
                ..
            } = step
            {
                expr_signals(expr, out);
            }
        }
    }

    fn expr_signals(expr: &LExpr, out: &mut Vec<SignalId>) {
        match expr {
            LExpr::Select(sel) => select(sel, out),
            LExpr::Const(_) => {}
            LExpr::Unary { arg, .. } | LExpr::Slice { base: arg, .. } | LExpr::Resize { arg, .. } => {
                expr_signals(arg, out)
            }
            LExpr::Binary { lhs, rhs, .. } => {
                expr_signals(lhs, out);
                expr_signals(rhs, out);
            }
            LExpr::Mux {
                cond,
                then,
                otherwise,
                ..
            } => {
                expr_signals(cond, out);
                expr_signals(then, out);
                expr_signals(otherwise, out);
            }
            LExpr::Concat { parts, .. } => parts.iter().for_each(|p| expr_signals(p, out)),
        }
    }

    for stmt in stmts {
        match stmt {
            LStmt::Assign { target, value } => {
                select(target, out);
                expr_signals(value, out);
            }
            LStmt::If {
                cond,
                then,
                otherwise,
            } => {
                expr_signals(cond, out);
                lowered_signals(then, out);
                lowered_signals(otherwise, out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Type checking and lowering
// ---------------------------------------------------------------------------

pub(crate) struct Lowerer<'h> {
    hier: &'h Hierarchy,
}

/// Either a select chain that still carries its declared type, or a computed vector.
enum Typed {
    Select(Select, DataType),
    Value(LExpr),
}

impl Typed {
    fn width(&self) -> u32 {
        match self {
            Typed::Select(sel, _) => sel.width,
            Typed::Value(expr) => expr.width(),
        }
    }

    fn into_expr(self) -> LExpr {
        match self {
            Typed::Select(sel, _) => LExpr::Select(sel),
            Typed::Value(expr) => expr,
        }
    }
}

fn check_width(width: u32, what: &str) -> Result<(), String> {
    if (1..=MAX_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(format!("{what} width {width} outside 1..={MAX_WIDTH}"))
    }
}

impl<'h> Lowerer<'h> {
    pub(crate) fn new(hier: &'h Hierarchy) -> Self {
        Self { hier }
    }

    pub(crate) fn lower(&self, stmts: &[Stmt]) -> Result<Vec<LStmt>, String> {
        stmts.iter().map(|s| self.stmt(s)).collect()
    }

    fn stmt(&self, stmt: &Stmt) -> Result<LStmt, String> {
        match stmt {
            Stmt::Assign { target, value } => {
                let (target, _) = self.lvalue(target)?;
                let mut value = self.expr(value)?.into_expr();
                if value.width() != target.width {
                    value = LExpr::Resize {
                        arg: Box::new(value),
                        width: target.width,
                    };
                }
                Ok(LStmt::Assign { target, value })
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => Ok(LStmt::If {
                cond: self.expr(cond)?.into_expr(),
                then: self.lower(then)?,
                otherwise: self.lower(otherwise)?,
            }),
        }
    }

    fn signal(&self, sig: SignalId) -> Result<(Select, DataType), String> {
        let info = self
            .hier
            .signals
            .get(sig.index())
            .ok_or_else(|| format!("unknown signal {sig:?}"))?;
        let ty = info.ty.clone();
        Ok((
            Select {
                sig,
                steps: Vec::new(),
                width: ty.bit_width(),
            },
            ty,
        ))
    }

    fn lvalue(&self, target: &LValue) -> Result<(Select, DataType), String> {
        match target {
            LValue::Sig(sig) => self.signal(*sig),
            LValue::Slice { base, lo, width } => {
                let (sel, ty) = self.lvalue(base)?;
                self.range(sel, &ty, *lo, *width)
            }
            LValue::Field { base, name } => {
                let (sel, ty) = self.lvalue(base)?;
                self.field(sel, &ty, name)
            }
            LValue::Index { base, index } => {
                let (sel, ty) = self.lvalue(base)?;
                let index = self.expr(index)?.into_expr();
                self.index(sel, &ty, index)
            }
        }
    }

    fn range(&self, mut sel: Select, ty: &DataType, lo: u32, width: u32) -> Result<(Select, DataType), String> {
        check_width(width, "slice")?;
        if lo + width > sel.width {
            return Err(format!(
                "slice [{lo} +: {width}] exceeds {}-bit value",
                sel.width
            ));
        }
        let on_array = matches!(ty, DataType::Array { .. });
        match sel.steps.last_mut() {
            Some(SelStep::Range {
                lo: prev_lo,
                width: prev_width,
                ..
            }) => {
                *prev_lo += lo;
                *prev_width = width;
            }
            _ => sel.steps.push(SelStep::Range { lo, width, on_array }),
        }
        sel.width = width;
        Ok((sel, DataType::Vector(width)))
    }

    fn field(&self, mut sel: Select, ty: &DataType, name: &str) -> Result<(Select, DataType), String> {
        let (offset, field_ty) = ty
            .field(name)
            .ok_or_else(|| format!("type {ty} has no field '{name}'"))?;
        let field_ty = field_ty.clone();
        check_width(field_ty.bit_width(), &format!("field '{name}'"))?;
        sel.steps.push(SelStep::Field {
            name: name.to_string(),
            offset,
        });
        sel.width = field_ty.bit_width();
        Ok((sel, field_ty))
    }

    fn index(&self, mut sel: Select, ty: &DataType, index: LExpr) -> Result<(Select, DataType), String> {
        let (elem, stride, count) = match ty {
            DataType::Vector(width) => (DataType::Vector(1), 1, *width),
            DataType::Struct(_) | DataType::Int => (DataType::Vector(1), 1, ty.bit_width()),
            DataType::Array { .. } => ty
                .element()
                .ok_or_else(|| format!("array type {ty} has no dimensions"))?,
        };
        check_width(elem.bit_width(), "element")?;
        if count == 0 {
            return Err(format!("cannot index empty type {ty}"));
        }
        let index = match index {
            LExpr::Const(bits) => {
                if bits.value() >= u128::from(count) {
                    return Err(format!(
                        "index {} out of range for {count} elements",
                        bits.value()
                    ));
                }
                IndexKind::Static(bits.value() as u32)
            }
            other => IndexKind::Dynamic(Box::new(other)),
        };
        sel.steps.push(SelStep::Index {
            index,
            stride,
            count,
        });
        sel.width = elem.bit_width();
        Ok((sel, elem))
    }

    fn expr(&self, expr: &Expr) -> Result<Typed, String> {
        Ok(match expr {
            Expr::Sig(sig) => {
                let (sel, ty) = self.signal(*sig)?;
                Typed::Select(sel, ty)
            }
            Expr::Const(bits) => Typed::Value(LExpr::Const(*bits)),
            Expr::Unary(op, arg) => {
                let arg = self.expr(arg)?.into_expr();
                let width = match op {
                    UnaryOp::Not => arg.width(),
                    _ => 1,
                };
                Typed::Value(LExpr::Unary {
                    op: *op,
                    arg: Box::new(arg),
                    width,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.expr(lhs)?.into_expr();
                let rhs = self.expr(rhs)?.into_expr();
                let width = if op.is_predicate() {
                    1
                } else if op.is_shift() {
                    lhs.width()
                } else {
                    lhs.width().max(rhs.width())
                };
                Typed::Value(LExpr::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    width,
                })
            }
            Expr::Mux {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond)?.into_expr();
                let then = self.expr(then)?.into_expr();
                let otherwise = self.expr(otherwise)?.into_expr();
                let width = then.width().max(otherwise.width());
                Typed::Value(LExpr::Mux {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                    width,
                })
            }
            Expr::Slice { base, lo, width } => match self.expr(base)? {
                Typed::Select(sel, ty) => {
                    let (sel, ty) = self.range(sel, &ty, *lo, *width)?;
                    Typed::Select(sel, ty)
                }
                Typed::Value(value) => {
                    check_width(*width, "slice")?;
                    if lo + width > value.width() {
                        return Err(format!(
                            "slice [{lo} +: {width}] exceeds {}-bit value",
                            value.width()
                        ));
                    }
                    Typed::Value(LExpr::Slice {
                        base: Box::new(value),
                        lo: *lo,
                        width: *width,
                    })
                }
            },
            Expr::Concat(parts) => {
                if parts.is_empty() {
                    return Err("empty concatenation".to_string());
                }
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p).map(Typed::into_expr))
                    .collect::<Result<Vec<_>, _>>()?;
                let width = parts.iter().map(LExpr::width).sum();
                check_width(width, "concatenation")?;
                Typed::Value(LExpr::Concat { parts, width })
            }
            Expr::Field { base, name } => match self.expr(base)? {
                Typed::Select(sel, ty) => {
                    let (sel, ty) = self.field(sel, &ty, name)?;
                    Typed::Select(sel, ty)
                }
                Typed::Value(_) => {
                    return Err(format!("field '{name}' of a computed value"));
                }
            },
            Expr::Index { base, index } => {
                let index = self.expr(index)?.into_expr();
                match self.expr(base)? {
                    Typed::Select(sel, ty) => {
                        let (sel, ty) = self.index(sel, &ty, index)?;
                        Typed::Select(sel, ty)
                    }
                    Typed::Value(value) => match index {
                        LExpr::Const(bits) if bits.value() < u128::from(value.width()) => {
                            Typed::Value(LExpr::Slice {
                                base: Box::new(value),
                                lo: bits.value() as u32,
                                width: 1,
                            })
                        }
                        _ => return Err("dynamic index of a computed value".to_string()),
                    },
                }
            }
            Expr::Resize { expr, width } => {
                check_width(*width, "resize")?;
                let arg = self.expr(expr)?;
                if arg.width() == *width {
                    arg
                } else {
                    Typed::Value(LExpr::Resize {
                        arg: Box::new(arg.into_expr()),
                        width: *width,
                    })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DesignBuilder;
    use crate::dtype::StructType;
    use std::collections::HashMap;

    struct Values(HashMap<SignalId, Bits>);

    impl SignalPeek for Values {
        fn peek(&self, sig: SignalId) -> Bits {
            self.0[&sig]
        }
    }

    fn lower_expr(hier: &Hierarchy, expr: &Expr) -> LExpr {
        Lowerer::new(hier).expr(expr).unwrap().into_expr()
    }

    #[test]
    fn test_width_rules() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        let w = b.add_input(top, "w", DataType::bits(16));
        let hier = b.hierarchy();

        assert_eq!(lower_expr(hier, &(Expr::sig(a) + w)).width(), 16);
        assert_eq!(lower_expr(hier, &(Expr::sig(w) << a)).width(), 16);
        assert_eq!(lower_expr(hier, &Expr::sig(a).lt(w)).width(), 1);
        assert_eq!(lower_expr(hier, &Expr::sig(a).reduce_xor()).width(), 1);
        assert_eq!(lower_expr(hier, &Expr::concat([Expr::sig(a), Expr::sig(w)])).width(), 24);
    }

    #[test]
    fn test_eval_wraps() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        let c = b.add_input(top, "c", DataType::bits(8));
        let hier = b.hierarchy();

        let vals = Values(HashMap::from([(a, Bits::new(8, 0xf0)), (c, Bits::new(8, 0x20))]));
        assert_eq!(lower_expr(hier, &(Expr::sig(a) + c)).eval(&vals).value(), 0x10);
        assert_eq!(lower_expr(hier, &(Expr::sig(c) - a)).eval(&vals).value(), 0x30);
        assert_eq!(lower_expr(hier, &!Expr::sig(a)).eval(&vals).value(), 0x0f);
        assert_eq!(
            lower_expr(hier, &(Expr::sig(a) << Expr::lit(4, 9))).eval(&vals).value(),
            0
        );
        assert_eq!(lower_expr(hier, &Expr::sig(a).reduce_and()).eval(&vals).value(), 0);
    }

    #[test]
    fn test_struct_and_array_selects() {
        let pair = DataType::Struct(
            StructType::new("Pair")
                .field("hi", DataType::bits(8))
                .field("lo", DataType::bits(8)),
        );
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let p = b.add_input(top, "p", pair);
        let arr = b.add_input(top, "arr", DataType::array(DataType::bits(4), vec![4]));
        let i = b.add_input(top, "i", DataType::bits(3));
        let hier = b.hierarchy();

        let vals = Values(HashMap::from([
            (p, Bits::new(16, 0xab_cd)),
            (arr, Bits::new(16, 0x4321)),
            (i, Bits::new(3, 2)),
        ]));

        let hi = lower_expr(hier, &Expr::sig(p).field("hi"));
        assert_eq!(hi.eval(&vals).value(), 0xab);

        let elem = lower_expr(hier, &Expr::sig(arr).index(i));
        assert_eq!(elem.eval(&vals).value(), 3);

        let oob = Values(HashMap::from([
            (p, Bits::new(16, 0)),
            (arr, Bits::new(16, 0x4321)),
            (i, Bits::new(3, 6)),
        ]));
        assert_eq!(elem.eval(&oob).value(), 0);
    }

    #[test]
    fn test_type_errors() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        let hier = b.hierarchy();
        let lowerer = Lowerer::new(hier);

        assert!(lowerer.expr(&Expr::sig(a).field("x")).is_err());
        assert!(lowerer.expr(&Expr::sig(a).slice(4, 8)).is_err());
        assert!(lowerer.expr(&Expr::sig(a).index(Expr::lit(4, 8))).is_err());
        assert!(lowerer.expr(&(Expr::sig(a) + a).index(Expr::sig(a))).is_err());
    }

    #[test]
    fn test_access_inference() {
        let mut b = DesignBuilder::new("top", "Top");
        let top = b.top();
        let a = b.add_input(top, "a", DataType::bits(8));
        let i = b.add_input(top, "i", DataType::bits(2));
        let out = b.add_output(top, "out", DataType::array(DataType::bits(8), vec![4]));

        let body = vec![Stmt::when(
            Expr::sig(a).not_equals(Expr::lit(8, 0)),
            vec![Stmt::assign(LValue::from(out).index(i), a)],
        )];
        let (mut reads, mut writes) = (Vec::new(), Vec::new());
        collect_access(&body, &mut reads, &mut writes);
        reads.sort();
        reads.dedup();
        assert_eq!(reads, vec![a, i]);
        assert_eq!(writes, vec![out]);
    }
}
