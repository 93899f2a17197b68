//! Error taxonomy.
//!
//! Each class maps to one stage of the pipeline: declaration and connection
//! problems are [`StructuralError`], bad constraint references are
//! [`ConstraintError`], unschedulable graphs are [`ScheduleError`]. All three
//! are fatal to elaboration and surface through [`ElabError`]. Running and
//! translating a design have their own error types.

use thiserror::Error;

use crate::types::Tick;

/// Problems with the declared structure or its connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("duplicate name '{name}' in component {component}")]
    DuplicateName { component: String, name: String },

    #[error("signal {path} has width {width}, expected 1..=128")]
    InvalidWidth { path: String, width: u32 },

    #[error("connection endpoint {endpoint} was not declared in this design")]
    UnknownEndpoint { endpoint: String },

    #[error("type mismatch connecting {a} ({a_ty}) to {b} ({b_ty})")]
    TypeMismatch {
        a: String,
        b: String,
        a_ty: String,
        b_ty: String,
    },

    #[error("cannot connect {a} to {b}: {reason}")]
    DirectionConflict {
        a: String,
        b: String,
        reason: &'static str,
    },

    #[error("cannot connect {a} to {b}: endpoints are not in adjacent components")]
    NotAdjacent { a: String, b: String },

    #[error("wire {wire} is private to its component and cannot connect to {other}")]
    PrivateWire { wire: String, other: String },

    #[error("interfaces {a} and {b} do not match: {detail}")]
    InterfaceMismatch { a: String, b: String, detail: String },

    #[error("net containing {net} has multiple drivers: {}", drivers.join(", "))]
    MultipleDrivers { net: String, drivers: Vec<String> },

    #[error("block {block} may not write {signal}")]
    IllegalWrite { block: String, signal: String },

    #[error("net containing {signal} is written by several blocks: {}", blocks.join(", "))]
    ConflictingWriters { signal: String, blocks: Vec<String> },

    #[error("block {block} writes {signal}, which is already driven by {driver}")]
    DrivenElsewhere {
        block: String,
        signal: String,
        driver: String,
    },
}

/// Constraints naming things that do not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("constraint references unknown block '{0}'")]
    UnknownBlock(String),

    #[error("constraint references unknown signal '{0}'")]
    UnknownSignal(String),

    #[error("block {0} is constrained to run before itself")]
    SelfOrdering(String),
}

/// The dependency graph admits no total order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("dependency cycle: {} -> {}", cycle.join(" -> "), cycle.first().map(String::as_str).unwrap_or(""))]
    Cycle { cycle: Vec<String> },

    #[error("contradictory explicit constraints: {a} before {b} and {b} before {a}")]
    Contradiction { a: String, b: String },
}

/// Any failure while turning a declared hierarchy into a [`Design`](crate::Design).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElabError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("ill-formed behavior in block {block}: {detail}")]
    Behavior { block: String, detail: String },
}

/// Failures reported by the simulator. None of these leave it in a bad state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("condition not reached within {max_ticks} ticks (stopped at cycle {cycle})")]
    Timeout { max_ticks: Tick, cycle: Tick },

    #[error("{path} is not a top-level input port")]
    NotTopLevelInput { path: String },

    #[error("value for {path} has width {actual}, expected {expected}")]
    WidthMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },
}

/// Failures of a translation pass.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("type {ty} at {path} has no hardware mapping")]
    UnsupportedType { ty: String, path: String },

    #[error("block {block} has a native body and cannot be translated")]
    OpaqueBlock { block: String },

    #[error("block {block} references {signal}, which is outside its component's scope")]
    OutOfScope { block: String, signal: String },

    #[error("block {block}: {detail}")]
    UnsupportedExpr { block: String, detail: String },

    #[error("identifier '{name}' at {path} is a reserved word")]
    ReservedIdentifier { name: String, path: String },

    #[error("struct {name} has conflicting definitions")]
    StructConflict { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ElabResult<T> = Result<T, ElabError>;
