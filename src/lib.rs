//! # tickhdl
//!
//! A component-based hardware modeling framework: describe digital logic as
//! a hierarchy of components with typed ports and explicit update blocks,
//! simulate it cycle by cycle, and translate it to SystemVerilog.
//!
//! ## Pipeline
//!
//! - **Declaration**: [`DesignBuilder`] registers components, ports,
//!   interfaces, connections, update blocks and ordering constraints up front.
//! - **Elaboration**: [`DesignBuilder::elaborate`] resolves connections into
//!   nets, collects read/write sets and constraints, and computes one
//!   deterministic per-tick schedule (or reports a concrete cycle).
//! - **Simulation**: [`Simulator`] runs the schedule every tick. Combinational
//!   writes are visible immediately; sequential writes commit at the end of
//!   the tick.
//! - **Translation**: [`translate::TranslationPass`] writes one file per
//!   marked component and leaves unchanged files untouched.
//!
//! ## Features
//!
//! - `parallel` - Render independent translation targets using rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use tickhdl::{Bits, BlockSpec, DataType, DesignBuilder, Expr, Simulator, Stmt};
//!
//! let mut b = DesignBuilder::new("top", "Counter");
//! let top = b.top();
//! let en = b.add_input(top, "en", DataType::bits(1));
//! let count = b.add_output(top, "count", DataType::bits(8));
//! let reset = b.reset(top);
//! b.add_block(
//!     top,
//!     BlockSpec::seq(
//!         "up_count",
//!         vec![Stmt::when_else(
//!             reset,
//!             vec![Stmt::assign(count, Expr::lit(8, 0))],
//!             vec![Stmt::when(en, vec![Stmt::assign(count, Expr::sig(count) + Expr::lit(8, 1))])],
//!         )],
//!     ),
//! );
//!
//! let mut sim = Simulator::new(b.elaborate().unwrap());
//! sim.reset();
//! sim.poke(en, Bits::from_bool(true)).unwrap();
//! sim.run_for(3);
//! assert_eq!(sim.peek(count).value(), 3);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use tickhdl::config::FrameworkConfig;
//!
//! let config = FrameworkConfig::from_yaml_file("tickhdl.yaml")?;
//! config.apply_translation_markers(&design)?;
//! let mut sim = Simulator::with_config(design, &config.simulation);
//! ```

pub mod bits;
pub mod block;
pub mod component;
pub mod config;
pub mod connect;
pub mod design;
pub mod dtype;
pub mod error;
pub mod ir;
pub mod metadata;
pub mod registry;
pub mod schedule;
pub mod signal;
pub mod sim;
pub mod stats;
pub mod stdlib;
pub mod translate;
pub mod types;

// Re-export commonly used types
pub use bits::Bits;
pub use block::{BlockSpec, SignalAccess, SignalPeek, UpdateKind};
pub use component::{ConstraintTarget, DesignBuilder, Hierarchy};
pub use config::{ConfigError, FrameworkConfig, FrameworkConfigBuilder, SimulationParams, TranslationParams};
pub use connect::{NetDriver, NetList};
pub use design::Design;
pub use dtype::{DataType, StructType};
pub use error::{ConstraintError, ElabError, ScheduleError, SimError, StructuralError, TranslationError};
pub use ir::{Expr, LValue, Stmt};
pub use metadata::{MetadataKey, MetadataTable};
pub use signal::{Direction, InterfaceDesc, Polarity};
pub use sim::{Phase, Simulator};
pub use stats::{SimulationStats, Timer};
pub use translate::{TranslationOutput, TranslationPass};
pub use types::{BlockId, ComponentId, InterfaceId, NetId, SignalId, Tick};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// tickhdl::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
