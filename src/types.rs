//! Core identifier types for the framework.
//!
//! Every object created during the declaration pass is addressed by a small
//! index newtype. Indices are assigned in declaration order, which is what
//! makes elaboration deterministic: any tie between otherwise equivalent
//! objects is broken by the lower index.

use serde::{Deserialize, Serialize};

/// Simulation time, counted in clock ticks.
pub type Tick = u64;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl $name {
            /// Returns the raw index.
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

index_type!(
    /// Identifies a component in the hierarchy. The root is always `ComponentId(0)`.
    ComponentId
);

index_type!(
    /// Identifies a port or wire.
    SignalId
);

index_type!(
    /// Identifies an interface (a bundle of ports) instance.
    InterfaceId
);

index_type!(
    /// Identifies an update block.
    BlockId
);

index_type!(
    /// Identifies a net, the equivalence class of connected signals.
    NetId
);
