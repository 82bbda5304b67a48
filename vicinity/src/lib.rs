#![warn(clippy::all, clippy::pedantic)]

// disable some style lints
#![allow(clippy::needless_return, clippy::must_use_candidate, clippy::comparison_chain)]
#![allow(clippy::redundant_field_names, clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unreadable_literal, clippy::option_if_let_else, clippy::range_plus_one)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::module_name_repetitions)]

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap, clippy::cast_lossless, clippy::cast_sign_loss)]
#![allow(clippy::default_trait_access, clippy::needless_range_loop)]

// Tests lints
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod types;
pub use types::*;

mod errors;
pub use self::errors::Error;

mod boundary;
pub use self::boundary::{Boundary, BoundaryShape};

pub mod systems;
pub use systems::{System, SimpleSystem};

mod potentials;
pub use self::potentials::{PairPotential, TruncatedPotential, PotentialTable};
pub use self::potentials::{PairExclusion, NoExclusion, BondedExclusion};

pub mod cells;
pub use self::cells::CellIndex;

pub mod neighbors;
pub use self::neighbors::{NeighborListManager, NeighborListParameters, NeighborManager};
pub use self::neighbors::{NeighborIterator, NeighborsUpdated};
pub use self::neighbors::{NeighborPolicy, Plain, Lattice, HardCollision};
