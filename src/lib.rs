//! Sea is a nested-grid simulation engine for layered ocean models. The
//! coarsest level covers the whole domain with a shallow water model (single
//! or multilayer); each finer level refines a centred window of its parent
//! and may switch to a fully three dimensional model, either a compressible
//! relativistic fluid in Valencia form or its low Mach number limit. Levels
//! are advanced with Berger-Oliger subcycling: a fine level takes `r` steps
//! per parent step, fed by prolongation from the parent at its boundary and
//! restricted back into the parent when it catches up.
//!
//! Work is split over processes along x, one contiguous slab per process on
//! every level, with halo exchange and collectives running over any
//! `message::Communicator`. Within a process, x rows are processed in
//! parallel with rayon.

pub mod boundary;
pub mod config;
pub mod coupling;
pub mod decomposition;
pub mod driver;
pub mod error;
pub mod grid;
pub mod hierarchy;
pub mod hydro;
pub mod index_space;
pub mod linalg;
pub mod message;
pub mod num_vec;
pub mod output;
pub mod reference;
pub mod reflux;
pub mod sea;

pub use boundary::{bcs, Boundary};
pub use config::SeaParams;
pub use driver::RunStatus;
pub use error::{Error, Result, ValidationError};
pub use hydro::Model;
pub use output::{read_snapshots, CborWriter, Snapshot, SnapshotWriter};
pub use reference::ReferenceSea;
pub use sea::Sea;
