//! Project rules that do not touch the database.

pub mod access;
pub mod cost;
pub mod phase;
pub mod role;
pub mod validation;

pub use access::{CurrentUser, Permission};
pub use phase::{PhaseState, PHASE_COUNT};
pub use role::Role;
