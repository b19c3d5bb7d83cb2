//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`; callers decide the
//! transaction scope. All public functions are re-exported here.

mod alert;
mod glucose;
mod medication;
mod patient;
mod symptom;

#[cfg(test)]
pub(crate) mod fixtures;

pub use alert::*;
pub use glucose::*;
pub use medication::*;
pub use patient::*;
pub use symptom::*;
