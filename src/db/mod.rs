//! SQLite run history.
//!
//! - `model`: run records returned by the repository.
//! - `repo`: SQL-only functions, plus [`SqliteTables`], the table writer that
//!   stores one run's rows.
//!
//! The repository API is re-exported at `crate::db::*`.

pub mod model;
pub mod repo;

pub use model::{Run, RunKind, RunStatus};
pub use repo::*;
