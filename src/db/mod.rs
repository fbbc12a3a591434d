//! Database module: view models and SQL repositories.
//!
//! - `model`: slices of rows returned to the jobs.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `donor_digest::db`; the repository API is re-exported
//! here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{DigestEnrollment, DueCampaign, LeaseRecord};
