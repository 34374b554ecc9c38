//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed row entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `repo_steward::db` — we re-export the
//! repository API and the row models for convenience.

pub mod model;
pub mod repo;

pub use model::{Privilege, RepositoryRecord, WatchedManifest};
pub use repo::*;
