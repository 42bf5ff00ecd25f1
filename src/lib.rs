//! Project BOM engine
//!
//! Bills of materials attached to project tasks: price resolution from
//! purchase history and vendor lists, header totals, approval snapshots per
//! version and BOM import from a local or remote explosion.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use services::project_bom::ProjectBomService;
pub use services::BomContext;
