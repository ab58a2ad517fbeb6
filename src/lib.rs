//! Core library for the sheet-tools command line application.
//!
//! The library exposes the spreadsheet operations behind the CLI as well as
//! the building blocks they share. Workbook adapters live under [`io`], the
//! in-memory cell and table types in [`model`], the old/new row
//! reconciliation in [`reconcile`], the two smaller title operations in
//! [`title`] and [`diff`], and the file-to-file orchestration in [`sync`].

pub mod diff;
pub mod error;
pub mod io;
pub mod model;
pub mod reconcile;
pub mod sync;
pub mod title;

pub use error::{Result, ToolError};
