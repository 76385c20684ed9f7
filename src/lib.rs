//!
//! src/lib.rs  Andrew Belles  Oct 18th, 2026
//!
//! Shared library behind the two binaries. The collector writes the
//! yearly CSV tables defined in `types`, the presenter reads them back
//!
//!

pub mod config;
pub mod errors;
pub mod logging;

pub mod types;
pub mod fetch;
pub mod sink;
pub mod collector;
pub mod explorer;
pub mod presenter;

pub use errors::EtlError;
