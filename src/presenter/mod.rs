//!
//! src/presenter/mod.rs  Andrew Belles  Oct 18th, 2026
//!
//! Read side: load the yearly tables once, filter per request and
//! aggregate into the dashboard views
//!

pub mod load;
pub mod filter;
pub mod stats;
pub mod server;

pub use filter::{DashboardParams, Filter};
pub use load::{Dataset, load_dataset};
pub use stats::{Dashboard, build_dashboard};

use std::io;

use crate::config::PresenterConfig;
use crate::errors::EtlError;
use crate::sink::write_rows;
use crate::types::CSV_COLUMNS;

/// Filters the table for one request and aggregates what is left
pub fn dashboard(dataset: &Dataset, params: &DashboardParams, cfg: &PresenterConfig) -> Dashboard {
    if dataset.is_empty() {
        return Dashboard::Empty { message: "no yearly files were loaded".to_string() };
    }
    let rows = params.filter().apply(&dataset.records);
    build_dashboard(&rows, params.hit_threshold.unwrap_or(cfg.hit_threshold), cfg)
}

/// Writes the rows `filter` keeps in the yearly file layout. Returns
/// how many rows were written
pub fn export_csv<W: io::Write>(dataset: &Dataset, filter: &Filter, writer: W)
    -> Result<usize, EtlError> {
    let rows = filter.apply(&dataset.records);
    write_rows(writer, &CSV_COLUMNS, rows.iter().copied())?;
    Ok(rows.len())
}
