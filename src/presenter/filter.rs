//!
//! src/presenter/filter.rs  Andrew Belles  Oct 18th, 2026
//!
//! User filters. They narrow the rows a request aggregates over and
//! never touch the loaded table
//!

use serde::{Deserialize, Serialize};

use crate::presenter::stats::GenreCategory;
use crate::types::TrackRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub min_popularity: Option<u8>,
    pub max_popularity: Option<u8>,
    /// Genre category label, case insensitive. "all" or empty disables it
    pub genre: Option<String>
}

impl Filter {
    fn genre(&self) -> Option<&str> {
        self.genre.as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case("all"))
    }

    pub fn matches(&self, r: &TrackRecord) -> bool {
        self.year_from.is_none_or(|y| r.year >= y)
            && self.year_to.is_none_or(|y| r.year <= y)
            && self.min_popularity.is_none_or(|p| r.popularity >= p)
            && self.max_popularity.is_none_or(|p| r.popularity <= p)
            && self.genre().is_none_or(|g| {
                GenreCategory::of(&r.genre).label().eq_ignore_ascii_case(g)
            })
    }

    pub fn apply<'a>(&self, records: &'a [TrackRecord]) -> Vec<&'a TrackRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Query string of `/api/dashboard`, also filled from the report cli
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardParams {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub min_popularity: Option<u8>,
    pub max_popularity: Option<u8>,
    pub genre: Option<String>,
    pub hit_threshold: Option<u8>
}

impl DashboardParams {
    pub fn filter(&self) -> Filter {
        Filter {
            year_from: self.year_from,
            year_to: self.year_to,
            min_popularity: self.min_popularity,
            max_popularity: self.max_popularity,
            genre: self.genre.clone()
        }
    }
}
