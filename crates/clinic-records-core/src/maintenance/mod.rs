//! Backup, cross-store merge and CSV export.

mod backup;
mod csv;
mod merge;

pub use backup::*;
pub use csv::*;
pub use merge::*;
