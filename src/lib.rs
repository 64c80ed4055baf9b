//! Harvests course evaluations (ISQ), grade distributions and class schedules
//! from Banner, joins them per course offering, and stores the result in
//! SQLite and a CSV report.

pub mod config;
pub mod course_key;
pub mod database;
pub mod department;
pub mod error;
pub mod faculty;
pub mod fetch;
mod html;
pub mod isq;
pub mod reconcile;
pub mod report;
pub mod schedule;
pub mod terms;

pub use config::Config;
pub use error::{Error, Result};
