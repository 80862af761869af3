//! Pipeline entry points for monitor operations.
//!
//! - `ChangeDetector`: decide which documents changed since the last run
//! - `run_monitor`: one full run from discovery to notification

pub mod detect;
pub mod monitor;

pub use detect::{Assessment, ChangeDetector};
pub use monitor::{TEST_DATE_ENV, reference_date, run_monitor};
