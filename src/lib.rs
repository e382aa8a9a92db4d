//! Client for the B2B buyer organization bulk import service.
//!
//! Covers the whole import lifecycle: upload a spreadsheet, start
//! validation, poll the import until it settles, and turn the result into a
//! per-category report. The latest-import alert and its session flags live
//! alongside.

pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod storage;

pub use config::ImportConfig;
pub use error::{AppError, ErrorPresentation};
