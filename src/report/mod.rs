//! # Reports
//!
//! Files written after a run: the accession validation summary and the
//! failure / rolled-back-batch exports.

pub mod accession;
pub mod failures;

pub use accession::{summarize_dir, summarize_file, write_summary, AccessionSummary};
pub use failures::{export as export_failures, write_failures, write_rolled_back};
