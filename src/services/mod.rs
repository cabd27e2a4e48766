//! Service layer for contract analysis.
//!
//! Domain logic shared by the CLI and the web server.

pub mod analysis;
pub mod results;

pub use analysis::{AnalysisError, AnalysisEvent, AnalysisOutcome, AnalysisService};
pub use results::{merge_report_items, ResultsError, ResultsService, VersionedReport};
