//! Collapses checker findings into persisted issues.

pub mod aggregator;
pub mod title;

pub use aggregator::{build_issues, IssueAggregator, PageContext};
pub use title::page_title;
