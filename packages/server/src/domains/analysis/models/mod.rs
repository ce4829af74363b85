pub mod page_analysis;
pub mod quality;
pub mod query_result;
pub mod run;

pub use page_analysis::{PageAnalysis, PageAnalysisStatus};
pub use quality::{CompetitorMention, ContentQualityRecord, ResponseClassification};
pub use query_result::QueryResult;
pub use run::{AnalysisRun, RunStatus};
