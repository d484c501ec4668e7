pub mod aggregator;
pub mod config;
pub mod context;
pub mod enricher;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod sink;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tokens;
pub mod traits;

pub use aggregator::{Aggregation, AggregationStats, SourceAggregator, SourceTable, NO_SOURCE_ID};
pub use config::Config;
pub use context::{ExclusionList, PassCatalog, ReportWindow, RunContext, DEFAULT_EXCLUDED_PASSES};
pub use enricher::{ContactEnricher, EnrichmentFailure, EnrichmentReport, EnrichmentStep};
pub use outcome::{ContactOutcome, SourceCounters};
pub use pipeline::{GeneratedReport, ReportRun, ReportSettings, RunSummary};
pub use report::{Cell, FormulaLocale, ReportBuilder, ReportMatrix, REPORT_COLUMNS};
pub use sink::{CsvFileSink, JsonSink, SheetsSink};
pub use tokens::{RefreshingToken, StaticToken, TokenFile};
pub use traits::{CrmGateway, ReportSink, TokenProvider};
