//! Per-property pipeline: orchestration, row assembly and output sinks.

pub mod orchestrator;
pub mod row;
pub mod sink;

pub use orchestrator::{PipelineOrchestrator, RowOutcome, RunSummary};
pub use row::CsvRow;
pub use sink::{CsvSink, MemorySink, RowSink};
