pub mod batch;
pub mod delimited;
pub mod report;

pub use batch::ExportBatch;
pub use delimited::SeriesWriter;
pub use report::{stage_report, RunReport};
