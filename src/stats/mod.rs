pub mod ctr_histogram;

pub use ctr_histogram::{CtrHistogram, DistributionSummary};
