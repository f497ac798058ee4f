pub mod outlier;
pub mod window;

pub use outlier::OutlierDetector;
pub use window::{WindowSelection, WindowSelector};
