//! Visual regression: baseline storage, Figma frames and pixel comparison.

pub mod engine;
pub mod figma;
pub mod pixel;

pub use engine::{compare_files, BaselineRequest, CreateBaseline, VisualRegressionEngine};
pub use figma::FigmaClient;
pub use pixel::{DiffOptions, DiffOutcome};
