pub mod browser;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod table;

pub use browser::{BrowserCheck, BrowserLauncher, BrowserOptions, BrowserPool, Navigation};
pub use engine::{BatchReport, Engine, EngineMode, EngineOptions};
pub use error::{BrowserError, EngineError, TableError};
pub use model::{DetectionMethod, OutputRow, ResolutionResult, Target};
pub use pipeline::{BrowserHandoff, Pipeline, PipelineOutcome};
pub use sink::{Counters, ResultCallback};

pub use careerlink_scanner as scanner;
