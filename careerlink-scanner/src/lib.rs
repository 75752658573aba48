pub mod candidates;
pub mod classifier;
pub mod error;
pub mod fetcher;
pub mod outcome;
pub mod scheduler;
pub mod urls;

pub use candidates::{CandidateGenerator, CandidateMethod, CandidateUrl};
pub use classifier::{Classification, Classifier};
pub use error::ScanError;
pub use fetcher::{Fetcher, FetcherConfig, PageFetcher};
pub use outcome::{FetchOutcome, FetchStatus, TransportFailure};
pub use scheduler::{Admission, Scheduler, SchedulerConfig, ThrottledFetcher};
pub use urls::{base_origin, domain_key, normalize_url};
