//! Business logic services.

pub mod confirmation;
pub mod rates;
pub mod recovery;
pub mod review;
pub mod storage;
pub mod submission;
pub mod vision;
pub mod worker;

pub use rates::{CommissionRates, DbCommissionRates, RateLookupError};
pub use recovery::{recover_stuck_jobs, start_stuck_job_sweep};
pub use storage::{ImageStore, S3ImageStore};
pub use submission::SubmissionService;
pub use vision::{
    ExtractOptions, ExtractionResult, HttpVisionBackend, VisionBackend, VisionError,
    VisionExtractionClient, VisionHealth,
};
pub use worker::{ExtractionWorker, ProcessOutcome, RetryDecision, RetryPolicy, start_extraction_workers};
