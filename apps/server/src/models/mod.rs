//! Domain models for the sign-up intake service.

pub mod audit;
pub mod extraction;
pub mod review;
pub mod sign_up;

// Re-export commonly used types
pub use audit::{AuditAction, AuditLogEntry};
pub use extraction::{
    ExtractionDetails, FieldConfidence, JobStats, JobStatus, MAX_EXTRACTION_ATTEMPTS, PendingJob,
};
pub use review::{
    ConfirmRequest, Corrections, DEFAULT_SKIP_REASON, ReviewItem, ReviewListResponse, ReviewQuery,
    SkipRequest,
};
pub use sign_up::{
    ExtractionStatus, MissingField, ReviewStatus, SignUp, SignUpChannel, SubmitSignUpRequest,
    SubmitSignUpResponse, cents_to_decimal, decimal_to_cents,
};
