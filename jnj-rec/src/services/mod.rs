//! Recognition pipeline services

pub mod acrcloud_client;
pub mod audd_client;
pub mod rate_limiter;
pub mod recognition_client;
pub mod result_merger;
pub mod retry;
pub mod segment_recognizer;
pub mod segmenter;
pub mod session_aggregator;

pub use acrcloud_client::{AcrCloudBackend, AcrCloudCredentials};
pub use audd_client::AuddBackend;
pub use rate_limiter::SharedRateLimiter;
pub use recognition_client::{BackendResponse, RecognitionBackend, RecognitionClient};
pub use result_merger::ResultMerger;
pub use segment_recognizer::SegmentRecognizer;
pub use session_aggregator::SessionAggregator;
