//! Kernel module - server infrastructure and dependencies.

pub mod ai;
pub mod deps;
pub mod email;
pub mod scheduled_tasks;
pub mod scraper;
pub mod speech;
pub mod sse;
pub mod stitcher;
pub mod storage;
pub mod store;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

// Production clients
pub use ai::OpenAiClient;
pub use email::HttpEmailSender;
pub use scraper::HttpScraper;
pub use speech::OpenAiSpeech;
pub use stitcher::FfmpegStitcher;
pub use storage::HttpBlobStorage;

// Other exports
pub use deps::{CoreServices, ServerDeps};
pub use scheduled_tasks::{start_scheduler, Schedules};
pub use stream_hub::{PublishOutcome, StreamHub, Subscription};
pub use test_dependencies::TestDependencies;
pub use traits::*;
