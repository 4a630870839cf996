pub mod compose;
pub mod orchestrator;

pub use compose::{compose_digest, escape_html, DigestVariant};
pub use orchestrator::{
    previous_day_window, DigestBatchReport, DigestConfig, DigestOrchestrator, DigestResult,
};
