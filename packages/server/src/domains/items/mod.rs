pub mod enrich;
pub mod events;
pub mod models;
pub mod queue;
pub mod worker;

pub use enrich::{Enricher, ItemPipeline};
pub use events::{ItemUpdate, UpdateType};
pub use models::{normalize_set, Enrichment, Item, NewItem, ProcessingStatus};
pub use queue::{default_retry_window, ItemQueue, ItemStatusView, ItemUpdateHub, RetrySweep};
pub use worker::{backoff_delay, WorkerPool, WorkerPoolConfig, INTERRUPTED_MESSAGE};
