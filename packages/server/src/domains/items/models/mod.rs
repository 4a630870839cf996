pub mod item;

pub use item::{normalize_set, Enrichment, Item, NewItem, ProcessingStatus};
