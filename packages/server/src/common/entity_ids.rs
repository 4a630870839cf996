//! Typed ID definitions for all domain entities.
//!
//! ```rust
//! use briefcast_core::common::{ItemId, PodcastId};
//!
//! let item_id = ItemId::new();
//! let podcast_id = PodcastId::new();
//!
//! // This would be a compile error:
//! // let wrong: PodcastId = item_id;
//! ```

pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for User entities (digest recipients, item owners).
pub struct User;

/// Marker type for Item entities (one ingested URL).
pub struct Item;

/// Marker type for Podcast entities (synthesized audio).
pub struct Podcast;

/// Marker type for live-status subscriptions (never persisted).
pub struct Subscription;

// ============================================================================
// Type aliases
// ============================================================================

pub type UserId = Id<User>;
pub type ItemId = Id<Item>;
pub type PodcastId = Id<Podcast>;
pub type SubscriptionId = Id<Subscription, V4>;
