//! Payload of the `item-update` frames pushed to live subscribers.

use serde::{Deserialize, Serialize};

use super::models::{Item, ProcessingStatus};
use crate::common::ItemId;

/// Which queue transition produced the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Created,
    Processing,
    Completed,
    Failed,
    Retried,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub item_id: ItemId,
    pub processing_status: ProcessingStatus,
    pub update_type: UpdateType,
}

impl ItemUpdate {
    pub fn for_item(item: &Item, update_type: UpdateType) -> Self {
        Self {
            item_id: item.id,
            processing_status: item.processing_status,
            update_type,
        }
    }
}
