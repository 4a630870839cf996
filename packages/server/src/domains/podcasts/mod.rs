pub mod models;
pub mod pipeline;
pub mod voices;

pub use models::{
    clamp_position, DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
pub use pipeline::{
    build_script_content, truncate_content, PodcastConfig, PodcastPipeline, PodcastProgress,
    ITEM_DELIMITER, TRUNCATION_MARKER,
};
pub use voices::{Speaker, VoiceMap};
