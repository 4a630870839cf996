pub mod podcast;

pub use podcast::{
    clamp_position, DialogueTurn, MemberRemoval, NewPodcast, Podcast, PodcastItem, PodcastStatus,
};
