//! Speaker roles and the voice each one is read with.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::models::DialogueTurn;
use crate::common::CoreError;

/// The closed set of roles a script may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Host,
    Guest,
}

impl FromStr for Speaker {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Speaker::Host),
            "guest" => Ok(Speaker::Guest),
            _ => Err(CoreError::UnknownSpeaker(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMap {
    pub host: String,
    pub guest: String,
}

impl Default for VoiceMap {
    fn default() -> Self {
        Self {
            host: "alloy".to_string(),
            guest: "onyx".to_string(),
        }
    }
}

impl VoiceMap {
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Host => &self.host,
            Speaker::Guest => &self.guest,
        }
    }

    /// Resolves every turn to a voice before any audio is requested.
    ///
    /// The first unknown speaker fails the whole script.
    pub fn resolve_script<'a>(&'a self, turns: &[DialogueTurn]) -> Result<Vec<&'a str>, CoreError> {
        turns
            .iter()
            .map(|turn| {
                let speaker: Speaker = turn.speaker.parse()?;
                Ok(self.voice_for(speaker))
            })
            .collect()
    }
}
