// Text cleanup module
// Strips configured patterns from track metadata before it is compared or submitted

use crate::config::CleanupConfig;
use crate::track::Track;
use regex::Regex;

pub struct TextCleaner {
    patterns: Vec<Regex>,
}

impl TextCleaner {
    /// Compile the configured patterns, skipping invalid ones
    pub fn new(config: &CleanupConfig) -> Self {
        if !config.enabled {
            return Self {
                patterns: Vec::new(),
            };
        }

        let patterns = config
            .patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Invalid cleanup pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Remove every pattern from `text`
    pub fn clean(&self, text: &str) -> String {
        if self.patterns.is_empty() {
            return text.to_string();
        }

        let cleaned = self
            .patterns
            .iter()
            .fold(text.to_string(), |acc, pattern| {
                pattern.replace_all(&acc, "").into_owned()
            });

        cleaned.trim().to_string()
    }

    pub fn clean_track(&self, track: Track) -> Track {
        Track {
            title: self.clean(&track.title),
            artist: self.clean(&track.artist),
            album: self.clean(&track.album),
        }
    }
}
