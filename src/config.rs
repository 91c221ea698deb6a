// Polyglot Reader - Sentence-Synchronized Multilingual Audiobook Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Engine configuration
//!
//! Stored as JSON next to the app's other settings. A missing file yields
//! the defaults; a present but invalid file is an error.

use crate::audio::resolver::DEFAULT_OFFSET_TOLERANCE_MS;
use crate::content::language::{Language, LanguageSlots};
use crate::error::{PlaybackError, Result};
use crate::playback::cursor::PlaybackMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Slowest allowed playback rate
pub const MIN_SPEED: f32 = 0.5;

/// Fastest allowed playback rate
pub const MAX_SPEED: f32 = 3.0;

/// Fade-out applied before switching to a different chunk file
pub const DEFAULT_FADE_OUT_MS: u64 = 150;

/// Default progress database file name
pub const DEFAULT_DB_FILE: &str = "polyglot_progress.db";

/// Playback engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Languages for stages 1..3
    pub languages: LanguageSlots,

    /// Mode used when no progress has been saved
    pub default_mode: PlaybackMode,

    /// Rate used for languages without an explicit speed
    pub default_speed: f32,

    pub min_speed: f32,
    pub max_speed: f32,

    /// Fade before the old chunk file is released
    pub fade_out_ms: u64,

    /// Allowed content index / playback map drift
    pub offset_tolerance_ms: f64,

    /// SQLite file holding listening progress
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            languages: LanguageSlots::default(),
            default_mode: PlaybackMode::Sentence,
            default_speed: 1.0,
            min_speed: MIN_SPEED,
            max_speed: MAX_SPEED,
            fade_out_ms: DEFAULT_FADE_OUT_MS,
            offset_tolerance_ms: DEFAULT_OFFSET_TOLERANCE_MS,
            database_path: PathBuf::from(DEFAULT_DB_FILE),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load from a JSON file, falling back to defaults if it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.languages.primary.as_str().is_empty() {
            return Err(PlaybackError::InvalidConfiguration(
                "primary language is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (stage, language) in self.languages.configured() {
            if !language.is_well_formed() {
                return Err(PlaybackError::InvalidConfiguration(format!(
                    "stage {} language '{}' is not a language code",
                    stage, language
                )));
            }
            if !seen.insert(language) {
                return Err(PlaybackError::InvalidConfiguration(format!(
                    "language '{}' is assigned to more than one stage",
                    language
                )));
            }
        }

        if !(self.min_speed.is_finite() && self.max_speed.is_finite())
            || self.min_speed <= 0.0
            || self.min_speed > self.max_speed
        {
            return Err(PlaybackError::InvalidConfiguration(format!(
                "speed range {}..={} is invalid",
                self.min_speed, self.max_speed
            )));
        }
        if self.min_speed < MIN_SPEED || self.max_speed > MAX_SPEED {
            return Err(PlaybackError::InvalidConfiguration(format!(
                "speed range must stay within {}..={}",
                MIN_SPEED, MAX_SPEED
            )));
        }
        if !self.speed_range().contains(&self.default_speed) {
            return Err(PlaybackError::InvalidConfiguration(format!(
                "default speed {} is outside {}..={}",
                self.default_speed, self.min_speed, self.max_speed
            )));
        }
        if !self.offset_tolerance_ms.is_finite() || self.offset_tolerance_ms < 0.0 {
            return Err(PlaybackError::InvalidConfiguration(
                "offset tolerance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn speed_range(&self) -> RangeInclusive<f32> {
        self.min_speed..=self.max_speed
    }

    /// Clamp a requested rate into the allowed range
    pub fn clamp_speed(&self, speed: f32) -> f32 {
        speed.clamp(self.min_speed, self.max_speed)
    }

    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }
}

/// Builder for EngineConfig
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn languages(mut self, languages: LanguageSlots) -> Self {
        self.config.languages = languages;
        self
    }

    pub fn primary_language(mut self, code: &str) -> Self {
        self.config.languages.primary = Language::new(code);
        self
    }

    pub fn secondary_language(mut self, code: Option<&str>) -> Self {
        self.config.languages.secondary = code.map(Language::new);
        self
    }

    pub fn tertiary_language(mut self, code: Option<&str>) -> Self {
        self.config.languages.tertiary = code.map(Language::new);
        self
    }

    pub fn default_mode(mut self, mode: PlaybackMode) -> Self {
        self.config.default_mode = mode;
        self
    }

    pub fn default_speed(mut self, speed: f32) -> Self {
        self.config.default_speed = speed;
        self
    }

    pub fn speed_range(mut self, min: f32, max: f32) -> Self {
        self.config.min_speed = min;
        self.config.max_speed = max;
        self
    }

    pub fn fade_out(mut self, fade: Duration) -> Self {
        self.config.fade_out_ms = fade.as_millis() as u64;
        self
    }

    pub fn offset_tolerance_ms(mut self, tolerance_ms: f64) -> Self {
        self.config.offset_tolerance_ms = tolerance_ms;
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fade_out(), Duration::from_millis(150));
        assert_eq!(config.offset_tolerance_ms, 2.0);
        assert_eq!(config.clamp_speed(10.0), 3.0);
        assert_eq!(config.clamp_speed(0.1), 0.5);
    }

    #[test]
    fn test_builder_normalizes_languages() {
        let config = EngineConfig::builder()
            .primary_language("en-US")
            .secondary_language(Some("ES_es"))
            .default_mode(PlaybackMode::Paragraph)
            .build()
            .unwrap();
        assert_eq!(config.languages.primary.as_str(), "en");
        assert_eq!(config.languages.secondary.as_ref().unwrap().as_str(), "es");
        assert_eq!(config.languages.configured_count(), 2);
    }

    #[test]
    fn test_rejects_duplicate_languages() {
        let err = EngineConfig::builder()
            .primary_language("en")
            .tertiary_language(Some("en-GB"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_empty_primary_and_bad_speeds() {
        assert!(EngineConfig::builder().primary_language(" ").build().is_err());
        assert!(EngineConfig::builder().default_speed(4.0).build().is_err());
        assert!(EngineConfig::builder().speed_range(2.0, 1.0).build().is_err());
        assert!(EngineConfig::builder().speed_range(0.1, 1.0).build().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.json");
        let config = EngineConfig::builder()
            .primary_language("de")
            .secondary_language(Some("fr"))
            .default_speed(1.25)
            .build()
            .unwrap();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "languages": { "primary": "it" }, "fade_out_ms": 300 }"#).unwrap();
        assert_eq!(config.languages.primary.as_str(), "it");
        assert_eq!(config.fade_out_ms, 300);
        assert_eq!(config.default_speed, 1.0);
    }
}
