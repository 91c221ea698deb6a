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


//! Language codes, stages and configured language slots
//!
//! Every code that enters the core goes through [`normalize_language_code`],
//! so `"es-ES"`, `"ES_es"` and `" es "` all address the same audio.

use crate::error::{PlaybackError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    /// ISO 639-1/639-3 style base code, after normalization
    static ref BASE_CODE_REGEX: Regex = Regex::new(r"^[a-z]{2,3}$").unwrap();
}

/// Reduce a locale-qualified code to its lowercase base form
///
/// Total and case-insensitive: `"xx-YY"` and `"xx_YY"` become `"xx"`,
/// surrounding whitespace is ignored. Never fails; garbage in gives
/// lowercase garbage out, which simply will not match any content.
pub fn normalize_language_code(code: &str) -> String {
    let trimmed = code.trim();
    let base = trimmed
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or(trimmed);
    base.to_ascii_lowercase()
}

/// Normalized language code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Language(String);

impl Language {
    pub fn new(code: &str) -> Self {
        Self(normalize_language_code(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the normalized code looks like a real base language code
    pub fn is_well_formed(&self) -> bool {
        BASE_CODE_REGEX.is_match(&self.0)
    }
}

impl From<String> for Language {
    fn from(code: String) -> Self {
        Self::new(&code)
    }
}

impl From<&str> for Language {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the (up to) three configured languages is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::First, Stage::Second, Stage::Third];

    /// 1-based ordinal
    pub fn ordinal(self) -> u8 {
        match self {
            Stage::First => 1,
            Stage::Second => 2,
            Stage::Third => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            1 => Some(Stage::First),
            2 => Some(Stage::Second),
            3 => Some(Stage::Third),
            _ => None,
        }
    }

    fn following(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ordinal())
    }
}

/// Languages assigned to the three stages
///
/// Stage 1 always has a language. Stages 2 and 3 may be "none", in which
/// case they are skipped when cycling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSlots {
    pub primary: Language,
    #[serde(default)]
    pub secondary: Option<Language>,
    #[serde(default)]
    pub tertiary: Option<Language>,
}

impl LanguageSlots {
    pub fn single(primary: Language) -> Self {
        Self {
            primary,
            secondary: None,
            tertiary: None,
        }
    }

    /// Build slots from an ordered list of codes (first is primary)
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Result<Self> {
        let mut iter = codes.iter().map(|c| Language::new(c.as_ref()));
        let primary = iter
            .next()
            .ok_or_else(|| PlaybackError::MissingRequiredField("primary language".to_string()))?;
        let secondary = iter.next();
        let tertiary = iter.next();
        if iter.next().is_some() {
            return Err(PlaybackError::invalid_input(format!(
                "At most 3 languages can be configured, got {}",
                codes.len()
            )));
        }
        Ok(Self {
            primary,
            secondary,
            tertiary,
        })
    }

    pub fn language_for(&self, stage: Stage) -> Option<&Language> {
        match stage {
            Stage::First => Some(&self.primary),
            Stage::Second => self.secondary.as_ref(),
            Stage::Third => self.tertiary.as_ref(),
        }
    }

    /// Next stage after `stage` that has a language, skipping absent slots
    pub fn next_stage(&self, stage: Stage) -> Option<Stage> {
        let mut candidate = stage.following();
        while let Some(next) = candidate {
            if self.language_for(next).is_some() {
                return Some(next);
            }
            candidate = next.following();
        }
        None
    }

    /// Assign (or clear) a slot; the primary slot cannot be cleared
    pub fn set(&mut self, stage: Stage, language: Option<Language>) -> Result<()> {
        match stage {
            Stage::First => {
                self.primary = language.ok_or_else(|| {
                    PlaybackError::invalid_input("The primary language slot cannot be empty")
                })?;
            }
            Stage::Second => self.secondary = language,
            Stage::Third => self.tertiary = language,
        }
        Ok(())
    }

    /// Configured (stage, language) pairs in stage order
    pub fn configured(&self) -> impl Iterator<Item = (Stage, &Language)> {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.language_for(stage).map(|lang| (stage, lang)))
    }

    pub fn configured_count(&self) -> usize {
        self.configured().count()
    }
}

impl Default for LanguageSlots {
    fn default() -> Self {
        Self::single(Language::new("en"))
    }
}
