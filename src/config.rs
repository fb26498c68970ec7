//! Application-level configuration loading: phase durations, game tuning, colors and word bank.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use rand::{Rng, seq::IndexedRandom};
use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WHISPER_BACK_CONFIG_PATH";
/// Fallback color returned when the palette is exhausted.
const DEFAULT_COLOR: &str = "#ffffff";

/// Duration of every timed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    /// Time allowed for every player to roll.
    pub dice: Duration,
    /// Pause showing the computed speaking order.
    pub turn_assignment: Duration,
    /// Time allowed to each speaker.
    pub turn: Duration,
    /// Open discussion once everyone spoke.
    pub discussion: Duration,
    /// Time allowed to cast a vote.
    pub voting: Duration,
    /// Pause showing the elimination outcome before the win check.
    pub results: Duration,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            dice: Duration::from_secs(30),
            turn_assignment: Duration::from_secs(5),
            turn: Duration::from_secs(30),
            discussion: Duration::from_secs(60),
            voting: Duration::from_secs(30),
            results: Duration::from_secs(8),
        }
    }
}

/// Secret word pair drawn once per game.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WordPair {
    /// Shown to every player.
    pub category: String,
    /// Word handed to civilians.
    pub civilian: String,
    /// Word handed to impostors.
    pub impostor: String,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    phases: PhaseDurations,
    min_players: usize,
    impostors: usize,
    impostor_parity_ratio: f64,
    vote_retry_attempts: u32,
    dice_seed: Option<u64>,
    colors: Vec<String>,
    words: Vec<WordPair>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        colors = app_config.colors.len(),
                        words = app_config.words.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Replace the phase durations.
    pub fn with_phases(mut self, phases: PhaseDurations) -> Self {
        self.phases = phases;
        self
    }

    /// Override the minimum number of members required to start.
    pub fn with_min_players(mut self, min_players: usize) -> Self {
        self.min_players = min_players;
        self
    }

    /// Override the bounded number of compare-and-swap attempts.
    pub fn with_vote_retry_attempts(mut self, attempts: u32) -> Self {
        self.vote_retry_attempts = attempts;
        self
    }

    /// Durations of the timed phases.
    pub fn phases(&self) -> &PhaseDurations {
        &self.phases
    }

    /// Fewest members a room needs to start.
    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn impostor_parity_ratio(&self) -> f64 {
        self.impostor_parity_ratio
    }

    /// Bound on compare-and-swap attempts for player updates.
    pub fn vote_retry_attempts(&self) -> u32 {
        self.vote_retry_attempts
    }

    /// Seed for reproducible dice, if any.
    pub fn dice_seed(&self) -> Option<u64> {
        self.dice_seed
    }

    /// Number of impostors for a game of `players`.
    ///
    /// Capped so civilians always start with a strict majority, and never below one.
    pub fn impostor_count(&self, players: usize) -> usize {
        let cap = players.saturating_sub(1) / 2;
        self.impostors.min(cap).max(1)
    }

    /// Return the first palette color that is not already listed in `used`.
    ///
    /// When every palette entry is already taken we fall back to [`DEFAULT_COLOR`] so
    /// callers always receive a value.
    pub fn first_unused_color(&self, used: &[String]) -> String {
        self.colors
            .iter()
            .find(|candidate| used.iter().all(|existing| existing != *candidate))
            .cloned()
            .unwrap_or_else(|| DEFAULT_COLOR.to_owned())
    }

    /// Draw a word pair from the bank.
    pub fn pick_words<R: Rng + ?Sized>(&self, rng: &mut R) -> WordPair {
        self.words
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| default_words().swap_remove(0))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            phases: PhaseDurations::default(),
            min_players: 3,
            impostors: 1,
            impostor_parity_ratio: 1.0,
            vote_retry_attempts: 16,
            dice_seed: None,
            colors: default_colors(),
            words: default_words(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    phases: RawPhases,
    min_players: usize,
    impostors: usize,
    impostor_parity_ratio: f64,
    vote_retry_attempts: u32,
    dice_seed: Option<u64>,
    colors: Vec<String>,
    words: Vec<WordPair>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = AppConfig::default();
        Self {
            phases: RawPhases::default(),
            min_players: defaults.min_players,
            impostors: defaults.impostors,
            impostor_parity_ratio: defaults.impostor_parity_ratio,
            vote_retry_attempts: defaults.vote_retry_attempts,
            dice_seed: None,
            colors: Vec::new(),
            words: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// Phase durations in whole seconds.
struct RawPhases {
    dice: u64,
    turn_assignment: u64,
    turn: u64,
    discussion: u64,
    voting: u64,
    results: u64,
}

impl Default for RawPhases {
    fn default() -> Self {
        let defaults = PhaseDurations::default();
        Self {
            dice: defaults.dice.as_secs(),
            turn_assignment: defaults.turn_assignment.as_secs(),
            turn: defaults.turn.as_secs(),
            discussion: defaults.discussion.as_secs(),
            voting: defaults.voting.as_secs(),
            results: defaults.results.as_secs(),
        }
    }
}

impl From<RawPhases> for PhaseDurations {
    fn from(value: RawPhases) -> Self {
        // a zero-length phase would never give players a chance to act
        let secs = |value: u64| Duration::from_secs(value.max(1));
        Self {
            dice: secs(value.dice),
            turn_assignment: secs(value.turn_assignment),
            turn: secs(value.turn),
            discussion: secs(value.discussion),
            voting: secs(value.voting),
            results: secs(value.results),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let colors = if value.colors.is_empty() {
            default_colors()
        } else {
            value.colors
        };
        let words = if value.words.is_empty() {
            default_words()
        } else {
            value.words
        };
        let impostor_parity_ratio = if value.impostor_parity_ratio.is_finite()
            && value.impostor_parity_ratio > 0.0
        {
            value.impostor_parity_ratio
        } else {
            warn!(
                ratio = value.impostor_parity_ratio,
                "ignoring invalid impostor parity ratio"
            );
            1.0
        };

        Self {
            phases: value.phases.into(),
            min_players: value.min_players.max(3),
            impostors: value.impostors.max(1),
            impostor_parity_ratio,
            vote_retry_attempts: value.vote_retry_attempts.max(1),
            dice_seed: value.dice_seed,
            colors,
            words,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in palette shipped with the binary.
fn default_colors() -> Vec<String> {
    [
        "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0",
        "#f032e6", "#bcf60c", "#fabebe", "#008080", "#e6beff",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_words() -> Vec<WordPair> {
    [
        ("food", "pizza", "lasagna"),
        ("animals", "wolf", "fox"),
        ("places", "beach", "desert"),
        ("music", "guitar", "violin"),
        ("sports", "tennis", "badminton"),
        ("drinks", "coffee", "tea"),
    ]
    .into_iter()
    .map(|(category, civilian, impostor)| WordPair {
        category: category.into(),
        civilian: civilian.into(),
        impostor: impostor.into(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impostor_count_leaves_civilian_majority() {
        let config = AppConfig::default();
        assert_eq!(config.impostor_count(3), 1);
        assert_eq!(config.impostor_count(12), 1);

        let raw: RawConfig = serde_json::from_str(r#"{"impostors": 4}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.impostor_count(3), 1);
        assert_eq!(config.impostor_count(5), 2);
        assert_eq!(config.impostor_count(12), 4);
    }

    #[test]
    fn first_unused_color_skips_taken_entries() {
        let config = AppConfig::default();
        let first = config.first_unused_color(&[]);
        let second = config.first_unused_color(std::slice::from_ref(&first));
        assert_ne!(first, second);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"phases": {"dice": 10}, "impostor_parity_ratio": -2}"#)
                .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.phases().dice, Duration::from_secs(10));
        assert_eq!(config.phases().voting, PhaseDurations::default().voting);
        assert_eq!(config.impostor_parity_ratio(), 1.0);
        assert_eq!(config.min_players(), 3);
        assert!(!config.words.is_empty());
    }
}
