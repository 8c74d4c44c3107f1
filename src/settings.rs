use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, Source};
use serde::Deserialize;

use crate::model::{Difficulty, Source as ProblemSource};

pub const ENV_PREFIX: &str = "CONTEST";
pub const MAX_DELAY_SECONDS: f64 = 300.0;
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Run settings. Defaults are overlaid by `CONTEST_*` environment variables,
/// then by command-line flags.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub log_file: PathBuf,
    /// Minimum gap between requests, also the backoff base. Unset means the
    /// per-source default.
    pub delay_seconds: Option<f64>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub problem_limit: i64,
    pub min_rating: Option<i32>,
    pub max_rating: Option<i32>,
    pub difficulty: Option<String>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .set_default("db_path", "data/problems.sqlite")?
            .set_default("log_file", "contest_import.log")?
            .set_default("max_retries", 3)?
            .set_default("timeout_seconds", 30)?
            .set_default("problem_limit", 50)?
            .set_default("dry_run", false)?
            .set_default("verbose", false)?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Collects every problem with the settings instead of stopping at the
    /// first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.problem_limit < 1 {
            errors.push(format!("problem limit must be >= 1 (got {})", self.problem_limit));
        }
        if let Some(d) = self.delay_seconds {
            if !d.is_finite() || !(0.0..=MAX_DELAY_SECONDS).contains(&d) {
                errors.push(format!(
                    "delay must be between 0 and {} seconds (got {})",
                    MAX_DELAY_SECONDS, d
                ));
            }
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            errors.push(format!(
                "max retries must be <= {} (got {})",
                MAX_RETRIES_LIMIT, self.max_retries
            ));
        }
        if self.timeout_seconds == 0 {
            errors.push("timeout must be at least 1 second".to_string());
        }
        if let Some(r) = self.min_rating {
            if r < 0 {
                errors.push(format!("min rating must be >= 0 (got {})", r));
            }
        }
        if let (Some(min), Some(max)) = (self.min_rating, self.max_rating) {
            if max < min {
                errors.push(format!("max rating {} is below min rating {}", max, min));
            }
        }
        if let Some(d) = &self.difficulty {
            if let Err(e) = d.parse::<Difficulty>() {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty.as_deref().and_then(|d| d.parse().ok())
    }

    pub fn limit(&self) -> usize {
        self.problem_limit.max(1) as usize
    }

    /// Falls back to the per-source default when the configured delay is
    /// not a representable duration.
    pub fn delay_for(&self, source: ProblemSource) -> Duration {
        let default = match source {
            ProblemSource::Codeforces => Duration::from_secs(2),
            ProblemSource::LeetCode => Duration::from_secs(1),
        };
        self.delay_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(default)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use config::{File, FileFormat};

    use super::*;

    fn from_json(json: &str) -> Settings {
        Settings::from_source(File::from_str(json, FileFormat::Json)).unwrap()
    }

    #[test]
    fn defaults() {
        let s = from_json("{}");
        assert_eq!(s.db_path, PathBuf::from("data/problems.sqlite"));
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.problem_limit, 50);
        assert_eq!(s.timeout(), Duration::from_secs(30));
        assert!(!s.dry_run);
        assert_eq!(s.delay_for(ProblemSource::Codeforces), Duration::from_secs(2));
        assert_eq!(s.delay_for(ProblemSource::LeetCode), Duration::from_secs(1));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn explicit_delay_applies_to_both_sources() {
        let s = from_json(r#"{"delay_seconds": 0.5, "difficulty": "Hard"}"#);
        assert_eq!(s.delay_for(ProblemSource::Codeforces), Duration::from_millis(500));
        assert_eq!(s.delay_for(ProblemSource::LeetCode), Duration::from_millis(500));
        assert_eq!(s.difficulty(), Some(Difficulty::Hard));
    }

    #[test]
    fn validation_collects_every_error() {
        let s = from_json(
            r#"{"problem_limit": 0, "delay_seconds": -1.0, "min_rating": 1600,
                "max_rating": 1200, "difficulty": "extreme"}"#,
        );
        let errors = s.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("limit"));
        assert!(errors[3].contains("extreme"));
    }

    #[test]
    fn oversized_delay_and_retries_are_config_errors() {
        let s = from_json(r#"{"delay_seconds": 1e20, "max_retries": 50}"#);
        let errors = s.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("delay"));
        assert!(errors[1].contains("retries"));

        // Never panics, even when validation is skipped.
        assert_eq!(s.delay_for(ProblemSource::Codeforces), Duration::from_secs(2));
        let negative = from_json(r#"{"delay_seconds": -3.0}"#);
        assert_eq!(negative.delay_for(ProblemSource::LeetCode), Duration::from_secs(1));
    }

    #[test]
    fn delay_ceiling_is_inclusive() {
        let s = from_json(r#"{"delay_seconds": 300.0, "max_retries": 10}"#);
        assert!(s.validate().is_ok());
        assert_eq!(s.delay_for(ProblemSource::Codeforces), Duration::from_secs(300));
    }
}
