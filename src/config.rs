//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default tick delay between scheduler iterations.
const DEFAULT_LOOP_SECS: u64 = 10;
/// Default mail throttle: ten minutes.
const DEFAULT_MAIL_CHECK_SECS: u64 = 600;
/// Default deadline for one consume() batch.
const DEFAULT_CONSUME_TIMEOUT_SECS: u64 = 300;
/// Default deadline for one pull() call.
const DEFAULT_PULL_TIMEOUT_SECS: u64 = 120;

/// Intake daemon configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// The intake queue: where new documents await consumption.
    pub consumption_dir: PathBuf,
    /// Root under which the document stores live.
    pub media_root: PathBuf,
    /// Fixed delay between scheduler ticks.
    pub loop_interval: Duration,
    /// Minimum elapsed time between mail pulls.
    pub mail_check_interval: Duration,
    /// Deadline for a single consume() batch.
    pub consume_timeout: Duration,
    /// Deadline for a single pull() call.
    pub pull_timeout: Duration,
    /// Mail source location. `None` disables mail fetching.
    pub maildir: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            consumption_dir: PathBuf::from("./consume"),
            media_root: PathBuf::from("./media"),
            loop_interval: Duration::from_secs(DEFAULT_LOOP_SECS),
            mail_check_interval: Duration::from_secs(DEFAULT_MAIL_CHECK_SECS),
            consume_timeout: Duration::from_secs(DEFAULT_CONSUME_TIMEOUT_SECS),
            pull_timeout: Duration::from_secs(DEFAULT_PULL_TIMEOUT_SECS),
            maildir: None,
        }
    }
}

impl IntakeConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// An env var that is set but unparseable is a `ConfigError` rather than
    /// a silent fallback, so a typo in an interval does not go unnoticed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let consumption_dir = std::env::var("INTAKE_CONSUMPTION_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.consumption_dir);

        let media_root = std::env::var("INTAKE_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.media_root);

        let maildir = std::env::var("INTAKE_MAILDIR").ok().map(PathBuf::from);

        Ok(Self {
            consumption_dir,
            media_root,
            loop_interval: duration_from_env("INTAKE_LOOP_SECS", defaults.loop_interval)?,
            mail_check_interval: duration_from_env(
                "INTAKE_MAIL_CHECK_SECS",
                defaults.mail_check_interval,
            )?,
            consume_timeout: duration_from_env(
                "INTAKE_CONSUME_TIMEOUT_SECS",
                defaults.consume_timeout,
            )?,
            pull_timeout: duration_from_env("INTAKE_PULL_TIMEOUT_SECS", defaults.pull_timeout)?,
            maildir,
        })
    }

    /// Where consumed originals are stored.
    pub fn originals_dir(&self) -> PathBuf {
        self.media_root.join("documents").join("originals")
    }

    /// Where thumbnails are stored. Created at startup, written by others.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.media_root.join("documents").join("thumbnails")
    }
}

/// Read a whole-seconds duration from `key`, or use `default` when unset.
fn duration_from_env(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_secs(&raw).map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a non-zero whole-seconds value.
fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("expected whole seconds, got {raw:?}"))?;
    if secs == 0 {
        return Err("must be at least 1 second".to_string());
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_secs_accepts_plain_integers() {
        assert_eq!(parse_secs("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_secs(" 600 "), Ok(Duration::from_secs(600)));
    }

    #[test]
    fn parse_secs_rejects_zero_and_garbage() {
        assert!(parse_secs("0").is_err());
        assert!(parse_secs("ten").is_err());
        assert!(parse_secs("-5").is_err());
        assert!(parse_secs("1.5").is_err());
    }

    #[test]
    fn default_mail_check_is_ten_minutes() {
        let config = IntakeConfig::default();
        assert_eq!(config.mail_check_interval, Duration::from_secs(600));
    }

    #[test]
    fn storage_dirs_derive_from_media_root() {
        let config = IntakeConfig {
            media_root: PathBuf::from("/srv/media"),
            ..IntakeConfig::default()
        };
        assert_eq!(
            config.originals_dir(),
            PathBuf::from("/srv/media/documents/originals")
        );
        assert_eq!(
            config.thumbnails_dir(),
            PathBuf::from("/srv/media/documents/thumbnails")
        );
    }
}
