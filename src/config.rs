//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::effects::PlaybackSettings;
use crate::obs::ObsSettings;

const DEFAULT_PASSWORD_FILE: &str = "~/.config/memen_demon/obs_password";

/// Command-line arguments (each also readable from the environment)
#[derive(Debug, Parser)]
#[command(
    name = "memen-daemon",
    version,
    about = "Plays OBS effects on command and ducks music under speech"
)]
pub struct Cli {
    /// OBS websocket URL
    #[arg(long, env = "MEMEN_OBS_URL", default_value = "ws://127.0.0.1:4455")]
    pub obs_url: String,

    /// OBS websocket password
    #[arg(long, env = "MEMEN_OBS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// File holding the OBS password, used when no password is given
    #[arg(long, env = "MEMEN_OBS_PASSWORD_FILE", default_value = DEFAULT_PASSWORD_FILE)]
    pub password_file: String,

    /// Command socket address
    #[arg(long, env = "MEMEN_LISTEN", default_value = "127.0.0.1:5555")]
    pub listen: String,

    /// Speech status feed address
    #[arg(long, env = "MEMEN_SPEECH_FEED", default_value = "127.0.0.1:5556")]
    pub speech_feed: String,

    /// Scene used when a command names none (default: current program scene)
    #[arg(long, env = "MEMEN_DEFAULT_SCENE")]
    pub default_scene: Option<String>,

    /// Background audio input to duck
    #[arg(long, env = "MEMEN_MUSIC_INPUT", default_value = "Music")]
    pub music_input: String,

    /// Text input updated by TRACK commands
    #[arg(long, env = "MEMEN_TRACK_INPUT", default_value = "NowPlaying")]
    pub track_input: String,

    /// How long to wait for an effect to start playing
    #[arg(long, default_value_t = 3000)]
    pub start_timeout_ms: u64,

    /// How long to wait for an effect to stop playing
    #[arg(long, default_value_t = 30_000)]
    pub end_timeout_ms: u64,

    /// Timeout for a single OBS request
    #[arg(long, default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Delay before reconnecting to the speech feed
    #[arg(long, default_value_t = 3000)]
    pub feed_backoff_ms: u64,
}

/// Daemon configuration
#[derive(Clone)]
pub struct Config {
    pub obs: ObsSettings,
    pub playback: PlaybackSettings,
    /// Command socket address
    pub listen_addr: String,
    /// Speech status feed address
    pub speech_feed_addr: String,
    pub music_input: String,
    pub track_input: String,
    pub feed_backoff: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("obs_url", &self.obs.url)
            .field("password", &self.obs.password.as_ref().map(|_| "<redacted>"))
            .field("listen_addr", &self.listen_addr)
            .field("speech_feed_addr", &self.speech_feed_addr)
            .field("default_scene", &self.playback.default_scene)
            .field("music_input", &self.music_input)
            .field("track_input", &self.track_input)
            .finish()
    }
}

impl Config {
    /// Load configuration from the command line and environment
    pub fn load() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self> {
        let password = match cli.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(password),
            None => {
                let optional = cli.password_file == DEFAULT_PASSWORD_FILE;
                read_password_file(&cli.password_file, optional)?
            }
        };

        Ok(Self {
            obs: ObsSettings {
                url: cli.obs_url,
                password,
                request_timeout: Duration::from_millis(cli.request_timeout_ms),
            },
            playback: PlaybackSettings {
                default_scene: cli.default_scene.filter(|s| !s.is_empty()),
                start_timeout: Duration::from_millis(cli.start_timeout_ms),
                end_timeout: Duration::from_millis(cli.end_timeout_ms),
                ..PlaybackSettings::default()
            },
            listen_addr: cli.listen,
            speech_feed_addr: cli.speech_feed,
            music_input: cli.music_input,
            track_input: cli.track_input,
            feed_backoff: Duration::from_millis(cli.feed_backoff_ms),
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Read and trim the password file. A missing file is only tolerated when it
/// is the default location.
fn read_password_file(path: &str, optional: bool) -> Result<Option<String>> {
    let path = expand_home(path);
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let password = contents.trim().to_string();
            Ok((!password.is_empty()).then_some(password))
        }
        Err(e) if optional && e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("failed to read password file {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["memen-daemon"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_explicit_password_wins() {
        let config = Config::from_cli(cli(&[
            "--password",
            "hunter2",
            "--password-file",
            "/definitely/not/here",
        ]))
        .unwrap();
        assert_eq!(config.obs.password.as_deref(), Some("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_password_file_is_trimmed() {
        let dir = std::env::temp_dir().join(format!("memen-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("obs_password");
        std::fs::write(&file, "  s3cret\n").unwrap();

        let args = ["--password-file", file.to_str().unwrap()];
        let config = assert_ok!(Config::from_cli(cli(&args)));
        assert_eq!(config.obs.password.as_deref(), Some("s3cret"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_explicit_password_file_is_an_error() {
        assert_err!(Config::from_cli(cli(&["--password-file", "/definitely/not/here"])));
    }

    #[test]
    fn test_timeouts_and_scene() {
        let config = Config::from_cli(cli(&[
            "--password",
            "x",
            "--default-scene",
            "memes",
            "--start-timeout-ms",
            "1500",
        ]))
        .unwrap();
        assert_eq!(config.playback.default_scene.as_deref(), Some("memes"));
        assert_eq!(config.playback.start_timeout, Duration::from_millis(1500));
        assert_eq!(config.playback.end_timeout, Duration::from_secs(30));
        assert_eq!(config.listen_addr, "127.0.0.1:5555");
    }
}
