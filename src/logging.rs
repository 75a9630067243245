/*!
Logging setup, once per run.

The console gets the `--verbose` level, unless `RUST_LOG` says otherwise.
A log file, when given, gets everything from DEBUG up.
*/

use crate::error::ConfigError;

use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct LogConfig {
  pub level : Level,
  pub file : Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self{ level: Level::INFO, file: None }
  }
}

impl LogConfig {
  /// `verbose` is a level name in any case. WARNING and CRITICAL are accepted too.
  pub fn new(verbose : &str, file : Option<PathBuf>) -> Result<Self, ConfigError> {
    let level = match verbose.trim().to_ascii_uppercase().as_str() {
      "WARNING" => Level::WARN,
      "CRITICAL" | "FATAL" => Level::ERROR,
      other => other.parse::<Level>().map_err(|_| ConfigError::LogLevel(verbose.into()))?,
    };
    Ok(Self{ level, file })
  }
}

/// Install the global subscriber. Does nothing when one is already installed.
pub fn init(config : &LogConfig) -> std::io::Result<()> {
  let console_filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::from_level(config.level).into())
    .from_env_lossy();
  let console = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_filter(console_filter);

  let file = match &config.file {
    Some(path) => {
      let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
      let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .with_filter(LevelFilter::DEBUG);
      Some(layer)
    }
    None => None,
  };

  // a second init, eg from tests in the same process, keeps the first subscriber
  let _ = tracing_subscriber::registry().with(console).with(file).try_init();
  Ok(())
}

#[cfg(test)]
mod test_logging {
  use super::*;

  #[test]
  fn level_names() {
    assert_eq!(LogConfig::new("DEBUG", None).unwrap().level, Level::DEBUG);
    assert_eq!(LogConfig::new("info", None).unwrap().level, Level::INFO);
    assert_eq!(LogConfig::new("WARNING", None).unwrap().level, Level::WARN);
    assert_eq!(LogConfig::new("Critical", None).unwrap().level, Level::ERROR);
    assert!(matches!(LogConfig::new("chatty", None), Err(ConfigError::LogLevel(l)) if l == "chatty"));
  }

  #[test]
  fn file_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    init(&LogConfig{ level: Level::ERROR, file: Some(path.clone()) }).unwrap();
    assert!(path.exists());
  }
}
