use xsdjson::cli::Cli;
use xsdjson::config::ConvertConfig;
use xsdjson::error::ConfigError;
use xsdjson::logging;
use xsdjson::remote::{HadoopCli, RemoteStore};
use xsdjson::scheduler;
use xsdjson::xsd::XsdSchema;

use anyhow::Context;
use clap::Parser;

/// Converts xml files to json, one record per match of an xpath, or one per document.
/// Failures of single files are logged, and don't change the exit code.
fn main() {
  if let Err(err) = run() {
    eprintln!("Error: {err:#}");
    std::process::exit(1);
  }
}

fn run() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let config = ConvertConfig::from_cli(&cli)?;
  logging::init(&config.log).context("cannot open log file")?;

  let schema = XsdSchema::load(&config.xsd_file)
    .with_context(|| format!("cannot load schema {}", config.xsd_file.display()))?;

  let store = match config.is_remote() {
    true => Some(HadoopCli::new(config.server.clone()).ok_or(ConfigError::NoHadoopClient)?),
    false => None,
  };

  scheduler::run(&config, &schema, store.as_ref().map(|s| s as &dyn RemoteStore))?;
  Ok(())
}
