/*!
Validated run configuration.

Everything the flags describe is parsed and checked here, before the first
job is planned, so that a bad flag stops the run without touching any file.
*/

use crate::archive::Container;
use crate::cli::Cli;
use crate::error::{ConfigError, Error, PathError};
use crate::logging::LogConfig;
use crate::remote::{self, RemoteStore};
use crate::schema::{Cardinality, SchemaDecoder};
use crate::writer::{Format, Framing, WriteOptions};
use crate::xpath::{Path, PathSet};

use std::path::PathBuf;

/// Above this many jobs, they run in expansion order rather than largest first.
pub const SORT_LIMIT : usize = 1000;

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum TargetDir {
  /// each output next to its input
  Beside,
  Local(PathBuf),
  /// staged locally beside the input, then put here
  Remote(String),
}

#[derive(Debug,Clone)]
pub struct ConvertConfig {
  pub xsd_file : PathBuf,
  pub format : Format,
  pub target : TargetDir,
  pub compress : bool,
  pub xpath : Option<Path>,
  pub captures : PathSet,
  pub exclusions : PathSet,
  pub multi : usize,
  pub overwrite : bool,
  pub mkdirs : bool,
  pub server : Option<String>,
  pub patterns : Vec<String>,
  pub log : LogConfig,
}

fn path_list(flag : Option<&str>) -> Result<PathSet, PathError> {
  Ok(PathSet::new(flag.map(Path::parse_list).transpose()?.unwrap_or_default()))
}

impl ConvertConfig {
  pub fn from_cli(cli : &Cli) -> Result<Self, ConfigError> {
    let xpath = cli.xpath.as_deref().map(Path::parse).transpose()?;
    let captures = path_list(cli.attribpath.as_deref())?;
    let exclusions = path_list(cli.excludepaths.as_deref())?;
    if xpath.is_none() && !captures.is_empty() { return Err(ConfigError::CapturesWithoutTarget) }
    if cli.multi == 0 { return Err(ConfigError::NoWorkers) }

    let target = match cli.target_path.as_deref().map(str::trim) {
      None | Some("") => TargetDir::Beside,
      Some(t) if remote::is_remote(t) => TargetDir::Remote(t.to_string()),
      Some(t) => TargetDir::Local(PathBuf::from(t)),
    };

    Ok(Self{
      xsd_file: cli.xsd_file.clone(),
      format: cli.output_format,
      target,
      compress: cli.zip,
      xpath,
      captures,
      exclusions,
      multi: cli.multi,
      overwrite: !cli.no_overwrite,
      mkdirs: cli.mkdirs,
      server: cli.server.clone(),
      patterns: cli.xml_files.clone(),
      log: LogConfig::new(&cli.verbose, cli.log.clone())?,
    })
  }

  pub fn is_remote(&self) -> bool {
    matches!(self.target, TargetDir::Remote(_))
  }

  /// Cardinality of the target path. The target must be declared in the schema.
  pub fn cardinality(&self, schema : &dyn SchemaDecoder) -> Result<Cardinality, ConfigError> {
    match &self.xpath {
      None => Ok(Cardinality::Single),
      Some(xpath) => schema.cardinality(xpath).map_err(|err| {
        tracing::debug!("{xpath}: {err}");
        ConfigError::UnknownTarget(xpath.to_string())
      }),
    }
  }

  /// Arrays for repeatable targets and for containers. Records are wrapped
  /// for whole documents, and for a lone json record.
  pub fn write_options(&self, cardinality : Cardinality, container : Container) -> WriteOptions {
    let framing = match (cardinality, container) {
      (Cardinality::Array, _) | (_, Container::Zip) => Framing::Array,
      _ => Framing::Bare,
    };
    let wrap = self.xpath.is_none() || (self.format == Format::Json && framing == Framing::Bare);
    WriteOptions{ format: self.format, framing, wrap, compress: self.compress }
  }

  /// Check the target directory exists, creating it with `mkdirs`.
  pub fn prepare_target(&self, store : Option<&dyn RemoteStore>) -> Result<(), Error> {
    match &self.target {
      TargetDir::Beside => Ok(()),
      TargetDir::Local(dir) if dir.is_dir() => Ok(()),
      TargetDir::Local(dir) if self.mkdirs => {
        tracing::info!("creating {}", dir.display());
        Ok(std::fs::create_dir_all(dir)?)
      }
      TargetDir::Local(dir) => Err(ConfigError::InvalidTarget(dir.display().to_string()).into()),
      TargetDir::Remote(dir) => {
        let store = store.ok_or(ConfigError::NoHadoopClient)?;
        if store.exists(dir)? { return Ok(()) }
        if !self.mkdirs {
          let target = match &self.server {
            Some(server) => format!("{dir} using hadoop server: {server}"),
            None => dir.clone(),
          };
          return Err(ConfigError::InvalidTarget(target).into())
        }
        tracing::info!("creating {dir}");
        Ok(store.mkdirs(dir)?)
      }
    }
  }
}

#[cfg(test)]
mod test_config {
  use super::*;
  use clap::Parser;

  fn config(args : &[&str]) -> Result<ConvertConfig, ConfigError> {
    let cli = Cli::try_parse_from(["xsdjson", "-x", "po.xsd"].iter().chain(args).chain(&["po.xml"])).unwrap();
    ConvertConfig::from_cli(&cli)
  }

  #[test]
  fn parses_paths() {
    let cfg = config(&["-p", "/purchaseOrder/items/item", "-a", "/purchaseOrder,/purchaseOrder/shipTo", "-e", "/purchaseOrder/comment"]).unwrap();
    assert_eq!(cfg.xpath.unwrap().leaf(), "item");
    assert_eq!(cfg.captures.iter().count(), 2);
    assert_eq!(cfg.exclusions.iter().count(), 1);
    assert!(cfg.overwrite);
  }

  #[test]
  fn rejects_bad_flags() {
    assert!(matches!(config(&["-p", "purchaseOrder"]), Err(ConfigError::Path(PathError::NotAbsolute(_)))));
    assert!(matches!(config(&["-a", "/purchaseOrder"]), Err(ConfigError::CapturesWithoutTarget)));
    assert!(matches!(config(&["-m", "0"]), Err(ConfigError::NoWorkers)));
    assert!(matches!(config(&["-v", "LOUD"]), Err(ConfigError::LogLevel(_))));
  }

  #[test]
  fn target_kinds() {
    assert_eq!(config(&[]).unwrap().target, TargetDir::Beside);
    assert_eq!(config(&["-t", "/tmp/out"]).unwrap().target, TargetDir::Local("/tmp/out".into()));
    let remote = config(&["-t", "hdfs:///out"]).unwrap();
    assert_eq!(remote.target, TargetDir::Remote("hdfs:///out".into()));
    assert!(remote.is_remote());
  }

  #[test]
  fn framing_and_wrapping() {
    let item = config(&["-o", "json", "-p", "/purchaseOrder/items/item"]).unwrap();
    let opts = item.write_options(Cardinality::Array, Container::Plain);
    assert_eq!((opts.framing, opts.wrap), (Framing::Array, false));
    let opts = item.write_options(Cardinality::Single, Container::Plain);
    assert_eq!((opts.framing, opts.wrap), (Framing::Bare, true));
    let opts = item.write_options(Cardinality::Single, Container::Zip);
    assert_eq!((opts.framing, opts.wrap), (Framing::Array, false));

    let lines = config(&["-p", "/purchaseOrder/shipTo"]).unwrap();
    assert!(!lines.write_options(Cardinality::Single, Container::Plain).wrap);

    let whole = config(&[]).unwrap();
    let opts = whole.write_options(Cardinality::Single, Container::Plain);
    assert_eq!((opts.framing, opts.wrap), (Framing::Bare, true));
  }

  #[test]
  fn local_target_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("out");
    let missing = missing.to_str().unwrap();

    let cfg = config(&["-t", missing]).unwrap();
    assert!(matches!(cfg.prepare_target(None), Err(Error::Config(ConfigError::InvalidTarget(_)))));

    let cfg = config(&["-t", missing, "--mkdirs"]).unwrap();
    cfg.prepare_target(None).unwrap();
    assert!(dir.path().join("out").is_dir());

    let remote = config(&["-t", "hdfs:///out"]).unwrap();
    assert!(matches!(remote.prepare_target(None), Err(Error::Config(ConfigError::NoHadoopClient))));
  }
}
