//! Command line arguments.

use crate::writer::Format;
use clap::Parser;
use std::path::PathBuf;

/// XML to JSON converter, shaped by an XSD.
#[derive(Debug, Parser)]
#[command(name = "xsdjson")]
#[command(version, about, long_about = None)]
pub struct Cli {
  /// xsd file name
  #[arg(short = 'x', long = "xsd_file")]
  pub xsd_file : PathBuf,

  /// output format
  #[arg(short = 'o', long = "output_format", value_enum, default_value_t = Format::Jsonl)]
  pub output_format : Format,

  /// server with a hadoop client, when there is none here
  #[arg(short = 's', long)]
  pub server : Option<String>,

  /// target directory, eg /proj/test or hdfs:///proj/test. Default is beside each input.
  #[arg(short = 't', long = "target_path")]
  pub target_path : Option<String>,

  /// gzip output files
  #[arg(short = 'z', long)]
  pub zip : bool,

  /// path of the element to write one record per occurrence of, eg /purchaseOrder/items/item
  #[arg(short = 'p', long)]
  pub xpath : Option<String>,

  /// comma separated paths of elements whose attributes are added to each record
  #[arg(short = 'a', long)]
  pub attribpath : Option<String>,

  /// comma separated paths of elements to leave out
  #[arg(short = 'e', long)]
  pub excludepaths : Option<String>,

  /// number of files to convert concurrently
  #[arg(short = 'm', long, default_value_t = 1)]
  pub multi : usize,

  /// log file, always at DEBUG
  #[arg(short = 'l', long, env = "XSDJSON_LOG")]
  pub log : Option<PathBuf>,

  /// console log level: ERROR, WARNING, INFO, DEBUG or TRACE
  #[arg(short = 'v', long, env = "XSDJSON_VERBOSE", default_value = "INFO")]
  pub verbose : String,

  /// do not overwrite output files that exist already
  #[arg(short = 'n', long = "no_overwrite")]
  pub no_overwrite : bool,

  /// create the target directory when it is missing
  #[arg(long)]
  pub mkdirs : bool,

  /// xml files to convert, as glob patterns
  #[arg(required = true)]
  pub xml_files : Vec<String>,
}
