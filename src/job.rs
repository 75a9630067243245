/*!
One input file, converted to one output file.
*/

use crate::archive::{self, Container};
use crate::config::ConvertConfig;
use crate::error::JobError;
use crate::extractor::{ExtractSummary, Extractor};
use crate::parser::XmlEvents;
use crate::schema::{Cardinality, SchemaDecoder};
use crate::writer::{Format, IncrementalWriter, WriteSummary};

use std::path::{Path as FsPath, PathBuf};

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct Job {
  pub input : PathBuf,
  /// local output, also the staging file for a remote target
  pub output : PathBuf,
  pub remote : Option<String>,
  /// input size in bytes, for ordering
  pub size : u64,
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum JobOutcome {
  Converted(WriteSummary),
  /// nothing matched, and there is no output
  Empty,
}

/// `a.xml` becomes `a.jsonl`, `a.json`, or with compression `a.jsonl.gz`.
/// Names without an `.xml` or `.zip` suffix keep it all.
pub fn output_file_name(input : &FsPath, format : Format, compress : bool) -> String {
  let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  let stem = [".xml", ".zip"].iter()
    .find_map(|suffix| strip_suffix_ignore_case(&name, suffix))
    .unwrap_or(&name);
  let gz = if compress { ".gz" } else { "" };
  format!("{stem}.{}{gz}", format.extension())
}

fn strip_suffix_ignore_case<'a>(name : &'a str, suffix : &str) -> Option<&'a str> {
  let split = name.len().checked_sub(suffix.len())?;
  match name.get(split..) {
    Some(tail) if tail.eq_ignore_ascii_case(suffix) => Some(&name[..split]),
    _ => None,
  }
}

/// Parse, extract and write. A failure part way removes the output.
pub fn run_job(job : &Job, config : &ConvertConfig, schema : &dyn SchemaDecoder, cardinality : Cardinality) -> Result<JobOutcome, JobError> {
  tracing::info!("Parsing {}", job.input.display());
  let opts = config.write_options(cardinality, Container::of(&job.input));
  let mut writer = IncrementalWriter::create(&job.output, opts)?;
  tracing::info!("Writing to file {}", job.output.display());

  let mut extractor = Extractor::new(config.xpath.as_ref(), &config.captures, &config.exclusions);
  let mut summary = ExtractSummary::default();
  let scanned = archive::for_each_document(&job.input, |name, content| {
    let mut events = XmlEvents::new(content);
    summary += extractor.extract(&mut events, schema, &mut writer)?;
    tracing::debug!("{name}: {} bytes read", events.bytes_read());
    Ok(())
  });

  if let Err(err) = scanned {
    writer.abandon();
    return Err(err)
  }
  if summary.skipped > 0 {
    tracing::info!("{} of {} records skipped in {}", summary.skipped, summary.matches, job.input.display());
  }

  let written = writer.close()?;
  if written.removed {
    tracing::debug!("No data found in {}", job.input.display());
    Ok(JobOutcome::Empty)
  } else {
    tracing::info!("Completed {}", job.input.display());
    Ok(JobOutcome::Converted(written))
  }
}

/// run_job, with a panic turned into an error and its partial output removed.
pub fn run_isolated(job : &Job, config : &ConvertConfig, schema : &dyn SchemaDecoder, cardinality : Cardinality) -> Result<JobOutcome, JobError> {
  let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_job(job, config, schema, cardinality)));
  result.unwrap_or_else(|payload| {
    let msg = payload.downcast_ref::<&str>().map(|s| s.to_string())
      .or_else(|| payload.downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "unknown panic".into());
    if job.output.exists() {
      let _ = std::fs::remove_file(&job.output);
    }
    Err(JobError::Panicked(msg))
  })
}

#[cfg(test)]
mod test_job {
  use super::*;

  #[test]
  fn output_names() {
    assert_eq!(output_file_name(FsPath::new("/in/po.xml"), Format::Jsonl, false), "po.jsonl");
    assert_eq!(output_file_name(FsPath::new("po.zip"), Format::Json, true), "po.json.gz");
    assert_eq!(output_file_name(FsPath::new("po.XML"), Format::Json, false), "po.json");
    assert_eq!(output_file_name(FsPath::new("B.ZIP"), Format::Json, false), "B.json");
    assert_eq!(output_file_name(FsPath::new("a.xml.Zip"), Format::Jsonl, false), "a.xml.jsonl");
    assert_eq!(output_file_name(FsPath::new(".zip"), Format::Jsonl, false), ".jsonl");
    assert_eq!(output_file_name(FsPath::new("data"), Format::Jsonl, true), "data.jsonl.gz");
  }
}
