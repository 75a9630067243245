/*!
Runs one job per input file on a bounded pool of worker threads.

Jobs go across a bounded channel to the workers, and outcomes come back
across another to the calling thread, which stages outputs to the remote
target one at a time. A failed job is logged and counted; a failed remote
transfer ends the run.
*/

use crate::config::{ConvertConfig, TargetDir, SORT_LIMIT};
use crate::error::{ConfigError, Error, JobError, RemoteError};
use crate::job::{self, Job, JobOutcome};
use crate::remote::{self, RemoteStore};
use crate::schema::SchemaDecoder;

use rustc_hash::FxHashSet;
use std::path::{Path as FsPath, PathBuf};

#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct RunSummary {
  pub converted : u64,
  pub empty : u64,
  pub skipped : u64,
  pub failed : u64,
}

impl std::fmt::Display for RunSummary {
  fn fmt(&self, f : &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} converted, {} empty, {} skipped, {} failed", self.converted, self.empty, self.skipped, self.failed)
  }
}

/// Expand glob patterns into files, each once, in first-seen order.
pub fn expand_patterns<S : AsRef<str>>(patterns : &[S]) -> Result<Vec<PathBuf>, ConfigError> {
  let mut seen = FxHashSet::default();
  let mut files = vec![];
  for pattern in patterns {
    let pattern = pattern.as_ref();
    let entries = glob::glob(pattern).map_err(|source| ConfigError::Pattern{ pattern: pattern.into(), source })?;
    for entry in entries {
      match entry {
        Ok(path) if path.is_file() => if seen.insert(path.clone()) { files.push(path) },
        Ok(_) => (),
        Err(err) => tracing::warn!("skipping unreadable match of {pattern}: {err}"),
      }
    }
  }
  Ok(files)
}

/// Decide each file's output, dropping those that must not be overwritten. Largest first.
pub fn plan_jobs(files : Vec<PathBuf>, config : &ConvertConfig, store : Option<&dyn RemoteStore>) -> Result<(Vec<Job>, u64), Error> {
  let mut jobs = vec![];
  let mut skipped = 0;

  for input in files {
    let name = job::output_file_name(&input, config.format, config.compress);
    let beside = input.parent().map(|dir| dir.join(&name)).unwrap_or_else(|| PathBuf::from(&name));

    let (output, remote, exists) = match &config.target {
      TargetDir::Beside => { let exists = beside.is_file(); (beside, None, exists) }
      TargetDir::Local(dir) => { let output = dir.join(&name); let exists = output.is_file(); (output, None, exists) }
      TargetDir::Remote(dir) => {
        let store = store.ok_or(ConfigError::NoHadoopClient)?;
        let remote = remote::remote_join(dir, &name);
        let exists = !config.overwrite && store.exists(&remote)?;
        (beside, Some(remote), exists)
      }
    };

    if !config.overwrite && exists {
      tracing::debug!("No overwrite. Skipping {}", input.display());
      skipped += 1;
      continue
    }

    let size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
    jobs.push(Job{ input, output, remote, size });
  }

  if jobs.len() <= SORT_LIMIT {
    jobs.sort_by(|a, b| b.size.cmp(&a.size));
    tracing::info!("Parsing files in the following order:");
    tracing::info!("{:?}", jobs.iter().map(|j| j.input.display().to_string()).collect::<Vec<_>>());
  }
  Ok((jobs, skipped))
}

/// Put a finished output to its remote location, then remove the local copy.
fn stage(local : &FsPath, remote : &str, store : &dyn RemoteStore, overwrite : bool) -> Result<(), RemoteError> {
  tracing::info!("Moving {} to {remote}", local.display());
  if overwrite && store.exists(remote)? {
    store.remove(remote)?;
  }
  store.put(local, remote)?;
  if let Err(err) = std::fs::remove_file(local) {
    tracing::warn!("cannot remove staged {}: {err}", local.display());
  }
  Ok(())
}

/// Convert everything the patterns match.
pub fn run(config : &ConvertConfig, schema : &dyn SchemaDecoder, store : Option<&dyn RemoteStore>) -> Result<RunSummary, Error> {
  tracing::info!("Parsing XML Files..");
  let cardinality = config.cardinality(schema)?;
  config.prepare_target(store)?;

  let files = expand_patterns(&config.patterns)?;
  tracing::info!("Processing {} files", files.len());
  let (jobs, skipped) = plan_jobs(files, config, store)?;

  let mut summary = RunSummary{ skipped, ..Default::default() };
  let jobs = &jobs;

  let pooled = crossbeam::thread::scope(|scope| -> Result<(), Error> {
    let (job_tx, job_rx) = crossbeam::channel::bounded::<&Job>(config.multi);
    let (done_tx, done_rx) = crossbeam::channel::bounded::<(&Job, Result<JobOutcome, JobError>)>(config.multi);

    scope.builder().name("xsdjson feed".into()).spawn(move |_| {
      for job in jobs {
        // workers gone, ie the run is ending early
        if job_tx.send(job).is_err() { break }
      }
    })?;

    for n in 0..config.multi {
      let job_rx = job_rx.clone();
      let done_tx = done_tx.clone();
      scope.builder().name(format!("xsdjson worker {n}")).spawn(move |_| {
        for job in job_rx.iter() {
          let outcome = job::run_isolated(job, config, schema, cardinality);
          if done_tx.send((job, outcome)).is_err() { break }
        }
      })?;
    }
    drop(job_rx);
    drop(done_tx);

    for (job, outcome) in done_rx.iter() {
      match outcome {
        Ok(JobOutcome::Converted(written)) => {
          summary.converted += 1;
          if let (Some(remote), Some(store)) = (&job.remote, store) {
            stage(&written.path, remote, store, config.overwrite)?;
          }
        }
        Ok(JobOutcome::Empty) => summary.empty += 1,
        Err(err) => {
          tracing::error!("{}: {err}", job.input.display());
          summary.failed += 1;
        }
      }
    }
    Ok(())
  });

  pooled.map_err(|_| Error::Pool("a pool thread panicked".into()))??;
  tracing::info!("{summary}");
  Ok(summary)
}

#[cfg(test)]
mod test_scheduler {
  use super::*;

  fn touch(dir : &FsPath, name : &str, size : usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![b' '; size]).unwrap();
    path
  }

  #[test]
  fn expands_and_dedupes() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.xml", 1);
    touch(dir.path(), "b.xml", 1);
    std::fs::create_dir(dir.path().join("c.xml")).unwrap();

    let all = format!("{}/*.xml", dir.path().display());
    let one = format!("{}/a.xml", dir.path().display());
    let files = expand_patterns(&[one, all]).unwrap();
    let names = files.iter().map(|f| f.file_name().unwrap().to_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(names, vec!["a.xml", "b.xml"]);

    assert!(matches!(expand_patterns(&["[x"]), Err(ConfigError::Pattern{..})));
  }

  #[test]
  fn plans_largest_first_and_skips_existing() {
    use clap::Parser;
    let dir = tempfile::tempdir().unwrap();
    let small = touch(dir.path(), "small.xml", 10);
    let big = touch(dir.path(), "big.xml", 1000);
    let done = touch(dir.path(), "done.xml", 5000);
    touch(dir.path(), "done.jsonl", 1);

    let cli = crate::cli::Cli::try_parse_from(["xsdjson", "-x", "po.xsd", "-n", "*.xml"]).unwrap();
    let config = ConvertConfig::from_cli(&cli).unwrap();
    let (jobs, skipped) = plan_jobs(vec![small.clone(), big.clone(), done], &config, None).unwrap();

    assert_eq!(skipped, 1);
    assert_eq!(jobs.iter().map(|j| j.input.clone()).collect::<Vec<_>>(), vec![big, small]);
    assert_eq!(jobs[0].output, dir.path().join("big.jsonl"));
    assert_eq!(jobs[0].remote, None);
  }
}
