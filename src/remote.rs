/*!
The remote storage port, and the hadoop command line client behind it.

With a server, every command runs as `ssh <server> "<command>"`, so the
server must see the local output directory at the same path.
*/

use crate::error::RemoteError;
use std::path::Path as FsPath;
use std::process::{Command, Stdio};

/// Prefix that marks a target as remote.
pub const REMOTE_PREFIX : &str = "hdfs:";

pub fn is_remote(target : &str) -> bool {
  target.starts_with(REMOTE_PREFIX)
}

/// Join a file name onto a remote directory.
pub fn remote_join(dir : &str, name : &str) -> String {
  format!("{}/{name}", dir.trim_end_matches('/'))
}

/// Shared by all workers, so only the existence probes run concurrently.
pub trait RemoteStore : Send + Sync {
  fn exists(&self, path : &str) -> Result<bool, RemoteError>;
  fn mkdirs(&self, path : &str) -> Result<(), RemoteError>;
  fn put(&self, local : &FsPath, remote : &str) -> Result<(), RemoteError>;
  fn remove(&self, path : &str) -> Result<(), RemoteError>;
}

#[derive(Debug,Clone,Default)]
pub struct HadoopCli {
  server : Option<String>,
}

impl HadoopCli {
  /// None when there is neither a server nor a local hadoop client.
  pub fn new(server : Option<String>) -> Option<Self> {
    match server {
      Some(server) => Some(Self{ server: Some(server) }),
      None => which::which("hadoop").ok().map(|hadoop| {
        tracing::debug!("using hadoop client {}", hadoop.display());
        Self{ server: None }
      }),
    }
  }

  fn command(&self, args : &[&str]) -> (Command, String) {
    let line = std::iter::once("hadoop").chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
    let cmd = match &self.server {
      Some(server) => {
        let mut cmd = Command::new("ssh");
        cmd.arg(server).arg(&line);
        cmd
      }
      None => {
        let mut cmd = Command::new("hadoop");
        cmd.args(args);
        cmd
      }
    };
    (cmd, line)
  }

  /// Exit code of `hadoop fs <args>`.
  fn status(&self, args : &[&str]) -> Result<(Option<i32>, String), RemoteError> {
    let (mut cmd, line) = self.command(args);
    tracing::trace!("running {line}");
    let status = cmd
      .stdin(Stdio::null())
      .status()
      .map_err(|source| RemoteError::Spawn{ command: line.clone(), source })?;
    Ok((status.code(), line))
  }

  fn run(&self, args : &[&str]) -> Result<(), RemoteError> {
    match self.status(args)? {
      (Some(0), _) => Ok(()),
      (code, command) => Err(RemoteError::Failed{ command, code }),
    }
  }
}

impl RemoteStore for HadoopCli {
  fn exists(&self, path : &str) -> Result<bool, RemoteError> {
    // -test exits 1 for a missing path, anything else is the client failing
    match self.status(&["fs", "-test", "-e", path])? {
      (Some(0), _) => Ok(true),
      (Some(1), _) => Ok(false),
      (code, command) => Err(RemoteError::Failed{ command, code }),
    }
  }

  fn mkdirs(&self, path : &str) -> Result<(), RemoteError> {
    self.run(&["fs", "-mkdir", "-p", path])
  }

  fn put(&self, local : &FsPath, remote : &str) -> Result<(), RemoteError> {
    let local = local.to_string_lossy();
    self.run(&["fs", "-put", &local, remote])
  }

  fn remove(&self, path : &str) -> Result<(), RemoteError> {
    self.run(&["fs", "-rm", path])
  }
}
