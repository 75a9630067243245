/*!
Error taxonomy.

Only `Error` stops a run. `DecodeError` is contained at record granularity
and `JobError` at file granularity; both surface through logs only.
*/

use thiserror::Error;

/// A path flag that does not describe a `/`-separated sequence of tags.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
  #[error("empty path")]
  Empty,

  #[error("path '{0}' must start with '/'")]
  NotAbsolute(String),

  #[error("path '{0}' contains an empty segment")]
  EmptySegment(String),
}

/// Bad flags, or a target that can never be written to.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid path: {0}")]
  Path(#[from] PathError),

  #[error("invalid file pattern '{pattern}': {source}")]
  Pattern { pattern : String, source : glob::PatternError },

  #[error("invalid target_path: {0}")]
  InvalidTarget(String),

  #[error("no hadoop client found")]
  NoHadoopClient,

  #[error("attribute paths require an xpath")]
  CapturesWithoutTarget,

  #[error("xpath {0} is not declared in the schema")]
  UnknownTarget(String),

  #[error("multi must be at least 1")]
  NoWorkers,

  #[error("invalid verbose level '{0}'")]
  LogLevel(String),
}

#[derive(Debug, Error)]
pub enum SchemaLoadError {
  #[error("cannot read schema {path}: {source}")]
  Io { path : std::path::PathBuf, source : std::io::Error },

  #[error("schema is not well formed XML: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("schema document root is <{0}>, expected <schema>")]
  NotASchema(String),

  #[error("unresolved {kind} reference '{name}'")]
  Unresolved { kind : &'static str, name : String },

  #[error("invalid occurrence value '{0}'")]
  Occurs(String),

  #[error("{0}")]
  Invalid(String),
}

/// Failure to decode one element. The caller skips the record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
  #[error("element <{0}> is not declared in the schema")]
  UnknownElement(String),

  #[error("no element found at {0}")]
  MissingAtPath(String),

  #[error("unexpected child <{child}> in <{parent}>")]
  UnexpectedChild { parent : String, child : String },

  #[error("unexpected attribute '{attribute}' on <{element}>")]
  UnexpectedAttribute { element : String, attribute : String },

  #[error("invalid {kind} value '{text}' in <{element}>")]
  InvalidValue { element : String, kind : &'static str, text : String },

  #[error("cannot merge captured attributes into a non-object value for <{0}>")]
  NotAnObject(String),

  #[error("type nesting too deep at <{0}>")]
  TooDeep(String),
}

/// Anything else that goes wrong while converting one file.
#[derive(Debug, Error)]
pub enum JobError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("XML error at byte {position}: {source}")]
  Xml { position : usize, source : quick_xml::Error },

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("document ended with <{0}> still open")]
  Unbalanced(String),

  #[error("closing tag without an open element")]
  UnexpectedEnd,

  #[error("worker panicked: {0}")]
  Panicked(String),
}

impl From<std::convert::Infallible> for JobError {
  fn from(never : std::convert::Infallible) -> Self {
    match never {}
  }
}

#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("failed to start {command}: {source}")]
  Spawn { command : String, source : std::io::Error },

  #[error("{command} exited with code {code:?}")]
  Failed { command : String, code : Option<i32> },
}

/// Fatal for the whole run.
#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  #[error("schema error: {0}")]
  SchemaLoad(#[from] SchemaLoadError),

  #[error("remote transfer error: {0}")]
  Remote(#[from] RemoteError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("worker pool failed: {0}")]
  Pool(String),
}

impl From<PathError> for Error {
  fn from(err : PathError) -> Self {
    Error::Config(ConfigError::Path(err))
  }
}
