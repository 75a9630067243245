/*!
This writes the records of one job to its output file as they arrive.

Framing is fixed before the first record: either a json array, written
lazily so that an empty result has no brackets, or bare values. An output
that ends up with no records is removed on close.
*/

use crate::sender::{self, Event, Record};

use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

#[derive(Debug,Clone,Copy,PartialEq,Eq,clap::ValueEnum)]
pub enum Format {
  /// one json document
  Json,
  /// one json value per line
  Jsonl,
}

impl Format {
  pub fn extension(self) -> &'static str {
    match self {
      Format::Json => "json",
      Format::Jsonl => "jsonl",
    }
  }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Framing {
  /// `[` before the first record, `,` between records, `]` at the end
  Array,
  Bare,
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct WriteOptions {
  pub format : Format,
  pub framing : Framing,
  /// write each record as `{"<tag>": value}`
  pub wrap : bool,
  pub compress : bool,
}

enum Sink {
  Plain(std::io::BufWriter<std::fs::File>),
  Gzip(flate2::write::GzEncoder<std::io::BufWriter<std::fs::File>>),
}

impl Sink {
  fn finish(self) -> std::io::Result<()> {
    match self {
      Sink::Plain(mut w) => w.flush(),
      Sink::Gzip(gz) => gz.finish()?.flush(),
    }
  }
}

impl Write for Sink {
  fn write(&mut self, buf : &[u8]) -> std::io::Result<usize> {
    match self {
      Sink::Plain(w) => w.write(buf),
      Sink::Gzip(w) => w.write(buf),
    }
  }

  fn flush(&mut self) -> std::io::Result<()> {
    match self {
      Sink::Plain(w) => w.flush(),
      Sink::Gzip(w) => w.flush(),
    }
  }
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct WriteSummary {
  pub path : PathBuf,
  pub records : u64,
  pub skipped : u64,
  /// nothing was written, so the file is gone
  pub removed : bool,
}

pub struct IncrementalWriter {
  path : PathBuf,
  sink : Sink,
  opts : WriteOptions,
  records : u64,
  skipped : u64,
  warned : bool,
}

impl IncrementalWriter {
  pub fn create<P : AsRef<FsPath>>(path : P, opts : WriteOptions) -> std::io::Result<Self> {
    let path = path.as_ref().to_path_buf();
    let file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    let sink = if opts.compress {
      Sink::Gzip(flate2::write::GzEncoder::new(file, flate2::Compression::default()))
    } else {
      Sink::Plain(file)
    };
    Ok(Self{ path, sink, opts, records: 0, skipped: 0, warned: false })
  }

  pub fn write_record(&mut self, record : &Record) -> std::io::Result<()> {
    let separator : &[u8] = match (self.opts.format, self.opts.framing, self.records) {
      (Format::Jsonl, _, _) => b"",
      (Format::Json, Framing::Array, 0) => b"[\n",
      (Format::Json, Framing::Array, _) => b",\n",
      (Format::Json, Framing::Bare, 0) => b"",
      (Format::Json, Framing::Bare, _) => {
        if !self.warned {
          tracing::warn!("{} has more than one record but is not an array", self.path.display());
          self.warned = true;
        }
        b"\n"
      }
    };
    self.sink.write_all(separator)?;

    if self.opts.wrap {
      self.sink.write_all(b"{")?;
      serde_json::to_writer(&mut self.sink, &record.tag)?;
      self.sink.write_all(b":")?;
      serde_json::to_writer(&mut self.sink, &record.value)?;
      self.sink.write_all(b"}")?;
    } else {
      serde_json::to_writer(&mut self.sink, &record.value)?;
    }

    if self.opts.format == Format::Jsonl { self.sink.write_all(b"\n")? }
    self.records += 1;
    Ok(())
  }

  /// Finish the file, or remove it when no record was written.
  pub fn close(mut self) -> std::io::Result<WriteSummary> {
    if self.records > 0 && self.opts.format == Format::Json && self.opts.framing == Framing::Array {
      self.sink.write_all(b"\n]")?;
    }
    let Self{ path, sink, records, skipped, .. } = self;
    sink.finish()?;

    let removed = records == 0;
    if removed { std::fs::remove_file(&path)? }
    Ok(WriteSummary{ path, records, skipped, removed })
  }

  /// Give up on a failed job. The partial file is removed.
  pub fn abandon(self) {
    let Self{ path, sink, .. } = self;
    drop(sink);
    if let Err(err) = std::fs::remove_file(&path) {
      tracing::warn!("cannot remove partial output {}: {err}", path.display());
    }
  }
}

impl sender::Sender<Event> for IncrementalWriter {
  type SendError = std::io::Error;

  fn send(&mut self, ev : Event) -> Result<(), Self::SendError> {
    match ev {
      Event::Record(record) => self.write_record(&record),
      Event::Skip{..} => {
        self.skipped += 1;
        Ok(())
      }
    }
  }
}
