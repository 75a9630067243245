/*!
The Sender trait.

The extractor ultimately sends each per-record outcome to an implementation
of Sender: the incremental writer for a real job, a closure in tests.

Parameterised because it might write to a file, or it might not.
*/

/// A decoded record, ready to be written.
#[derive(Debug,Clone,PartialEq)]
pub struct Record {
  /// local name of the matched element, used when the record is wrapped
  pub tag : String,
  pub value : serde_json::Value,
}

/// Outcome of one match.
#[derive(Debug,Clone,PartialEq)]
pub enum Event {
  Record(Record),
  /// decoding failed; the rest of the file carries on
  Skip{ tag : String, reason : crate::error::DecodeError },
}

/// This can be implemented by anything from a function call to a file writer.
pub trait Sender<Event> {
  type SendError : std::fmt::Debug;
  fn send(&mut self, ev : Event) -> Result<(), Self::SendError>;
}
