/*!
Source of structural parse events, ie the xml parser.

Flattens quick-xml's event zoo into enter / text / exit. Self-closing
elements come out as a `Start` immediately followed by an `End`.
Declarations, comments, processing instructions and doctypes are dropped.

Text is passed on untrimmed. Whitespace-only text is kept only as the content
of an element with no child elements, or when it joins other text.
Attributes in the XMLSchema-instance namespace (`xsi:type`, `xsi:nil`,
`xsi:schemaLocation`, ...) describe the document rather than its content and
are dropped along with namespace declarations.
*/

use crate::error::JobError;
use crate::tree::Element;
use crate::xpath::local_name;

use quick_xml::events::BytesStart;
use quick_xml::events::Event as QEvent;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::collections::VecDeque;

pub const XSI_NAMESPACE : &[u8] = b"http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum XmlEvent {
  /// tag and attributes only, never children
  Start(Element),
  Text(String),
  End,
}

pub struct XmlEvents<R : std::io::BufRead> {
  reader : NsReader<countio::Counter<R>>,
  buf : Vec<u8>,
  queued : VecDeque<XmlEvent>,
  // whitespace-only text not yet known to be content
  blank : Option<String>,
  // no child element since the last Start
  leaf : bool,
}

impl<R : std::io::BufRead> XmlEvents<R> {
  pub fn new(istream : R) -> Self {
    let reader = NsReader::from_reader(countio::Counter::new(istream));
    Self{reader, buf: vec![], queued: VecDeque::new(), blank: None, leaf: false}
  }

  /// Bytes pulled from the underlying stream so far.
  pub fn bytes_read(&self) -> usize {
    self.reader.get_ref().reader_bytes()
  }

  /// None at end of input.
  pub fn next_event(&mut self) -> Result<Option<XmlEvent>, JobError> {
    if let Some(ev) = self.queued.pop_front() { return Ok(Some(ev)) }

    loop {
      self.buf.clear();
      let position = self.reader.buffer_position();
      let xml_err = |source| JobError::Xml{position, source};

      match self.reader.read_event_into(&mut self.buf).map_err(xml_err)? {
        QEvent::Start(start) => {
          let elem = start_element(&self.reader, &start).map_err(xml_err)?;
          self.blank = None;
          self.leaf = true;
          return Ok(Some(XmlEvent::Start(elem)))
        }
        QEvent::Empty(start) => {
          let elem = start_element(&self.reader, &start).map_err(xml_err)?;
          self.blank = None;
          self.leaf = false;
          self.queued.push_back(XmlEvent::End);
          return Ok(Some(XmlEvent::Start(elem)))
        }
        QEvent::End(_) => {
          let leaf = std::mem::replace(&mut self.leaf, false);
          return match self.blank.take() {
            Some(blank) if leaf => {
              self.queued.push_back(XmlEvent::End);
              Ok(Some(XmlEvent::Text(blank)))
            }
            _ => Ok(Some(XmlEvent::End)),
          }
        }
        QEvent::Text(text) => {
          let text = text.unescape().map_err(xml_err)?;
          if text.trim().is_empty() {
            self.blank.get_or_insert_with(String::new).push_str(&text);
            continue
          }
          return Ok(Some(XmlEvent::Text(joined(&mut self.blank, &text))))
        }
        QEvent::CData(cdata) => {
          let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
          return Ok(Some(XmlEvent::Text(joined(&mut self.blank, &text))))
        }
        QEvent::Eof => return Ok(None),
        _ => continue,
      }
    }
  }
}

/// Held whitespace followed by `text`.
fn joined(blank : &mut Option<String>, text : &str) -> String {
  match blank.take() {
    Some(mut blank) => { blank.push_str(text); blank }
    None => text.to_string(),
  }
}

fn is_instance_attribute<B : std::io::BufRead>(reader : &NsReader<B>, key : quick_xml::name::QName) -> bool {
  match reader.resolve_attribute(key).0 {
    ResolveResult::Bound(Namespace(ns)) => ns == XSI_NAMESPACE,
    // undeclared, but nobody means anything else by it
    ResolveResult::Unknown(prefix) => prefix == b"xsi",
    ResolveResult::Unbound => false,
  }
}

/// Local name and attributes of an opening tag. Namespace declarations are not attributes.
fn start_element<B : std::io::BufRead>(reader : &NsReader<B>, start : &BytesStart) -> Result<Element, quick_xml::Error> {
  let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
  let mut elem = Element::new(local_name(&tag));

  for attr in start.attributes() {
    let attr = attr.map_err(quick_xml::Error::from)?;
    let raw_key = attr.key.as_ref();
    if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") { continue }
    if is_instance_attribute(reader, attr.key) { continue }

    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
    let value = attr.unescape_value()?.into_owned();
    elem.attributes.push((key, value));
  }
  Ok(elem)
}

/// Read a whole document into one tree. Only for small inputs like schemas.
pub fn read_document<R : std::io::BufRead>(events : &mut XmlEvents<R>) -> Result<Option<Element>, JobError> {
  let mut open : Vec<Element> = vec![];
  let mut root = None;

  while let Some(ev) = events.next_event()? {
    match ev {
      XmlEvent::Start(elem) => open.push(elem),
      XmlEvent::Text(text) => if let Some(top) = open.last_mut() { top.push_text(&text) },
      XmlEvent::End => {
        let elem = open.pop().ok_or(JobError::UnexpectedEnd)?;
        match open.last_mut() {
          Some(parent) => parent.children.push(elem),
          None => root = Some(elem),
        }
      }
    }
  }

  match open.pop() {
    Some(unclosed) => Err(JobError::Unbalanced(unclosed.tag)),
    None => Ok(root),
  }
}
