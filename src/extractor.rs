/*!
This walks the incoming xml events from the streaming parser, and sends one
decoded record per match of the target path.

Memory is bounded by what stays open: the stack of open elements carries
tag and attributes only, until a match is in progress. Inside a match,
closed children are attached to their parent so the match is complete when
it closes. Everything else is dropped as soon as it closes.

Attribute captures are decoded when their element opens, from its
attributes alone, and merged into matches according to where the capture
path sits relative to the target:
- ancestor-or-self of the target: visible to matches inside it, reset when it closes;
- below the target: visible only to the enclosing match;
- elsewhere: visible until captured again.
*/

use crate::error::{DecodeError, JobError};
use crate::parser::{XmlEvent, XmlEvents};
use crate::schema::SchemaDecoder;
use crate::sender::{Event, Record, Sender};
use crate::skeleton::Skeleton;
use crate::tree::Element;
use crate::valuer::Validation;
use crate::xpath::{CurrentPath, Path, PathSet};

use serde_json::{Map, Value};

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum CaptureScope {
  /// ancestor-or-self of the target
  Inline,
  /// strictly below the target
  Descendant,
  Persistent,
}

#[derive(Debug,Clone)]
struct Capture {
  path : Path,
  skeleton : Skeleton,
  scope : CaptureScope,
  mapping : Option<Map<String,Value>>,
}

impl Capture {
  fn new(path : Path, target : &Path) -> Self {
    let scope = if path.is_ancestor_or_self_of(target) {
      CaptureScope::Inline
    } else if target.is_ancestor_or_self_of(&path) {
      CaptureScope::Descendant
    } else {
      CaptureScope::Persistent
    };
    Self{ skeleton: Skeleton::new(&path), path, scope, mapping: None }
  }

  /// Decode the attributes of a freshly opened element.
  fn capture(&mut self, elem : &Element, schema : &dyn SchemaDecoder) {
    let path = &self.path;
    let (decoded, _) = self.skeleton.with_attached(elem.shallow_clone(), |root| schema.decode(root, Some(path), Validation::Skip));
    self.mapping = match decoded {
      Ok(Value::Object(map)) => Some(map),
      Ok(other) => {
        tracing::debug!("attributes at {path} decoded to a non-object {other}, ignored");
        None
      }
      Err(err) => {
        tracing::debug!("cannot capture attributes at {path}: {err}");
        None
      }
    };
  }
}

#[derive(Debug,Clone)]
struct Target {
  path : Path,
  skeleton : Skeleton,
}

/// Counts for one document.
#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct ExtractSummary {
  pub matches : u64,
  pub skipped : u64,
}

impl std::ops::AddAssign for ExtractSummary {
  fn add_assign(&mut self, rhs : Self) {
    self.matches += rhs.matches;
    self.skipped += rhs.skipped;
  }
}

/// Per-job extraction state. Reusable across documents, eg the members of a zip.
#[derive(Debug,Clone)]
pub struct Extractor {
  // None for whole-document mode
  target : Option<Target>,
  captures : Vec<Capture>,
  exclusions : PathSet,
}

impl Extractor {
  /// Captures are ignored without a target.
  pub fn new(target : Option<&Path>, captures : &PathSet, exclusions : &PathSet) -> Self {
    let captures = match target {
      Some(target) => captures.iter().map(|path| Capture::new(path.clone(), target)).collect(),
      None => vec![],
    };
    let target = target.map(|path| Target{ skeleton: Skeleton::new(path), path: path.clone() });
    Self{ target, captures, exclusions: exclusions.clone() }
  }

  pub fn capture_scopes(&self) -> Vec<(&Path, CaptureScope)> {
    self.captures.iter().map(|c| (&c.path, c.scope)).collect()
  }

  /// Scan one document, sending an event per match (or one for the whole document).
  pub fn extract<R, Snd>(&mut self, events : &mut XmlEvents<R>, schema : &dyn SchemaDecoder, tx : &mut Snd)
  -> Result<ExtractSummary, JobError>
  where
    R : std::io::BufRead,
    Snd : Sender<Event>,
    JobError : From<Snd::SendError>,
  {
    for capture in self.captures.iter_mut() { capture.mapping = None }

    let whole_document = self.target.is_none();
    let mut summary = ExtractSummary::default();
    let mut open : Vec<Element> = vec![];
    let mut path = CurrentPath::new();
    let mut match_active = whole_document;
    let mut root : Option<Element> = None;

    while let Some(ev) = events.next_event()? {
      match ev {
        XmlEvent::Start(elem) => {
          path = path.push_back(elem.tag.clone());
          if self.is_target(&path) { match_active = true }
          for capture in self.captures.iter_mut().filter(|c| c.path.matches(&path)) {
            capture.capture(&elem, schema);
          }
          open.push(elem);
        }

        XmlEvent::Text(text) => if match_active {
          if let Some(top) = open.last_mut() { top.push_text(&text) }
        }

        XmlEvent::End => {
          let elem = open.pop().ok_or(JobError::UnexpectedEnd)?;

          if self.is_target(&path) {
            summary.matches += 1;
            if !self.emit(elem, schema, tx)? { summary.skipped += 1 }
            match_active = false;
            for capture in self.captures.iter_mut().filter(|c| c.scope == CaptureScope::Descendant) {
              capture.mapping = None;
            }
          } else if match_active {
            if self.exclusions.contains(&path) {
              tracing::trace!("excluding {}", elem.tag);
            } else {
              match open.last_mut() {
                Some(parent) => parent.children.push(elem),
                None => root = Some(elem),
              }
            }
          }
          // otherwise elem is dropped here, with all it held

          for capture in self.captures.iter_mut().filter(|c| c.scope == CaptureScope::Inline && c.path.matches(&path)) {
            capture.mapping = None;
          }
          path = path.drop_last().unwrap_or_default();
        }
      }
    }

    if let Some(unclosed) = open.pop() {
      return Err(JobError::Unbalanced(unclosed.tag))
    }

    if whole_document {
      if let Some(root) = root {
        summary.matches += 1;
        let tag = root.tag.clone();
        let sent = match schema.decode(&root, None, Validation::Strict) {
          Ok(value) => Event::Record(Record{ tag, value }),
          Err(reason) => {
            tracing::debug!("cannot decode document <{tag}>: {reason}");
            summary.skipped += 1;
            Event::Skip{ tag, reason }
          }
        };
        tx.send(sent)?;
      }
    }

    Ok(summary)
  }

  fn is_target(&self, path : &CurrentPath) -> bool {
    self.target.as_ref().map(|t| t.path.matches(path)).unwrap_or(false)
  }

  /// Decode a closed match through the skeleton and send it. false when the record was skipped.
  fn emit<Snd>(&mut self, elem : Element, schema : &dyn SchemaDecoder, tx : &mut Snd) -> Result<bool, JobError>
  where
    Snd : Sender<Event>,
    JobError : From<Snd::SendError>,
  {
    let Some(target) = self.target.as_mut() else { return Ok(true) };
    let tag = elem.tag.clone();
    let path = &target.path;
    let (decoded, _detached) = target.skeleton.with_attached(elem, |root| schema.decode(root, Some(path), Validation::Strict));

    let captured = self.captures.iter().filter_map(|c| c.mapping.as_ref()).collect::<Vec<_>>();
    match decoded.and_then(|value| merge_captures(&captured, value, &tag)) {
      Ok(value) => {
        tx.send(Event::Record(Record{ tag, value }))?;
        Ok(true)
      }
      Err(reason) => {
        tracing::debug!("skipping <{tag}> at {path}: {reason}");
        tx.send(Event::Skip{ tag, reason })?;
        Ok(false)
      }
    }
  }
}

/// Captured attributes first, then the match's own keys, which win on collision.
fn merge_captures(captured : &[&Map<String,Value>], value : Value, tag : &str) -> Result<Value, DecodeError> {
  if captured.is_empty() { return Ok(value) }
  let Value::Object(own) = value else { return Err(DecodeError::NotAnObject(tag.into())) };

  let mut merged = Map::new();
  for map in captured {
    merged.extend(map.iter().map(|(k,v)| (k.clone(), v.clone())));
  }
  merged.extend(own);
  Ok(Value::Object(merged))
}

#[cfg(test)]
mod test_extractor {
  use super::*;
  use crate::fn_snd::FnSnd;
  use crate::xsd::XsdSchema;
  use crate::xsd::test_xsd::PURCHASE_ORDER_XSD;
  use serde_json::json;

  const PURCHASE_ORDER_XML : &str = r#"<?xml version="1.0"?>
<purchaseOrder orderDate="1999-10-20">
  <shipTo country="US"><name>Alice Smith</name><street>123 Maple Street</street><city>Mill Valley</city><state>CA</state><zip>90952</zip></shipTo>
  <billTo country="US"><name>Robert Smith</name><street>8 Oak Avenue</street><city>Old Town</city><state>PA</state><zip>95819</zip></billTo>
  <comment>Hurry, my lawn is going wild!</comment>
  <items>
    <item partNum="872-AA"><productName>Lawnmower</productName><quantity>1</quantity><USPrice>148.95</USPrice><comment>Confirm this is electric</comment></item>
    <item partNum="926-AA"><productName>Baby Monitor</productName><quantity>1</quantity><USPrice>39.98</USPrice><shipDate>1999-05-21</shipDate></item>
  </items>
</purchaseOrder>
"#;

  fn paths(ps : &[&str]) -> PathSet {
    PathSet::new(ps.iter().map(|p| Path::parse(p).unwrap()).collect())
  }

  fn run(schema : &XsdSchema, xml : &str, target : Option<&str>, captures : &[&str], exclusions : &[&str]) -> (Result<ExtractSummary, JobError>, Vec<Event>) {
    let target = target.map(|t| Path::parse(t).unwrap());
    let mut extractor = Extractor::new(target.as_ref(), &paths(captures), &paths(exclusions));
    let mut events = XmlEvents::new(xml.as_bytes());
    let mut sent = vec![];
    let result = extractor.extract(&mut events, schema, &mut FnSnd(|ev : Event| sent.push(ev)));
    (result, sent)
  }

  fn values(events : &[Event]) -> Vec<Value> {
    events.iter().filter_map(|ev| match ev { Event::Record(r) => Some(r.value.clone()), _ => None }).collect()
  }

  fn po_schema() -> XsdSchema { XsdSchema::parse(PURCHASE_ORDER_XSD, None).unwrap() }

  #[test]
  fn matches_in_document_order() {
    let (summary, events) = run(&po_schema(), PURCHASE_ORDER_XML, Some("/purchaseOrder/items/item"), &[], &[]);
    assert_eq!(summary.unwrap(), ExtractSummary{ matches: 2, skipped: 0 });
    let values = values(&events);
    assert_eq!(values[0], json!({
      "itempartNum": "872-AA", "productName": "Lawnmower", "quantity": 1, "USPrice": 148.95, "comment": "Confirm this is electric"
    }));
    assert_eq!(values[1]["shipDate"], json!("1999-05-21"));
    assert!(matches!(&events[0], Event::Record(r) if r.tag == "item"));
  }

  #[test]
  fn whole_document_once() {
    let (summary, events) = run(&po_schema(), PURCHASE_ORDER_XML, None, &[], &[]);
    assert_eq!(summary.unwrap().matches, 1);
    let values = values(&events);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["shipTo"]["zip"], json!(90952.0));
    assert_eq!(values[0]["items"]["item"][1]["productName"], json!("Baby Monitor"));
  }

  #[test]
  fn exclusions_never_reach_the_decoder() {
    let (_, events) = run(&po_schema(), PURCHASE_ORDER_XML, None, &[], &["/purchaseOrder/items/item/comment", "/purchaseOrder/billTo"]);
    let doc = &values(&events)[0];
    assert!(doc.get("billTo").is_none());
    assert!(doc["items"]["item"][0].get("comment").is_none());
    assert_eq!(doc["comment"], json!("Hurry, my lawn is going wild!"));
  }

  #[test]
  fn sibling_and_ancestor_captures() {
    let (_, events) = run(&po_schema(), PURCHASE_ORDER_XML, Some("/purchaseOrder/items/item"), &["/purchaseOrder", "/purchaseOrder/shipTo"], &[]);
    let values = values(&events);
    assert_eq!(values.len(), 2);
    for value in &values {
      assert_eq!(value["purchaseOrderorderDate"], json!("1999-10-20"));
      assert_eq!(value["shipTocountry"], json!("US"));
    }
    let keys = values[0].as_object().unwrap().keys().take(3).cloned().collect::<Vec<_>>();
    assert_eq!(keys, vec!["purchaseOrderorderDate", "shipTocountry", "itempartNum"]);
  }

  const BATCH_XSD : &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="batch"><xs:complexType>
      <xs:sequence><xs:element name="group" maxOccurs="unbounded"><xs:complexType>
        <xs:sequence><xs:element name="row" maxOccurs="unbounded"><xs:complexType>
          <xs:sequence>
            <xs:element name="meta" minOccurs="0"><xs:complexType><xs:attribute name="src" type="xs:string"/></xs:complexType></xs:element>
            <xs:element name="v" type="xs:int"/>
          </xs:sequence>
          <xs:attribute name="id" type="xs:int"/>
        </xs:complexType></xs:element></xs:sequence>
        <xs:attribute name="g" type="xs:string"/>
      </xs:complexType></xs:element></xs:sequence>
    </xs:complexType></xs:element>
  </xs:schema>"#;

  #[test]
  fn capture_scopes_follow_the_target() {
    let target = Path::parse("/batch/group/row").unwrap();
    let extractor = Extractor::new(Some(&target), &paths(&["/batch/group", "/batch/group/row/meta", "/batch/other"]), &PathSet::default());
    let scopes = extractor.capture_scopes().into_iter().map(|(_, s)| s).collect::<Vec<_>>();
    assert_eq!(scopes, vec![CaptureScope::Inline, CaptureScope::Descendant, CaptureScope::Persistent]);
  }

  #[test]
  fn captures_do_not_leak() {
    let schema = XsdSchema::parse(BATCH_XSD, None).unwrap();
    let xml = r#"<batch>
      <group g="one"><row id="1"><meta src="a"/><v>1</v></row><row id="2"><v>2</v></row></group>
      <group><row id="3"><v>3</v></row></group>
    </batch>"#;
    let (_, events) = run(&schema, xml, Some("/batch/group/row"), &["/batch/group", "/batch/group/row/meta"], &[]);
    let values = values(&events);
    assert_eq!(values.len(), 3);
    assert_eq!(values[0]["groupg"], json!("one"));
    assert_eq!(values[0]["metasrc"], json!("a"));
    // descendant capture belongs to its own match only
    assert!(values[1].get("metasrc").is_none());
    assert_eq!(values[1]["groupg"], json!("one"));
    // the second group has no attribute, and the first one's is gone
    assert!(values[2].get("groupg").is_none());
    assert_eq!(values[2]["v"], json!(3));
  }

  #[test]
  fn bad_records_are_skipped() {
    let xml = r#"<purchaseOrder><items>
      <item partNum="1"><productName>a</productName><quantity>many</quantity><USPrice>1</USPrice></item>
      <item partNum="2"><productName>b</productName><quantity>2</quantity><USPrice>2</USPrice></item>
    </items></purchaseOrder>"#;
    let (summary, events) = run(&po_schema(), xml, Some("/purchaseOrder/items/item"), &[], &[]);
    assert_eq!(summary.unwrap(), ExtractSummary{ matches: 2, skipped: 1 });
    assert!(matches!(&events[0], Event::Skip{reason: DecodeError::InvalidValue{..}, ..}));
    assert_eq!(values(&events), vec![json!({"itempartNum": "2", "productName": "b", "quantity": 2, "USPrice": 2.0})]);
  }

  #[test]
  fn instance_attributes_are_not_content() {
    let xml = PURCHASE_ORDER_XML.replace(
      r#"<purchaseOrder orderDate="1999-10-20">"#,
      r#"<purchaseOrder xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="po.xsd" orderDate="1999-10-20">"#);
    let (summary, events) = run(&po_schema(), &xml, None, &[], &[]);
    assert_eq!(summary.unwrap(), ExtractSummary{ matches: 1, skipped: 0 });
    assert_eq!(values(&events)[0]["purchaseOrderorderDate"], json!("1999-10-20"));

    let xml = r#"<purchaseOrder xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><items>
      <item partNum="1"><productName>a</productName><quantity>1</quantity><USPrice>1</USPrice><comment xsi:nil="true"/></item>
    </items></purchaseOrder>"#;
    let (summary, events) = run(&po_schema(), xml, Some("/purchaseOrder/items/item"), &[], &[]);
    assert_eq!(summary.unwrap(), ExtractSummary{ matches: 1, skipped: 0 });
    assert_eq!(values(&events), vec![json!({"itempartNum": "1", "productName": "a", "quantity": 1, "USPrice": 1.0})]);
  }

  #[test]
  fn text_keeps_its_whitespace() {
    let xml = r#"<purchaseOrder><items>
      <item partNum="1">
        <productName>Lawn<!-- x --> mower</productName>
        <quantity> 1 </quantity>
        <USPrice>1</USPrice>
        <comment>  two  spaced  </comment>
      </item>
    </items></purchaseOrder>"#;
    let (summary, events) = run(&po_schema(), xml, Some("/purchaseOrder/items/item"), &[], &[]);
    assert_eq!(summary.unwrap().skipped, 0);
    let values = values(&events);
    assert_eq!(values[0]["productName"], json!("Lawn mower"));
    assert_eq!(values[0]["comment"], json!("  two  spaced  "));
    assert_eq!(values[0]["quantity"], json!(1));
  }

  #[test]
  fn unbalanced_document() {
    let (result, events) = run(&po_schema(), "<purchaseOrder><items>", None, &[], &[]);
    assert!(matches!(result, Err(JobError::Unbalanced(tag)) if tag == "items"));
    assert!(events.is_empty());
  }

  #[test]
  fn no_matches() {
    let (summary, events) = run(&po_schema(), "<purchaseOrder><items/></purchaseOrder>", Some("/purchaseOrder/items/item"), &[], &[]);
    assert_eq!(summary.unwrap().matches, 0);
    assert!(events.is_empty());
  }
}
