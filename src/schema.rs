/*!
The schema decode port, and its XSD-backed implementation.

The extractor only ever asks two things of a schema: how many times can the
element at a path occur, and what does this (partial) tree look like as json.

Decoded shape, per element:
- each attribute becomes `<tag><attribute>`;
- simple content becomes `<tag>: value`, null when empty;
- a single simple child is flattened into its parent;
- a single complex child is nested under its tag;
- repeatable children collect into an array under their tag, except that a
  parent with no attributes and one simple child declaration becomes the bare
  array itself;
- children that decode to nothing are left out.
*/

use crate::error::DecodeError;
use crate::tree::Element;
use crate::valuer::{leaf_value, SimpleKind, Validation};
use crate::xpath::Path;
use crate::xsd::{ComplexType, Content, ElementDecl, TypeRef, XsdSchema};

use serde_json::{Map, Value};

/// Bound on decode recursion, for pathological documents against recursive types.
const MAX_DEPTH : usize = 512;

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Cardinality {
  Single,
  Array,
}

/// What the extractor needs from a schema. Shared read-only between workers.
pub trait SchemaDecoder : Send + Sync {
  fn cardinality(&self, path : &Path) -> Result<Cardinality, DecodeError>;

  /// Decode the element at `path` below `root`, or `root` itself when there is no path.
  fn decode(&self, root : &Element, path : Option<&Path>, validation : Validation) -> Result<Value, DecodeError>;
}

impl XsdSchema {
  /// Declaration of the element at `path`, following child declarations down from the global element.
  pub fn decl_at(&self, path : &Path) -> Result<&ElementDecl, DecodeError> {
    let (first, rest) = path.steps().split_first().ok_or_else(|| DecodeError::MissingAtPath(path.to_string()))?;
    let root = self.element(first).ok_or_else(|| DecodeError::UnknownElement(first.clone()))?;

    rest.iter().try_fold(root, |decl, step| {
      self.complex_of(decl)
        .and_then(|ty| ty.child(step))
        .ok_or_else(|| DecodeError::UnknownElement(step.clone()))
    })
  }

  fn complex_of(&self, decl : &ElementDecl) -> Option<&ComplexType> {
    match decl.ty {
      TypeRef::Complex(id) => self.complex(id),
      _ => None,
    }
  }

  fn is_simple(&self, ty : &TypeRef) -> bool {
    match ty {
      TypeRef::Simple(_) => true,
      TypeRef::Complex(id) => matches!(self.complex(*id).map(|t| &t.content), Some(Content::Simple(_))),
      TypeRef::Any => false,
    }
  }

  fn element_value(&self, elem : &Element, ty : &TypeRef, validation : Validation, depth : usize) -> Result<Value, DecodeError> {
    if depth > MAX_DEPTH { return Err(DecodeError::TooDeep(elem.tag.clone())) }

    let complex = match ty {
      TypeRef::Simple(kind) => return self.simple_value(elem, kind, validation),
      TypeRef::Any => return Ok(any_value(elem)),
      TypeRef::Complex(id) => self.complex(*id).ok_or_else(|| DecodeError::UnknownElement(elem.tag.clone()))?,
    };

    let mut map = self.attribute_map(elem, complex, validation)?;

    let children = match &complex.content {
      Content::Simple(kind) => {
        map.insert(elem.tag.clone(), text_value(elem, kind, validation)?);
        if !elem.children.is_empty() && validation == Validation::Strict {
          return Err(DecodeError::UnexpectedChild{ parent: elem.tag.clone(), child: elem.children[0].tag.clone() })
        }
        return Ok(Value::Object(map))
      }
      Content::Empty => &[][..],
      Content::Elements{children, ..} => children.as_slice(),
    };

    // a parent that is nothing but a list of simple values
    let bare_list = elem.attributes.is_empty()
      && children.len() == 1
      && children[0].max.is_repeatable()
      && self.is_simple(&children[0].ty);
    let mut list = vec![];

    for child in &elem.children {
      let decl = match children.iter().find(|d| d.name == child.tag) {
        Some(decl) => decl,
        None if complex.is_open() => {
          push_value(&mut map, &child.tag, any_value(child), false);
          continue
        }
        None => match validation {
          Validation::Strict => return Err(DecodeError::UnexpectedChild{ parent: elem.tag.clone(), child: child.tag.clone() }),
          Validation::Skip => continue,
        }
      };

      let value = self.element_value(child, &decl.ty, validation, depth + 1)?;
      if is_empty(&value) { continue }

      match (decl.max.is_repeatable(), self.is_simple(&decl.ty)) {
        (true, _) if bare_list => list.push(value),
        (true, _) => push_value(&mut map, &child.tag, value, true),
        (false, true) => flatten_into(&mut map, &child.tag, value),
        (false, false) => { map.insert(child.tag.clone(), value); }
      }
    }

    if bare_list { Ok(Value::Array(list)) } else { Ok(Value::Object(map)) }
  }

  fn attribute_map(&self, elem : &Element, complex : &ComplexType, validation : Validation) -> Result<Map<String,Value>, DecodeError> {
    let mut map = Map::new();
    for (name, text) in &elem.attributes {
      let kind = match complex.attribute(name) {
        Some(kind) => kind,
        None if complex.any_attribute || validation == Validation::Skip => &SimpleKind::String,
        None => return Err(DecodeError::UnexpectedAttribute{ element: elem.tag.clone(), attribute: name.clone() }),
      };
      map.insert(format!("{}{name}", elem.tag), leaf_value(&elem.tag, text, kind, validation)?);
    }
    Ok(map)
  }

  fn simple_value(&self, elem : &Element, kind : &SimpleKind, validation : Validation) -> Result<Value, DecodeError> {
    if validation == Validation::Strict {
      if let Some((attribute, _)) = elem.attributes.first() {
        return Err(DecodeError::UnexpectedAttribute{ element: elem.tag.clone(), attribute: attribute.clone() })
      }
      if let Some(child) = elem.children.first() {
        return Err(DecodeError::UnexpectedChild{ parent: elem.tag.clone(), child: child.tag.clone() })
      }
    }
    let mut map = Map::new();
    map.insert(elem.tag.clone(), text_value(elem, kind, validation)?);
    Ok(Value::Object(map))
  }
}

impl SchemaDecoder for XsdSchema {
  fn cardinality(&self, path : &Path) -> Result<Cardinality, DecodeError> {
    let decl = self.decl_at(path)?;
    Ok(if decl.max.is_repeatable() { Cardinality::Array } else { Cardinality::Single })
  }

  fn decode(&self, root : &Element, path : Option<&Path>, validation : Validation) -> Result<Value, DecodeError> {
    match path {
      None => {
        let decl = self.element(&root.tag).ok_or_else(|| DecodeError::UnknownElement(root.tag.clone()))?;
        self.element_value(root, &decl.ty, validation, 0)
      }
      Some(path) => {
        let decl = self.decl_at(path)?;
        let elem = root.find_path(path.steps()).ok_or_else(|| DecodeError::MissingAtPath(path.to_string()))?;
        self.element_value(elem, &decl.ty, validation, 0)
      }
    }
  }
}

/// Strings keep their whitespace. For any other kind blank text is no value.
fn text_value(elem : &Element, kind : &SimpleKind, validation : Validation) -> Result<Value, DecodeError> {
  match elem.text.as_deref() {
    None | Some("") => Ok(Value::Null),
    Some(text) if *kind != SimpleKind::String && text.trim().is_empty() => Ok(Value::Null),
    Some(text) => leaf_value(&elem.tag, text, kind, validation),
  }
}

/// Nothing worth writing.
fn is_empty(value : &Value) -> bool {
  match value {
    Value::Object(map) => map.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Null => true,
    _ => false,
  }
}

fn flatten_into(map : &mut Map<String,Value>, tag : &str, value : Value) {
  match value {
    Value::Object(inner) => map.extend(inner),
    other => { map.insert(tag.to_string(), other); }
  }
}

/// Insert under `tag`, turning the slot into an array on repeat, or from the start when `array`.
fn push_value(map : &mut Map<String,Value>, tag : &str, value : Value, array : bool) {
  match map.get_mut(tag) {
    Some(Value::Array(items)) if array => items.push(value),
    Some(existing) => {
      let previous = existing.take();
      *existing = match previous {
        Value::Array(mut items) => { items.push(value); Value::Array(items) }
        single => Value::Array(vec![single, value]),
      };
    }
    None if array => { map.insert(tag.to_string(), Value::Array(vec![value])); }
    None => { map.insert(tag.to_string(), value); }
  }
}

/// Undeclared content (anyType or a wildcard), decoded from the tree alone with string leaves.
fn any_value(elem : &Element) -> Value {
  let mut map = Map::new();
  for (name, text) in &elem.attributes {
    map.insert(format!("{}{name}", elem.tag), Value::String(text.clone()));
  }

  if elem.children.is_empty() {
    let text = elem.text.as_ref().filter(|t| !t.trim().is_empty()).map(|t| Value::String(t.clone()));
    map.insert(elem.tag.clone(), text.unwrap_or(Value::Null));
    return Value::Object(map)
  }

  for child in &elem.children {
    let value = any_value(child);
    if child.children.is_empty() && child.attributes.is_empty() && !map.contains_key(&child.tag) {
      flatten_into(&mut map, &child.tag, value);
    } else {
      push_value(&mut map, &child.tag, value, false);
    }
  }
  Value::Object(map)
}

#[cfg(test)]
mod test_decode {
  use super::*;
  use crate::xsd::test_xsd::PURCHASE_ORDER_XSD;
  use serde_json::json;

  fn schema() -> XsdSchema {
    XsdSchema::parse(PURCHASE_ORDER_XSD, None).unwrap()
  }

  fn item(part : &str, name : &str) -> Element {
    Element::new("item")
      .with_attribute("partNum", part)
      .with_child(Element::new("productName").with_text(name))
      .with_child(Element::new("quantity").with_text("1"))
      .with_child(Element::new("USPrice").with_text("148.95"))
  }

  fn path(p : &str) -> Path { Path::parse(p).unwrap() }

  #[test]
  fn cardinality() {
    let schema = schema();
    assert_eq!(schema.cardinality(&path("/purchaseOrder/items/item")), Ok(Cardinality::Array));
    assert_eq!(schema.cardinality(&path("/purchaseOrder/shipTo")), Ok(Cardinality::Single));
    assert_eq!(schema.cardinality(&path("/purchaseOrder")), Ok(Cardinality::Single));
    assert!(matches!(schema.cardinality(&path("/purchaseOrder/nope")), Err(DecodeError::UnknownElement(s)) if s == "nope"));
  }

  #[test]
  fn decode_item_in_skeleton() {
    let root = Element::new("purchaseOrder").with_child(Element::new("items").with_child(item("872-AA", "Lawnmower")));
    let value = schema().decode(&root, Some(&path("/purchaseOrder/items/item")), Validation::Strict).unwrap();
    assert_eq!(value, json!({"itempartNum": "872-AA", "productName": "Lawnmower", "quantity": 1, "USPrice": 148.95}));
    // key order follows the document
    let keys = value.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    assert_eq!(keys, vec!["itempartNum", "productName", "quantity", "USPrice"]);
  }

  #[test]
  fn decode_whole_document() {
    let root = Element::new("purchaseOrder")
      .with_attribute("orderDate", "1999-10-20")
      .with_child(Element::new("shipTo").with_attribute("country", "US").with_child(Element::new("zip").with_text("90952")))
      .with_child(Element::new("comment").with_text("Hurry"))
      .with_child(Element::new("items").with_child(item("1", "a")).with_child(item("2", "b")));

    let value = schema().decode(&root, None, Validation::Strict).unwrap();
    assert_eq!(value["purchaseOrderorderDate"], json!("1999-10-20"));
    assert_eq!(value["shipTo"], json!({"shipTocountry": "US", "zip": 90952.0}));
    assert_eq!(value["comment"], json!("Hurry"));
    assert_eq!(value["items"]["item"].as_array().unwrap().len(), 2);
    assert_eq!(value["items"]["item"][1]["itempartNum"], json!("2"));
  }

  #[test]
  fn strict_and_skip() {
    let schema = schema();
    let bad = Element::new("purchaseOrder").with_child(Element::new("items").with_child(
      Element::new("item").with_attribute("colour", "red")));
    let target = path("/purchaseOrder/items/item");
    assert!(matches!(schema.decode(&bad, Some(&target), Validation::Strict), Err(DecodeError::UnexpectedAttribute{..})));
    assert_eq!(schema.decode(&bad, Some(&target), Validation::Skip), Ok(json!({"itemcolour": "red"})));

    let bad_qty = Element::new("purchaseOrder").with_child(Element::new("items").with_child(
      Element::new("item").with_child(Element::new("quantity").with_text("lots"))));
    assert!(matches!(schema.decode(&bad_qty, Some(&target), Validation::Strict), Err(DecodeError::InvalidValue{..})));

    let stranger = Element::new("invoice");
    assert_eq!(schema.decode(&stranger, None, Validation::Strict), Err(DecodeError::UnknownElement("invoice".into())));
    let empty = Element::new("purchaseOrder");
    assert!(matches!(schema.decode(&empty, Some(&target), Validation::Strict), Err(DecodeError::MissingAtPath(_))));
  }

  #[test]
  fn bare_lists_and_empty_children() {
    let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="tags"><xs:complexType><xs:sequence>
        <xs:element name="tag" type="xs:string" maxOccurs="unbounded"/>
      </xs:sequence></xs:complexType></xs:element>
      <xs:element name="doc"><xs:complexType><xs:sequence>
        <xs:element ref="tags"/>
        <xs:element name="note" minOccurs="0"><xs:complexType/></xs:element>
        <xs:element name="extra" type="xs:anyType" minOccurs="0"/>
      </xs:sequence></xs:complexType></xs:element>
    </xs:schema>"#;
    let schema = XsdSchema::parse(xsd, None).unwrap();

    let doc = Element::new("doc")
      .with_child(Element::new("tags").with_child(Element::new("tag").with_text("x")).with_child(Element::new("tag").with_text("y")))
      .with_child(Element::new("note"))
      .with_child(Element::new("extra").with_child(Element::new("k").with_text("v")));

    let value = schema.decode(&doc, None, Validation::Strict).unwrap();
    assert_eq!(value, json!({"tags": [{"tag": "x"}, {"tag": "y"}], "extra": {"k": "v"}}));
  }

  #[test]
  fn blank_text() {
    let root = Element::new("purchaseOrder").with_child(Element::new("items").with_child(
      item("872-AA", "  Lawn  mower ").with_child(Element::new("comment").with_text("   "))));
    let mut blank = root.clone();
    blank.children[0].children[0].children[1].text = Some(" \n ".into());

    let target = path("/purchaseOrder/items/item");
    let value = schema().decode(&root, Some(&target), Validation::Strict).unwrap();
    assert_eq!(value["productName"], json!("  Lawn  mower "));
    assert_eq!(value["comment"], json!("   "));
    // a blank quantity is missing, not invalid
    let value = schema().decode(&blank, Some(&target), Validation::Strict).unwrap();
    assert_eq!(value.get("quantity"), None);
  }
}
