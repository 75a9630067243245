/*!
Loads an XSD into the small model the decoder needs: for each element, its
occurrence bound and whether its type is simple, complex (with which
attributes and children), or anything.

Loading happens in two passes. The first collects named definitions from the
schema document and everything it includes or imports. The second resolves
references into an arena of complex types, so recursive types are fine as
long as the recursion goes through an element.

All names are local names. Prefixes are stripped from tags, from `type`,
`ref` and `base` values, and everything is matched on what is left.
*/

use crate::error::SchemaLoadError;
use crate::error::JobError;
use crate::parser;
use crate::tree::Element;
use crate::valuer::SimpleKind;
use crate::xpath::local_name;

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path as FsPath, PathBuf};

/// Nesting bound for simple type derivations.
const MAX_SIMPLE_DEPTH : usize = 64;

/// maxOccurs
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Occurs {
  Bounded(u64),
  Unbounded,
}

impl Occurs {
  pub const ONE : Occurs = Occurs::Bounded(1);

  pub fn parse(value : Option<&str>) -> Result<Self, SchemaLoadError> {
    match value.map(str::trim) {
      None => Ok(Self::ONE),
      Some("unbounded") => Ok(Occurs::Unbounded),
      Some(n) => n.parse::<u64>().map(Occurs::Bounded).map_err(|_| SchemaLoadError::Occurs(n.into())),
    }
  }

  /// More than one occurrence possible.
  pub fn is_repeatable(self) -> bool {
    match self {
      Occurs::Unbounded => true,
      Occurs::Bounded(n) => n > 1,
    }
  }
}

impl std::ops::Mul for Occurs {
  type Output = Occurs;
  fn mul(self, rhs : Occurs) -> Occurs {
    use Occurs::*;
    match (self, rhs) {
      (Bounded(0), _) | (_, Bounded(0)) => Bounded(0),
      (Bounded(a), Bounded(b)) => Bounded(a.saturating_mul(b)),
      _ => Unbounded,
    }
  }
}

impl std::ops::Add for Occurs {
  type Output = Occurs;
  fn add(self, rhs : Occurs) -> Occurs {
    match (self, rhs) {
      (Occurs::Bounded(a), Occurs::Bounded(b)) => Occurs::Bounded(a.saturating_add(b)),
      _ => Occurs::Unbounded,
    }
  }
}

/// Index into the complex type arena.
pub type TypeId = usize;

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum TypeRef {
  Simple(SimpleKind),
  Complex(TypeId),
  /// anyType, or an element declared without a type
  Any,
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct ElementDecl {
  pub name : String,
  /// effective bound, already multiplied through enclosing groups
  pub max : Occurs,
  pub ty : TypeRef,
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub enum Content {
  Empty,
  Simple(SimpleKind),
  /// `open` when an `any` wildcard allows undeclared children
  Elements{ children : Vec<ElementDecl>, open : bool },
}

#[derive(Debug,Clone,PartialEq,Eq)]
pub struct ComplexType {
  pub attributes : Vec<(String, SimpleKind)>,
  pub any_attribute : bool,
  pub content : Content,
}

impl ComplexType {
  fn placeholder() -> Self {
    Self{ attributes: vec![], any_attribute: false, content: Content::Empty }
  }

  pub fn attribute(&self, name : &str) -> Option<&SimpleKind> {
    self.attributes.iter().find(|(n,_)| n == name).map(|(_,k)| k)
  }

  pub fn child(&self, name : &str) -> Option<&ElementDecl> {
    match &self.content {
      Content::Elements{children, ..} => children.iter().find(|c| c.name == name),
      _ => None,
    }
  }

  pub fn child_count(&self) -> usize {
    match &self.content {
      Content::Elements{children, ..} => children.len(),
      _ => 0,
    }
  }

  pub fn is_open(&self) -> bool {
    matches!(self.content, Content::Elements{open: true, ..})
  }
}

/// A loaded schema.
#[derive(Debug,Clone)]
pub struct XsdSchema {
  pub(crate) elements : FxHashMap<String, ElementDecl>,
  pub(crate) types : Vec<ComplexType>,
}

impl XsdSchema {
  /// Load a schema file, following include and import locations relative to it.
  pub fn load<P : AsRef<FsPath>>(path : P) -> Result<Self, SchemaLoadError> {
    let mut raw = RawSchema::default();
    let mut visited = FxHashSet::default();
    raw.collect_file(path.as_ref(), &mut visited)?;
    Self::resolve(&raw)
  }

  /// Load from a string. Includes are resolved relative to `base_dir`.
  pub fn parse(xsd : &str, base_dir : Option<&FsPath>) -> Result<Self, SchemaLoadError> {
    let mut raw = RawSchema::default();
    let mut visited = FxHashSet::default();
    let doc = read_schema_document(xsd.as_bytes(), FsPath::new("<string>"))?;
    raw.collect(&doc, base_dir.unwrap_or(FsPath::new(".")), &mut visited)?;
    Self::resolve(&raw)
  }

  pub fn element(&self, name : &str) -> Option<&ElementDecl> {
    self.elements.get(name)
  }

  pub fn complex(&self, id : TypeId) -> Option<&ComplexType> {
    self.types.get(id)
  }

  fn resolve(raw : &RawSchema) -> Result<Self, SchemaLoadError> {
    let mut resolver = Resolver{ raw, types: vec![], named: FxHashMap::default(), globals: FxHashMap::default() };

    let mut elements = FxHashMap::default();
    for name in raw.elements.keys() {
      let ty = resolver.global_element_type(name)?;
      elements.insert(name.clone(), ElementDecl{ name: name.clone(), max: Occurs::ONE, ty });
    }

    Ok(Self{ elements, types: resolver.types })
  }
}

fn read_schema_document<R : std::io::BufRead>(istream : R, path : &FsPath) -> Result<Element, SchemaLoadError> {
  let mut events = parser::XmlEvents::new(istream);
  let doc = parser::read_document(&mut events).map_err(|err| match err {
    JobError::Xml{source, ..} => SchemaLoadError::Xml(source),
    JobError::Io(source) => SchemaLoadError::Io{ path: path.into(), source },
    other => SchemaLoadError::Invalid(other.to_string()),
  })?;

  match doc {
    Some(doc) if doc.tag == "schema" => Ok(doc),
    Some(doc) => Err(SchemaLoadError::NotASchema(doc.tag)),
    None => Err(SchemaLoadError::NotASchema(String::new())),
  }
}

/// Value of a QName-valued attribute, without prefix.
fn qname_attr<'e>(node : &'e Element, key : &str) -> Option<&'e str> {
  node.attribute(key).map(local_name)
}

/// Named top-level definitions, keyed by local name, first definition wins.
#[derive(Debug,Default)]
struct RawSchema {
  elements : FxHashMap<String, Element>,
  complex_types : FxHashMap<String, Element>,
  simple_types : FxHashMap<String, Element>,
  groups : FxHashMap<String, Element>,
  attribute_groups : FxHashMap<String, Element>,
  attributes : FxHashMap<String, Element>,
}

impl RawSchema {
  fn collect_file(&mut self, path : &FsPath, visited : &mut FxHashSet<PathBuf>) -> Result<(), SchemaLoadError> {
    let canonical = path.canonicalize().map_err(|source| SchemaLoadError::Io{ path: path.into(), source })?;
    if !visited.insert(canonical.clone()) { return Ok(()) }

    tracing::debug!("Generating schema from {}", path.display());
    let file = std::fs::File::open(&canonical).map_err(|source| SchemaLoadError::Io{ path: path.into(), source })?;
    let doc = read_schema_document(std::io::BufReader::new(file), path)?;
    let base_dir = canonical.parent().map(FsPath::to_path_buf).unwrap_or_default();
    self.collect(&doc, &base_dir, visited)
  }

  fn collect(&mut self, doc : &Element, base_dir : &FsPath, visited : &mut FxHashSet<PathBuf>) -> Result<(), SchemaLoadError> {
    for node in &doc.children {
      let name = node.attribute("name").map(String::from);
      let table = match node.tag.as_str() {
        "element" => &mut self.elements,
        "complexType" => &mut self.complex_types,
        "simpleType" => &mut self.simple_types,
        "group" => &mut self.groups,
        "attributeGroup" => &mut self.attribute_groups,
        "attribute" => &mut self.attributes,
        "include" | "import" | "redefine" | "override" => {
          if let Some(location) = node.attribute("schemaLocation") {
            let location = base_dir.join(location);
            match (node.tag.as_str(), location.exists()) {
              (_, true) => self.collect_file(&location, visited)?,
              // imports commonly point at remote locations
              ("import", false) => tracing::debug!("skipping unreachable import {}", location.display()),
              (_, false) => return Err(SchemaLoadError::Io{
                path: location,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
              }),
            }
          }
          continue
        }
        _ => continue,
      };

      if let Some(name) = name {
        table.entry(name).or_insert_with(|| node.clone());
      }
    }
    Ok(())
  }
}

struct Resolver<'r> {
  raw : &'r RawSchema,
  types : Vec<ComplexType>,
  // named complex types already in the arena
  named : FxHashMap<String, TypeId>,
  // global elements already resolved
  globals : FxHashMap<String, TypeRef>,
}

impl<'r> Resolver<'r> {
  fn alloc(&mut self) -> TypeId {
    self.types.push(ComplexType::placeholder());
    self.types.len() - 1
  }

  fn global_element_type(&mut self, name : &str) -> Result<TypeRef, SchemaLoadError> {
    if let Some(ty) = self.globals.get(name) { return Ok(ty.clone()) }
    let raw = self.raw;
    let node = raw.elements.get(name).ok_or_else(|| SchemaLoadError::Unresolved{ kind: "element", name: name.into() })?;
    self.element_type(node, Some(name))
  }

  /// The type of an element declaration. A global element is memoised
  /// before its inline type is filled in, so recursion through it terminates.
  fn element_type(&mut self, node : &'r Element, global : Option<&str>) -> Result<TypeRef, SchemaLoadError> {
    if let Some(type_name) = qname_attr(node, "type") {
      let ty = self.named_type(type_name)?;
      if let Some(global) = global { self.globals.insert(global.into(), ty.clone()); }
      return Ok(ty)
    }

    if let Some(complex) = node.children.iter().find(|c| c.tag == "complexType") {
      let id = self.alloc();
      if let Some(global) = global { self.globals.insert(global.into(), TypeRef::Complex(id)); }
      self.fill(id, complex)?;
      return Ok(TypeRef::Complex(id))
    }

    let ty = match node.children.iter().find(|c| c.tag == "simpleType") {
      Some(simple) => TypeRef::Simple(self.simple_kind(simple, 0)?),
      None => TypeRef::Any,
    };
    if let Some(global) = global { self.globals.insert(global.into(), ty.clone()); }
    Ok(ty)
  }

  fn named_type(&mut self, name : &str) -> Result<TypeRef, SchemaLoadError> {
    if let Some(&id) = self.named.get(name) { return Ok(TypeRef::Complex(id)) }

    let raw = self.raw;
    if let Some(node) = raw.complex_types.get(name) {
      let id = self.alloc();
      self.named.insert(name.into(), id);
      self.fill(id, node)?;
      return Ok(TypeRef::Complex(id))
    }

    match name {
      "anyType" => Ok(TypeRef::Any),
      _ => Ok(TypeRef::Simple(self.simple_named(name, 0)?)),
    }
  }

  fn simple_named(&mut self, name : &str, depth : usize) -> Result<SimpleKind, SchemaLoadError> {
    if depth > MAX_SIMPLE_DEPTH { return Err(SchemaLoadError::Invalid(format!("simple type {name} nests too deep"))) }

    let raw = self.raw;
    if let Some(node) = raw.simple_types.get(name) { return self.simple_kind(node, depth + 1) }
    if let Some(kind) = SimpleKind::builtin(name) { return Ok(kind) }

    // simpleContent may derive from a complex type that has simple content
    if raw.complex_types.contains_key(name) {
      if let TypeRef::Complex(id) = self.named_type(name)? {
        if let Content::Simple(kind) = &self.types[id].content { return Ok(kind.clone()) }
      }
      return Ok(SimpleKind::String)
    }

    Err(SchemaLoadError::Unresolved{ kind: "type", name: name.into() })
  }

  fn simple_kind(&mut self, node : &'r Element, depth : usize) -> Result<SimpleKind, SchemaLoadError> {
    for child in &node.children {
      match child.tag.as_str() {
        "restriction" => return match qname_attr(child, "base") {
          Some(base) => self.simple_named(base, depth + 1),
          None => self.inline_simple(child, depth),
        },
        "list" => {
          let item = match qname_attr(child, "itemType") {
            Some(item) => self.simple_named(item, depth + 1)?,
            None => self.inline_simple(child, depth)?,
          };
          return Ok(SimpleKind::List(Box::new(item)))
        }
        // members may disagree, so keep the lexical form
        "union" => return Ok(SimpleKind::String),
        _ => continue,
      }
    }
    Ok(SimpleKind::String)
  }

  fn inline_simple(&mut self, node : &'r Element, depth : usize) -> Result<SimpleKind, SchemaLoadError> {
    match node.children.iter().find(|c| c.tag == "simpleType") {
      Some(simple) => self.simple_kind(simple, depth + 1),
      None => Ok(SimpleKind::String),
    }
  }

  /// Fill arena slot `id` from a complexType node.
  fn fill(&mut self, id : TypeId, node : &'r Element) -> Result<(), SchemaLoadError> {
    let mut ty = ComplexType::placeholder();
    let mut children = vec![];
    let mut open = false;
    let mut has_particles = false;

    for child in &node.children {
      match child.tag.as_str() {
        "sequence" | "choice" | "all" | "group" => {
          has_particles = true;
          self.particle(child, Occurs::ONE, &mut children, &mut open)?;
        }
        "attribute" | "attributeGroup" | "anyAttribute" => self.attribute_use(child, &mut ty)?,
        "simpleContent" => {
          if let Some(derivation) = child.children.iter().find(|c| c.tag == "extension" || c.tag == "restriction") {
            let kind = match qname_attr(derivation, "base") {
              Some(base) => {
                self.inherit_attributes(base, &mut ty)?;
                self.simple_named(base, 0)?
              }
              None => self.inline_simple(derivation, 0)?,
            };
            for attr in &derivation.children { self.attribute_use(attr, &mut ty)? }
            ty.content = Content::Simple(kind);
          }
        }
        "complexContent" => {
          if let Some(derivation) = child.children.iter().find(|c| c.tag == "extension" || c.tag == "restriction") {
            has_particles = true;
            if let Some(base) = qname_attr(derivation, "base") {
              self.inherit_attributes(base, &mut ty)?;
              // a restriction restates the content it keeps
              if derivation.tag == "extension" {
                if let TypeRef::Complex(base_id) = self.named_type(base)? {
                  if let Content::Elements{children: base_children, open: base_open} = &self.types[base_id].content {
                    children.extend(base_children.iter().cloned());
                    open |= *base_open;
                  }
                }
              }
            }
            for part in &derivation.children {
              match part.tag.as_str() {
                "sequence" | "choice" | "all" | "group" => self.particle(part, Occurs::ONE, &mut children, &mut open)?,
                _ => self.attribute_use(part, &mut ty)?,
              }
            }
          }
        }
        _ => continue,
      }
    }

    if has_particles {
      ty.content = Content::Elements{ children, open };
    }
    self.types[id] = ty;
    Ok(())
  }

  fn inherit_attributes(&mut self, base : &str, ty : &mut ComplexType) -> Result<(), SchemaLoadError> {
    if !self.raw.complex_types.contains_key(base) { return Ok(()) }
    if let TypeRef::Complex(base_id) = self.named_type(base)? {
      let base_ty = &self.types[base_id];
      ty.any_attribute |= base_ty.any_attribute;
      for (name, kind) in &base_ty.attributes {
        if ty.attribute(name).is_none() { ty.attributes.push((name.clone(), kind.clone())) }
      }
    }
    Ok(())
  }

  /// Flatten element declarations out of a model group, multiplying occurrence bounds on the way down.
  fn particle(&mut self, node : &'r Element, outer : Occurs, children : &mut Vec<ElementDecl>, open : &mut bool) -> Result<(), SchemaLoadError> {
    let raw = self.raw;
    let occurs = outer * Occurs::parse(node.attribute("maxOccurs"))?;

    match node.tag.as_str() {
      "element" => {
        let decl = match qname_attr(node, "ref") {
          Some(name) => ElementDecl{ name: name.into(), max: occurs, ty: self.global_element_type(name)? },
          None => {
            let name = node.attribute("name").ok_or_else(|| SchemaLoadError::Invalid("local element without name or ref".into()))?;
            ElementDecl{ name: name.into(), max: occurs, ty: self.element_type(node, None)? }
          }
        };
        push_child(children, decl);
      }
      "sequence" | "choice" | "all" => {
        for child in &node.children { self.particle(child, occurs, children, open)? }
      }
      "group" => {
        let name = qname_attr(node, "ref").ok_or_else(|| SchemaLoadError::Invalid("group without ref".into()))?;
        let group = raw.groups.get(name).ok_or_else(|| SchemaLoadError::Unresolved{ kind: "group", name: name.into() })?;
        for child in &group.children { self.particle(child, occurs, children, open)? }
      }
      "any" => *open = true,
      _ => (),
    }
    Ok(())
  }

  fn attribute_use(&mut self, node : &'r Element, ty : &mut ComplexType) -> Result<(), SchemaLoadError> {
    let raw = self.raw;
    match node.tag.as_str() {
      "attribute" => {
        if node.attribute("use") == Some("prohibited") { return Ok(()) }
        let (name, decl) = match qname_attr(node, "ref") {
          Some(name) => (name, raw.attributes.get(name).ok_or_else(|| SchemaLoadError::Unresolved{ kind: "attribute", name: name.into() })?),
          None => (node.attribute("name").ok_or_else(|| SchemaLoadError::Invalid("attribute without name or ref".into()))?, node),
        };
        let kind = match qname_attr(decl, "type") {
          Some(type_name) => self.simple_named(type_name, 0)?,
          None => self.inline_simple(decl, 0)?,
        };
        if ty.attribute(name).is_none() { ty.attributes.push((name.to_string(), kind)) }
      }
      "attributeGroup" => {
        let name = qname_attr(node, "ref").ok_or_else(|| SchemaLoadError::Invalid("attributeGroup without ref".into()))?;
        let group = raw.attribute_groups.get(name).ok_or_else(|| SchemaLoadError::Unresolved{ kind: "attributeGroup", name: name.into() })?;
        for child in &group.children { self.attribute_use(child, ty)? }
      }
      "anyAttribute" => ty.any_attribute = true,
      _ => (),
    }
    Ok(())
  }
}

/// A name declared twice in one content model can occur more than once.
fn push_child(children : &mut Vec<ElementDecl>, decl : ElementDecl) {
  match children.iter_mut().find(|c| c.name == decl.name) {
    Some(existing) => existing.max = existing.max + decl.max,
    None => children.push(decl),
  }
}
