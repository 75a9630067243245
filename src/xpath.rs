/*!
The path model. A `Path` is an absolute, `/`-separated sequence of tag
local names, eg `/purchaseOrder/items/item`.

While streaming, the live ancestor stack is a `CurrentPath`, which must be
optimised for add/remove the last element. `rpds::Vector` meets that
requirement, and comparison against a `Path` is plain sequence equality.
*/

use crate::error::PathError;

/// The live stack of open element local names, outermost first.
pub type CurrentPath = rpds::Vector<String>;

/// Strip a namespace prefix, either `{uri}local` or `prefix:local`.
pub fn local_name(tag : &str) -> &str {
  let tag = match tag.split_once('}') {
    Some((_, local)) => local,
    None => tag,
  };
  match tag.rsplit_once(':') {
    Some((_, local)) => local,
    None => tag,
  }
}

#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub struct Path(Vec<String>);

impl Path {
  /// Parse `/a/b/c`. Each step loses its namespace prefix.
  pub fn parse(path : &str) -> Result<Self, PathError> {
    let path = path.trim();
    if path.is_empty() { return Err(PathError::Empty) }

    let rest = path.strip_prefix('/').ok_or_else(|| PathError::NotAbsolute(path.into()))?;
    let steps = rest
      .split('/')
      .map(|step| match local_name(step.trim()) {
        "" => Err(PathError::EmptySegment(path.into())),
        local => Ok(local.to_string()),
      })
      .collect::<Result<Vec<String>, PathError>>()?;

    Ok(Self(steps))
  }

  /// Parse a comma separated list of paths, eg `/a/b,/a/c`. Blank entries are ignored.
  pub fn parse_list(paths : &str) -> Result<Vec<Self>, PathError> {
    paths
      .split(',')
      .filter(|p| !p.trim().is_empty())
      .map(Self::parse)
      .collect()
  }

  pub fn from_steps<I,S>(steps : I) -> Result<Self, PathError>
  where I : IntoIterator<Item = S>, S : Into<String>
  {
    let steps = steps.into_iter().map(Into::into).collect::<Vec<String>>();
    if steps.is_empty() { return Err(PathError::Empty) }
    if steps.iter().any(String::is_empty) { return Err(PathError::EmptySegment(steps.join("/"))) }
    Ok(Self(steps))
  }

  pub fn steps(&self) -> &[String] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  /// Never true for a parsed path, here for clippy.
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// The final step, ie the tag of the selected element.
  pub fn leaf(&self) -> &str {
    // parse guarantees at least one step
    self.0.last().map(String::as_str).unwrap_or_default()
  }

  /// All steps but the last. None for a single-step path.
  pub fn parent(&self) -> Option<Path> {
    match self.0.len() {
      0 | 1 => None,
      n => Some(Self(self.0[..n-1].to_vec())),
    }
  }

  /// true when `self` is an ancestor of `other` or the same path.
  pub fn is_ancestor_or_self_of(&self, other : &Path) -> bool {
    self.0.len() <= other.0.len() && other.0[..self.0.len()] == self.0[..]
  }

  /// Sequence equality against the live ancestor stack.
  pub fn matches(&self, current : &CurrentPath) -> bool {
    self.0.len() == current.len() && self.0.iter().zip(current.iter()).all(|(a,b)| a == b)
  }
}

impl std::fmt::Display for Path {
  fn fmt(&self, f : &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for step in &self.0 { write!(f, "/{step}")? }
    Ok(())
  }
}

impl std::str::FromStr for Path {
  type Err = PathError;
  fn from_str(s : &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

/// A set of paths for exclusion and attribute capture.
/// Small enough that a linear scan beats hashing the live stack.
#[derive(Debug,Clone,Default)]
pub struct PathSet(Vec<Path>);

impl PathSet {
  pub fn new(paths : Vec<Path>) -> Self { Self(paths) }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> std::slice::Iter<'_, Path> { self.0.iter() }

  /// Does the live stack equal one of these paths.
  pub fn contains(&self, current : &CurrentPath) -> bool {
    self.0.iter().any(|p| p.matches(current))
  }
}

impl From<Vec<Path>> for PathSet {
  fn from(paths : Vec<Path>) -> Self { Self(paths) }
}
