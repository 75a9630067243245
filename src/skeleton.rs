/*!
A synthetic ancestor chain for a target path, so the schema decoder can be
handed a rooted tree without the rest of the document.

For `/a/b/c` the skeleton is `<a><b/></a>`. A match `<c>` is spliced in as
the last child of `<b>`, the root is decoded, and the match is spliced out
again. At most one match is attached at any time.
*/

use crate::tree::Element;
use crate::xpath::Path;

#[derive(Debug,Clone)]
pub struct Skeleton {
  // None when the path has a single step, ie the match is the document root
  root : Option<Element>,
  // synthetic levels above a match
  depth : usize,
}

impl Skeleton {
  pub fn new(path : &Path) -> Self {
    let root = path.parent().and_then(|parent| {
      parent.steps()
        .iter()
        .rev()
        .fold(None, |child : Option<Element>, step| {
          let mut elem = Element::new(step.as_str());
          elem.children.extend(child);
          Some(elem)
        })
    });
    Self{root, depth: path.len() - 1}
  }

  /// Attach `elem` as the last child of the parent, call `f` with the root,
  /// then detach `elem` and hand it back.
  pub fn with_attached<T>(&mut self, elem : Element, f : impl FnOnce(&Element) -> T) -> (T, Element) {
    let depth = self.depth;
    let Some(root) = self.root.as_mut() else {
      let result = f(&elem);
      return (result, elem)
    };

    parent_of(root, depth).children.push(elem);
    let result = f(root);
    let elem = parent_of(root, depth).children.pop().unwrap_or_default();
    (result, elem)
  }
}

// Each synthetic level holds exactly one child, so index 0 is always the next level down.
fn parent_of(root : &mut Element, depth : usize) -> &mut Element {
  let mut level = root;
  for _ in 1..depth {
    level = &mut level.children[0];
  }
  level
}
