/*!
Owned element nodes.

Only the portion of the document still needed is ever held as an `Element`:
the open ancestor chain, an in-progress match, or a skeleton.
*/

#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct Element {
  /// local name, prefix already stripped
  pub tag : String,
  /// (local name, unescaped value) in document order
  pub attributes : Vec<(String,String)>,
  /// concatenated character data directly inside this element
  pub text : Option<String>,
  pub children : Vec<Element>,
}

impl Element {
  pub fn new<S : Into<String>>(tag : S) -> Self {
    Self{ tag: tag.into(), ..Default::default() }
  }

  pub fn with_attribute<K : Into<String>, V : Into<String>>(mut self, key : K, value : V) -> Self {
    self.attributes.push((key.into(), value.into()));
    self
  }

  pub fn with_text<S : Into<String>>(mut self, text : S) -> Self {
    self.push_text(&text.into());
    self
  }

  pub fn with_child(mut self, child : Element) -> Self {
    self.children.push(child);
    self
  }

  pub fn push_text(&mut self, text : &str) {
    match &mut self.text {
      Some(existing) => existing.push_str(text),
      None => self.text = Some(text.to_string()),
    }
  }

  /// Tag and attributes only.
  pub fn shallow_clone(&self) -> Self {
    Self{ tag: self.tag.clone(), attributes: self.attributes.clone(), text: None, children: vec![] }
  }

  pub fn attribute(&self, key : &str) -> Option<&str> {
    self.attributes.iter().find(|(k,_)| k == key).map(|(_,v)| v.as_str())
  }

  /// Walk down from self, one tag per step, taking the first child with that tag.
  /// `steps[0]` must be self's tag.
  pub fn find_path<S : AsRef<str>>(&self, steps : &[S]) -> Option<&Element> {
    let (first, rest) = steps.split_first()?;
    if first.as_ref() != self.tag { return None }
    rest.iter().try_fold(self, |elem, step| elem.children.iter().find(|c| c.tag == step.as_ref()))
  }
}
