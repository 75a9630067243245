/*!
Input containers. A plain file is one xml document; a zip holds one per
member, read in archive index order.
*/

use crate::error::JobError;
use std::path::Path as FsPath;

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Container {
  Plain,
  Zip,
}

impl Container {
  /// Decided by extension alone.
  pub fn of<P : AsRef<FsPath>>(path : P) -> Self {
    match path.as_ref().extension().and_then(|ext| ext.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("zip") => Container::Zip,
      _ => Container::Plain,
    }
  }
}

/// Call `f` with the name and content of each document in `path`. Directory entries are skipped.
pub fn for_each_document<P, F>(path : P, mut f : F) -> Result<usize, JobError>
where
  P : AsRef<FsPath>,
  F : FnMut(&str, &mut dyn std::io::BufRead) -> Result<(), JobError>,
{
  let path = path.as_ref();
  let file = std::fs::File::open(path)?;

  match Container::of(path) {
    Container::Plain => {
      let name = path.display().to_string();
      f(&name, &mut std::io::BufReader::new(file))?;
      Ok(1)
    }
    Container::Zip => {
      let mut archive = zip::ZipArchive::new(file)?;
      let mut documents = 0;
      for index in 0..archive.len() {
        let member = archive.by_index(index)?;
        if member.is_dir() { continue }
        let name = member.name().to_string();
        tracing::debug!("reading {name} from {}", path.display());
        f(&name, &mut std::io::BufReader::new(member))?;
        documents += 1;
      }
      Ok(documents)
    }
  }
}

#[cfg(test)]
mod test_archive {
  use super::*;
  use std::io::{Read, Write};

  #[test]
  fn container_by_extension() {
    assert_eq!(Container::of("a/b.zip"), Container::Zip);
    assert_eq!(Container::of("B.ZIP"), Container::Zip);
    assert_eq!(Container::of("b.xml"), Container::Plain);
    assert_eq!(Container::of("zip"), Container::Plain);
  }

  #[test]
  fn zip_members_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.zip");
    {
      let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
      let options = zip::write::FileOptions::default();
      zip.start_file("b.xml", options).unwrap();
      zip.write_all(b"<b/>").unwrap();
      zip.add_directory("sub/", options).unwrap();
      zip.start_file("sub/a.xml", options).unwrap();
      zip.write_all(b"<a/>").unwrap();
      zip.finish().unwrap();
    }

    let mut seen = vec![];
    let count = for_each_document(&path, |name, content| {
      let mut text = String::new();
      content.read_to_string(&mut text)?;
      seen.push((name.to_string(), text));
      Ok(())
    }).unwrap();

    assert_eq!(count, 2);
    assert_eq!(seen, vec![("b.xml".to_string(), "<b/>".to_string()), ("sub/a.xml".to_string(), "<a/>".to_string())]);
  }

  #[test]
  fn missing_input() {
    let result = for_each_document("/nonexistent/input.xml", |_, _| Ok(()));
    assert!(matches!(result, Err(JobError::Io(_))));
  }
}
