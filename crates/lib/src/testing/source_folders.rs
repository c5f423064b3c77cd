//! Source folder inference for coverage reports.

use std::collections::BTreeSet;

use crate::consts::GEN_DIR;

/// Where Java packages start inside the project.
///
/// `paths_from_root` are project-relative prefixes such as `java/`;
/// `path_elements` are directory names such as `src` that mark a source root
/// wherever they appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFinder {
  paths_from_root: BTreeSet<String>,
  path_elements: BTreeSet<String>,
}

impl PackageFinder {
  pub fn new(
    paths_from_root: impl IntoIterator<Item = impl Into<String>>,
    path_elements: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      paths_from_root: paths_from_root.into_iter().map(Into::into).collect(),
      path_elements: path_elements.into_iter().map(Into::into).collect(),
    }
  }

  /// Build from `java.src_roots` entries: `/java/` is a path from the root,
  /// `src` is a path element.
  pub fn from_src_roots<'a>(roots: impl IntoIterator<Item = &'a str>) -> Self {
    let mut finder = Self::default();
    for root in roots.into_iter().map(str::trim).filter(|r| !r.is_empty()) {
      match root.strip_prefix('/') {
        Some(from_root) => {
          let mut path = from_root.to_string();
          if !path.ends_with('/') {
            path.push('/');
          }
          finder.paths_from_root.insert(path);
        }
        None => {
          finder.path_elements.insert(root.trim_end_matches('/').to_string());
        }
      }
    }
    finder
  }

  pub fn paths_from_root(&self) -> &BTreeSet<String> {
    &self.paths_from_root
  }

  pub fn path_elements(&self) -> &BTreeSet<String> {
    &self.path_elements
  }

  fn source_folder(&self, path: &str) -> Option<String> {
    if let Some(root) = self.paths_from_root.iter().find(|r| path.starts_with(r.as_str())) {
      return Some(root.clone());
    }

    let mut parent = path;
    while let Some(slash) = parent.rfind('/') {
      parent = &parent[..slash];
      let name = parent.rsplit('/').next().unwrap_or(parent);
      if self.path_elements.contains(name) {
        return Some(format!("{}/", parent));
      }
    }
    None
  }
}

/// Whether `path` lies under the generated-output directory.
pub fn is_generated_file(path: &str) -> bool {
  path
    .strip_prefix(GEN_DIR)
    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Source root directories of `srcs`, each ending in `/`.
///
/// Generated sources are ignored, as are sources under no known root.
pub fn source_folders<'a>(srcs: impl IntoIterator<Item = &'a str>, finder: &PackageFinder) -> BTreeSet<String> {
  srcs
    .into_iter()
    .filter(|src| !is_generated_file(src))
    .filter_map(|src| finder.source_folder(src))
    .collect()
}
