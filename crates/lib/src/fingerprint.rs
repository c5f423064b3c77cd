//! Rule fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical JSON document describing the
//! rule: its type, its target, the sorted fingerprints of its dependencies and
//! a digest of its inputs. The document only holds sorted collections, so the
//! value is stable across runs and machines.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rules::BuildRule;
use crate::util::hash::{ContentHash, HashError, hash_bytes, hash_file};

/// Lowercase hex SHA-256, always 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Accepts only well-formed fingerprints.
  pub fn parse(s: &str) -> Option<Self> {
    (s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))).then(|| Self(s.to_string()))
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Serialize)]
struct InputDigest<'a> {
  inputs: BTreeMap<String, ContentHash>,
  attributes: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FingerprintDoc<'a> {
  rule_type: &'a str,
  target: String,
  deps: Vec<&'a Fingerprint>,
  input_digest: ContentHash,
}

/// Digest of the rule's input files (by content) and constant attributes.
pub fn input_digest(rule: &BuildRule, project_root: &Path) -> Result<ContentHash, HashError> {
  let buildable = rule.buildable();
  let mut inputs = BTreeMap::new();
  for input in buildable.inputs() {
    let hash = hash_file(&project_root.join(&input))?;
    inputs.insert(input.to_string_lossy().replace('\\', "/"), hash);
  }
  let attributes = buildable.constant_attributes();
  let doc = InputDigest {
    inputs,
    attributes: &attributes,
  };
  Ok(hash_bytes(&to_canonical_json(&doc)))
}

/// Fingerprint of `rule` given its dependencies' fingerprints in any order.
pub fn compute_fingerprint(
  rule: &BuildRule,
  dep_fingerprints: &[&Fingerprint],
  project_root: &Path,
) -> Result<Fingerprint, HashError> {
  let mut deps = dep_fingerprints.to_vec();
  deps.sort();

  let doc = FingerprintDoc {
    rule_type: rule.rule_type().name(),
    target: rule.target().fully_qualified_name(),
    deps,
    input_digest: input_digest(rule, project_root)?,
  };
  Ok(Fingerprint(hash_bytes(&to_canonical_json(&doc)).0))
}

fn to_canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
  // Only maps with string keys and plain structs are serialised here.
  serde_json::to_vec(value).unwrap_or_default()
}
