use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;

use mlua::prelude::*;
use tracing::debug;

use super::{AttrValue, BuildFileParseError, BuildFileParser, RawRecord};
use crate::target::BuildTarget;
use crate::util::hash::{ContentHash, hash_bytes};

/// Any undefined global called with a table records a rule of that type.
const PRELUDE: &str = r#"
setmetatable(_G, {
  __index = function(_, rule_type)
    return function(attrs)
      if type(attrs) ~= "table" then
        error(rule_type .. " expects a table of attributes", 2)
      end
      __brick_record(rule_type, attrs)
    end
  end,
})
"#;

/// Evaluates `BUCK` files as Lua.
///
/// ```lua
/// export_file { name = "some-file.html" }
/// java_library {
///   name = "util",
///   srcs = { "Util.java" },
///   deps = { ":base", "//third-party:guava" },
///   visibility = { "PUBLIC" },
/// }
/// ```
///
/// Results are memoised per file and content hash.
#[derive(Default)]
pub struct LuaBuildFileParser {
  cache: Mutex<HashMap<PathBuf, (ContentHash, Vec<RawRecord>)>>,
}

impl LuaBuildFileParser {
  pub fn new() -> Self {
    Self::default()
  }
}

impl BuildFileParser for LuaBuildFileParser {
  fn parse_package(&self, project_root: &Path, base_path: &str) -> Result<Vec<RawRecord>, BuildFileParseError> {
    let rel_path = PathBuf::from(base_path).join(crate::consts::BUILD_FILE_NAME);
    let source =
      std::fs::read(project_root.join(&rel_path)).map_err(|e| BuildFileParseError::for_build_file(&rel_path, e))?;
    let digest = hash_bytes(&source);

    if let Ok(cache) = self.cache.lock() {
      if let Some((cached_digest, records)) = cache.get(&rel_path) {
        if *cached_digest == digest {
          return Ok(records.clone());
        }
      }
    }

    let source = String::from_utf8(source).map_err(|e| BuildFileParseError::for_build_file(&rel_path, e))?;
    debug!(path = %rel_path.display(), "evaluating build file");
    let records = evaluate(&rel_path, base_path, &source)?;

    if let Ok(mut cache) = self.cache.lock() {
      cache.insert(rel_path, (digest, records.clone()));
    }
    Ok(records)
  }
}

fn evaluate(path: &Path, base_path: &str, source: &str) -> Result<Vec<RawRecord>, BuildFileParseError> {
  let to_parse_error = |e: LuaError| BuildFileParseError::for_build_file(path, e);

  let lua = Lua::new();
  let records: Rc<RefCell<Vec<RawRecord>>> = Rc::new(RefCell::new(Vec::new()));

  let recorder = {
    let records = Rc::clone(&records);
    let base_path = base_path.to_string();
    lua
      .create_function(move |_, (rule_type, attrs): (String, LuaTable)| {
        let record = record_from_table(&rule_type, &base_path, &attrs)?;
        let mut records = records.borrow_mut();
        if records.iter().any(|r| r.target == record.target) {
          return Err(LuaError::RuntimeError(format!(
            "duplicate target `{}` in package",
            record.target
          )));
        }
        records.push(record);
        Ok(())
      })
      .map_err(to_parse_error)?
  };

  lua.globals().set("__brick_record", recorder).map_err(to_parse_error)?;
  lua.load(PRELUDE).set_name("=prelude").exec().map_err(to_parse_error)?;
  lua
    .load(source)
    .set_name(format!("@{}", path.display()))
    .exec()
    .map_err(to_parse_error)?;

  Ok(std::mem::take(&mut *records.borrow_mut()))
}

fn record_from_table(rule_type: &str, base_path: &str, attrs: &LuaTable) -> LuaResult<RawRecord> {
  let mut name = None;
  let mut attributes = BTreeMap::new();

  for pair in attrs.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair?;
    let LuaValue::String(key) = key else {
      return Err(LuaError::RuntimeError(format!(
        "{}: attribute names must be strings",
        rule_type
      )));
    };
    let key = key.to_str()?.to_string();
    let value = attr_value(rule_type, &key, value)?;

    if key == "name" {
      match value {
        AttrValue::String(s) => name = Some(s),
        other => {
          return Err(LuaError::RuntimeError(format!(
            "{}: `name` must be a string, got {}",
            rule_type,
            other.type_name()
          )));
        }
      }
    } else {
      attributes.insert(key, value);
    }
  }

  let name = name.ok_or_else(|| LuaError::RuntimeError(format!("{}: missing required attribute `name`", rule_type)))?;
  let target = BuildTarget::new(base_path, &name).map_err(|e| LuaError::RuntimeError(e.to_string()))?;

  Ok(RawRecord {
    rule_type: rule_type.to_string(),
    target,
    attributes,
  })
}

fn attr_value(rule_type: &str, key: &str, value: LuaValue) -> LuaResult<AttrValue> {
  match value {
    LuaValue::String(s) => Ok(AttrValue::String(s.to_str()?.to_string())),
    LuaValue::Boolean(b) => Ok(AttrValue::Bool(b)),
    LuaValue::Integer(i) => Ok(AttrValue::Int(i)),
    LuaValue::Number(n) if n.fract() == 0.0 => Ok(AttrValue::Int(n as i64)),
    LuaValue::Table(t) => {
      let len = t.raw_len();
      let mut items = Vec::with_capacity(len);
      for i in 1..=len {
        match t.raw_get::<LuaValue>(i)? {
          LuaValue::String(s) => items.push(s.to_str()?.to_string()),
          _ => {
            return Err(LuaError::RuntimeError(format!(
              "{}: `{}` must be a list of strings",
              rule_type, key
            )));
          }
        }
      }
      if t.pairs::<LuaValue, LuaValue>().count() != len {
        return Err(LuaError::RuntimeError(format!(
          "{}: `{}` must be a list of strings",
          rule_type, key
        )));
      }
      Ok(AttrValue::List(items))
    }
    other => Err(LuaError::RuntimeError(format!(
      "{}: unsupported value of type {} for `{}`",
      rule_type,
      other.type_name(),
      key
    ))),
  }
}
