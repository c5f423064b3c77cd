use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use super::{AttrReader, BuildRuleResolver, BuildRuleType, Buildable, RuleFactory, RuleParams};
use crate::consts::GEN_DIR;
use crate::error::BuildError;
use crate::step::Step;
use crate::target::BuildTarget;

/// Copies one source file into the generated directory.
///
/// The copy is a real file so that archiving the output directory and
/// unpacking it elsewhere yields an ordinary file.
#[derive(Debug)]
pub struct ExportFile {
  target: BuildTarget,
  src: PathBuf,
  out: String,
  output: OnceLock<PathBuf>,
}

impl ExportFile {
  /// `src` and `out` default to the target's short name. Only the file name
  /// of `out` is used.
  pub fn new(target: BuildTarget, src: Option<String>, out: Option<String>) -> Result<Self, BuildError> {
    let src = src.unwrap_or_else(|| target.short_name().to_string());
    let out = out.unwrap_or_else(|| target.short_name().to_string());

    let out = Path::new(&out)
      .file_name()
      .and_then(|name| name.to_str())
      .map(str::to_string)
      .ok_or_else(|| BuildError::InvalidAttribute {
        target: target.clone(),
        attribute: "out".to_string(),
        message: format!("`{}` has no file name", out),
      })?;

    Ok(Self {
      src: PathBuf::from(format!("{}{}", target.base_path_with_slash(), src)),
      target,
      out,
      output: OnceLock::new(),
    })
  }

  pub fn src(&self) -> &Path {
    &self.src
  }

  fn output(&self) -> &Path {
    self
      .output
      .get_or_init(|| PathBuf::from(format!("{}/{}{}", GEN_DIR, self.target.base_path_with_slash(), self.out)))
  }
}

impl Buildable for ExportFile {
  fn inputs(&self) -> Vec<PathBuf> {
    vec![self.src.clone()]
  }

  fn constant_attributes(&self) -> BTreeMap<String, String> {
    BTreeMap::from([("out".to_string(), self.out.clone())])
  }

  fn steps(&self) -> Vec<Step> {
    let output = self.output().to_path_buf();
    let parent = output.parent().map(Path::to_path_buf).unwrap_or_default();
    vec![
      Step::Mkdir { path: parent },
      Step::Copy {
        from: self.src.clone(),
        to: output,
      },
    ]
  }

  fn output_path(&self) -> Option<PathBuf> {
    Some(self.output().to_path_buf())
  }
}

pub struct ExportFileRuleFactory;

impl RuleFactory for ExportFileRuleFactory {
  fn rule_type(&self) -> BuildRuleType {
    BuildRuleType::EXPORT_FILE
  }

  fn attributes(&self) -> Vec<&'static str> {
    vec!["src", "out"]
  }

  fn create_buildable(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    _resolver: &mut dyn BuildRuleResolver,
  ) -> Result<Arc<dyn Buildable>, BuildError> {
    let export = ExportFile::new(params.target.clone(), attrs.optional_string("src")?, attrs.optional_string("out")?)?;
    Ok(Arc::new(export))
  }
}
