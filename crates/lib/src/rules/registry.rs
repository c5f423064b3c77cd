use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::{BuildRule, BuildRuleType, Buildable};
use crate::error::BuildError;
use crate::parser::{AttrValue, RawRecord};
use crate::target::{BuildTarget, BuildTargetPattern, allowed};

/// Attributes every rule type accepts.
const COMMON_ATTRIBUTES: &[&str] = &["deps", "visibility", "labels"];

/// Turns a target into its rule, parsing other build files when needed.
pub trait BuildRuleResolver {
  fn resolve(&mut self, target: &BuildTarget) -> Result<Arc<BuildRule>, BuildError>;
}

/// Resolve `dependency` on behalf of `consumer`, enforcing visibility.
pub fn resolve_visible(
  resolver: &mut dyn BuildRuleResolver,
  consumer: &BuildTarget,
  dependency: &BuildTarget,
) -> Result<Arc<BuildRule>, BuildError> {
  let rule = resolver.resolve(dependency)?;
  if !allowed(rule.target(), rule.visibility(), consumer) {
    return Err(BuildError::VisibilityViolation {
      dependent: consumer.clone(),
      dependency: dependency.clone(),
    });
  }
  Ok(rule)
}

/// Fields shared by every rule, already resolved.
#[derive(Debug)]
pub struct RuleParams {
  pub target: BuildTarget,
  pub deps: Vec<Arc<BuildRule>>,
  pub visibility: Vec<BuildTargetPattern>,
  pub labels: BTreeSet<String>,
}

/// Typed access to the attributes of one record.
pub struct AttrReader<'a> {
  record: &'a RawRecord,
}

impl<'a> AttrReader<'a> {
  pub fn new(record: &'a RawRecord) -> Self {
    Self { record }
  }

  pub fn target(&self) -> &BuildTarget {
    &self.record.target
  }

  fn invalid(&self, attribute: &str, message: String) -> BuildError {
    BuildError::InvalidAttribute {
      target: self.record.target.clone(),
      attribute: attribute.to_string(),
      message,
    }
  }

  pub fn optional_string(&self, name: &str) -> Result<Option<String>, BuildError> {
    match self.record.attributes.get(name) {
      None => Ok(None),
      Some(AttrValue::String(s)) => Ok(Some(s.clone())),
      Some(other) => Err(self.invalid(name, format!("expected a string, got {}", other.type_name()))),
    }
  }

  /// A list of strings; absent means empty. A single string is accepted as
  /// a one-element list.
  pub fn string_list(&self, name: &str) -> Result<Vec<String>, BuildError> {
    match self.record.attributes.get(name) {
      None => Ok(Vec::new()),
      Some(AttrValue::List(items)) => Ok(items.clone()),
      Some(AttrValue::String(s)) => Ok(vec![s.clone()]),
      Some(other) => Err(self.invalid(name, format!("expected a list of strings, got {}", other.type_name()))),
    }
  }

  pub fn string_set(&self, name: &str) -> Result<BTreeSet<String>, BuildError> {
    Ok(self.string_list(name)?.into_iter().collect())
  }

  /// Target references, resolved against the record's package.
  pub fn targets(&self, name: &str) -> Result<Vec<BuildTarget>, BuildError> {
    let base_path = self.record.target.base_path();
    let mut targets = Vec::new();
    for item in self.string_list(name)? {
      targets.push(BuildTarget::parse(&item, Some(base_path))?);
    }
    Ok(targets)
  }

  /// Source paths, made relative to the project root. Paths already under
  /// `buck-out/` name generated files and are kept as written.
  pub fn source_paths(&self, name: &str) -> Result<BTreeSet<String>, BuildError> {
    let prefix = self.record.target.base_path_with_slash();
    let mut paths = BTreeSet::new();
    for item in self.string_list(name)? {
      if item.starts_with('/') || item.split('/').any(|c| c == "..") {
        return Err(self.invalid(name, format!("`{}` must be a relative path inside the package", item)));
      }
      if item.starts_with(&format!("{}/", crate::consts::BUCK_OUT_DIR)) {
        paths.insert(item);
      } else {
        paths.insert(format!("{}{}", prefix, item));
      }
    }
    Ok(paths)
  }
}

/// Creates rules of one type.
pub trait RuleFactory: Send + Sync {
  fn rule_type(&self) -> BuildRuleType;

  /// Attributes read by this factory, besides `deps`, `visibility` and `labels`.
  fn attributes(&self) -> Vec<&'static str>;

  fn create_buildable(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    resolver: &mut dyn BuildRuleResolver,
  ) -> Result<Arc<dyn Buildable>, BuildError>;
}

/// Maps rule-type tags to factories.
#[derive(Default)]
pub struct RuleFactoryRegistry {
  factories: BTreeMap<&'static str, Arc<dyn RuleFactory>>,
}

impl RuleFactoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry holding `export_file`, `java_library`, `java_test` and
  /// `robolectric_test`.
  pub fn with_builtin_rules(java: super::JavaOptions) -> Self {
    let mut registry = Self::new();
    registry.register(Arc::new(super::ExportFileRuleFactory));
    registry.register(Arc::new(super::JavaLibraryRuleFactory::new(java.clone())));
    registry.register(Arc::new(super::JavaTestRuleFactory::new(java.clone())));
    registry.register(Arc::new(super::RobolectricTestRuleFactory::new(java)));
    registry
  }

  /// Add a factory, replacing any previous one for the same tag.
  pub fn register(&mut self, factory: Arc<dyn RuleFactory>) {
    self.factories.insert(factory.rule_type().name(), factory);
  }

  pub fn get(&self, rule_type: &str) -> Option<&Arc<dyn RuleFactory>> {
    self.factories.get(rule_type)
  }

  pub fn rule_types(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.factories.keys().copied()
  }

  /// Build the rule for `record`, resolving its dependencies through
  /// `resolver`.
  pub fn create_rule(
    &self,
    record: &RawRecord,
    resolver: &mut dyn BuildRuleResolver,
  ) -> Result<BuildRule, BuildError> {
    let factory = self.get(&record.rule_type).ok_or_else(|| BuildError::UnknownRuleType {
      rule_type: record.rule_type.clone(),
      target: record.target.clone(),
    })?;

    let declared = factory.attributes();
    if let Some(unknown) = record
      .attributes
      .keys()
      .find(|k| !COMMON_ATTRIBUTES.contains(&k.as_str()) && !declared.contains(&k.as_str()))
    {
      return Err(BuildError::UnknownAttribute {
        target: record.target.clone(),
        rule_type: record.rule_type.clone(),
        attribute: unknown.clone(),
      });
    }

    let attrs = AttrReader::new(record);
    let base_path = record.target.base_path();

    let mut deps = Vec::new();
    for dep in attrs.targets("deps")? {
      deps.push(resolve_visible(resolver, &record.target, &dep)?);
    }

    let mut visibility = Vec::new();
    for pattern in attrs.string_list("visibility")? {
      visibility.push(BuildTargetPattern::parse(&pattern, Some(base_path))?);
    }

    let params = RuleParams {
      target: record.target.clone(),
      deps,
      visibility,
      labels: attrs.string_set("labels")?,
    };

    debug!(target = %record.target, rule_type = %record.rule_type, "creating rule");
    let buildable = factory.create_buildable(&params, &attrs, resolver)?;

    Ok(BuildRule::new(
      params.target,
      factory.rule_type(),
      params.deps,
      params.visibility,
      params.labels,
      buildable,
    ))
  }
}
