use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use super::{
  AttrReader, BuildRuleResolver, BuildRuleType, Buildable, RuleFactory, RuleParams, TestBuildable, resolve_visible,
};
use crate::consts::GEN_DIR;
use crate::error::BuildError;
use crate::step::{ExecStep, Step};
use crate::target::BuildTarget;

/// Tools and defaults for the JVM rule family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaOptions {
  pub javac: String,
  pub jar: String,
  pub java: String,
  /// Main class that runs tests and writes one JSON summary per test case.
  pub test_runner: String,
  pub source_level: String,
  pub target_level: String,
}

impl Default for JavaOptions {
  fn default() -> Self {
    Self {
      javac: "javac".to_string(),
      jar: "jar".to_string(),
      java: "java".to_string(),
      test_runner: "brick.junit.JUnitMain".to_string(),
      source_level: "7".to_string(),
      target_level: "7".to_string(),
    }
  }
}

/// Compiles sources into `lib__<name>__output/<name>.jar`.
#[derive(Debug)]
pub struct JavaLibrary {
  target: BuildTarget,
  srcs: BTreeSet<String>,
  resources: BTreeSet<String>,
  classpath: Vec<PathBuf>,
  source_level: String,
  target_level: String,
  javac: String,
  jar: String,
  output: OnceLock<Option<PathBuf>>,
}

impl JavaLibrary {
  pub fn target(&self) -> &BuildTarget {
    &self.target
  }

  /// Source paths relative to the project root.
  pub fn srcs(&self) -> &BTreeSet<String> {
    &self.srcs
  }

  /// Jars of every transitive library dependency, nearest first.
  pub fn classpath(&self) -> &[PathBuf] {
    &self.classpath
  }

  /// This library's jar followed by its classpath.
  pub fn transitive_classpath(&self) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = self.output_path().into_iter().collect();
    for entry in &self.classpath {
      if !entries.contains(entry) {
        entries.push(entry.clone());
      }
    }
    entries
  }

  fn gen_dir(&self, suffix: &str) -> PathBuf {
    PathBuf::from(format!(
      "{}/{}lib__{}__{}",
      GEN_DIR,
      self.target.base_path_with_slash(),
      self.target.short_name(),
      suffix
    ))
  }

  fn classes_dir(&self) -> PathBuf {
    self.gen_dir("classes")
  }

  fn output(&self) -> Option<&Path> {
    self
      .output
      .get_or_init(|| {
        if self.srcs.is_empty() {
          None
        } else {
          Some(self.gen_dir("output").join(format!("{}.jar", self.target.short_name())))
        }
      })
      .as_deref()
  }
}

impl Buildable for JavaLibrary {
  fn inputs(&self) -> Vec<PathBuf> {
    self.srcs.iter().chain(&self.resources).map(PathBuf::from).collect()
  }

  fn constant_attributes(&self) -> BTreeMap<String, String> {
    let classpath: Vec<String> = self.classpath.iter().map(|p| p.display().to_string()).collect();
    BTreeMap::from([
      ("classpath".to_string(), classpath.join(":")),
      ("javac".to_string(), self.javac.clone()),
      ("source".to_string(), self.source_level.clone()),
      ("target".to_string(), self.target_level.clone()),
    ])
  }

  fn steps(&self) -> Vec<Step> {
    let Some(output) = self.output() else {
      return Vec::new();
    };
    let classes = self.classes_dir();
    let mut steps = vec![Step::MakeCleanDir { path: classes.clone() }];

    let mut javac = vec![
      self.javac.clone(),
      "-source".to_string(),
      self.source_level.clone(),
      "-target".to_string(),
      self.target_level.clone(),
      "-g".to_string(),
      "-d".to_string(),
      classes.display().to_string(),
    ];
    if !self.classpath.is_empty() {
      javac.push("-classpath".to_string());
      javac.push(join_classpath(&self.classpath));
    }
    javac.extend(self.srcs.iter().cloned());
    steps.push(Step::Exec(ExecStep::new(javac)));

    let package = self.target.base_path_with_slash();
    for resource in &self.resources {
      let relative = resource.strip_prefix(&package).unwrap_or(resource);
      let dest = classes.join(relative);
      if let Some(parent) = dest.parent() {
        steps.push(Step::Mkdir {
          path: parent.to_path_buf(),
        });
      }
      steps.push(Step::Copy {
        from: PathBuf::from(resource),
        to: dest,
      });
    }

    if let Some(parent) = output.parent() {
      steps.push(Step::Mkdir {
        path: parent.to_path_buf(),
      });
    }
    steps.push(Step::Exec(ExecStep::new(vec![
      self.jar.clone(),
      "cf".to_string(),
      output.display().to_string(),
      "-C".to_string(),
      classes.display().to_string(),
      ".".to_string(),
    ])));
    steps
  }

  fn output_path(&self) -> Option<PathBuf> {
    self.output().map(Path::to_path_buf)
  }

  fn as_java_library(&self) -> Option<&JavaLibrary> {
    Some(self)
  }
}

fn join_classpath(entries: &[PathBuf]) -> String {
  entries
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(":")
}

/// Which runner flavour a test uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFlavor {
  JUnit,
  Robolectric,
}

/// A library plus the command that runs its tests.
#[derive(Debug)]
pub struct JavaTest {
  library: JavaLibrary,
  vm_args: Vec<String>,
  contacts: BTreeSet<String>,
  source_under_test: Vec<BuildTarget>,
  coverage_sources: BTreeSet<String>,
  flavor: TestFlavor,
  java: String,
  test_runner: String,
}

impl JavaTest {
  pub fn library(&self) -> &JavaLibrary {
    &self.library
  }

  pub fn vm_args(&self) -> &[String] {
    &self.vm_args
  }

  pub fn contacts(&self) -> &BTreeSet<String> {
    &self.contacts
  }

  pub fn source_under_test(&self) -> &[BuildTarget] {
    &self.source_under_test
  }

  pub fn flavor(&self) -> TestFlavor {
    self.flavor
  }
}

impl Buildable for JavaTest {
  fn inputs(&self) -> Vec<PathBuf> {
    self.library.inputs()
  }

  fn constant_attributes(&self) -> BTreeMap<String, String> {
    let mut attrs = self.library.constant_attributes();
    attrs.insert("vm_args".to_string(), self.vm_args.join(" "));
    attrs.insert("test_runner".to_string(), self.test_runner.clone());
    attrs
  }

  fn steps(&self) -> Vec<Step> {
    self.library.steps()
  }

  fn output_path(&self) -> Option<PathBuf> {
    self.library.output_path()
  }

  fn as_test(&self) -> Option<&dyn TestBuildable> {
    Some(self)
  }

  fn as_java_library(&self) -> Option<&JavaLibrary> {
    Some(&self.library)
  }
}

impl TestBuildable for JavaTest {
  fn test_output_dir(&self) -> PathBuf {
    let target = self.library.target();
    PathBuf::from(format!(
      "{}/{}__java_test_{}_output__",
      GEN_DIR,
      target.base_path_with_slash(),
      target.short_name()
    ))
  }

  fn test_steps(&self) -> Vec<Step> {
    let output_dir = self.test_output_dir();
    let mut steps = vec![Step::MakeCleanDir {
      path: output_dir.clone(),
    }];
    let Some(jar) = self.library.output_path() else {
      return steps;
    };

    let mut argv = vec![self.java.clone()];
    argv.extend(self.vm_args.iter().cloned());
    argv.push("-classpath".to_string());
    argv.push(join_classpath(&self.library.transitive_classpath()));
    argv.push(self.test_runner.clone());
    argv.push(output_dir.display().to_string());
    argv.push(jar.display().to_string());
    steps.push(Step::Exec(ExecStep::new(argv)));
    steps
  }

  fn coverage_sources(&self) -> BTreeSet<String> {
    if self.source_under_test.is_empty() {
      self.library.srcs.clone()
    } else {
      self.coverage_sources.clone()
    }
  }
}

pub struct JavaLibraryRuleFactory {
  options: JavaOptions,
}

impl JavaLibraryRuleFactory {
  pub fn new(options: JavaOptions) -> Self {
    Self { options }
  }

  pub fn create_library(&self, params: &RuleParams, attrs: &AttrReader<'_>) -> Result<JavaLibrary, BuildError> {
    let mut classpath = Vec::new();
    for dep in &params.deps {
      if let Some(lib) = dep.buildable().as_java_library() {
        for entry in lib.transitive_classpath() {
          if !classpath.contains(&entry) {
            classpath.push(entry);
          }
        }
      }
    }

    Ok(JavaLibrary {
      target: params.target.clone(),
      srcs: attrs.source_paths("srcs")?,
      resources: attrs.source_paths("resources")?,
      classpath,
      source_level: attrs
        .optional_string("source")?
        .unwrap_or_else(|| self.options.source_level.clone()),
      target_level: attrs
        .optional_string("target")?
        .unwrap_or_else(|| self.options.target_level.clone()),
      javac: self.options.javac.clone(),
      jar: self.options.jar.clone(),
      output: OnceLock::new(),
    })
  }
}

impl RuleFactory for JavaLibraryRuleFactory {
  fn rule_type(&self) -> BuildRuleType {
    BuildRuleType::JAVA_LIBRARY
  }

  fn attributes(&self) -> Vec<&'static str> {
    vec!["srcs", "resources", "source", "target"]
  }

  fn create_buildable(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    _resolver: &mut dyn BuildRuleResolver,
  ) -> Result<Arc<dyn Buildable>, BuildError> {
    Ok(Arc::new(self.create_library(params, attrs)?))
  }
}

/// Builds the library part through a [`JavaLibraryRuleFactory`], then adds
/// the test fields.
pub struct JavaTestRuleFactory {
  library: JavaLibraryRuleFactory,
  options: JavaOptions,
}

impl JavaTestRuleFactory {
  pub fn new(options: JavaOptions) -> Self {
    Self {
      library: JavaLibraryRuleFactory::new(options.clone()),
      options,
    }
  }

  pub fn create_test(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    resolver: &mut dyn BuildRuleResolver,
    flavor: TestFlavor,
  ) -> Result<JavaTest, BuildError> {
    let library = self.library.create_library(params, attrs)?;

    let source_under_test = attrs.targets("source_under_test")?;
    let mut coverage_sources = BTreeSet::new();
    for target in &source_under_test {
      let rule = resolve_visible(resolver, &params.target, target)?;
      let lib = rule.buildable().as_java_library().ok_or_else(|| BuildError::InvalidAttribute {
        target: params.target.clone(),
        attribute: "source_under_test".to_string(),
        message: format!("{} is not a java library", target),
      })?;
      coverage_sources.extend(lib.srcs().iter().cloned());
    }

    Ok(JavaTest {
      library,
      vm_args: attrs.string_list("vm_args")?,
      contacts: attrs.string_set("contacts")?,
      source_under_test,
      coverage_sources,
      flavor,
      java: self.options.java.clone(),
      test_runner: self.options.test_runner.clone(),
    })
  }

  fn test_attributes(&self) -> Vec<&'static str> {
    let mut attributes = self.library.attributes();
    attributes.extend(["source_under_test", "vm_args", "contacts"]);
    attributes
  }
}

impl RuleFactory for JavaTestRuleFactory {
  fn rule_type(&self) -> BuildRuleType {
    BuildRuleType::JAVA_TEST
  }

  fn attributes(&self) -> Vec<&'static str> {
    self.test_attributes()
  }

  fn create_buildable(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    resolver: &mut dyn BuildRuleResolver,
  ) -> Result<Arc<dyn Buildable>, BuildError> {
    Ok(Arc::new(self.create_test(params, attrs, resolver, TestFlavor::JUnit)?))
  }
}

/// A `java_test` that runs under Robolectric.
pub struct RobolectricTestRuleFactory {
  java_test: JavaTestRuleFactory,
}

impl RobolectricTestRuleFactory {
  pub fn new(options: JavaOptions) -> Self {
    Self {
      java_test: JavaTestRuleFactory::new(options),
    }
  }
}

impl RuleFactory for RobolectricTestRuleFactory {
  fn rule_type(&self) -> BuildRuleType {
    BuildRuleType::ROBOLECTRIC_TEST
  }

  fn attributes(&self) -> Vec<&'static str> {
    self.java_test.test_attributes()
  }

  fn create_buildable(
    &self,
    params: &RuleParams,
    attrs: &AttrReader<'_>,
    resolver: &mut dyn BuildRuleResolver,
  ) -> Result<Arc<dyn Buildable>, BuildError> {
    let mut test = self.java_test.create_test(params, attrs, resolver, TestFlavor::Robolectric)?;
    test.vm_args.insert(0, "-Dbrick.robolectric=true".to_string());
    Ok(Arc::new(test))
  }
}
