//! XML test report.
//!
//! ```text
//! <tests>
//!   <test name="CaseName">
//!     <testresult name="testName" time="millis">
//!       <message></message>
//!       <stacktrace></stacktrace>
//!     </testresult>
//!   </test>
//! </tests>
//! ```
//!
//! `<message>` and `<stacktrace>` are always present and empty when the
//! result carries none.

use std::io::{self, Write};
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use super::summary::{TestCaseSummary, TestResultSummary, TestResults};

#[derive(Debug, Error)]
pub enum ReportError {
  #[error("failed to write XML report: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("failed to write XML report {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },
}

impl From<io::Error> for ReportError {
  fn from(source: io::Error) -> Self {
    ReportError::Io {
      path: String::new(),
      source,
    }
  }
}

/// Write the report for `results` to `out`.
pub fn write_xml_output<W: Write>(results: &[TestResults], out: W) -> Result<(), ReportError> {
  let mut writer = Writer::new(out);
  writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
  writer.write_event(Event::Start(BytesStart::new("tests")))?;
  for case in results.iter().flat_map(TestResults::cases) {
    write_case(&mut writer, case)?;
  }
  writer.write_event(Event::End(BytesEnd::new("tests")))?;
  Ok(())
}

/// Write the report to `path`, creating parent directories.
pub fn write_xml_report(results: &[TestResults], path: &Path) -> Result<(), ReportError> {
  let io_err = |source| ReportError::Io {
    path: path.display().to_string(),
    source,
  };
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(io_err)?;
  }
  let mut buffer = Vec::new();
  write_xml_output(results, &mut buffer)?;
  std::fs::write(path, buffer).map_err(io_err)
}

fn write_case<W: Write>(writer: &mut Writer<W>, case: &TestCaseSummary) -> Result<(), ReportError> {
  writer.write_event(Event::Start(
    BytesStart::new("test").with_attributes([("name", case.case_name.as_str())]),
  ))?;
  for result in &case.results {
    write_result(writer, result)?;
  }
  writer.write_event(Event::End(BytesEnd::new("test")))?;
  Ok(())
}

fn write_result<W: Write>(writer: &mut Writer<W>, result: &TestResultSummary) -> Result<(), ReportError> {
  let time = result.time_ms.to_string();
  writer.write_event(Event::Start(
    BytesStart::new("testresult").with_attributes([("name", result.test_name.as_str()), ("time", time.as_str())]),
  ))?;
  write_text_element(writer, "message", result.message.as_deref())?;
  write_text_element(writer, "stacktrace", result.stacktrace.as_deref())?;
  writer.write_event(Event::End(BytesEnd::new("testresult")))?;
  Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: Option<&str>) -> Result<(), ReportError> {
  writer.write_event(Event::Start(BytesStart::new(name)))?;
  if let Some(text) = text.filter(|t| !t.is_empty()) {
    writer.write_event(Event::Text(BytesText::new(text)))?;
  }
  writer.write_event(Event::End(BytesEnd::new(name)))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::BuildTarget;

  fn render(results: &[TestResults]) -> String {
    let mut out = Vec::new();
    write_xml_output(results, &mut out).unwrap();
    String::from_utf8(out).unwrap()
  }

  fn results(cases: Vec<TestCaseSummary>) -> TestResults {
    TestResults::new(BuildTarget::parse("//t:t", None).unwrap(), cases)
  }

  #[test]
  fn one_case_with_mixed_results() {
    let case = TestCaseSummary::new(
      "TestCase",
      vec![
        TestResultSummary::passed("TestCase", "passTest", 5000),
        TestResultSummary::failed(
          "TestCase",
          "failWithMsg",
          7000,
          Some("Index out of bounds!"),
          Some("Stacktrace"),
        ),
        TestResultSummary::failed("TestCase", "failNoMsg", 4000, None, None),
      ],
    );

    let xml = render(&[results(vec![case])]);

    assert_eq!(
      xml,
      concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "<tests>",
        r#"<test name="TestCase">"#,
        r#"<testresult name="passTest" time="5000"><message></message><stacktrace></stacktrace></testresult>"#,
        r#"<testresult name="failWithMsg" time="7000"><message>Index out of bounds!</message><stacktrace>Stacktrace</stacktrace></testresult>"#,
        r#"<testresult name="failNoMsg" time="4000"><message></message><stacktrace></stacktrace></testresult>"#,
        "</test>",
        "</tests>",
      )
    );
  }

  #[test]
  fn one_test_element_per_case_across_rules() {
    let a = TestCaseSummary::new("A", vec![TestResultSummary::passed("A", "a", 1)]);
    let b = TestCaseSummary::new("B", vec![]);
    let c = TestCaseSummary::new("C", vec![TestResultSummary::passed("C", "c", 3)]);

    let xml = render(&[results(vec![a, b]), results(vec![c])]);

    assert_eq!(xml.matches("<tests>").count(), 1);
    assert_eq!(xml.matches("<test name=").count(), 3);
    assert!(xml.contains(r#"<test name="B"></test>"#));
  }

  #[test]
  fn text_and_attributes_are_escaped() {
    let case = TestCaseSummary::new(
      "Case<T>",
      vec![TestResultSummary::failed("Case<T>", "t", 0, Some("a < b & c"), None)],
    );

    let xml = render(&[results(vec![case])]);

    assert!(xml.contains(r#"<test name="Case&lt;T&gt;">"#), "{xml}");
    assert!(xml.contains("<message>a &lt; b &amp; c</message>"), "{xml}");
  }

  #[test]
  fn empty_report_is_just_the_root() {
    assert_eq!(render(&[]), r#"<?xml version="1.0" encoding="UTF-8"?><tests></tests>"#);
  }

  #[test]
  fn report_file_parent_is_created() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("reports/nested/tests.xml");
    write_xml_report(&[], &path).unwrap();
    assert!(std::fs::read_to_string(path).unwrap().ends_with("<tests></tests>"));
  }
}
