// crates/gait-regress/src/junit.rs
// ============================================================================
// Module: JUnit Rendering
// Description: JUnit XML projection of a regression result.
// Purpose: Let CI systems ingest grader outcomes directly.
// Dependencies: gait-core
// ============================================================================

//! ## Overview
//! One `<testsuite>` mirrors one regression run; each grader becomes a
//! `<testcase>` whose failure message joins the grader's reason codes. The
//! output is a fixed, tiny grammar rendered by hand.

// ============================================================================
// SECTION: Imports
// ============================================================================

use gait_core::schema::regress::RegressResult;
use gait_core::schema::regress::RegressStatus;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a regression result as JUnit XML.
#[must_use]
pub fn render_junit(result: &RegressResult) -> String {
    let failures =
        result.graders.iter().filter(|grader| grader.status == RegressStatus::Fail).count();
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<testsuite name=\"gait-regress\" tests=\"{}\" failures=\"{}\">\n",
        result.graders.len(),
        failures
    ));
    for grader in &result.graders {
        if grader.status == RegressStatus::Pass {
            out.push_str(&format!("  <testcase name=\"{}\"/>\n", escape_xml(&grader.name)));
            continue;
        }
        out.push_str(&format!("  <testcase name=\"{}\">\n", escape_xml(&grader.name)));
        out.push_str(&format!(
            "    <failure message=\"{}\"/>\n",
            escape_xml(&grader.reason_codes.join(","))
        ));
        out.push_str("  </testcase>\n");
    }
    out.push_str("</testsuite>\n");
    out
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use gait_core::schema::regress::GraderResult;

    use super::*;

    #[test]
    fn renders_passes_and_failures() {
        let result = RegressResult {
            schema_id: "gait.regress.result".to_string(),
            schema_version: "1.0.0".to_string(),
            created_at: gait_core::frozen_epoch(),
            producer_version: "test".to_string(),
            status: RegressStatus::Fail,
            fixture_count: 1,
            graders: vec![
                GraderResult {
                    name: "run_demo/expected_exit_code".to_string(),
                    status: RegressStatus::Pass,
                    reason_codes: Vec::new(),
                },
                GraderResult {
                    name: "run_demo/diff".to_string(),
                    status: RegressStatus::Fail,
                    reason_codes: vec!["unexpected_diff".to_string()],
                },
            ],
        };

        let xml = render_junit(&result);
        assert!(xml.contains("tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"run_demo/expected_exit_code\"/>"));
        assert!(xml.contains("<failure message=\"unexpected_diff\"/>"));
    }

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_xml(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
