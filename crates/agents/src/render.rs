//! Markdown rendering of a [`Report`]. Pure; the same report always renders
//! to the same text.

use crate::report::{Content, Report, FINDING_HEADING};

/// Shown for a field with no content.
pub const NOT_PROVIDED: &str = "Not provided.";
/// Shown for an empty recommendation list.
pub const NO_RECOMMENDATIONS: &str = "No specific recommendations.";

pub fn render_markdown(report: &Report) -> String {
    let mut md: Vec<String> = Vec::new();

    md.push(format!("# {}", report.title));
    md.push(format!("\n**Source:** `{}`", report.source_identifier));

    if let Some(ref error) = report.error {
        md.push("\n## Error".to_string());
        md.push(format!("\n{}", fenced(error)));
    }

    md.push("\n## 1. Coordinator Analysis and Decomposition".to_string());
    md.push(format!("\n{}", text_block(&report.coordinator_analysis)));

    md.push("\n## 2. Combined Worker Findings".to_string());
    // The aggregate carries its own headings and reads better unfenced.
    if report.findings_summary.contains(&format!("\n{FINDING_HEADING}")) {
        md.push(format!("\n{}", report.findings_summary));
    } else {
        md.push(format!("\n{}", text_block(&report.findings_summary)));
    }

    md.push("\n## 3. Validation Feedback".to_string());
    md.push(format!("\n{}", text_block(&report.validation_feedback)));

    md.push("\n## 4. Conclusion".to_string());
    md.push(format!("\n{}", render_content(&report.conclusion, NOT_PROVIDED)));

    md.push("\n## 5. Recommendations".to_string());
    md.push(format!("\n{}", render_recommendations(&report.recommendations)));

    md.join("\n")
}

/// Rules, applied per field:
/// - list: one `- ` line per item, `empty_list` marker when empty
/// - blank text: [`NOT_PROVIDED`]
/// - multi-line text: fenced block
/// - single-line text: inline
pub fn render_content(content: &Content, empty_list: &str) -> String {
    match content {
        Content::List(items) if items.is_empty() => empty_list.to_string(),
        Content::List(items) => items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        Content::Text(text) if text.trim().is_empty() => NOT_PROVIDED.to_string(),
        Content::Text(text) if text.contains('\n') => fenced(text),
        Content::Text(text) => text.clone(),
    }
}

/// Like [`render_content`], except that recommendation text the model already
/// wrote as a markdown list is kept verbatim.
pub fn render_recommendations(content: &Content) -> String {
    match content {
        Content::Text(text) if !text.trim().is_empty() && is_markdown_list(text) => text.clone(),
        other => render_content(other, NO_RECOMMENDATIONS),
    }
}

fn is_markdown_list(text: &str) -> bool {
    text.trim_start().starts_with('-') || text.contains("\n-") || text.contains("\n*")
}

fn text_block(text: &str) -> String {
    if text.trim().is_empty() {
        NOT_PROVIDED.to_string()
    } else {
        fenced(text)
    }
}

fn fenced(text: &str) -> String {
    format!("```text\n{text}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{aggregate_findings, PLACEHOLDER_CONCLUSION};
    use vigil_common::Finding;

    fn recommendations_section(report: &Report) -> String {
        let md = render_markdown(report);
        let start = md.find("## 5. Recommendations").unwrap();
        md[start..].to_string()
    }

    fn conclusion_section(report: &Report) -> String {
        let md = render_markdown(report);
        let start = md.find("## 4. Conclusion").unwrap();
        let end = md.find("## 5. Recommendations").unwrap();
        md[start..end].to_string()
    }

    fn report_with(recommendations: Content) -> Report {
        let mut report = Report::draft("calc.py", "analysis", "findings", "feedback");
        report.recommendations = recommendations;
        report
    }

    #[test]
    fn test_empty_list_renders_marker() {
        let section = recommendations_section(&report_with(Content::List(vec![])));
        assert!(section.contains(NO_RECOMMENDATIONS));
        assert!(!section.contains("- "));
    }

    #[test]
    fn test_three_items_render_three_bullets() {
        let section = recommendations_section(&report_with(Content::List(vec![
            "Check b before dividing".into(),
            "Add a unit test".into(),
            "Return an error type".into(),
        ])));
        let bullets = section.lines().filter(|l| l.starts_with("- ")).count();
        assert_eq!(bullets, 3);
    }

    #[test]
    fn test_multi_line_text_renders_one_fence() {
        let section = recommendations_section(&report_with(Content::text(
            "Guard the divisor.\nLog rejected input.",
        )));
        assert_eq!(section.matches("```text").count(), 1);
        assert!(section.contains("```text\nGuard the divisor.\nLog rejected input.\n```"));
    }

    #[test]
    fn test_single_line_text_inline() {
        let section = recommendations_section(&report_with(Content::text("Guard the divisor.")));
        assert!(section.ends_with("\nGuard the divisor."));
        assert!(!section.contains("```"));
    }

    #[test]
    fn test_existing_bullet_text_verbatim() {
        let text = "- one\n- two";
        let section = recommendations_section(&report_with(Content::text(text)));
        assert!(section.ends_with(&format!("\n{text}")));
        assert!(!section.contains("```"));
    }

    #[test]
    fn test_bullet_shaped_conclusion_is_fenced() {
        let mut report = report_with(Content::List(vec![]));
        report.conclusion = Content::text(
            "Raw model output (could not parse JSON): Summary:\n- division by zero on line 4\n- no input validation",
        );

        let section = conclusion_section(&report);
        assert_eq!(section.matches("```text").count(), 1);
        assert!(section.contains("```text\nRaw model output"));
        assert!(section.contains("- no input validation\n```"));
    }

    #[test]
    fn test_bullet_passthrough_only_for_recommendations() {
        let bullets = Content::text("- one\n- two");
        assert_eq!(render_recommendations(&bullets), "- one\n- two");
        assert_eq!(render_content(&bullets, NO_RECOMMENDATIONS), "```text\n- one\n- two\n```");
    }

    #[test]
    fn test_blank_fields_marked_not_provided() {
        let report = Report::draft("x", "", "", "");
        let md = render_markdown(&report);
        assert_eq!(md.matches(NOT_PROVIDED).count(), 3);
        assert!(md.contains(PLACEHOLDER_CONCLUSION));
    }

    #[test]
    fn test_aggregate_rendered_unfenced() {
        let aggregate = aggregate_findings(&[Finding::new("div by zero")]);
        let report = Report::draft("x", "a", aggregate.clone(), "f");
        let md = render_markdown(&report);
        assert!(md.contains(&aggregate));
        assert!(!md.contains(&format!("```text\n{aggregate}")));
    }

    #[test]
    fn test_error_section_first() {
        let md = render_markdown(&Report::failed("x", "run cancelled"));
        let error_at = md.find("## Error").unwrap();
        assert!(error_at < md.find("## 1.").unwrap());
        assert!(md.contains("```text\nrun cancelled\n```"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let report = report_with(Content::List(vec!["a".into()]));
        assert_eq!(render_markdown(&report), render_markdown(&report));
    }
}
