//! Extraction of structured data from free-form generation output.
//!
//! Two contracts live here:
//! - [`json_object`] is strict: the output must contain a JSON object, possibly
//!   wrapped in code fences or surrounded by prose.
//! - [`markdown_sections`] is lenient: missing sections come back empty.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::NotepressError;

/// Removes markdown code-fence markers (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed.strip_prefix("```") {
                Some(rest) if rest.chars().all(|c| c.is_ascii_alphanumeric()) => "",
                _ => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Finds the JSON object in `raw`.
///
/// Fences are stripped first; if the remainder is not an object on its own,
/// the greedy span from the first `{` to the last `}` is tried.
pub fn json_object(raw: &str) -> Result<Map<String, Value>, NotepressError> {
    let cleaned = strip_code_fences(raw);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(map);
    }

    let span = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => {
            return Err(NotepressError::ContentFormat(format!(
                "no JSON object found in generation output: {}",
                preview(raw)
            )));
        }
    };

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(NotepressError::ContentFormat(
            "generation output is not a JSON object".into(),
        )),
        Err(e) => Err(NotepressError::ContentFormat(format!(
            "invalid JSON in generation output: {e}"
        ))),
    }
}

/// Extracts a JSON object and deserializes it into `T`. Missing required
/// fields surface as [`NotepressError::ContentFormat`].
pub fn parse_object<T: DeserializeOwned>(raw: &str) -> Result<T, NotepressError> {
    let map = json_object(raw)?;
    serde_json::from_value(Value::Object(map))
        .map_err(|e| NotepressError::ContentFormat(format!("incomplete generation output: {e}")))
}

/// The three sections of a generated note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownSections {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Title,
    Body,
    Tags,
    Other,
}

fn classify_heading(label: &str) -> Section {
    let label = label
        .trim()
        .trim_end_matches([':', '：'])
        .trim()
        .to_lowercase();
    match label.as_str() {
        "title" | "标题" => Section::Title,
        "body" | "content" | "text" | "正文" => Section::Body,
        "tags" | "hashtags" | "标签" => Section::Tags,
        _ => Section::Other,
    }
}

/// Splits a markdown response into title, body and tags by heading label.
///
/// Only level-two headings (`## `) delimit sections; deeper headings are
/// ordinary lines of whatever section they sit in. Unknown `## ` labels close
/// the current section and their content is discarded. The title is the
/// first non-empty line of its section; tags are whitespace separated.
pub fn markdown_sections(raw: &str) -> MarkdownSections {
    let mut current = None;
    let mut title = String::new();
    let mut body: Vec<&str> = Vec::new();
    let mut tags = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(label) = trimmed.strip_prefix("## ") {
            current = Some(classify_heading(label));
            continue;
        }

        match current {
            Some(Section::Title) if title.is_empty() && !trimmed.is_empty() => {
                title = trimmed.to_string();
            }
            Some(Section::Body) => body.push(line.trim_end()),
            Some(Section::Tags) => {
                tags.extend(trimmed.split_whitespace().map(str::to_string));
            }
            _ => {}
        }
    }

    MarkdownSections {
        title,
        body: body.join("\n").trim().to_string(),
        tags,
    }
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 120;
    let mut out: String = raw.chars().take(LIMIT).collect();
    if raw.chars().count() > LIMIT {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object_is_parsed() {
        let map = json_object(r#"{"a": 1, "b": [true]}"#).unwrap();
        assert_eq!(Value::Object(map), json!({"a": 1, "b": [true]}));
    }

    #[test]
    fn fenced_object_is_parsed() {
        let raw = "```json\n{\"final_title\": \"Hi\", \"tags\": [\"#x\"]}\n```";
        let map = json_object(raw).unwrap();
        assert_eq!(Value::Object(map), json!({"final_title": "Hi", "tags": ["#x"]}));
    }

    #[test]
    fn object_surrounded_by_prose_is_parsed() {
        let expected = json!({"cover_image": "sunrise", "content_images": ["a", "b"], "n": 2});
        let raw = format!(
            "Sure! Here is the result you asked for:\n```\n{}\n```\nLet me know if you need changes.",
            serde_json::to_string_pretty(&expected).unwrap()
        );
        let map = json_object(&raw).unwrap();
        assert_eq!(Value::Object(map), expected);
    }

    #[test]
    fn nested_objects_use_greedy_span() {
        let raw = r#"result: {"outer": {"inner": 1}, "list": [{"k": "v"}]} done"#;
        let map = json_object(raw).unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"outer": {"inner": 1}, "list": [{"k": "v"}]})
        );
    }

    #[test]
    fn missing_object_is_format_error() {
        let err = json_object("I cannot help with that.").unwrap_err();
        assert!(matches!(err, NotepressError::ContentFormat(_)));
    }

    #[test]
    fn array_is_not_an_object() {
        let err = json_object("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, NotepressError::ContentFormat(_)));
    }

    #[test]
    fn broken_json_is_format_error() {
        let err = json_object(r#"{"final_title": "unterminated}"#).unwrap_err();
        assert!(matches!(err, NotepressError::ContentFormat(_)));
    }

    #[test]
    fn parse_object_reports_missing_fields() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            final_title: String,
        }
        let err = parse_object::<Needs>(r#"{"other": 1}"#).unwrap_err();
        match err {
            NotepressError::ContentFormat(msg) => assert!(msg.contains("final_title")),
            other => panic!("expected ContentFormat, got {other:?}"),
        }
    }

    #[test]
    fn markdown_sections_are_extracted() {
        let raw = "## Title\nFive habits that stuck\n\n## Body\nFirst line.\n\nSecond paragraph.\n\n## Image Suggestions\nbright, airy\n\n## Tags\n#habits #focus\n#morning";
        let sections = markdown_sections(raw);
        assert_eq!(sections.title, "Five habits that stuck");
        assert_eq!(sections.body, "First line.\n\nSecond paragraph.");
        assert_eq!(sections.tags, vec!["#habits", "#focus", "#morning"]);
    }

    #[test]
    fn markdown_accepts_chinese_labels() {
        let raw = "## 标题\n效率翻倍\n## 正文\n正文内容\n## 标签\n#效率 #工具";
        let sections = markdown_sections(raw);
        assert_eq!(sections.title, "效率翻倍");
        assert_eq!(sections.body, "正文内容");
        assert_eq!(sections.tags, vec!["#效率", "#工具"]);
    }

    #[test]
    fn missing_sections_are_empty() {
        let sections = markdown_sections("## Body\nonly a body here");
        assert_eq!(sections.title, "");
        assert_eq!(sections.body, "only a body here");
        assert!(sections.tags.is_empty());

        assert_eq!(markdown_sections("no headings at all"), MarkdownSections::default());
    }

    #[test]
    fn subheadings_stay_in_the_body() {
        let raw = "## Title\nT\n\n## Body\nIntro line.\n\n### Tip 1\nDrink water.\n\n### Tip 2\nSleep early.\n\n## Image Suggestions\nx\n\n## Tags\n#a";
        let sections = markdown_sections(raw);
        assert_eq!(
            sections.body,
            "Intro line.\n\n### Tip 1\nDrink water.\n\n### Tip 2\nSleep early."
        );
        assert_eq!(sections.tags, vec!["#a"]);
    }

    #[test]
    fn hashtag_lines_are_not_headings() {
        let raw = "## Tags\n#one #two";
        assert_eq!(markdown_sections(raw).tags, vec!["#one", "#two"]);
    }

    #[test]
    fn strip_code_fences_keeps_inner_text() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("plain"), "plain");
    }
}
