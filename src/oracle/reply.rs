//! Tolerant parsing of oracle replies.
//!
//! Replies arrive wrapped in code fences, preceded by prose, with trailing commas, with
//! field names in several spellings and with confidences as fractions, percentages or
//! words. Whatever can be extracted is used; anything else is a
//! [`OracleError::MalformedReply`].

use crate::boundary::{clamp_confidence, BoundaryCandidate};
use crate::error::OracleError;
use crate::patterns::{ContentType, DetectedPatterns, DetectionSource};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static RE_CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```").unwrap());

static RE_TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

static RE_LINE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)lines?\s*(\d{1,7})\s*(?:-|–|to|through|until)\s*(?:line\s*)?(\d{1,7})").unwrap()
});

static RE_CONFIDENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)confidence\D{0,12}(\d{1,3}(?:\.\d+)?)\s*(%)?").unwrap());

static RE_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:not\s+(?:present|found)|no\s+such|none\s+found|does\s+not\s+(?:contain|have))\b|"found"\s*:\s*false"#)
        .unwrap()
});

static RE_REFLOW_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:here\s+is|here's|sure[,!.]?|certainly[,!.]?)[^\n]*:\s*\n").unwrap()
});

/// Confidence assumed when a reply reports a boundary but no confidence.
const DEFAULT_CONFIDENCE: f64 = 0.5;

const START_KEYS: &[&str] = &["start_line", "start", "startLine", "start_index", "from"];
const END_KEYS: &[&str] = &["end_line", "end", "endLine", "end_index", "to"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "score", "certainty"];
const RATIONALE_KEYS: &[&str] = &["rationale", "reason", "reasoning", "explanation"];

/// Strips code fences and surrounding prose and parses the first JSON object.
pub fn extract_json(reply: &str) -> Option<Value> {
    let body = RE_CODE_FENCE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str());

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &body[start..=end];

    serde_json::from_str(candidate).ok().or_else(|| {
        let repaired = RE_TRAILING_COMMA.replace_all(candidate, "$1");
        serde_json::from_str(&repaired).ok()
    })
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .filter(|value| !value.is_null())
}

fn as_line(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a confidence given as a fraction, a percentage or a word.
pub fn parse_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            match s.as_str() {
                "very high" => return Some(0.95),
                "high" => return Some(0.85),
                "medium" | "moderate" => return Some(0.6),
                "low" => return Some(0.3),
                "very low" => return Some(0.1),
                _ => {}
            }
            if let Some(percent) = s.strip_suffix('%') {
                return percent.trim().parse::<f64>().ok().map(|p| clamp_confidence(p / 100.0));
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    // 1 < x <= 100 is a percentage
    let fraction = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    Some(clamp_confidence(fraction))
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "present" => Some(true),
            "false" | "no" | "absent" | "none" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn as_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("pattern")
                    .or_else(|| obj.get("regex"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Parses a boundary reply. `Ok(None)` means the oracle reported no such section.
pub fn parse_boundary(reply: &str) -> Result<Option<BoundaryCandidate>, OracleError> {
    if let Some(Value::Object(object)) = extract_json(reply) {
        // Some replies nest the answer under "boundary" or "result"
        let object = ["boundary", "result", "section"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_object))
            .unwrap_or(&object);

        if field(object, &["found", "present", "exists"])
            .and_then(as_bool)
            .is_some_and(|found| !found)
        {
            return Ok(None);
        }

        let start = field(object, START_KEYS).and_then(as_line);
        let end = field(object, END_KEYS).and_then(as_line);
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            (None, None) => return Ok(None),
            _ => {
                return Err(OracleError::MalformedReply(
                    "boundary reply has only one of start and end".into(),
                ))
            }
        };

        let confidence = field(object, CONFIDENCE_KEYS)
            .and_then(parse_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let mut candidate = BoundaryCandidate::new(start, end, confidence);
        if let Some(rationale) = field(object, RATIONALE_KEYS).and_then(Value::as_str) {
            candidate = candidate.with_rationale(rationale);
        }
        return Ok(Some(candidate));
    }

    // Plain-text reply
    if let Some(caps) = RE_LINE_RANGE.captures(reply) {
        let start = caps[1].parse::<usize>();
        let end = caps[2].parse::<usize>();
        if let (Ok(start), Ok(end)) = (start, end) {
            let confidence = RE_CONFIDENCE
                .captures(reply)
                .and_then(|c| {
                    let number = c[1].parse::<f64>().ok()?;
                    Some(if c.get(2).is_some() { number / 100.0 } else { number })
                })
                .map(|n| parse_confidence(&Value::from(n)).unwrap_or(DEFAULT_CONFIDENCE))
                .unwrap_or(DEFAULT_CONFIDENCE);
            return Ok(Some(BoundaryCandidate::new(start, end, confidence)));
        }
    }
    if RE_NOT_FOUND.is_match(reply) {
        return Ok(None);
    }

    Err(OracleError::MalformedReply(excerpt(reply)))
}

/// Parses a pattern-analysis reply.
pub fn parse_patterns(reply: &str) -> Result<DetectedPatterns, OracleError> {
    let Some(Value::Object(object)) = extract_json(reply) else {
        return Err(OracleError::MalformedReply(excerpt(reply)));
    };

    let flag = |keys: &[&str]| field(&object, keys).and_then(as_bool).unwrap_or(false);
    let line = |keys: &[&str]| field(&object, keys).and_then(as_line);
    let list = |keys: &[&str]| as_string_list(field(&object, keys));

    Ok(DetectedPatterns {
        content_type: field(&object, &["content_type", "contentType", "type"])
            .and_then(Value::as_str)
            .map(ContentType::from_label)
            .unwrap_or_default(),
        has_front_matter: flag(&["has_front_matter", "hasFrontMatter", "front_matter"]),
        front_matter_end: line(&["front_matter_end", "frontMatterEnd"]),
        has_table_of_contents: flag(&["has_table_of_contents", "has_toc", "hasToc", "hasTableOfContents"]),
        toc_start: line(&["toc_start", "tocStart"]),
        toc_end: line(&["toc_end", "tocEnd"]),
        has_index: flag(&["has_index", "hasIndex"]),
        index_start: line(&["index_start", "indexStart"]),
        has_back_matter: flag(&["has_back_matter", "hasBackMatter", "back_matter"]),
        back_matter_start: line(&["back_matter_start", "backMatterStart"]),
        header_patterns: list(&["header_patterns", "headerPatterns", "headers"]),
        footer_patterns: list(&["footer_patterns", "footerPatterns", "footers"]),
        page_number_patterns: list(&["page_number_patterns", "pageNumberPatterns", "page_numbers"]),
        citation_patterns: list(&["citation_patterns", "citationPatterns", "citations"]),
        footnote_patterns: list(&["footnote_patterns", "footnotePatterns", "footnotes"]),
        chapter_patterns: list(&["chapter_patterns", "chapterPatterns", "chapters"]),
        confidence: field(&object, CONFIDENCE_KEYS)
            .and_then(parse_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE),
        source: DetectionSource::Oracle,
    })
}

/// Extracts reflowed text: strips a code fence and a one-line preamble.
pub fn parse_reflow(reply: &str) -> Result<String, OracleError> {
    let body = RE_CODE_FENCE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str());
    let body = RE_REFLOW_PREAMBLE.replace(body, "");
    let body = body.trim_matches('\n');

    if body.trim().is_empty() {
        return Err(OracleError::MalformedReply("empty reflow reply".into()));
    }
    Ok(body.to_string())
}

fn excerpt(reply: &str) -> String {
    let mut excerpt: String = reply.chars().take(120).collect();
    if reply.chars().count() > 120 {
        excerpt.push('…');
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let candidate = parse_boundary(r#"{"start_line": 300, "end_line": 400, "confidence": 0.8}"#)
            .unwrap()
            .unwrap();
        assert_eq!((candidate.start_line, candidate.end_line), (300, 400));
        assert_eq!(candidate.confidence, 0.8);
    }

    #[test]
    fn test_fenced_json_with_prose_and_trailing_comma() {
        let reply = "Sure! Here is the boundary:\n```json\n{\n  \"start\": \"12\",\n  \"end\": 40,\n  \"confidence\": \"85%\",\n  \"reason\": \"contents heading\",\n}\n```\nLet me know.";
        let candidate = parse_boundary(reply).unwrap().unwrap();
        assert_eq!((candidate.start_line, candidate.end_line), (12, 40));
        assert!((candidate.confidence - 0.85).abs() < 1e-9);
        assert_eq!(candidate.rationale.as_deref(), Some("contents heading"));
    }

    #[test]
    fn test_camel_case_and_percent_number() {
        let candidate = parse_boundary(r#"{"startLine": 5, "endLine": 9, "confidence": 90}"#)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.start_line, 5);
        assert!((candidate.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_not_found() {
        assert_eq!(parse_boundary(r#"{"found": false}"#).unwrap(), None);
        assert_eq!(
            parse_boundary(r#"{"found": false, "start_line": null}"#).unwrap(),
            None
        );
        assert_eq!(
            parse_boundary("The document does not contain an index.").unwrap(),
            None
        );
    }

    #[test]
    fn test_plain_text_fallback() {
        let candidate = parse_boundary("Back matter spans lines 410 to 498 (confidence 80%).")
            .unwrap()
            .unwrap();
        assert_eq!((candidate.start_line, candidate.end_line), (410, 498));
        assert!((candidate.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(
            parse_boundary("I cannot help with that."),
            Err(OracleError::MalformedReply(_))
        ));
        assert!(matches!(
            parse_boundary(r#"{"start_line": 4}"#),
            Err(OracleError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_confidence_words() {
        assert_eq!(parse_confidence(&Value::from("high")), Some(0.85));
        assert_eq!(parse_confidence(&Value::from("0.4")), Some(0.4));
        assert_eq!(parse_confidence(&Value::from(250.0)), Some(1.0));
        assert_eq!(parse_confidence(&Value::Null), None);
    }

    #[test]
    fn test_patterns_reply() {
        let reply = r#"```json
{
  "content_type": "Academic Paper",
  "has_front_matter": "yes",
  "has_index": false,
  "header_patterns": ["^JOURNAL OF THINGS \\d+$"],
  "citation_patterns": "\\[\\d+\\]",
  "footnote_patterns": [],
  "confidence": 0.9,
}
```"#;
        let patterns = parse_patterns(reply).unwrap();
        assert_eq!(patterns.content_type, ContentType::AcademicPaper);
        assert!(patterns.has_front_matter);
        assert!(!patterns.has_index);
        assert_eq!(patterns.header_patterns, vec![r"^JOURNAL OF THINGS \d+$"]);
        assert_eq!(patterns.citation_patterns, vec![r"\[\d+\]"]);
        assert!(patterns.footnote_patterns.is_empty());
        assert_eq!(patterns.source, DetectionSource::Oracle);
    }

    #[test]
    fn test_reflow_reply() {
        let reply = "Here is the reflowed text:\n```\nOne joined sentence.\n\nNext paragraph.\n```";
        assert_eq!(
            parse_reflow(reply).unwrap(),
            "One joined sentence.\n\nNext paragraph."
        );
        assert!(parse_reflow("   \n").is_err());
    }
}
