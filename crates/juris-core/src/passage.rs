//! Statute passages and their extraction from raw vector-store hits.

use std::sync::LazyLock;

use juris_memory::ScoredVectorPoint;
use regex::Regex;
use serde_json::Value;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Sec\.\s+(\d+[a-z]?-\d+[a-z]?(?:-\d+[a-z]?)?)").expect("valid section regex")
});

static STATUTE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://www\.cga\.ct\.gov/current/pub/[^\s)\]]+").expect("valid url regex")
});

const TEXT_KEYS: [&str; 3] = ["text", "page_content", "content"];

/// A chunk of statute text returned by retrieval. Higher `score` means more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub section_id: String,
    pub text: String,
    pub score: f32,
    pub source_url: Option<String>,
}

impl Passage {
    #[must_use]
    pub fn new(section_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            section_id: section_id.into(),
            text: text.into(),
            score,
            source_url: None,
        }
    }

    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Build a passage from a store hit. Returns `None` when the payload carries no text.
    #[must_use]
    pub fn from_scored_point(point: ScoredVectorPoint) -> Option<Self> {
        let Some(text) = TEXT_KEYS
            .iter()
            .find_map(|key| non_empty_str(point.payload.get(*key)))
        else {
            tracing::debug!(id = %point.id, "skipping hit without text payload");
            return None;
        };
        let text = text.to_owned();

        let section_id = non_empty_str(point.payload.get("section_id"))
            .map(str::to_owned)
            .or_else(|| section_from_text(&text))
            .unwrap_or_else(|| point.id.clone());

        let source_url = non_empty_str(point.payload.get("source_url"))
            .map(str::to_owned)
            .or_else(|| source_from_payload(&point))
            .or_else(|| {
                STATUTE_URL_RE
                    .find(&text)
                    .map(|m| m.as_str().to_owned())
            });

        Some(Self {
            section_id,
            text,
            score: point.score,
            source_url,
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn section_from_text(text: &str) -> Option<String> {
    SECTION_RE
        .captures(text)
        .map(|caps| format!("Sec. {}", &caps[1]))
}

/// First `source_*` payload entry holding an http(s) link. Keys are sorted so
/// the choice does not depend on map iteration order.
fn source_from_payload(point: &ScoredVectorPoint) -> Option<String> {
    let mut keys: Vec<&String> = point
        .payload
        .keys()
        .filter(|k| k.starts_with("source_") && k.as_str() != "source_file")
        .collect();
    keys.sort();
    keys.into_iter().find_map(|k| {
        non_empty_str(point.payload.get(k))
            .filter(|v| v.starts_with("http"))
            .map(str::to_owned)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn hit(id: &str, score: f32, payload: serde_json::Value) -> ScoredVectorPoint {
        let payload: HashMap<String, Value> = serde_json::from_value(payload).unwrap();
        ScoredVectorPoint {
            id: id.into(),
            score,
            payload,
        }
    }

    #[test]
    fn explicit_payload_fields_win() {
        let p = Passage::from_scored_point(hit(
            "1",
            0.91,
            serde_json::json!({
                "section_id": "Sec. 46b-36g",
                "text": "Sec. 46b-36a. Definitions. A premarital agreement...",
                "source_url": "https://www.cga.ct.gov/current/pub/chap_815e.htm#sec_46b-36g",
            }),
        ))
        .unwrap();
        assert_eq!(p.section_id, "Sec. 46b-36g");
        assert_eq!(
            p.source_url.as_deref(),
            Some("https://www.cga.ct.gov/current/pub/chap_815e.htm#sec_46b-36g")
        );
        assert!((p.score - 0.91).abs() < f32::EPSILON);
    }

    #[test]
    fn section_parsed_from_text_when_missing() {
        let p = Passage::from_scored_point(hit(
            "abc",
            0.5,
            serde_json::json!({ "page_content": "Sec.  53a-59. Assault in the first degree." }),
        ))
        .unwrap();
        assert_eq!(p.section_id, "Sec. 53a-59");
        assert!(p.source_url.is_none());
    }

    #[test]
    fn point_id_is_last_resort_section() {
        let p = Passage::from_scored_point(hit(
            "42",
            0.1,
            serde_json::json!({ "content": "General provisions without a heading." }),
        ))
        .unwrap();
        assert_eq!(p.section_id, "42");
    }

    #[test]
    fn source_prefixed_payload_key_is_used() {
        let p = Passage::from_scored_point(hit(
            "7",
            0.7,
            serde_json::json!({
                "text": "Sec. 46b-84. Parents' obligation for maintenance of minor child.",
                "source_file": "chap_815j.htm",
                "source_46b-84": "https://www.cga.ct.gov/current/pub/chap_815j.htm#sec_46b-84",
            }),
        ))
        .unwrap();
        assert_eq!(
            p.source_url.as_deref(),
            Some("https://www.cga.ct.gov/current/pub/chap_815j.htm#sec_46b-84")
        );
    }

    #[test]
    fn source_file_is_not_a_link() {
        let p = Passage::from_scored_point(hit(
            "7",
            0.7,
            serde_json::json!({ "text": "Sec. 1-1. Words and phrases.", "source_file": "http://local/x" }),
        ))
        .unwrap();
        assert!(p.source_url.is_none());
    }

    #[test]
    fn url_found_inside_text() {
        let p = Passage::from_scored_point(hit(
            "9",
            0.3,
            serde_json::json!({
                "text": "See https://www.cga.ct.gov/current/pub/chap_952.htm for the full chapter."
            }),
        ))
        .unwrap();
        assert_eq!(
            p.source_url.as_deref(),
            Some("https://www.cga.ct.gov/current/pub/chap_952.htm")
        );
    }

    #[test]
    fn hit_without_text_is_skipped() {
        assert!(
            Passage::from_scored_point(hit("1", 0.9, serde_json::json!({ "section_id": "x", "text": "  " })))
                .is_none()
        );
    }
}
