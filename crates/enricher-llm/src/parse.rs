use serde_json::Value;

use enricher_core::clamp_confidence;

/// Structured fields recovered from a backend reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryPayload {
    pub summary_md: String,
    pub highlights: Vec<String>,
    pub action_items: Vec<String>,
    pub confidence: f64,
}

/// Recover a summary from free-form model output.
///
/// Tries, in order: the text with any surrounding code fence removed, then
/// the span from the first `{` to the last `}`. When neither decodes to a
/// JSON object, the trimmed reply becomes `summary_md` as-is. A recovered
/// object with a blank `summary_md` also falls back to the raw reply.
pub fn parse_summary(raw: &str) -> SummaryPayload {
    let trimmed = raw.trim();
    match recover_object(trimmed) {
        Some(mut payload) => {
            if payload.summary_md.trim().is_empty() {
                payload.summary_md = trimmed.to_string();
            }
            payload
        }
        None => SummaryPayload {
            summary_md: trimmed.to_string(),
            ..SummaryPayload::default()
        },
    }
}

fn recover_object(text: &str) -> Option<SummaryPayload> {
    let unfenced = strip_fence(text);
    if let Some(payload) = decode(unfenced) {
        return Some(payload);
    }
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    decode(&unfenced[start..=end])
}

/// Drop a leading ```lang line and everything from the last ``` on.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

fn decode(text: &str) -> Option<SummaryPayload> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;
    Some(SummaryPayload {
        summary_md: obj
            .get("summary_md")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        highlights: string_list(obj.get("highlights")),
        action_items: string_list(obj.get("action_items")),
        confidence: clamp_confidence(number(obj.get("confidence")).unwrap_or(0.0)),
    })
}

/// Models drift on list shapes: accept a bare string and stringify scalars.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::String(_)) => vec![v],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json() {
        let p = parse_summary(
            r###"{"summary_md":"## Summary\nDB down","highlights":["a"],"action_items":["b"],"confidence":0.7}"###,
        );
        assert_eq!(p.summary_md, "## Summary\nDB down");
        assert_eq!(p.highlights, vec!["a"]);
        assert_eq!(p.action_items, vec!["b"]);
        assert_eq!(p.confidence, 0.7);
    }

    #[test]
    fn fenced_json() {
        let raw = "```json\n{\"summary_md\":\"ok\",\"confidence\":0.5}\n```";
        let p = parse_summary(raw);
        assert_eq!(p.summary_md, "ok");
        assert_eq!(p.confidence, 0.5);
    }

    #[test]
    fn json_embedded_in_prose() {
        let raw = "Here you go: {\"summary_md\":\"x\",\"highlights\":[]} hope it helps";
        assert_eq!(parse_summary(raw).summary_md, "x");
    }

    #[test]
    fn wrappings_recover_identical_fields() {
        let json = r#"{"summary_md":"db down","highlights":["h1","h2"],"action_items":["restart"],"confidence":0.3}"#;
        let direct = parse_summary(json);
        let fenced = parse_summary(&format!("```json\n{json}\n```"));
        let prose = parse_summary(&format!("Sure, here it is:\n{json}\nLet me know."));
        assert_eq!(direct, fenced);
        assert_eq!(direct, prose);
        assert_eq!(direct.highlights, vec!["h1", "h2"]);
    }

    #[test]
    fn plain_text_falls_back_to_trimmed_input() {
        let p = parse_summary("  nothing structured here \n");
        assert_eq!(p.summary_md, "nothing structured here");
        assert!(p.highlights.is_empty());
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn broken_braces_fall_back() {
        let raw = "oops {not json} at all";
        assert_eq!(parse_summary(raw).summary_md, raw);
    }

    #[test]
    fn blank_summary_uses_raw_reply() {
        let raw = r#"{"summary_md":"  ","highlights":["h"]}"#;
        let p = parse_summary(raw);
        assert_eq!(p.summary_md, raw);
        assert_eq!(p.highlights, vec!["h"]);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(parse_summary(r#"{"summary_md":"x","confidence":3}"#).confidence, 1.0);
        assert_eq!(parse_summary(r#"{"summary_md":"x","confidence":-2}"#).confidence, 0.0);
        assert_eq!(parse_summary(r#"{"summary_md":"x","confidence":"0.25"}"#).confidence, 0.25);
    }

    #[test]
    fn lenient_lists() {
        let p = parse_summary(r#"{"summary_md":"x","highlights":"only one","action_items":[1,"do it",null,""]}"#);
        assert_eq!(p.highlights, vec!["only one"]);
        assert_eq!(p.action_items, vec!["1", "do it"]);
    }
}
