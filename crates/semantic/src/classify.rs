//! LLM response parsing for relationship classification (spec §4.7).

use forge_primitives::SemanticRelationType;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RelationshipClassification {
    pub relationship_type: Option<SemanticRelationType>,
    pub confidence: f32,
    pub reasoning: String,
    pub bidirectional: bool,
}

impl RelationshipClassification {
    fn none(reasoning: impl Into<String>) -> Self {
        Self {
            relationship_type: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            bidirectional: false,
        }
    }
}

const CLASSIFICATION_PROMPT_TEMPLATE: &str = r#"Analyze the relationship between two knowledge capsules and classify their semantic connection.

## Source Capsule
Title: {source_title}
Type: {source_type}
Content:
{source_content}

## Target Capsule
Title: {target_title}
Type: {target_type}
Content:
{target_content}

## Task
Determine if there is a meaningful semantic relationship between these capsules.

Possible relationship types:
- SUPPORTS: Source provides evidence or agreement for target's claims
- CONTRADICTS: Source conflicts with or opposes target's content
- ELABORATES: Source provides additional detail, examples, or explanation of target
- REFERENCES: Source explicitly cites or mentions target
- RELATED_TO: Generic semantic association (use only if others don't fit)
- NONE: No meaningful relationship exists

## Response Format
Respond with a JSON object:
{
    "relationship_type": "SUPPORTS" | "CONTRADICTS" | "ELABORATES" | "REFERENCES" | "RELATED_TO" | "NONE",
    "confidence": 0.0-1.0,
    "reasoning": "Brief explanation of why this relationship exists",
    "bidirectional": true/false (whether the relationship goes both ways equally)
}

Only return the JSON object, no other text."#;

pub fn classification_prompt(
    source_title: &str,
    source_type: &str,
    source_content: &str,
    target_title: &str,
    target_type: &str,
    target_content: &str,
) -> String {
    fn truncate(s: &str) -> &str {
        let max = 2000;
        if s.len() <= max {
            return s;
        }
        // `max` may land inside a multi-byte char; back off to the
        // nearest preceding boundary so we never panic on peer content.
        let boundary = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
        &s[..boundary]
    }
    CLASSIFICATION_PROMPT_TEMPLATE
        .replace("{source_title}", source_title)
        .replace("{source_type}", source_type)
        .replace("{source_content}", truncate(source_content))
        .replace("{target_title}", target_title)
        .replace("{target_type}", target_type)
        .replace("{target_content}", truncate(target_content))
}

/// Parse an LLM response defensively: strip a leading/trailing markdown
/// fence (with or without a `json` language tag), then parse the JSON
/// object. Any failure — malformed JSON, `relationship_type` absent or
/// `"NONE"` — yields a `None` classification rather than an error, matching
/// the "skip on parse failure" rule.
pub fn parse_classification(raw: &str) -> RelationshipClassification {
    let text = strip_markdown_fence(raw.trim());

    let data: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return RelationshipClassification::none(format!("parse error: {e}")),
    };

    let rel_type_str = data
        .get("relationship_type")
        .and_then(Value::as_str)
        .unwrap_or("NONE");

    if rel_type_str == "NONE" {
        let reasoning = data
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("No relationship detected")
            .to_string();
        return RelationshipClassification::none(reasoning);
    }

    let relationship_type =
        match serde_json::from_value::<SemanticRelationType>(Value::String(rel_type_str.to_string())) {
            Ok(t) => Some(t),
            Err(_) => return RelationshipClassification::none(format!("unknown relationship_type: {rel_type_str}")),
        };

    RelationshipClassification {
        relationship_type,
        confidence: data.get("confidence").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        reasoning: data
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        bidirectional: data
            .get("bidirectional")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn strip_markdown_fence(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\n', '\r']);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_json_object() {
        let raw = r#"{"relationship_type": "SUPPORTS", "confidence": 0.9, "reasoning": "backs the claim", "bidirectional": false}"#;
        let classification = parse_classification(raw);
        assert_eq!(
            classification.relationship_type,
            Some(SemanticRelationType::Supports)
        );
        assert_eq!(classification.confidence, 0.9);
    }

    #[test]
    fn strips_a_json_fenced_code_block() {
        let raw = "```json\n{\"relationship_type\": \"CONTRADICTS\", \"confidence\": 0.8, \"reasoning\": \"opposes\"}\n```";
        let classification = parse_classification(raw);
        assert_eq!(
            classification.relationship_type,
            Some(SemanticRelationType::Contradicts)
        );
    }

    #[test]
    fn strips_a_bare_fenced_code_block_without_language_tag() {
        let raw = "```\n{\"relationship_type\": \"RELATED_TO\", \"confidence\": 0.75, \"reasoning\": \"r\"}\n```";
        let classification = parse_classification(raw);
        assert_eq!(
            classification.relationship_type,
            Some(SemanticRelationType::RelatedTo)
        );
    }

    #[test]
    fn none_relationship_type_yields_no_classification() {
        let raw = r#"{"relationship_type": "NONE", "reasoning": "unrelated"}"#;
        let classification = parse_classification(raw);
        assert!(classification.relationship_type.is_none());
    }

    #[test]
    fn malformed_json_yields_no_classification_rather_than_an_error() {
        let classification = parse_classification("not json at all");
        assert!(classification.relationship_type.is_none());
        assert!(classification.reasoning.contains("parse error"));
    }

    #[test]
    fn unknown_relationship_type_string_yields_no_classification() {
        let raw = r#"{"relationship_type": "FLIBBERTIGIBBET", "confidence": 0.9}"#;
        let classification = parse_classification(raw);
        assert!(classification.relationship_type.is_none());
    }

    #[test]
    fn prompt_truncation_does_not_panic_when_the_byte_cutoff_lands_mid_character() {
        // 1999 ascii bytes then a 4-byte emoji: the 2000-byte cutoff falls
        // inside the emoji's encoding, which used to panic on a raw slice.
        let content: String = "a".repeat(1999) + "\u{1F600}\u{1F600}";
        let prompt = classification_prompt("t", "note", &content, "t2", "note", "short");
        assert!(prompt.contains("## Target"));
    }
}
