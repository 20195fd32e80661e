use schemars::JsonSchema;
use serde::Deserialize;
use webpilot_extract::feedback::feedback_for_error;
use webpilot_extract::prelude::*;
use webpilot_extract::schema_for_type;

#[derive(JsonSchema, Deserialize, Debug, PartialEq)]
struct Observation {
    title: String,
    links: Vec<String>,
}

#[test]
fn test_agent_answer_with_outer_tag_and_json_fence() {
    let sc = StructuredContent::new()
        .with_outer_tag("answer")
        .with_inner_tag("json");
    let text = "Thinking...\n<answer>\n```json\n{\"title\": \"Docs\", \"links\": [\"/a\"]}\n```\n</answer>\nbye";

    let content = sc.extract(text).unwrap();
    let observation: Observation = validate_json(&content).unwrap();

    assert_eq!(
        observation,
        Observation {
            title: "Docs".to_string(),
            links: vec!["/a".to_string()],
        }
    );
}

#[test]
fn test_tag_free_output_is_a_fixed_point() {
    let sc = StructuredContent::new()
        .with_inner_tag("json")
        .fail_if_inner_tag(false);
    for text in ["plain words", "{\"a\": 1}", "", "a > b but no opening bracket"] {
        let once = sc.extract(text).unwrap();
        assert_eq!(sc.extract(&once).unwrap(), once);
    }
}

#[test]
fn test_strict_inner_tag_reports_missing_fence() {
    let sc = StructuredContent::new().with_inner_tag("json");
    let err = sc.extract("{\"a\": 1}").unwrap_err();
    assert_eq!(err.kind(), ParsingErrorKind::MissingInnerTag);
}

#[test]
fn test_validation_error_feeds_back_to_model() {
    let err = validate_json::<Observation>("{\"title\": 7}").unwrap_err();
    assert_eq!(err.kind(), ParsingErrorKind::Validation);
    assert_eq!(err.content(), "{\"title\": 7}");

    let feedback = feedback_for_error(&err, &schema_for_type::<Observation>(), 1, 3);
    assert!(feedback.contains("Attempt 1/3"));
    assert!(feedback.contains("links"));
    assert!(feedback.contains("{\"title\": 7}"));
}

#[test]
fn test_invalid_json_feedback_mentions_parse_failure() {
    let err = validate_json::<Observation>("{title: Docs}").unwrap_err();
    assert_eq!(err.kind(), ParsingErrorKind::InvalidJson);

    let feedback = feedback_for_error(&err, &schema_for_type::<Observation>(), 2, 3);
    assert!(feedback.contains("Could not parse"));
}
