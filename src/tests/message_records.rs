use std::path::PathBuf;

use crate::types::message::{Message, MessageRecord, Role};

#[test]
fn record_round_trip_keeps_role_content_and_flag() {
    let mut message = Message::assistant("Sure, here it is.");
    message.enabled = false;

    let rebuilt = Message::from_record(message.serialize(), None);

    assert_eq!(rebuilt.role, Role::Assistant);
    assert_eq!(rebuilt.content, "Sure, here it is.");
    assert!(!rebuilt.enabled);
    assert!(rebuilt.attachments.is_empty());
}

#[test]
fn record_json_has_the_persisted_shape() {
    let message = Message::user("hello");
    let value = serde_json::to_value(message.serialize()).unwrap();

    assert_eq!(
        value,
        serde_json::json!({
            "role": "user",
            "content": "hello",
            "enabled": true,
            "file": null,
        })
    );
}

#[test]
fn missing_optional_fields_take_defaults() {
    let record: MessageRecord =
        serde_json::from_str(r#"{"role":"system","content":"be brief"}"#).unwrap();
    let message = Message::from_record(record, None);

    assert_eq!(message.role, Role::System);
    assert!(message.enabled);
    assert!(message.attachments.is_empty());
    assert_eq!(message.backing_file(), None);
}

#[test]
fn loaded_path_overrides_embedded_file() {
    let record: MessageRecord = serde_json::from_str(
        r#"{"role":"user","content":"hi","enabled":true,"file":"/old/place/1_user.json"}"#,
    )
    .unwrap();

    let actual = PathBuf::from("/new/place/1_user.json");
    let message = Message::from_record(record.clone(), Some(actual.clone()));
    assert_eq!(message.backing_file(), Some(actual.as_path()));

    let kept = Message::from_record(record, None);
    assert_eq!(
        kept.backing_file(),
        Some(PathBuf::from("/old/place/1_user.json").as_path())
    );
}

#[test]
fn unknown_role_is_rejected() {
    let parsed = serde_json::from_str::<MessageRecord>(r#"{"role":"robot","content":"x"}"#);
    assert!(parsed.is_err());
}

#[test]
fn attach_and_detach() {
    let mut message = Message::user("see files");
    message.attach("/tmp/a.txt");
    message.attach("/tmp/b.txt");
    message.detach("/tmp/missing.txt");
    assert_eq!(message.attachments.len(), 2);

    message.detach("/tmp/a.txt");
    assert_eq!(message.attachments, vec![PathBuf::from("/tmp/b.txt")]);
}

#[test]
fn attachments_survive_the_record() {
    let mut message = Message::user("see file");
    message.attach("/tmp/a.txt");

    let rebuilt = Message::from_record(message.serialize(), None);
    assert_eq!(rebuilt.attachments, vec![PathBuf::from("/tmp/a.txt")]);
}

#[test]
fn model_form_omits_file_and_enabled() {
    let mut message = Message::user("hello");
    message.attach("/tmp/a.txt");
    let value = serde_json::to_value(message.to_model_request_form()).unwrap();

    assert_eq!(
        value,
        serde_json::json!({
            "role": "user",
            "content": "hello",
            "attachments": ["/tmp/a.txt"],
        })
    );
}

#[test]
fn thinking_accumulator_starts_disabled() {
    let thinking = Message::thinking_accumulator();
    assert_eq!(thinking.role, Role::Assistant);
    assert!(!thinking.enabled);
    assert!(thinking.content.is_empty());
    assert!(Message::content_accumulator().enabled);
}

#[test]
fn preview_flattens_and_truncates() {
    let message = Message::user("line one\nline two");
    assert_eq!(message.preview(40), "line one line two");
    assert_eq!(message.preview(4), "line...");
}
