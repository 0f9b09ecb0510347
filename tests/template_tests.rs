use serde_json::{json, Value};
use wsgen::request::{Prompt, RequestEnvelope};
use wsgen::template::{self, RequestTemplate, Substitutions};

#[test]
fn test_format_message_simple()
{   let t = RequestTemplate::Text("User: $INPUT".to_string());
    let out = template::render(&t, "Hello world", None, None).unwrap();
    assert_eq!(out, "User: Hello world");
}

#[test]
fn test_format_message_json_object()
{   let t = RequestTemplate::Structured(json!({
      "message": "$INPUT",
      "conversation_id": "$CONVERSATION_ID",
      "api_key": "$KEY"
    }));
    let out = template::render(
      &t, "Hello", Some("test_conv"), Some("test_key")
    ).unwrap();
    let data: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(data["message"], "Hello");
    assert_eq!(data["conversation_id"], "test_conv");
    assert_eq!(data["api_key"], "test_key");
}

#[test]
fn test_structured_keeps_key_order()
{   let t = RequestTemplate::Structured(json!({
      "z": "$INPUT",
      "a": 1
    }));
    let out = template::render(&t, "hi", None, None).unwrap();
    assert_eq!(out, r#"{"z":"hi","a":1}"#);
}

#[test]
fn test_apply_replacements_nested()
{   let data = json!({
      "message": "$INPUT",
      "metadata": {
        "user": "$KEY",
        "conversation": "$CONVERSATION_ID",
        "retries": 3,
        "stream": false
      },
      "options": ["$INPUT", "static_value", null]
    });
    let subs = Substitutions
    {   input: "Hello"
      , key: "user123"
      , conversation_id: "conv456"
    };
    let result = template::substitute_value(&data, &subs);

    assert_eq!(result["message"], "Hello");
    assert_eq!(result["metadata"]["user"], "user123");
    assert_eq!(result["metadata"]["conversation"], "conv456");
    assert_eq!(result["metadata"]["retries"], 3);
    assert_eq!(result["metadata"]["stream"], false);
    assert_eq!(result["options"][0], "Hello");
    assert_eq!(result["options"][1], "static_value");
    assert_eq!(result["options"][2], Value::Null);
}

#[test]
fn test_missing_values_become_empty()
{   let t = RequestTemplate::Text("[$KEY|$CONVERSATION_ID] $INPUT".to_string());
    let out = template::render(&t, "ping", None, None).unwrap();
    assert_eq!(out, "[|] ping");
}

#[test]
fn test_unknown_placeholders_left_alone()
{   let t = RequestTemplate::Text(
      "cost: $5, $USER says $INPUT$".to_string()
    );
    let out = template::render(&t, "hi", None, None).unwrap();
    assert_eq!(out, "cost: $5, $USER says hi$");
}

#[test]
fn test_inserted_text_is_not_rescanned()
{   let t = RequestTemplate::Text("$INPUT / $KEY".to_string());
    let out = template::render(
      &t, "say $KEY and $INPUT", None, Some("secret")
    ).unwrap();
    assert_eq!(out, "say $KEY and $INPUT / secret");
}

#[test]
fn test_input_token_fully_replaced_and_deterministic()
{   let templates = [
      RequestTemplate::Text("$INPUT$INPUT".to_string())
    , RequestTemplate::Text("a $INPUT b $INPUT c".to_string())
    , RequestTemplate::Structured(json!({"x": ["$INPUT", {"y": "$INPUT!"}]}))
    ];
    for t in &templates
    {   let first = template::render(t, "prompt", Some("c"), Some("k"))
          .unwrap();
        let second = template::render(t, "prompt", Some("c"), Some("k"))
          .unwrap();
        assert!(!first.contains("$INPUT"), "left a token in {}", first);
        assert_eq!(first, second);
    }
}

#[test]
fn test_substitute_key_only()
{   assert_eq!(
      template::substitute_key("Token $KEY for $INPUT", "abc"),
      "Token abc for $INPUT"
    );
}

#[test]
fn test_envelope_prefers_prompt_conversation()
{   let t = RequestTemplate::Text("$CONVERSATION_ID:$INPUT".to_string());

    let env = RequestEnvelope::render(
      &t, &Prompt::new("hi"), Some("default"), None
    ).unwrap();
    assert_eq!(env.payload, "default:hi");
    assert_eq!(env.conversation_id.as_deref(), Some("default"));

    let prompt = Prompt::new("hi").with_conversation_id("thread-7");
    let env = RequestEnvelope::render(&t, &prompt, Some("default"), None)
      .unwrap();
    assert_eq!(env.payload, "thread-7:hi");
}

#[test]
fn test_default_template_sends_prompt_verbatim()
{   let t = RequestTemplate::default();
    let out = template::render(&t, "raw {json} $text", None, None).unwrap();
    assert_eq!(out, "raw {json} $text");
}
