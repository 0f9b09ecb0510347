use std::fs;
use std::time::Duration;

use serde::Deserialize;
use tokio_test::{assert_err, assert_ok};
use wsgen::credentials::{AuthStrategy, TokenSource};
use wsgen::extract::{FieldRule, PathSegment};
use wsgen::template::RequestTemplate;
use wsgen::{AuthType, EndpointSettings, Error, TypingMatch};

/// Fixture layout of tests/endpoints.json
#[derive(Debug, Deserialize)]
struct TestConfig
{   endpoints: Vec<EndpointSettings>
}

fn load_test_config(path: &str)
  -> Result<TestConfig, Box<dyn std::error::Error>>
{   let config_str = fs::read_to_string(path)?;
    let config: TestConfig = serde_json::from_str(&config_str)?;
    Ok(config)
}

fn settings(uri: &str) -> EndpointSettings
{   EndpointSettings
    {   auth_type: AuthType::None
      , ..EndpointSettings::new(uri)
    }
}

#[test]
fn test_defaults_match_documented_surface()
{   let s = EndpointSettings::default();
    assert_eq!(s.uri, None);
    assert_eq!(s.name, "WebSocket LLM");
    assert_eq!(s.auth_type, AuthType::Basic);
    assert_eq!(s.key_env_var, "WEBSOCKET_API_KEY");
    assert!(s.headers.is_empty());
    assert!(!s.response_json);
    assert_eq!(s.response_json_field, None);
    assert!(s.response_after_typing);
    assert_eq!(s.typing_indicator, "typing");
    assert_eq!(s.typing_match, TypingMatch::Contains);
    assert!(s.typing_case_sensitive);
    assert_eq!(s.connection_timeout, 10.0);
    assert_eq!(s.request_timeout, 20.0);
    assert_eq!(s.max_response_length, 10_000);
    assert!(s.verify_ssl);
    assert!(!s.reuse_connection);
}

#[test]
fn test_plain_uri_parts()
{   let config = assert_ok!(settings("ws://localhost:3000").build());
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 3000);
    assert_eq!(config.path, "/");
    assert!(!config.secure);
    assert_eq!(config.connection_timeout, Duration::from_secs(10));
    assert_eq!(config.resolver.request_timeout, Duration::from_secs(20));
    assert_eq!(config.template, RequestTemplate::Text("$INPUT".to_string()));
}

#[test]
fn test_secure_uri_parts()
{   let config = assert_ok!(
      settings("wss://api.example.com/chat").build()
    );
    assert!(config.secure);
    assert_eq!(config.host, "api.example.com");
    assert_eq!(config.port, 443);
    assert_eq!(config.path, "/chat");
    assert!(!config.accepts_invalid_certs());
}

#[test]
fn test_invalid_scheme_rejected()
{   let err = assert_err!(settings("http://localhost:3000").build());
    match err
    {   Error::Config(msg) => assert!(msg.contains("ws:// or wss://"))
      , other => panic!("unexpected error: {:?}", other)
    }
}

#[test]
fn test_missing_uri_rejected()
{   let err = assert_err!(EndpointSettings::default().build());
    assert_eq!(
      err,
      Error::Config("WebSocket uri is required".to_string())
    );
}

#[test]
fn test_bad_timeouts_rejected()
{   let mut s = settings("ws://localhost:3000");
    s.request_timeout = 0.0;
    assert_err!(s.clone().build());
    s.request_timeout = f64::NAN;
    assert_err!(s.clone().build());
    s.request_timeout = 1.5;
    s.connection_timeout = -1.0;
    assert_err!(s.build());
}

#[test]
fn test_custom_auth_requires_headers()
{   let mut s = settings("ws://localhost:3000");
    s.auth_type = AuthType::Custom;
    assert_err!(s.clone().build());

    s.headers.insert("X-Api-Token".to_string(), "$KEY".to_string());
    let config = assert_ok!(s.build());
    assert!(config.headers.is_empty());
    match config.auth
    {   AuthStrategy::Custom(headers) => {
          assert_eq!(headers.get("X-Api-Token").unwrap(), "$KEY")
        }
      , other => panic!("unexpected strategy: {:?}", other)
    }
}

#[test]
fn test_bearer_prefers_literal_key()
{   let mut s = settings("ws://localhost:3000");
    s.auth_type = AuthType::Bearer;
    let config = assert_ok!(s.clone().build());
    assert_eq!(
      config.auth,
      AuthStrategy::Bearer(TokenSource::Env("WEBSOCKET_API_KEY".to_string()))
    );

    s.api_key = Some("literal".to_string());
    let config = assert_ok!(s.build());
    assert_eq!(
      config.auth,
      AuthStrategy::Bearer(TokenSource::Literal("literal".to_string()))
    );
}

#[test]
fn test_json_template_from_string()
{   let mut s = settings("ws://localhost:3000");
    s.req_template_json_object = Some(serde_json::Value::String(
      r#"{"message": "$INPUT"}"#.to_string()
    ));
    let config = assert_ok!(s.clone().build());
    assert_eq!(
      config.template,
      RequestTemplate::Structured(serde_json::json!({"message": "$INPUT"}))
    );

    s.req_template_json_object = Some(serde_json::Value::String(
      "{not json".to_string()
    ));
    assert!(matches!(s.build(), Err(Error::Config(_))));
}

#[test]
fn test_malformed_field_path_rejected()
{   let mut s = settings("ws://localhost:3000");
    s.response_json = true;
    s.response_json_field = Some("$.choices[zero]".to_string());
    assert!(matches!(s.build(), Err(Error::Config(_))));
}

#[test]
fn test_load_endpoints_fixture()
{   let config = load_test_config("tests/endpoints.json")
      .expect("fixture should parse");
    assert_eq!(config.endpoints.len(), 2);

    let bot = config.endpoints[0].clone().build()
      .expect("first endpoint should validate");
    assert_eq!(bot.name, "support-bot");
    assert_eq!(bot.port, 8443);
    assert!(bot.accepts_invalid_certs());
    assert_eq!(bot.resolver.typing.token, "is_typing");
    assert_eq!(bot.resolver.request_timeout, Duration::from_secs(30));
    assert_eq!(
      bot.resolver.field,
      FieldRule::Path(vec![
        PathSegment::Key("choices".to_string())
      , PathSegment::Index(0)
      , PathSegment::Key("message".to_string())
      , PathSegment::Key("content".to_string())
      ])
    );

    let local = config.endpoints[1].clone().build()
      .expect("second endpoint should validate");
    assert_eq!(local.auth, AuthStrategy::None);
    assert!(!local.resolver.response_after_typing);
    assert_eq!(local.name, "WebSocket LLM");
}

#[test]
fn test_settings_from_json_file_missing()
{   let err = assert_err!(
      EndpointSettings::from_json_file("tests/does-not-exist.json")
    );
    assert!(matches!(err, Error::Config(_)));
}
