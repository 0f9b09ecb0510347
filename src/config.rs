//! Configuration for a WebSocket endpoint
//!
//! `EndpointSettings` is the flat, serde-friendly surface with the
//! documented defaults. `EndpointConfig` is the validated, immutable
//! form that every request cycle reads from.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::http::HeaderName;

use crate::credentials::{AuthStrategy, TokenSource};
use crate::error::Error;
use crate::extract::FieldRule;
use crate::resolver::{ResolverPolicy, TypingIndicator};
use crate::template::RequestTemplate;

/// Authentication method selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType
{   None
  , Basic
  , Bearer
  , Custom
}

impl Default for AuthType
{   fn default() -> Self
    {   AuthType::Basic
    }
}

/// How a frame is compared against the typing indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingMatch
{   /// Frame text contains the indicator anywhere
    Contains
  , /// Frame text equals the indicator
    Exact
}

impl Default for TypingMatch
{   fn default() -> Self
    {   TypingMatch::Contains
    }
}

/// Endpoint settings as they appear in a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings
{   /// WebSocket URL (ws:// or wss://)
    pub uri: Option<String>
  , /// Display name for the service
    pub name: String
  , pub auth_type: AuthType
  , pub username: Option<String>
  , pub password: Option<String>
  , /// Literal key for bearer auth and the `$KEY` placeholder
    pub api_key: Option<String>
  , /// Environment variable consulted when `api_key` is unset
    pub key_env_var: String
  , /// Conversation id used when a prompt carries none
    pub conversation_id: Option<String>
  , /// Additional handshake headers
    pub headers: BTreeMap<String, String>
  , pub req_template: Option<String>
  , /// Structured template, inline or as JSON text
    pub req_template_json_object: Option<serde_json::Value>
  , pub response_json: bool
  , pub response_json_field: Option<String>
  , pub response_after_typing: bool
  , pub typing_indicator: String
  , pub typing_match: TypingMatch
  , pub typing_case_sensitive: bool
  , /// Seconds
    pub connection_timeout: f64
  , /// Seconds
    pub request_timeout: f64
  , pub max_response_length: usize
  , pub verify_ssl: bool
  , /// Keep the session open between prompts
    pub reuse_connection: bool
}

impl EndpointSettings
{   pub const DEFAULT_NAME: &'static str = "WebSocket LLM";
    pub const DEFAULT_KEY_ENV_VAR: &'static str = "WEBSOCKET_API_KEY";
    pub const DEFAULT_TYPING_INDICATOR: &'static str = "typing";
    pub const DEFAULT_CONNECTION_TIMEOUT_SECS: f64 = 10.0;
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 20.0;
    pub const DEFAULT_MAX_RESPONSE_LENGTH: usize = 10_000;

    /// Settings with defaults for the given endpoint
    pub fn new(uri: impl Into<String>) -> Self
    {   EndpointSettings
        {   uri: Some(uri.into())
          , ..EndpointSettings::default()
        }
    }

    /// Parse settings from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, Error>
    {   serde_json::from_str(json).map_err(|e| {
          Error::Config(format!("invalid endpoint settings: {}", e))
        })
    }

    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>)
      -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Loading endpoint settings from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
          Error::Config(format!(
            "cannot read {}: {}", path.display(), e
          ))
        })?;
        Self::from_json_str(&text)
    }

    /// Validate into an immutable config
    pub fn build(self) -> Result<EndpointConfig, Error>
    {   EndpointConfig::from_settings(self)
    }
}

impl Default for EndpointSettings
{   fn default() -> Self
    {   EndpointSettings
        {   uri: None
          , name: Self::DEFAULT_NAME.to_string()
          , auth_type: AuthType::default()
          , username: None
          , password: None
          , api_key: None
          , key_env_var: Self::DEFAULT_KEY_ENV_VAR.to_string()
          , conversation_id: None
          , headers: BTreeMap::new()
          , req_template: None
          , req_template_json_object: None
          , response_json: false
          , response_json_field: None
          , response_after_typing: true
          , typing_indicator: Self::DEFAULT_TYPING_INDICATOR.to_string()
          , typing_match: TypingMatch::default()
          , typing_case_sensitive: true
          , connection_timeout: Self::DEFAULT_CONNECTION_TIMEOUT_SECS
          , request_timeout: Self::DEFAULT_REQUEST_TIMEOUT_SECS
          , max_response_length: Self::DEFAULT_MAX_RESPONSE_LENGTH
          , verify_ssl: true
          , reuse_connection: false
        }
    }
}

/// Validated endpoint configuration.
///
/// Built once per generator and shared read-only by every cycle.
#[derive(Debug, Clone)]
pub struct EndpointConfig
{   pub uri: String
  , pub name: String
  , pub host: String
  , pub port: u16
  , pub path: String
  , pub secure: bool
  , pub auth: AuthStrategy
  , /// Source of the `$KEY` placeholder value
    pub key_source: TokenSource
  , /// Headers added on top of the auth headers
    pub headers: BTreeMap<String, String>
  , pub template: RequestTemplate
  , pub conversation_id: Option<String>
  , pub resolver: ResolverPolicy
  , pub connection_timeout: Duration
  , pub verify_ssl: bool
  , pub reuse_connection: bool
}

impl EndpointConfig
{   pub fn from_settings(settings: EndpointSettings)
      -> Result<Self, Error>
    {   let uri = settings.uri
          .as_deref()
          .map(str::trim)
          .filter(|u| !u.is_empty())
          .ok_or_else(|| {
            Error::Config("WebSocket uri is required".to_string())
          })?
          .to_string();

        let parsed = url::Url::parse(&uri).map_err(|e| {
          Error::Config(format!("invalid uri '{}': {}", uri, e))
        })?;
        let secure = match parsed.scheme()
        {   "ws" => false
          , "wss" => true
          , other => {
              return Err(Error::Config(format!(
                "URI must use ws:// or wss:// scheme, got {}://",
                other
              )));
            }
        };
        let host = parsed.host_str()
          .ok_or_else(|| {
            Error::Config(format!("uri '{}' has no host", uri))
          })?
          .to_string();
        let port = parsed.port_or_known_default()
          .unwrap_or(if secure { 443 } else { 80 });
        let path = match parsed.path()
        {   "" => "/".to_string()
          , p => p.to_string()
        };

        let connection_timeout = seconds(
          "connection_timeout", settings.connection_timeout
        )?;
        let request_timeout = seconds(
          "request_timeout", settings.request_timeout
        )?;
        if settings.max_response_length == 0
        {   return Err(Error::Config(
              "max_response_length must be positive".to_string()
            ));
        }

        let key_source = match settings.api_key
          .filter(|k| !k.is_empty())
        {   Some(key) => TokenSource::Literal(key)
          , None => TokenSource::Env(settings.key_env_var.clone())
        };

        for name in settings.headers.keys()
        {   HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
              Error::Config(format!("invalid header name '{}'", name))
            })?;
        }

        let (auth, headers) = match settings.auth_type
        {   AuthType::None => (AuthStrategy::None, settings.headers)
          , AuthType::Basic => (
              AuthStrategy::Basic
              {   username: settings.username
                , password: settings.password
              }
            , settings.headers
            )
          , AuthType::Bearer => (
              AuthStrategy::Bearer(key_source.clone())
            , settings.headers
            )
          , AuthType::Custom => {
              if settings.headers.is_empty()
              {   return Err(Error::Config(
                    "custom auth requires at least one header"
                      .to_string()
                  ));
              }
              (AuthStrategy::Custom(settings.headers), BTreeMap::new())
            }
        };

        let template = RequestTemplate::from_settings(
          settings.req_template
        , settings.req_template_json_object
        )?;

        let field = match settings.response_json_field
        {   Some(rule) if !rule.trim().is_empty() => {
              FieldRule::parse(rule.trim())?
            }
          , _ => FieldRule::Document
        };

        let resolver = ResolverPolicy
        {   response_json: settings.response_json
          , field
          , response_after_typing: settings.response_after_typing
          , typing: TypingIndicator
            {   token: settings.typing_indicator
              , mode: settings.typing_match
              , case_sensitive: settings.typing_case_sensitive
            }
          , request_timeout
          , max_response_length: settings.max_response_length
        };

        if secure && !settings.verify_ssl
        {   warn!(
              "TLS certificate verification disabled for {}",
              uri
            );
        }

        debug!(
          "Endpoint configured: {} ({}:{}{}, secure={})",
          uri, host, port, path, secure
        );

        Ok(EndpointConfig
        {   uri
          , name: settings.name
          , host
          , port
          , path
          , secure
          , auth
          , key_source
          , headers
          , template
          , conversation_id: settings.conversation_id
              .filter(|c| !c.is_empty())
          , resolver
          , connection_timeout
          , verify_ssl: settings.verify_ssl
          , reuse_connection: settings.reuse_connection
        })
    }

    /// True when a TLS handshake must skip certificate checks
    pub fn accepts_invalid_certs(&self) -> bool
    {   self.secure && !self.verify_ssl
    }
}

impl TryFrom<EndpointSettings> for EndpointConfig
{   type Error = Error;

    fn try_from(settings: EndpointSettings)
      -> Result<Self, Self::Error>
    {   EndpointConfig::from_settings(settings)
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, Error>
{   if !(value > 0.0)
    {   return Err(Error::Config(format!(
          "{} must be a positive number of seconds", field
        )));
    }
    Duration::try_from_secs_f64(value).map_err(|e| {
      Error::Config(format!("{}: {}", field, e))
    })
}
