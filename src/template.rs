//! Request templating
//!
//! Placeholders are matched as exact tokens anywhere in a string and
//! substituted in a single left-to-right pass: text inserted for one
//! placeholder is never scanned again. Unknown `$` sequences are kept
//! literally.

use log::trace;
use serde_json::Value;

use crate::error::Error;

pub const INPUT: &str = "$INPUT";
pub const KEY: &str = "$KEY";
pub const CONVERSATION_ID: &str = "$CONVERSATION_ID";

const DEFAULT_TEMPLATE: &str = INPUT;

/// Outbound payload shape
#[derive(Debug, Clone, PartialEq)]
pub enum RequestTemplate
{   /// Plain text with placeholders
    Text(String)
  , /// Nested structure whose string leaves carry placeholders,
    /// serialized as JSON text after substitution
    Structured(Value)
}

impl Default for RequestTemplate
{   fn default() -> Self
    {   RequestTemplate::Text(DEFAULT_TEMPLATE.to_string())
    }
}

/// Values for the recognized placeholders
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitutions<'a>
{   pub input: &'a str
  , pub key: &'a str
  , pub conversation_id: &'a str
}

impl<'a> Substitutions<'a>
{   fn lookup(&self, text: &str) -> Option<(usize, &'a str)>
    {   [ (CONVERSATION_ID, self.conversation_id)
        , (INPUT, self.input)
        , (KEY, self.key)
        ]
          .into_iter()
          .find(|(token, _)| text.starts_with(token))
          .map(|(token, value)| (token.len(), value))
    }
}

impl RequestTemplate
{   /// Pick the template from the settings surface. A structured
    /// template wins over a text one; a structured template given as
    /// a string must hold valid JSON.
    pub fn from_settings(
      text: Option<String>
    , structured: Option<Value>
    ) -> Result<Self, Error>
    {   match structured
        {   Some(Value::Null) | None => {}
          , Some(Value::String(raw)) => {
              let parsed: Value = serde_json::from_str(&raw)
                .map_err(|e| {
                  Error::Config(format!(
                    "req_template_json_object is not valid JSON: {}",
                    e
                  ))
                })?;
              return Ok(RequestTemplate::Structured(parsed));
            }
          , Some(value) => {
              return Ok(RequestTemplate::Structured(value));
            }
        }
        Ok(RequestTemplate::Text(
          text.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
        ))
    }

    /// Render the payload for one prompt
    pub fn render(&self, subs: &Substitutions<'_>)
      -> Result<String, Error>
    {   match self
        {   RequestTemplate::Text(text) => Ok(substitute(text, subs))
          , RequestTemplate::Structured(value) => {
              let rendered = substitute_value(value, subs);
              trace!("Rendered structured template: {}", rendered);
              serde_json::to_string(&rendered).map_err(|e| {
                Error::Config(format!("cannot serialize template: {}", e))
              })
            }
        }
    }
}

/// Render `template` with the three recognized placeholders
pub fn render(
  template: &RequestTemplate
, prompt_text: &str
, conversation_id: Option<&str>
, api_key: Option<&str>
) -> Result<String, Error>
{   template.render(&Substitutions
    {   input: prompt_text
      , key: api_key.unwrap_or("")
      , conversation_id: conversation_id.unwrap_or("")
    })
}

/// Substitute placeholders in one string
pub fn substitute(text: &str, subs: &Substitutions<'_>) -> String
{   let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$')
    {   out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match subs.lookup(tail)
        {   Some((len, value)) => {
              out.push_str(value);
              rest = &tail[len..];
            }
          , None => {
              out.push('$');
              rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Substitute only `$KEY`, leaving the other placeholders alone
pub fn substitute_key(text: &str, key: &str) -> String
{   let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(KEY)
    {   out.push_str(&rest[..pos]);
        out.push_str(key);
        rest = &rest[pos + KEY.len()..];
    }
    out.push_str(rest);
    out
}

/// Walk maps, sequences and leaf strings; map keys and non-string
/// leaves are copied unchanged.
pub fn substitute_value(value: &Value, subs: &Substitutions<'_>) -> Value
{   match value
    {   Value::String(s) => Value::String(substitute(s, subs))
      , Value::Array(items) => Value::Array(
          items.iter().map(|v| substitute_value(v, subs)).collect()
        )
      , Value::Object(map) => Value::Object(
          map.iter()
            .map(|(k, v)| (k.clone(), substitute_value(v, subs)))
            .collect()
        )
      , other => other.clone()
    }
}
