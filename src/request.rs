//! Prompt and per-request envelope types

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::template::{RequestTemplate, Substitutions};

/// A prompt handed over by the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt
{   /// The prompt text
    pub text: String
  , /// Conversation to continue, if the harness tracks one
    #[serde(default)]
    pub conversation_id: Option<String>
}

impl Prompt
{   pub fn new(text: impl Into<String>) -> Self
    {   Prompt
        {   text: text.into()
          , conversation_id: None
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self
    {   self.conversation_id = Some(id.into());
        self
    }
}

impl From<&str> for Prompt
{   fn from(text: &str) -> Self
    {   Prompt::new(text)
    }
}

impl From<String> for Prompt
{   fn from(text: String) -> Self
    {   Prompt::new(text)
    }
}

/// Rendered outbound message for one request/response cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope
{   pub payload: String
  , pub conversation_id: Option<String>
}

impl RequestEnvelope
{   /// Render `prompt` through `template`. The prompt's conversation
    /// id takes precedence over the endpoint default.
    pub fn render(
      template: &RequestTemplate
    , prompt: &Prompt
    , default_conversation_id: Option<&str>
    , api_key: Option<&str>
    ) -> Result<Self, Error>
    {   let conversation_id = prompt.conversation_id
          .as_deref()
          .or(default_conversation_id)
          .map(str::to_string);
        let payload = template.render(&Substitutions
        {   input: &prompt.text
          , key: api_key.unwrap_or("")
          , conversation_id: conversation_id.as_deref().unwrap_or("")
        })?;
        Ok(RequestEnvelope
        {   payload
          , conversation_id
        })
    }
}
