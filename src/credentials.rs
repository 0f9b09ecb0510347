//! Credential resolution
//!
//! Turns an authentication strategy into the headers sent with the
//! upgrade request and the key handed to the template engine.
//! Resolution runs once per session open, never per message.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, error};

use crate::config::EndpointConfig;
use crate::error::Error;
use crate::template;

pub const AUTHORIZATION: &str = "Authorization";

/// Where a token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource
{   Literal(String)
  , /// Name of an environment variable read at session open
    Env(String)
}

impl TokenSource
{   /// Resolve the token; empty values count as absent
    pub fn lookup(&self) -> Option<String>
    {   match self
        {   TokenSource::Literal(value) => {
              Some(value.clone()).filter(|v| !v.is_empty())
            }
          , TokenSource::Env(name) => {
              if name.is_empty()
              {   return None;
              }
              debug!("Looking up token in ${}", name);
              std::env::var(name).ok().filter(|v| !v.is_empty())
            }
        }
    }

    fn describe(&self) -> String
    {   match self
        {   TokenSource::Literal(_) => "api_key".to_string()
          , TokenSource::Env(name) => format!("${}", name)
        }
    }
}

/// Authentication strategy for the upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy
{   None
  , Basic
    {   username: Option<String>
      , password: Option<String>
    }
  , Bearer(TokenSource)
  , /// Caller-supplied headers passed through as-is
    Custom(BTreeMap<String, String>)
}

/// Connection-time artifacts produced by [`resolve`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials
{   pub headers: BTreeMap<String, String>
  , /// Placeholder token to value, e.g. `$KEY`
    pub credentials_for_template: BTreeMap<String, String>
}

impl Credentials
{   /// The key substituted for `$KEY`, if any
    pub fn api_key(&self) -> Option<&str>
    {   self.credentials_for_template
          .get(template::KEY)
          .map(String::as_str)
    }
}

/// Resolve a strategy into headers and template credentials
pub fn resolve(strategy: &AuthStrategy) -> Result<Credentials, Error>
{   let mut credentials = Credentials::default();

    match strategy
    {   AuthStrategy::None => {}
      , AuthStrategy::Basic { username, password } => {
          let username = username.as_deref()
            .filter(|u| !u.is_empty());
          let password = password.as_deref()
            .filter(|p| !p.is_empty());
          match (username, password)
          {   (Some(user), Some(pass)) => {
                let encoded = BASE64
                  .encode(format!("{}:{}", user, pass));
                credentials.headers.insert(
                  AUTHORIZATION.to_string()
                , format!("Basic {}", encoded)
                );
              }
            , _ => {
                error!("Basic auth configured without credentials");
                return Err(Error::Config(
                  "basic auth requires username and password"
                    .to_string()
                ));
              }
          }
        }
      , AuthStrategy::Bearer(source) => {
          let token = source.lookup().ok_or_else(|| {
            error!("No bearer token available");
            Error::Config(format!(
              "bearer auth requires a token ({} is not set)",
              source.describe()
            ))
          })?;
          credentials.headers.insert(
            AUTHORIZATION.to_string()
          , format!("Bearer {}", token)
          );
          credentials.credentials_for_template
            .insert(template::KEY.to_string(), token);
        }
      , AuthStrategy::Custom(headers) => {
          if headers.is_empty()
          {   return Err(Error::Config(
                "custom auth requires at least one header".to_string()
              ));
          }
          credentials.headers = headers.clone();
        }
    }

    Ok(credentials)
}

/// Everything a session open needs for one endpoint: the auth
/// strategy, the extra headers, and the `$KEY` value, with `$KEY`
/// expanded inside header values.
pub fn for_endpoint(config: &EndpointConfig)
  -> Result<Credentials, Error>
{   let mut credentials = resolve(&config.auth)?;

    if credentials.api_key().is_none()
    {   if let Some(key) = config.key_source.lookup()
        {   credentials.credentials_for_template
              .insert(template::KEY.to_string(), key);
        }
    }

    // auth headers win over extras with the same name
    let mut headers = config.headers.clone();
    headers.append(&mut credentials.headers);

    let key = credentials.api_key().unwrap_or("").to_string();
    credentials.headers = headers
      .into_iter()
      .map(|(name, value)| {
        let value = if value.contains(template::KEY)
        {   template::substitute_key(&value, &key)
        } else
        {   value
        };
        (name, value)
      })
      .collect();

    debug!(
      "Resolved {} header(s) for {}",
      credentials.headers.len(), config.uri
    );
    Ok(credentials)
}
