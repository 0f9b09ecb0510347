//! Field extraction from structured responses

use serde_json::Value;

use crate::error::Error;

/// Marker that turns a rule into a path expression
pub const PATH_ROOT: char = '$';

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment
{   Key(String)
  , Index(usize)
}

/// Which part of a parsed frame is the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule
{   /// The whole document
    Document
  , /// A top-level key
    Field(String)
  , /// `$`-rooted path through nested maps and arrays
    Path(Vec<PathSegment>)
}

impl Default for FieldRule
{   fn default() -> Self
    {   FieldRule::Document
    }
}

impl FieldRule
{   /// Parse a rule such as `text`, `$.data.message` or
    /// `$.choices[0].message.content`.
    pub fn parse(rule: &str) -> Result<Self, Error>
    {   let Some(mut rest) = rule.strip_prefix(PATH_ROOT)
        else
        {   return Ok(FieldRule::Field(rule.to_string()));
        };

        let mut segments = Vec::new();

        // `$name` reads as a single top-level key
        if !rest.is_empty() && !rest.starts_with(['.', '['])
        {   let end = rest.find(['.', '[']).unwrap_or(rest.len());
            segments.push(PathSegment::Key(rest[..end].to_string()));
            rest = &rest[end..];
        }

        while !rest.is_empty()
        {   if let Some(after) = rest.strip_prefix('.')
            {   let end = after.find(['.', '['])
                  .unwrap_or(after.len());
                if end == 0
                {   return Err(malformed(rule, "empty key segment"));
                }
                segments.push(PathSegment::Key(after[..end].to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[')
            {   let close = after.find(']')
                  .ok_or_else(|| malformed(rule, "unclosed '['"))?;
                segments.push(bracket_segment(rule, after[..close].trim())?);
                rest = &after[close + 1..];
            } else
            {   return Err(malformed(rule, "expected '.' or '['"));
            }
        }

        Ok(FieldRule::Path(segments))
    }

    /// Select the value this rule points at
    pub fn select<'a>(&self, value: &'a Value) -> Option<&'a Value>
    {   match self
        {   FieldRule::Document => Some(value)
          , FieldRule::Field(name) => value.as_object()?.get(name)
          , FieldRule::Path(segments) => navigate(value, segments)
        }
    }

    /// Selected value as answer text. Strings are taken as-is, other
    /// values as compact JSON; `null` and missing values yield `None`.
    pub fn extract_text(&self, value: &Value) -> Option<String>
    {   match self.select(value)?
        {   Value::Null => None
          , Value::String(s) => Some(s.clone())
          , other => Some(other.to_string())
        }
    }
}

/// Follow `segments` from `value`, stopping with `None` at the first
/// segment that does not fit the shape.
pub fn navigate<'a>(value: &'a Value, segments: &[PathSegment])
  -> Option<&'a Value>
{   segments.iter().try_fold(value, |current, segment| {
      match segment
      {   PathSegment::Key(key) => current.as_object()?.get(key)
        , PathSegment::Index(i) => current.as_array()?.get(*i)
      }
    })
}

fn bracket_segment(rule: &str, inner: &str)
  -> Result<PathSegment, Error>
{   for quote in ['\'', '"']
    {   if inner.len() >= 2
          && inner.starts_with(quote)
          && inner.ends_with(quote)
        {   return Ok(PathSegment::Key(
              inner[1..inner.len() - 1].to_string()
            ));
        }
    }
    inner.parse::<usize>()
      .map(PathSegment::Index)
      .map_err(|_| malformed(rule, "index must be a number or quoted key"))
}

fn malformed(rule: &str, why: &str) -> Error
{   Error::Config(format!(
      "malformed response_json_field '{}': {}", rule, why
    ))
}
