//! Response resolution
//!
//! After a request is sent the resolver consumes inbound frames until
//! one of three things happens first: an answer is accepted, the frame
//! stream ends, or the request timeout fires. Cancellation by the
//! caller is checked ahead of the other two on every wake-up, and the
//! timeout ahead of frames, so no frame is processed once the deadline
//! has passed and nothing can override an accepted answer.
//!
//! Per frame:
//!
//! 1. typing indicator → status, never an answer
//! 2. with `response_json`, parse; an unparsable frame is kept as a
//!    literal text fallback, below any extracted candidate
//! 3. apply the field rule; a missing field means "not this frame"
//! 4. otherwise the frame is an answer candidate
//!
//! With `response_after_typing`, candidates seen before any status
//! frame are held and used only if nothing better arrives.

use std::future::Future;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use log::{debug, trace, warn};

use crate::config::{EndpointSettings, TypingMatch};
use crate::error::Error;
use crate::extract::FieldRule;
use crate::logging::preview;
use crate::transport::{FrameClass, InboundFrame};

/// Failure category reported to the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind
{   /// Credentials or template problem, raised before connecting
    Config
  , /// Open, send or receive failed
    Transport
  , Cancelled
}

/// Outcome of one request/response cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResponse
{   Answer(String)
  , /// Nothing usable arrived before the cycle ended
    Empty
  , Failure
    {   kind: FailureKind
      , detail: String
    }
}

impl ResolvedResponse
{   pub fn is_answer(&self) -> bool
    {   matches!(self, ResolvedResponse::Answer(_))
    }

    pub fn answer(&self) -> Option<&str>
    {   match self
        {   ResolvedResponse::Answer(text) => Some(text)
          , _ => None
        }
    }

    /// Harness output slot: the answer text, an empty string for
    /// `Empty`, and `None` for failures.
    pub fn into_output(self) -> Option<String>
    {   match self
        {   ResolvedResponse::Answer(text) => Some(text)
          , ResolvedResponse::Empty => Some(String::new())
          , ResolvedResponse::Failure { .. } => None
        }
    }
}

impl From<Error> for ResolvedResponse
{   fn from(err: Error) -> Self
    {   let kind = match err
        {   Error::Config(_) => FailureKind::Config
          , Error::Cancelled => FailureKind::Cancelled
          , _ => FailureKind::Transport
        };
        ResolvedResponse::Failure
        {   kind
          , detail: err.to_string()
        }
    }
}

/// Resolver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState
{   AwaitingFirstFrame
  , TypingObserved
  , AnswerCandidate
  , Resolved
  , TimedOut
  , /// Channel closed with nothing usable
    Closed
  , Error
}

/// Why a resolution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination
{   Resolved
  , TimedOut
  , StreamClosed
  , Cancelled
  , Failed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution
{   pub response: ResolvedResponse
  , pub termination: Termination
}

/// What one frame means for the current cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict
{   Status
  , Candidate(String)
  , /// Unparsable frame while structured responses are expected
    Unstructured(String)
  , NotTheAnswer
}

/// Typing indicator detection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator
{   pub token: String
  , pub mode: TypingMatch
  , pub case_sensitive: bool
}

impl TypingIndicator
{   /// An empty token never matches
    pub fn matches(&self, raw: &str) -> bool
    {   if self.token.is_empty()
        {   return false;
        }
        if self.case_sensitive
        {   return match self.mode
            {   TypingMatch::Contains => raw.contains(&self.token)
              , TypingMatch::Exact => raw == self.token
            };
        }
        let raw = raw.to_lowercase();
        let token = self.token.to_lowercase();
        match self.mode
        {   TypingMatch::Contains => raw.contains(&token)
          , TypingMatch::Exact => raw == token
        }
    }
}

impl Default for TypingIndicator
{   fn default() -> Self
    {   TypingIndicator
        {   token: EndpointSettings::DEFAULT_TYPING_INDICATOR.to_string()
          , mode: TypingMatch::default()
          , case_sensitive: true
        }
    }
}

/// Resolution settings taken from the endpoint config
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverPolicy
{   pub response_json: bool
  , pub field: FieldRule
  , pub response_after_typing: bool
  , pub typing: TypingIndicator
  , pub request_timeout: Duration
  , pub max_response_length: usize
}

impl Default for ResolverPolicy
{   fn default() -> Self
    {   ResolverPolicy
        {   response_json: false
          , field: FieldRule::Document
          , response_after_typing: true
          , typing: TypingIndicator::default()
          , request_timeout: Duration::from_secs_f64(
              EndpointSettings::DEFAULT_REQUEST_TIMEOUT_SECS
            )
          , max_response_length: EndpointSettings::DEFAULT_MAX_RESPONSE_LENGTH
        }
    }
}

impl ResolverPolicy
{   pub fn verdict(&self, frame: &InboundFrame) -> FrameVerdict
    {   match frame.classify(self)
        {   FrameClass::Status => FrameVerdict::Status
          , FrameClass::PlainText if self.response_json => {
              FrameVerdict::Unstructured(frame.raw.clone())
            }
          , FrameClass::PlainText => FrameVerdict::Candidate(frame.raw.clone())
          , FrameClass::Structured(value) => {
              match self.field.extract_text(&value)
              {   Some(text) => FrameVerdict::Candidate(text)
                , None => FrameVerdict::NotTheAnswer
              }
            }
        }
    }
}

/// Per-cycle resolver. Build a fresh one for every request.
#[derive(Debug)]
pub struct ResponseResolver<'a>
{   policy: &'a ResolverPolicy
  , state: ResolverState
  , typing_seen: bool
  , held: Option<String>
  , raw_fallback: Option<String>
}

impl<'a> ResponseResolver<'a>
{   pub fn new(policy: &'a ResolverPolicy) -> Self
    {   ResponseResolver
        {   policy
          , state: ResolverState::AwaitingFirstFrame
          , typing_seen: false
          , held: None
          , raw_fallback: None
        }
    }

    pub fn state(&self) -> ResolverState
    {   self.state
    }

    /// Feed one frame. Returns the accepted answer, already
    /// truncated, once the cycle resolves.
    pub fn observe(&mut self, frame: &InboundFrame) -> Option<String>
    {   match self.policy.verdict(frame)
        {   FrameVerdict::Status => {
              if !self.typing_seen
              {   debug!("Typing indicator detected, waiting for completion");
              }
              self.typing_seen = true;
              self.state = ResolverState::TypingObserved;
              None
            }
          , FrameVerdict::Candidate(text) => {
              if !self.policy.response_after_typing || self.typing_seen
              {   debug!("Accepting answer candidate");
                  self.state = ResolverState::Resolved;
                  return Some(self.truncate(text));
              }
              debug!("Holding candidate received before any status frame");
              self.held = Some(text);
              self.state = ResolverState::AnswerCandidate;
              None
            }
          , FrameVerdict::Unstructured(text) => {
              debug!("Frame is not JSON, keeping it as a text fallback");
              self.raw_fallback = Some(text);
              if self.state == ResolverState::AwaitingFirstFrame
              {   self.state = ResolverState::AnswerCandidate;
              }
              None
            }
          , FrameVerdict::NotTheAnswer => {
              debug!("Frame does not carry the response field, waiting");
              None
            }
        }
    }

    /// Close the cycle without an accepted answer, using whatever
    /// fallback is held. An extracted candidate beats a raw frame.
    pub fn conclude(&mut self, termination: Termination) -> Resolution
    {   let fallback = self.held.take().or_else(|| self.raw_fallback.take());
        let response = match fallback
        {   Some(text) => {
              debug!("Using fallback answer after {:?}", termination);
              self.state = ResolverState::Resolved;
              ResolvedResponse::Answer(self.truncate(text))
            }
          , None => {
              self.state = match termination
              {   Termination::StreamClosed => ResolverState::Closed
                , _ => ResolverState::TimedOut
              };
              ResolvedResponse::Empty
            }
        };
        Resolution
        {   response
          , termination
        }
    }

    /// Drive the resolver over `frames` until resolution, stream end,
    /// timeout or `cancelled` completing.
    pub async fn resolve<S, C>(mut self, frames: S, cancelled: C)
      -> Resolution
    where S: Stream<Item = Result<InboundFrame, Error>>
        , C: Future<Output = ()>
    {   let deadline = tokio::time::sleep(self.policy.request_timeout);
        tokio::pin!(frames);
        tokio::pin!(cancelled);
        tokio::pin!(deadline);

        loop
        { tokio::select!
          { biased;
            _ = &mut cancelled => {
              debug!("Cycle cancelled by caller");
              self.state = ResolverState::Error;
              return Resolution
              {   response: ResolvedResponse::from(Error::Cancelled)
                , termination: Termination::Cancelled
              };
            }
          , _ = &mut deadline => {
              debug!(
                "No answer within {:?}", self.policy.request_timeout
              );
              return self.conclude(Termination::TimedOut);
            }
          , next = frames.next() => match next
            {   Some(Ok(frame)) => {
                  trace!(
                    "Frame in state {:?}: {}",
                    self.state, preview(&frame.raw)
                  );
                  if let Some(answer) = self.observe(&frame)
                  {   return Resolution
                      {   response: ResolvedResponse::Answer(answer)
                        , termination: Termination::Resolved
                      };
                  }
                }
              , Some(Err(e)) => {
                  warn!("Receive failed mid-cycle: {}", e);
                  self.state = ResolverState::Error;
                  return Resolution
                  {   response: ResolvedResponse::from(e)
                    , termination: Termination::Failed
                  };
                }
              , None => {
                  debug!("Frame stream closed before an answer");
                  return self.conclude(Termination::StreamClosed);
                }
            }
          }
        }
    }

    fn truncate(&self, text: String) -> String
    {   let limit = self.policy.max_response_length;
        if text.len() <= limit
        {   return text;
        }
        debug!("Max response length reached, truncating to {}", limit);
        truncate_chars(&text, limit).to_string()
    }
}

/// Longest prefix of `text` holding at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> &str
{   match text.char_indices().nth(max)
    {   Some((idx, _)) => &text[..idx]
      , None => text
    }
}
