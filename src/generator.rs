//! Generator facade: one request/response cycle per prompt

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::config::{EndpointConfig, EndpointSettings};
use crate::credentials::{self, Credentials};
use crate::error::Error;
use crate::logging::preview;
use crate::request::{Prompt, RequestEnvelope};
use crate::resolver::{ResolvedResponse, ResponseResolver, Termination};
use crate::transport::{Session, SessionOptions};

/// Session kept open between prompts, with the credentials it was
/// opened with
struct LiveSession
{   session: Session
  , credentials: Credentials
}

/// Sends prompts to a WebSocket endpoint and resolves the answers
pub struct WebSocketGenerator
{   config: Arc<EndpointConfig>
  , persistent: Mutex<Option<LiveSession>>
}

impl WebSocketGenerator
{   /// The endpoint returns one response per prompt
    pub const SUPPORTS_MULTIPLE_GENERATIONS: bool = false;

    pub fn new(config: EndpointConfig) -> Self
    {   info!("WebSocket generator initialized for {}", config.uri);
        WebSocketGenerator
        {   config: Arc::new(config)
          , persistent: Mutex::new(None)
        }
    }

    pub fn from_settings(settings: EndpointSettings)
      -> Result<Self, Error>
    {   Ok(Self::new(settings.build()?))
    }

    pub fn config(&self) -> &EndpointConfig
    {   &self.config
    }

    /// Run one cycle for `prompt`
    pub async fn generate(&self, prompt: &Prompt) -> ResolvedResponse
    {   self.generate_cancellable(prompt, std::future::pending()).await
    }

    /// Run one cycle; completing `cancelled` interrupts the receive
    /// and closes the session.
    pub async fn generate_cancellable<C>(
      &self
    , prompt: &Prompt
    , cancelled: C
    ) -> ResolvedResponse
    where C: Future<Output = ()>
    {   match self.run_cycle(prompt, cancelled).await
        {   Ok(response) => response
          , Err(e) => {
              error!("WebSocket generation failed: {}", e);
              ResolvedResponse::from(e)
            }
        }
    }

    /// Harness entry point. At most one result comes back no matter
    /// how many generations are asked for.
    pub async fn call_model(
      &self
    , prompt: &Prompt
    , generations: usize
    ) -> Vec<ResolvedResponse>
    {   let mut results = Vec::new();
        if generations > 0
        {   results.push(self.generate(prompt).await);
        }
        results
    }

    /// Tear down the persistent session, if any
    pub async fn close(&self)
    {   if let Some(mut live) = self.persistent.lock().await.take()
        {   live.session.close().await;
        }
    }

    async fn run_cycle<C>(&self, prompt: &Prompt, cancelled: C)
      -> Result<ResolvedResponse, Error>
    where C: Future<Output = ()>
    {   if !self.config.reuse_connection
        {   let credentials = credentials::for_endpoint(&self.config)?;
            let envelope = self.envelope(prompt, &credentials)?;
            let session = self.open(&credentials).await?;
            let (response, session)
              = self.exchange(session, &envelope, cancelled).await?;
            if let Some(mut session) = session
            {   session.close().await;
            }
            return Ok(response);
        }

        // held for the whole cycle: one in-flight request per session
        let mut slot = self.persistent.lock().await;
        let (credentials, existing) = match slot.take()
        {   Some(live) if live.session.is_open() => {
              debug!("Reusing open session to {}", live.session.uri());
              (live.credentials, Some(live.session))
            }
          , stale => {
              if let Some(mut live) = stale
              {   live.session.close().await;
              }
              (credentials::for_endpoint(&self.config)?, None)
            }
        };
        let envelope = self.envelope(prompt, &credentials)?;
        let session = match existing
        {   Some(session) => session
          , None => self.open(&credentials).await?
        };
        let (response, session)
          = self.exchange(session, &envelope, cancelled).await?;
        *slot = session.map(|session| LiveSession
        {   session
          , credentials
        });
        Ok(response)
    }

    fn envelope(&self, prompt: &Prompt, credentials: &Credentials)
      -> Result<RequestEnvelope, Error>
    {   RequestEnvelope::render(
          &self.config.template
        , prompt
        , self.config.conversation_id.as_deref()
        , credentials.api_key()
        )
    }

    async fn open(&self, credentials: &Credentials)
      -> Result<Session, Error>
    {   let options = SessionOptions
        {   connection_timeout: self.config.connection_timeout
          , accept_invalid_certs: self.config.accepts_invalid_certs()
        };
        Session::open(&self.config.uri, &credentials.headers, &options)
          .await
    }

    /// Send the envelope and resolve the answer. The session comes
    /// back only when the cycle resolved cleanly and it is still open.
    async fn exchange<C>(
      &self
    , mut session: Session
    , envelope: &RequestEnvelope
    , cancelled: C
    ) -> Result<(ResolvedResponse, Option<Session>), Error>
    where C: Future<Output = ()>
    {   if let Err(e) = session.send(&envelope.payload).await
        {   error!("Failed to send on {}: {}", session.uri(), e);
            session.close().await;
            return Err(e);
        }
        debug!("Sent message: {}", preview(&envelope.payload));

        let resolution = ResponseResolver::new(&self.config.resolver)
          .resolve(session.receive_stream(), cancelled)
          .await;

        debug!(
          "Cycle ended with {:?}: {:?}",
          resolution.termination, resolution.response
        );
        if resolution.termination == Termination::Resolved
          && session.is_open()
        {   return Ok((resolution.response, Some(session)));
        }
        session.close().await;
        Ok((resolution.response, None))
    }
}
