use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{mpsc, watch};

use crate::generator::WebSocketGenerator;
use crate::GeneratorFoot;

/// Public API for the wsgen backend - owns the task
pub struct GeneratorBackend
{   hand: crate::GeneratorHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl GeneratorBackend
{   /// Create and spawn a new backend for one endpoint
    /// Returns immediately - spawns background task
    pub fn new(generator: WebSocketGenerator) -> Self
    {   debug!(
          "Creating GeneratorBackend for {}",
          generator.config().uri
        );

        let (send_prompt_tx, send_prompt_rx)
          = mpsc::unbounded_channel();
        let (reset_session_tx, reset_session_rx)
          = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx)
          = mpsc::unbounded_channel();

        let hand = crate::GeneratorHand
        {   send_prompt_tx
          , reset_session_tx
          , shutdown_tx
        };

        let foot = crate::GeneratorFoot
        {   send_prompt_rx
          , reset_session_rx
          , shutdown_rx
        };

        let generator = Arc::new(generator);
        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, generator).await
        });

        GeneratorBackend
        {   hand
          , _task_handle
        }
    }

    /// Build the generator from settings and spawn the backend
    pub fn from_settings(settings: crate::EndpointSettings)
      -> Result<Self, crate::error::Error>
    {   Ok(Self::new(WebSocketGenerator::from_settings(settings)?))
    }

    /// Send a prompt - returns almost immediately
    pub fn send_prompt(
      &self
    , prompt: crate::Prompt
    ) -> Result<
        mpsc::UnboundedReceiver<crate::SendPromptReply>,
        crate::error::Error
      >
    {   debug!("send_prompt queuing: {}", crate::logging::preview(&prompt.text));
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SendPromptArgs
        {   prompt
          , reply: reply_tx
        };

        self.hand.send_prompt_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Drop the persistent session so the next prompt reconnects
    pub fn reset_session(
      &self
    ) -> Result<
        mpsc::UnboundedReceiver<crate::ResetSessionReply>,
        crate::error::Error
      >
    {   debug!("reset_session queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::ResetSessionArgs
        {   reply: reply_tx
        };

        self.hand.reset_session_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend, cancelling in-flight cycles
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down GeneratorBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::ShutdownArgs
        {   reply: reply_tx
        };

        self.hand.shutdown_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            crate::error::Error::Other(
              "Backend already shutdown".to_string()
            )
          })?;

        // Wait for shutdown confirmation
        if let Some(result) = reply_rx.recv().await
        {   debug!("Backend shutdown confirmed");
            result
        } else
        {   error!("Backend exited without confirming shutdown");
            Err(crate::error::Error::Other(
              "Backend exited without confirming shutdown".to_string()
            ))
        }
    }
}

/// Main backend event loop
///
/// tokio::select! only queues: prompts and session resets are spawned
/// as their own tasks so a slow endpoint never blocks other commands
/// or shutdown.
async fn run_backend_loop(
  foot: crate::GeneratorFoot
, generator: Arc<WebSocketGenerator>
)
{   debug!("Starting GeneratorBackend event loop");
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let GeneratorFoot
    {   mut send_prompt_rx
      , mut reset_session_rx
      , mut shutdown_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = send_prompt_rx.recv() => {
          debug!("Received SendPrompt");
          let generator = Arc::clone(&generator);
          let cancel = cancel_rx.clone();
          tokio::spawn(async move {
            let response = generator
              .generate_cancellable(&cmd.prompt, shutdown_signal(cancel))
              .await;
            let _ = cmd.reply.send(response);
          });
        }
      , Some(cmd) = reset_session_rx.recv() => {
          debug!("Received ResetSession");
          // waits for any cycle holding the persistent session
          let generator = Arc::clone(&generator);
          tokio::spawn(async move {
            generator.close().await;
            let _ = cmd.reply.send(Ok(()));
          });
        }
      , Some(cmd) = shutdown_rx.recv() => {
          debug!("Received Shutdown");
          let _ = cancel_tx.send(true);
          generator.close().await;
          let _ = cmd.reply.send(Ok(()));
          info!("GeneratorBackend shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}

/// Completes once shutdown is requested; never completes if the
/// backend goes away without requesting it.
async fn shutdown_signal(mut rx: watch::Receiver<bool>)
{   if rx.wait_for(|stop| *stop).await.is_err()
    {   std::future::pending::<()>().await;
    }
}
