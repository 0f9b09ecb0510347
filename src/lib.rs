pub mod error;
pub mod config;
pub mod credentials;
pub mod template;
pub mod request;
pub mod extract;
pub mod resolver;
pub mod transport;
pub mod generator;
pub mod client;
pub mod logging;

pub use client::GeneratorBackend;
pub use config::{AuthType, EndpointConfig, EndpointSettings, TypingMatch};
pub use error::Error;
pub use generator::WebSocketGenerator;
pub use request::Prompt;
pub use resolver::{FailureKind, ResolvedResponse};

/*

wsgen (WebSocket generator): lets a probing harness talk to any
real-time chat endpoint over WebSocket as if it were a plain text
generation backend. One prompt in, one resolved answer out.

wsgen/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and the backend actor API
│   ├── error.rs        # Error taxonomy
│   ├── config.rs       # Settings surface and validated config
│   ├── credentials.rs  # Auth strategy -> handshake headers
│   ├── template.rs     # $INPUT / $KEY / $CONVERSATION_ID rendering
│   ├── request.rs      # Prompt and per-cycle envelope
│   ├── extract.rs      # JSON field / path extraction
│   ├── resolver.rs     # Which inbound frame is the answer
│   ├── transport.rs    # WebSocket session
│   ├── generator.rs    # One request/response cycle per prompt
│   ├── client.rs       # Backend task driving concurrent prompts
│   └── logging.rs
└── tests/

*/

/// WSGEN BACKEND INTERFACE:

// ===== SendPrompt =====

/// Failures are carried inside the response, never as a channel error
pub type SendPromptReply = resolver::ResolvedResponse;
pub type SendPromptReplySender
  = tokio::sync::mpsc::UnboundedSender<SendPromptReply>;

pub struct SendPromptArgs
{   pub prompt: request::Prompt
  , pub reply: SendPromptReplySender
}

// ===== ResetSession =====

pub type ResetSessionReply = Result<(), crate::error::Error>;
pub type ResetSessionReplySender
  = tokio::sync::mpsc::UnboundedSender<ResetSessionReply>;

pub struct ResetSessionArgs
{   pub reply: ResetSessionReplySender
}

// ===== Shutdown =====

pub type ShutdownReply = Result<(), crate::error::Error>;
pub type ShutdownReplySender
  = tokio::sync::mpsc::UnboundedSender<ShutdownReply>;

pub struct ShutdownArgs
{   pub reply: ShutdownReplySender
}

// ===== GeneratorHand (sender side) =====

pub struct GeneratorHand
{   pub send_prompt_tx
      : tokio::sync::mpsc::UnboundedSender<SendPromptArgs>
  , pub reset_session_tx
      : tokio::sync::mpsc::UnboundedSender<ResetSessionArgs>
  , pub shutdown_tx
      : tokio::sync::mpsc::UnboundedSender<ShutdownArgs>
}

// ===== GeneratorFoot (receiver side) =====

pub struct GeneratorFoot
{   pub send_prompt_rx
      : tokio::sync::mpsc::UnboundedReceiver<SendPromptArgs>
  , pub reset_session_rx
      : tokio::sync::mpsc::UnboundedReceiver<ResetSessionArgs>
  , pub shutdown_rx
      : tokio::sync::mpsc::UnboundedReceiver<ShutdownArgs>
}
