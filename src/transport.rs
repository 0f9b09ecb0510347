//! WebSocket transport session
//!
//! One `Session` owns one physical connection. Frames are handed out
//! one at a time in arrival order; nothing is buffered or replayed
//! between request cycles.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{
  connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};

use crate::error::Error;
use crate::logging::preview;
use crate::resolver::ResolverPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One message received on an open session
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame
{   pub raw: String
  , pub received_at: Instant
}

/// What an inbound frame looks like to the resolver
#[derive(Debug, Clone, PartialEq)]
pub enum FrameClass
{   /// Typing or other transient status
    Status
  , Structured(Value)
  , PlainText
}

impl InboundFrame
{   pub fn new(raw: impl Into<String>) -> Self
    {   InboundFrame
        {   raw: raw.into()
          , received_at: Instant::now()
        }
    }

    /// Classify against the resolver policy. The typing check runs
    /// first; JSON parsing is only attempted when structured
    /// responses are enabled.
    pub fn classify(&self, policy: &ResolverPolicy) -> FrameClass
    {   if policy.typing.matches(&self.raw)
        {   return FrameClass::Status;
        }
        if !policy.response_json
        {   return FrameClass::PlainText;
        }
        match serde_json::from_str::<Value>(&self.raw)
        {   Ok(value) => FrameClass::Structured(value)
          , Err(e) => {
              debug!("Frame is not JSON ({}), keeping as text", e);
              FrameClass::PlainText
            }
        }
    }
}

/// Connection-time options for [`Session::open`]
#[derive(Debug, Clone)]
pub struct SessionOptions
{   pub connection_timeout: Duration
  , /// Skip certificate and hostname checks on wss://
    pub accept_invalid_certs: bool
}

/// An open WebSocket connection
pub struct Session
{   uri: String
  , ws: WsStream
  , close_timeout: Duration
  , closed: bool
}

impl Session
{   /// Open a connection, bounded by the connection timeout
    pub async fn open(
      uri: &str
    , headers: &BTreeMap<String, String>
    , options: &SessionOptions
    ) -> Result<Session, Error>
    {   let mut request = uri.into_client_request().map_err(|e| {
          Error::Config(format!("invalid uri '{}': {}", uri, e))
        })?;
        for (name, value) in headers
        {   let name = HeaderName::from_bytes(name.as_bytes())
              .map_err(|_| {
                Error::Config(format!("invalid header name '{}'", name))
              })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
              Error::Config(format!("invalid value for header {}", name))
            })?;
            request.headers_mut().insert(name, value);
        }

        let connector = tls_connector(options.accept_invalid_certs)?;

        debug!("Connecting to WebSocket: {}", uri);
        let connecting = connect_async_tls_with_config(
          request, None, false, connector
        );
        let (ws, response)
          = match timeout(options.connection_timeout, connecting).await
        {   Ok(Ok(pair)) => pair
          , Ok(Err(e)) => {
              error!("Failed to connect to WebSocket {}: {}", uri, e);
              return Err(map_connect_error(e));
            }
          , Err(_) => {
              error!(
                "Connecting to {} timed out after {:?}",
                uri, options.connection_timeout
              );
              return Err(Error::ConnectionTimeout);
            }
        };

        info!(
          "WebSocket connected to {} (status {})",
          uri, response.status()
        );
        Ok(Session
        {   uri: uri.to_string()
          , ws
          , close_timeout: options.connection_timeout
          , closed: false
        })
    }

    pub fn uri(&self) -> &str
    {   &self.uri
    }

    pub fn is_open(&self) -> bool
    {   !self.closed
    }

    /// Send one text frame
    pub async fn send(&mut self, payload: &str) -> Result<(), Error>
    {   if self.closed
        {   return Err(Error::Send("session is closed".to_string()));
        }
        match self.ws.send(Message::Text(payload.to_string())).await
        {   Ok(()) => {
              trace!("Sent message: {}", preview(payload));
              Ok(())
            }
          , Err(e) => {
              self.closed = true;
              Err(Error::Send(e.to_string()))
            }
        }
    }

    /// Next data frame, or `None` once the channel is closed, with or
    /// without a closing handshake. Ping and pong traffic is skipped.
    pub async fn next_frame(&mut self)
      -> Option<Result<InboundFrame, Error>>
    {   if self.closed
        {   return None;
        }
        loop
        { match self.ws.next().await
          {   Some(Ok(Message::Text(text))) => {
                trace!("Received WebSocket message: {}", preview(&text));
                return Some(Ok(InboundFrame::new(text)));
              }
            , Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                trace!("Received binary message: {}", preview(&text));
                return Some(Ok(InboundFrame::new(text)));
              }
            , Some(Ok(Message::Close(frame))) => {
                debug!("Peer closed {}: {:?}", self.uri, frame);
                self.closed = true;
                return None;
              }
            , Some(Ok(_)) => continue
            , Some(Err(WsError::ConnectionClosed))
              | Some(Err(WsError::AlreadyClosed))
              | Some(Err(WsError::Protocol(
                  ProtocolError::ResetWithoutClosingHandshake
                )))
              | None => {
                debug!("Connection to {} closed", self.uri);
                self.closed = true;
                return None;
              }
            , Some(Err(e)) => {
                warn!("WebSocket receive failed on {}: {}", self.uri, e);
                self.closed = true;
                return Some(Err(Error::Receive(e.to_string())));
              }
          }
        }
    }

    /// Frames from the current point of the channel onward
    pub fn receive_stream(&mut self)
      -> impl Stream<Item = Result<InboundFrame, Error>> + '_
    {   futures_util::stream::unfold(self, |session| async move {
          session.next_frame().await.map(|frame| (frame, session))
        })
    }

    /// Close the connection, bounded by the connection timeout
    pub async fn close(&mut self)
    {   if self.closed
        {   return;
        }
        self.closed = true;
        match timeout(self.close_timeout, self.ws.close(None)).await
        {   Ok(Ok(())) => debug!("Closed WebSocket {}", self.uri)
          , Ok(Err(e)) => debug!("Error closing {}: {}", self.uri, e)
          , Err(_) => warn!("Timed out closing {}", self.uri)
        }
    }
}

fn tls_connector(accept_invalid_certs: bool)
  -> Result<Option<Connector>, Error>
{   if !accept_invalid_certs
    {   return Ok(None);
    }
    let connector = native_tls::TlsConnector::builder()
      .danger_accept_invalid_certs(true)
      .danger_accept_invalid_hostnames(true)
      .build()
      .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Some(Connector::NativeTls(connector)))
}

fn map_connect_error(err: WsError) -> Error
{   match err
    {   WsError::Io(io) if io.kind() == ErrorKind::ConnectionRefused => {
          Error::ConnectionRefused(io.to_string())
        }
      , WsError::Io(io) if io.kind() == ErrorKind::TimedOut => {
          Error::ConnectionTimeout
        }
      , WsError::Tls(e) => Error::Tls(e.to_string())
      , WsError::Url(e) => Error::Config(e.to_string())
      , WsError::Http(response) => Error::Connection(format!(
          "handshake rejected with status {}", response.status()
        ))
      , other => Error::Connection(other.to_string())
    }
}
