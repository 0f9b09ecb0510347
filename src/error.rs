use std::fmt;

/// Custom error type for wsgen operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Bad or missing credentials, malformed template or settings
    Config(String)
  , /// Connection attempt exceeded the connection timeout
    ConnectionTimeout
  , /// Remote end refused the connection
    ConnectionRefused(String)
  , /// TLS negotiation or certificate validation failed
    Tls(String)
  , /// Any other failure while opening the session
    Connection(String)
  , /// Sending on a half-closed or broken channel
    Send(String)
  , /// Reading from the channel failed mid-cycle
    Receive(String)
  , /// The caller cancelled the cycle
    Cancelled
  , /// Generic error
    Other(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::Config(msg) => {
              write!(f, "Configuration error: {}", msg)
            }
          , Error::ConnectionTimeout => {
              write!(f, "Connection attempt timed out")
            }
          , Error::ConnectionRefused(msg) => {
              write!(f, "Connection refused: {}", msg)
            }
          , Error::Tls(msg) => {
              write!(f, "TLS error: {}", msg)
            }
          , Error::Connection(msg) => {
              write!(f, "Connection error: {}", msg)
            }
          , Error::Send(msg) => {
              write!(f, "Send error: {}", msg)
            }
          , Error::Receive(msg) => {
              write!(f, "Receive error: {}", msg)
            }
          , Error::Cancelled => {
              write!(f, "Request cancelled")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
