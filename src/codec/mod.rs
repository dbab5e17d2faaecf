//! Body codecs: message marshalling and the deflate transform.
//!
//! [`MessageCodec`] is the seam between the session engine and whatever
//! marshalling grammar the application speaks. The engine only ever sees
//! body *text*; turning that text into typed requests (and responses back
//! into text) is the codec's business. A [`JsonCodec`] backed by serde is
//! bundled for applications without an existing grammar.
//!
//! [`DeflateCodec`] is the per-session compression transform negotiated via
//! the `content-encoding`/`accept-encoding` headers.

mod deflate;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FramewireError, Result};

pub use deflate::DeflateCodec;

/// Turns framed body text into typed requests and responses back into text.
///
/// Decode failures are recoverable at the session level (the message is
/// dropped and the bad-transmission counter advances); they must therefore
/// be reported as errors, never panics.
pub trait MessageCodec: Send + Sync + 'static {
    /// Decoded application request type.
    type Request: Send + 'static;
    /// Application response type.
    type Response: Send + 'static;

    /// Parse one complete message body into a request.
    fn decode(&self, body: &str) -> Result<Self::Request>;

    /// Serialize a response into message body text.
    fn encode(&self, response: &Self::Response) -> Result<String>;
}

/// A [`MessageCodec`] speaking JSON via serde.
///
/// Request and response types are chosen by the application; anything
/// `Deserialize`/`Serialize` works.
pub struct JsonCodec<Req, Resp> {
    _marker: std::marker::PhantomData<fn() -> (Req, Resp)>,
}

impl<Req, Resp> JsonCodec<Req, Resp> {
    /// Create a JSON codec for the given request/response pair.
    pub fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<Req, Resp> Default for JsonCodec<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> MessageCodec for JsonCodec<Req, Resp>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn decode(&self, body: &str) -> Result<Req> {
        serde_json::from_str(body).map_err(|e| FramewireError::Decode(e.to_string()))
    }

    fn encode(&self, response: &Resp) -> Result<String> {
        serde_json::to_string(response).map_err(|e| FramewireError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[derive(Serialize)]
    struct Pong {
        seq: u32,
    }

    #[test]
    fn test_json_codec_decode() {
        let codec: JsonCodec<Ping, Pong> = JsonCodec::new();
        let ping = codec.decode(r#"{"seq":7}"#).unwrap();
        assert_eq!(ping, Ping { seq: 7 });
    }

    #[test]
    fn test_json_codec_decode_failure_is_error() {
        let codec: JsonCodec<Ping, Pong> = JsonCodec::new();
        let err = codec.decode("<not json>").unwrap_err();
        assert!(matches!(err, FramewireError::Decode(_)));
    }

    #[test]
    fn test_json_codec_encode() {
        let codec: JsonCodec<Ping, Pong> = JsonCodec::new();
        let text = codec.encode(&Pong { seq: 9 }).unwrap();
        assert_eq!(text, r#"{"seq":9}"#);
    }
}
