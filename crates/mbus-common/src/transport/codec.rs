use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

/// Binary codec for the framed wire layer.
///
/// Frames carry postcard-encoded `Request`/`Response` structs; each wire
/// method additionally postcard-encodes its own parameter and return structs
/// into the `params`/`payload` byte fields. The enveloped send encoding is
/// the one place JSON appears, and that lives with the send adapters, not
/// here.
///
/// # Example
///
/// ```
/// use mbus_common::transport::BinCodec;
/// use mbus_common::protocol::Request;
///
/// let request = Request::new("mbus.getVersion", Vec::new());
///
/// let encoded = BinCodec::encode_request(&request).unwrap();
/// let decoded = BinCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct BinCodec;

impl BinCodec {
    /// Encode any serializable value to postcard bytes.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to encode
    ///
    /// # Returns
    ///
    /// Postcard-encoded bytes
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    /// Decode a value from postcard bytes.
    ///
    /// # Arguments
    ///
    /// * `data` - The postcard-encoded data
    ///
    /// # Returns
    ///
    /// The decoded value
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }

    /// Encode a request frame body.
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Self::encode(request)
    }

    /// Decode a request frame body.
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Self::decode(data)
    }

    /// Encode a response frame body.
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Self::encode(response)
    }

    /// Decode a response frame body.
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Self::decode(data)
    }
}
