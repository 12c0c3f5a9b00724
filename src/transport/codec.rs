//! Length-prefixed JSON framing.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [JSON data]`.
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::Framed`. Partially read
//! or written frames stay buffered inside the `Framed` value, so dropping a
//! `next()` or `send()` future halfway never desynchronizes the stream.

use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Decodes frames into `In`, encodes any serializable value.
///
/// The client side is `FrameCodec<Response>`; a member is `FrameCodec<Request>`.
#[derive(Debug)]
pub struct FrameCodec<In> {
    _marker: PhantomData<fn() -> In>,
}

impl<In> FrameCodec<In> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<In> Default for FrameCodec<In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned> Decoder for FrameCodec<In> {
    type Item = In;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, TransportError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len);
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

impl<In, Out: Serialize> Encoder<Out> for FrameCodec<In> {
    type Error = TransportError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), TransportError> {
        let encoded = serde_json::to_vec(&item)?;
        if encoded.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: encoded.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(HEADER_LEN + encoded.len());
        dst.put_u32(encoded.len() as u32);
        dst.put_slice(&encoded);
        Ok(())
    }
}

/// Peer hang-ups become `Closed`; everything else is `Io`.
pub fn map_io_error(e: std::io::Error) -> TransportError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => TransportError::Closed,
        _ => TransportError::Io(e.to_string()),
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        map_io_error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, RequestBody, Response, ResponseBody};

    fn put_request() -> Request {
        Request::new(RequestBody::Put {
            key: "k".into(),
            value: "v".into(),
        })
    }

    #[test]
    fn test_encode_then_decode() {
        let request = put_request();
        let mut buf = BytesMut::new();
        FrameCodec::<Request>::new().encode(&request, &mut buf).unwrap();

        let decoded = FrameCodec::<Request>::new().decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(request));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_rest() {
        let response = Response::new(uuid::Uuid::new_v4(), ResponseBody::Put { revision: 3 });
        let mut encoded = BytesMut::new();
        FrameCodec::<Response>::new().encode(&response, &mut encoded).unwrap();

        let mut codec = FrameCodec::<Response>::new();
        let half = encoded.len() / 2;
        let mut buf = BytesMut::from(&encoded[..half]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        // Nothing consumed until the whole frame is there.
        assert_eq!(buf.len(), half);

        buf.extend_from_slice(&encoded[half..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(response));
    }

    #[test]
    fn test_header_only_waits() {
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert_eq!(FrameCodec::<Request>::new().decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE as u32 + 1);

        let result = FrameCodec::<Request>::new().decode(&mut buf);
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_garbage_is_codec_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"{{{");

        let result = FrameCodec::<Request>::new().decode(&mut buf);
        assert!(matches!(result, Err(TransportError::Codec(_))));
    }

    #[test]
    fn test_eof_maps_to_closed() {
        let err: TransportError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err, TransportError::Closed);
    }
}
