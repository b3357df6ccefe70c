// SPDX-License-Identifier: MPL-2.0

//! Traits for encoding messages to and decoding them from byte strings.
//!
//! Every object that crosses the wire between protocol participants — field
//! element vectors, seeds, input shares, prepare messages — implements
//! [`Encode`] and either [`Decode`] or [`ParameterizedDecode`]. Layouts are
//! fixed-width concatenations with no framing; where a layout depends on
//! context (e.g., whether a share is the leader's), the context is supplied as
//! the decoding parameter.

use std::{
    error::Error,
    io::Cursor,
};

/// An error that occurred while decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error, typically an unexpected end of the input buffer.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Extra data remained in the buffer after decoding a complete message.
    #[error("{0} bytes left over after decoding value")]
    BytesLeftOver(usize),

    /// A decoded value was outside the range permitted by its type.
    #[error("unexpected value")]
    UnexpectedValue,

    /// Another error occurred while decoding.
    #[error("other error: {0}")]
    Other(#[source] Box<dyn Error + 'static + Send + Sync>),
}

/// Describes how to decode an object from a byte string.
pub trait Decode: Sized {
    /// Read and decode an object from the cursor's current position, advancing the cursor past
    /// the consumed bytes.
    fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;

    /// Decode an object from `bytes`, failing if any input is left over.
    fn get_decoded(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::get_decoded_with_param(&(), bytes)
    }
}

/// Describes how to decode an object from a byte string, given some decoding parameter that
/// provides the context needed to interpret the bytes.
pub trait ParameterizedDecode<P>: Sized {
    /// Read and decode an object from the cursor's current position, advancing the cursor past
    /// the consumed bytes.
    fn decode_with_param(
        decoding_parameter: &P,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError>;

    /// Decode an object from `bytes`, failing if any input is left over.
    fn get_decoded_with_param(decoding_parameter: &P, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let decoded = Self::decode_with_param(decoding_parameter, &mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(CodecError::BytesLeftOver(
                bytes.len() - cursor.position() as usize,
            ));
        }
        Ok(decoded)
    }
}

// Any object with a context-free decoding can be decoded with any parameter.
impl<D: Decode, P> ParameterizedDecode<P> for D {
    fn decode_with_param(
        _decoding_parameter: &P,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        Self::decode(bytes)
    }
}

/// Describes how to encode an object into a byte string.
pub trait Encode {
    /// Append the encoded form of this object to the end of `bytes`, growing the vector as
    /// needed.
    fn encode(&self, bytes: &mut Vec<u8>);

    /// The length of the encoded form of this object, if known ahead of encoding.
    fn encoded_len(&self) -> Option<usize> {
        None
    }

    /// Convenience method to encode a value into a fresh byte vector.
    fn get_encoded(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len().unwrap_or(0));
        self.encode(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Read;

    // A fixed-size test message: two raw bytes.
    #[derive(Debug, PartialEq, Eq)]
    struct TestMessage([u8; 2]);

    impl Encode for TestMessage {
        fn encode(&self, bytes: &mut Vec<u8>) {
            bytes.extend_from_slice(&self.0);
        }

        fn encoded_len(&self) -> Option<usize> {
            Some(2)
        }
    }

    impl Decode for TestMessage {
        fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
            let mut buf = [0; 2];
            bytes.read_exact(&mut buf)?;
            Ok(Self(buf))
        }
    }

    #[test]
    fn roundtrip() {
        let want = TestMessage([1, 2]);
        let encoded = want.get_encoded();
        assert_eq!(encoded.len(), want.encoded_len().unwrap());
        assert_eq!(TestMessage::get_decoded(&encoded).unwrap(), want);
    }

    #[test]
    fn leftover_bytes() {
        assert_matches!(
            TestMessage::get_decoded(&[1, 2, 3]),
            Err(CodecError::BytesLeftOver(1))
        );
    }

    #[test]
    fn short_read() {
        assert_matches!(TestMessage::get_decoded(&[1]), Err(CodecError::Io(_)));
    }
}
