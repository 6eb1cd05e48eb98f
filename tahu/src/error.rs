// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};

/// Represent the types of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed argument, like an unparsable server url.
    InvalidArgument,

    /// Value shape does not match its declared data type.
    InvalidType,

    /// Numeric value outside the declared range.
    OutOfRange,

    /// Data type code is unknown.
    UnknownType,

    /// Broker granted a different QoS than requested.
    NotAuthorized,

    /// Operation requires a live broker connection.
    NotConnected,

    /// A message sequence number broke the per-node chain.
    SequenceGap,

    /// NDEATH bdSeq does not pair with the registered NBIRTH.
    BdSeqMismatch,

    /// A bounded wait expired.
    Timeout,

    /// Packet decode error.
    DecodeError,

    /// Packet encode error.
    EncodeError,

    /// Internal channel or task failure.
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub const fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn not_connected(server_name: &str) -> Self {
        Self::from_string(
            ErrorKind::NotConnected,
            format!("Client {server_name} is not connected"),
        )
    }

    #[must_use]
    pub fn sequence_gap(expected: u8, got: u8) -> Self {
        Self::from_string(
            ErrorKind::SequenceGap,
            format!("Expected seq {expected}, got {got}"),
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        let kind = match err {
            codec::EncodeError::OutOfRange => ErrorKind::OutOfRange,
            codec::EncodeError::UnknownType => ErrorKind::UnknownType,
            codec::EncodeError::InvalidType { .. } => ErrorKind::InvalidType,
            _ => ErrorKind::EncodeError,
        };
        Self::from_string(kind, err.to_string())
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::DecodeError, err.to_string())
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::from_string(ErrorKind::Internal, format!("Mqtt client error: {err}"))
    }
}

impl From<rumqttc::ConnectionError> for Error {
    fn from(err: rumqttc::ConnectionError) -> Self {
        Self::from_string(ErrorKind::NotConnected, format!("Connection error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_kinds() {
        let err: Error = codec::EncodeError::OutOfRange.into();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);

        let err: Error = codec::DecodeError::TruncatedArray.into();
        assert_eq!(err.kind(), ErrorKind::DecodeError);
    }
}
