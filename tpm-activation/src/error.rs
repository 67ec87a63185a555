// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use tpm_codec::CodecError;
use tpm_types::UnsupportedTpmVersion;

use crate::verify::VerifyError;

/// Coarse classification of an [`ActivationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    PolicyViolation,
    AttestationMismatch,
    SignatureInvalid,
    Input,
    Randomness,
    Challenge,
}

#[derive(Debug, Error)]
pub enum ActivationError {
    /// A blob could not be parsed
    #[error("decoding {what} failed: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: CodecError,
    },
    /// The key is too weak, of an unsupported type, or lacks a required attribute
    #[error("{0}")]
    PolicyViolation(String),
    /// The attestation does not describe the key it came with
    #[error("{0}")]
    AttestationMismatch(String),
    #[error("could not verify attestation: {0}")]
    SignatureInvalid(#[from] VerifyError),
    #[error("{0}")]
    Input(String),
    #[error("error generating activation secret: {0}")]
    Randomness(#[source] rand::Error),
    #[error("challenge generation failed: {0}")]
    Challenge(String),
    #[error("invalid serialized key: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActivationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActivationError::Decode { .. } => ErrorKind::Decode,
            ActivationError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            ActivationError::AttestationMismatch(_) => ErrorKind::AttestationMismatch,
            ActivationError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            ActivationError::Input(_) | ActivationError::Serialization(_) => ErrorKind::Input,
            ActivationError::Randomness(_) => ErrorKind::Randomness,
            ActivationError::Challenge(_) => ErrorKind::Challenge,
        }
    }

    pub(crate) fn decode(what: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| ActivationError::Decode { what, source }
    }
}

impl From<UnsupportedTpmVersion> for ActivationError {
    fn from(e: UnsupportedTpmVersion) -> Self {
        ActivationError::Input(e.to_string())
    }
}

pub type Result<T, E = ActivationError> = std::result::Result<T, E>;

macro_rules! policy {
    ($($arg:tt)*) => {
        return Err($crate::error::ActivationError::PolicyViolation(format!($($arg)*)))
    };
}

macro_rules! mismatch {
    ($($arg:tt)*) => {
        return Err($crate::error::ActivationError::AttestationMismatch(format!($($arg)*)))
    };
}

macro_rules! input {
    ($($arg:tt)*) => {
        return Err($crate::error::ActivationError::Input(format!($($arg)*)))
    };
}

pub(crate) use input;
pub(crate) use mismatch;
pub(crate) use policy;
