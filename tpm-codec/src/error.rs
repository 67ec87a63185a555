// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Error returned by every decode operation of this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input is truncated or internally inconsistent.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// The input is well formed but uses a structure or algorithm this codec does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, CodecError::Unsupported(_))
    }
}

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

macro_rules! malformed {
    ($($arg:tt)*) => {
        return Err($crate::error::CodecError::Malformed(format!($($arg)*)))
    };
}

macro_rules! unsupported {
    ($($arg:tt)*) => {
        return Err($crate::error::CodecError::Unsupported(format!($($arg)*)))
    };
}

pub(crate) use malformed;
pub(crate) use unsupported;
