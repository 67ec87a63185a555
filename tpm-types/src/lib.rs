// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM Types - Common type definitions for AK credential activation
//!
//! This crate contains the data exchanged between the device that owns the
//! TPM and the verifier that challenges it:
//! - the device reports [`AttestationParameters`] for its attestation key
//! - the verifier answers with an [`EncryptedCredential`]

use scale::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;
use thiserror::Error;

/// TPM protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum TpmVersion {
    #[serde(rename = "1.2")]
    Tpm12,
    #[serde(rename = "2.0")]
    Tpm20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("TPM version {0} not supported")]
pub struct UnsupportedTpmVersion(pub u8);

impl TryFrom<u8> for TpmVersion {
    type Error = UnsupportedTpmVersion;

    /// Accepts the major version numbers `1` (TPM 1.2) and `2` (TPM 2.0)
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(TpmVersion::Tpm12),
            2 => Ok(TpmVersion::Tpm20),
            other => Err(UnsupportedTpmVersion(other)),
        }
    }
}

impl std::fmt::Display for TpmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TpmVersion::Tpm12 => f.write_str("1.2"),
            TpmVersion::Tpm20 => f.write_str("2.0"),
        }
    }
}

/// Properties of an attestation key, as produced by the TPM that holds it
///
/// All fields are untrusted until the verifier has checked them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct AttestationParameters {
    /// Public key blob: `TPMT_PUBLIC` on TPM 2.0, `TPM_PUBKEY` on TPM 1.2
    #[serde(with = "hex_bytes")]
    pub public: Vec<u8>,

    /// TPM 1.2 only: the key was created through the TrouSerS daemon and
    /// expects its variant of the activation blob
    #[serde(default)]
    pub use_tcsd_activation_format: bool,

    /// TPM 2.0 `TPMS_CREATION_DATA` of the key
    #[serde(with = "hex_bytes", default)]
    pub create_data: Vec<u8>,

    /// TPM 2.0 `TPMS_ATTEST` over the creation data
    #[serde(with = "hex_bytes", default)]
    pub create_attestation: Vec<u8>,

    /// TPM 2.0 `TPMT_SIGNATURE` of `create_attestation`, made by the key itself
    #[serde(with = "hex_bytes", default)]
    pub create_signature: Vec<u8>,
}

impl AttestationParameters {
    pub fn from_scale(mut input: &[u8]) -> Result<Self, scale::Error> {
        Self::decode(&mut input)
    }
}

/// Credential activation challenge, passed to the TPM's activate-credential command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct EncryptedCredential {
    #[serde(with = "hex_bytes")]
    pub credential: Vec<u8>,

    #[serde(with = "hex_bytes")]
    pub secret: Vec<u8>,
}

impl EncryptedCredential {
    pub fn from_scale(mut input: &[u8]) -> Result<Self, scale::Error> {
        Self::decode(&mut input)
    }
}
