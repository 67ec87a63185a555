// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM structure codec
//!
//! Decodes and encodes the TPM-emitted structures needed to reason about an
//! attestation key, without any C library dependencies.
//!
//! ## Supported Structures
//!
//! - TPM 2.0: `TPMT_PUBLIC`, `TPMS_CREATION_DATA`, `TPMS_ATTEST`
//!   (creation, quote and certify), `TPMT_SIGNATURE`, `TPM2B_NAME`
//! - TPM 1.2: `TPM_PUBKEY` (RSA)
//!
//! Decoding never panics on untrusted input: truncated or inconsistent data
//! is [`CodecError::Malformed`], structures or algorithms outside the list
//! above are [`CodecError::Unsupported`].
//!
//! ## Example
//!
//! ```
//! use tpm_codec::{Marshal, TpmtPublic, Unmarshal};
//!
//! let template = TpmtPublic::ecc_attestation_key(vec![1; 32], vec![2; 32]);
//! let public = TpmtPublic::from_bytes(&template.to_bytes())?;
//! let name = public.name()?;
//! assert_eq!(name.digest.len(), 32);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod attest;
mod constants;
mod error;
mod marshal;
mod pubkey12;
mod types;

pub use attest::*;
pub use constants::*;
pub use error::{CodecError, Result};
pub use marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
pub use pubkey12::{Tpm12PubKey, Tpm12RsaKeyParms};
pub use types::*;
