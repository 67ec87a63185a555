// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM attestation key activation
//!
//! Establishes that an attestation key (AK) lives on the same TPM as a known
//! endorsement key (EK), and that the AK is safe to use as a signing root.
//!
//! # Flow
//! - **Step 1**: [`ActivationParameters::check_ak_parameters`] validates the
//!   AK against policy. On TPM 2.0 this verifies the AK's self-signed creation
//!   attestation.
//! - **Step 2**: [`ActivationParameters::generate`] creates a random secret
//!   and seals it into an [`EncryptedCredential`] that only the TPM holding
//!   both keys can open.
//!
//! The device passes the credential to its TPM's activate-credential command
//! and returns the decrypted secret, which the verifier compares against the
//! [`Secret`] it kept.
//!
//! ```no_run
//! use tpm_activation::{ActivationParameters, PublicKey};
//! use tpm_types::{AttestationParameters, TpmVersion};
//!
//! # fn load() -> (String, AttestationParameters) { unimplemented!() }
//! let (ek_pem, ak) = load();
//! let params = ActivationParameters {
//!     tpm_version: TpmVersion::Tpm20,
//!     ek: Some(PublicKey::from_public_key_pem(&ek_pem)?),
//!     ak,
//! };
//! let (secret, challenge) = params.generate()?;
//! # let _ = (secret, challenge);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! This crate is designed to run on the verifier side. It never talks to a
//! TPM itself.

pub use tpm_codec::TPM_GENERATED_VALUE;
pub use tpm_types::{
    AttestationParameters, EncryptedCredential, TpmVersion, UnsupportedTpmVersion,
};

pub use challenge::Secret;
pub use error::{ActivationError, ErrorKind, Result};
pub use key::{AttestationKey, Tpm12Key, Tpm20Key};
pub use keys::PublicKey;
pub use verify::{verify_signature, VerifyError};

mod challenge;
pub mod credential;
mod error;
pub mod kdf;
mod key;
mod keys;
mod rng;
pub mod tpm12;
mod validate;
mod verify;

/// Minimum RSA modulus size of an AK
pub const MIN_RSA_BITS: usize = 2048;
/// Minimum size of each coordinate of an ECC AK
pub const MIN_ECC_BITS: usize = 256;
/// Size of the secret sealed into a challenge
pub const ACTIVATION_SECRET_LEN: usize = 32;
/// Symmetric block (and key) size of the EK's storage cipher, AES-128
pub const SYM_BLOCK_SIZE: usize = 16;
/// Shortest `TPMT_SIGNATURE` worth decoding
pub const MIN_SIGNATURE_LEN: usize = 8;

/// Everything needed to validate an AK and challenge the TPM holding it
#[derive(Debug, Clone)]
pub struct ActivationParameters {
    pub tpm_version: TpmVersion,
    /// EK of the TPM the AK is claimed to live on. The caller is responsible
    /// for trusting it, typically via its EK certificate.
    pub ek: Option<PublicKey>,
    pub ak: AttestationParameters,
}

impl ActivationParameters {
    /// Check that the AK is acceptable for activation
    ///
    /// [`generate`](Self::generate) performs this check itself.
    pub fn check_ak_parameters(&self) -> Result<()> {
        match self.tpm_version {
            TpmVersion::Tpm12 => validate::check_tpm12(&self.ak),
            TpmVersion::Tpm20 => validate::check_tpm20(&self.ak),
        }
    }
}
