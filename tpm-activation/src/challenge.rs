// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Activation challenge generation

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tpm_codec::{TpmsAttest, Unmarshal};
use tpm_types::{EncryptedCredential, TpmVersion};
use tracing::debug;

use crate::credential::make_credential;
use crate::error::{input, mismatch, ActivationError, Result};
use crate::keys::PublicKey;
use crate::{tpm12, ActivationParameters, ACTIVATION_SECRET_LEN, SYM_BLOCK_SIZE};

/// The secret a TPM has to decrypt to prove it holds both keys
///
/// Compare the value the TPM returns against [`Secret::as_bytes`] in
/// constant time.
#[derive(Clone)]
pub struct Secret([u8; ACTIVATION_SECRET_LEN]);

impl Secret {
    pub fn as_bytes(&self) -> &[u8; ACTIVATION_SECRET_LEN] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; ACTIVATION_SECRET_LEN] {
        self.0
    }
}

impl AsRef<[u8]> for Secret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl ActivationParameters {
    /// Validate the AK, then create a challenge for it using the system's
    /// secure random source
    pub fn generate(&self) -> Result<(Secret, EncryptedCredential)> {
        self.generate_with_rng(&mut OsRng)
    }

    /// Validate the AK, then create a challenge for it
    ///
    /// The secret, the encryption seeds and any padding randomness are all
    /// drawn from `rng`.
    pub fn generate_with_rng<R: CryptoRng + RngCore>(
        &self,
        rng: &mut R,
    ) -> Result<(Secret, EncryptedCredential)> {
        self.check_ak_parameters()?;
        let Some(ek) = &self.ek else {
            input!("no EK provided");
        };

        let mut secret = [0u8; ACTIVATION_SECRET_LEN];
        rng.try_fill_bytes(&mut secret)
            .map_err(ActivationError::Randomness)?;

        let credential = match self.tpm_version {
            TpmVersion::Tpm12 => self.generate_tpm12(ek, &secret, rng)?,
            TpmVersion::Tpm20 => self.generate_tpm20(ek, &secret, rng)?,
        };
        debug!("generated TPM {} activation challenge", self.tpm_version);
        Ok((Secret(secret), credential))
    }

    fn generate_tpm20<R: CryptoRng + RngCore>(
        &self,
        ek: &PublicKey,
        secret: &[u8],
        rng: &mut R,
    ) -> Result<EncryptedCredential> {
        let attest = TpmsAttest::from_bytes(&self.ak.create_attestation)
            .map_err(ActivationError::decode("creation attestation"))?;
        let Some(creation) = attest.creation_info() else {
            mismatch!("attestation was not for a creation event");
        };
        let Some(name) = creation.object_name.digest() else {
            mismatch!("attestation creation info name has no digest");
        };
        let (credential, secret) = make_credential(&name, ek, SYM_BLOCK_SIZE, secret, rng)?;
        Ok(EncryptedCredential { credential, secret })
    }

    fn generate_tpm12<R: CryptoRng + RngCore>(
        &self,
        ek: &PublicKey,
        secret: &[u8],
        rng: &mut R,
    ) -> Result<EncryptedCredential> {
        let PublicKey::Rsa(ek) = ek else {
            input!("got EK of type {}, want an RSA key", ek.type_name());
        };
        if self.ak.use_tcsd_activation_format {
            tpm12::generate_tcsd_challenge(rng, ek, &self.ak.public, secret)
        } else {
            tpm12::generate_challenge(rng, ek, &self.ak.public, secret)
        }
    }
}
