// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Attestation keys as stored by the device that owns the TPM

use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;
use tpm_types::{AttestationParameters, TpmVersion};

use crate::error::{input, Result};
use crate::keys::PublicKey;
use crate::ActivationParameters;

/// An attestation key of either TPM generation
pub trait AttestationKey: Send + Sync {
    fn tpm_version(&self) -> TpmVersion;

    /// The parameters a verifier needs to validate and activate the key
    fn attestation_parameters(&self) -> AttestationParameters;

    /// Serialize the key so it can be reloaded into the TPM later
    fn marshal(&self) -> Result<Vec<u8>>;

    /// The `(public, private)` blobs to load the key with
    fn blobs(&self) -> Result<(&[u8], &[u8])>;
}

/// A TPM 1.2 identity key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm12Key {
    /// `TPM_PUBKEY` of the key
    pub public: Vec<u8>,
    /// Wrapped key blob as returned by `TPM_MakeIdentity`
    pub blob: Vec<u8>,
    pub use_tcsd_activation_format: bool,
}

/// A TPM 2.0 attestation key with its creation evidence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm20Key {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
    pub create_data: Vec<u8>,
    pub create_attestation: Vec<u8>,
    pub create_signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    version: TpmVersion,
    #[serde(with = "hex_bytes")]
    public: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    blob: Vec<u8>,
    #[serde(default)]
    use_tcsd_activation_format: bool,
    #[serde(with = "hex_bytes", default)]
    private: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    create_data: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    create_attestation: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    create_signature: Vec<u8>,
}

impl StoredKey {
    fn parse(data: &[u8], want: TpmVersion) -> Result<Self> {
        let stored: StoredKey = serde_json::from_slice(data)?;
        if stored.version != want {
            input!("stored key is for TPM {}, not TPM {want}", stored.version);
        }
        Ok(stored)
    }
}

impl Tpm12Key {
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let stored = StoredKey::parse(data, TpmVersion::Tpm12)?;
        Ok(Self {
            public: stored.public,
            blob: stored.blob,
            use_tcsd_activation_format: stored.use_tcsd_activation_format,
        })
    }
}

impl AttestationKey for Tpm12Key {
    fn tpm_version(&self) -> TpmVersion {
        TpmVersion::Tpm12
    }

    fn attestation_parameters(&self) -> AttestationParameters {
        AttestationParameters {
            public: self.public.clone(),
            use_tcsd_activation_format: self.use_tcsd_activation_format,
            ..Default::default()
        }
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&StoredKey {
            version: TpmVersion::Tpm12,
            public: self.public.clone(),
            blob: self.blob.clone(),
            use_tcsd_activation_format: self.use_tcsd_activation_format,
            private: Vec::new(),
            create_data: Vec::new(),
            create_attestation: Vec::new(),
            create_signature: Vec::new(),
        })?)
    }

    fn blobs(&self) -> Result<(&[u8], &[u8])> {
        input!("TPM 1.2 keys have no public/private blobs");
    }
}

impl Tpm20Key {
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let stored = StoredKey::parse(data, TpmVersion::Tpm20)?;
        Ok(Self {
            public: stored.public,
            private: stored.private,
            create_data: stored.create_data,
            create_attestation: stored.create_attestation,
            create_signature: stored.create_signature,
        })
    }
}

impl AttestationKey for Tpm20Key {
    fn tpm_version(&self) -> TpmVersion {
        TpmVersion::Tpm20
    }

    fn attestation_parameters(&self) -> AttestationParameters {
        AttestationParameters {
            public: self.public.clone(),
            use_tcsd_activation_format: false,
            create_data: self.create_data.clone(),
            create_attestation: self.create_attestation.clone(),
            create_signature: self.create_signature.clone(),
        }
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&StoredKey {
            version: TpmVersion::Tpm20,
            public: self.public.clone(),
            blob: Vec::new(),
            use_tcsd_activation_format: false,
            private: self.private.clone(),
            create_data: self.create_data.clone(),
            create_attestation: self.create_attestation.clone(),
            create_signature: self.create_signature.clone(),
        })?)
    }

    fn blobs(&self) -> Result<(&[u8], &[u8])> {
        Ok((&self.public, &self.private))
    }
}

impl ActivationParameters {
    /// Activation parameters for `key`, to be encrypted to `ek`
    pub fn for_key(key: &dyn AttestationKey, ek: Option<PublicKey>) -> Self {
        Self {
            tpm_version: key.tpm_version(),
            ek,
            ak: key.attestation_parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn tpm20_key() -> Tpm20Key {
        Tpm20Key {
            public: vec![0x00, 0x01],
            private: vec![0x02],
            create_data: vec![0x03],
            create_attestation: vec![0x04],
            create_signature: vec![0x05],
        }
    }

    #[test]
    fn test_tpm20_marshal() {
        let key = tpm20_key();
        let data = key.marshal().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(json["version"], "2.0");
        assert_eq!(json["public"], "0001");

        assert_eq!(Tpm20Key::unmarshal(&data).unwrap(), key);
        let (public, private) = key.blobs().unwrap();
        assert_eq!((public, private), (&[0x00, 0x01][..], &[0x02][..]));
    }

    #[test]
    fn test_version_mismatch() {
        let data = tpm20_key().marshal().unwrap();
        let err = Tpm12Key::unmarshal(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(err.to_string(), "stored key is for TPM 2.0, not TPM 1.2");

        let err = Tpm20Key::unmarshal(b"not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_tpm12_key() {
        let key = Tpm12Key {
            public: vec![0xaa],
            blob: vec![0xbb],
            use_tcsd_activation_format: true,
        };
        assert!(key.blobs().is_err());
        let restored = Tpm12Key::unmarshal(&key.marshal().unwrap()).unwrap();
        assert_eq!(restored, key);

        let params = ActivationParameters::for_key(&key, None);
        assert_eq!(params.tpm_version, TpmVersion::Tpm12);
        assert!(params.ak.use_tcsd_activation_format);
        assert!(params.ak.create_signature.is_empty());
    }
}
