// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 and TPM 1.2 constants

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{unsupported, Result};

/// `TPM_GENERATED_VALUE`: only present on structures the TPM produced itself.
pub const TPM_GENERATED_VALUE: u32 = 0xff544347;

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TpmAlgId {
    Null = 0x0010,
    Sha1 = 0x0004,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Rsa = 0x0001,
    Ecc = 0x0023,
    Aes = 0x0006,
    Cfb = 0x0043,
    Hmac = 0x0005,
    RsaSsa = 0x0014,
    RsaEs = 0x0015,
    RsaPss = 0x0016,
    Oaep = 0x0017,
    EcDsa = 0x0018,
    EcDh = 0x0019,
    Kdf1Sp80056a = 0x0020,
    Kdf1Sp800108 = 0x0022,
    KeyedHash = 0x0008,
    SymCipher = 0x0025,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0010 => Some(TpmAlgId::Null),
            0x0004 => Some(TpmAlgId::Sha1),
            0x000B => Some(TpmAlgId::Sha256),
            0x000C => Some(TpmAlgId::Sha384),
            0x000D => Some(TpmAlgId::Sha512),
            0x0001 => Some(TpmAlgId::Rsa),
            0x0023 => Some(TpmAlgId::Ecc),
            0x0006 => Some(TpmAlgId::Aes),
            0x0043 => Some(TpmAlgId::Cfb),
            0x0005 => Some(TpmAlgId::Hmac),
            0x0014 => Some(TpmAlgId::RsaSsa),
            0x0015 => Some(TpmAlgId::RsaEs),
            0x0016 => Some(TpmAlgId::RsaPss),
            0x0017 => Some(TpmAlgId::Oaep),
            0x0018 => Some(TpmAlgId::EcDsa),
            0x0019 => Some(TpmAlgId::EcDh),
            0x0020 => Some(TpmAlgId::Kdf1Sp80056a),
            0x0022 => Some(TpmAlgId::Kdf1Sp800108),
            0x0008 => Some(TpmAlgId::KeyedHash),
            0x0025 => Some(TpmAlgId::SymCipher),
            _ => None,
        }
    }

    /// Parse an algorithm ID, reporting unknown values as unsupported
    pub fn parse(v: u16) -> Result<Self> {
        match Self::from_u16(v) {
            Some(alg) => Ok(alg),
            None => unsupported!("unknown algorithm: 0x{v:04x}"),
        }
    }

    pub fn is_hash(self) -> bool {
        self.digest_size() != 0
    }

    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            TpmAlgId::Sha384 => 48,
            TpmAlgId::Sha512 => 64,
            _ => 0,
        }
    }

    /// Hash `data` with this algorithm
    pub fn hash(self, data: &[u8]) -> Result<Vec<u8>> {
        self.hash_parts(&[data])
    }

    /// Hash the concatenation of `parts` with this algorithm
    pub fn hash_parts(self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            TpmAlgId::Sha1 => Ok(run::<Sha1>(parts)),
            TpmAlgId::Sha256 => Ok(run::<Sha256>(parts)),
            TpmAlgId::Sha384 => Ok(run::<Sha384>(parts)),
            TpmAlgId::Sha512 => Ok(run::<Sha512>(parts)),
            other => unsupported!("{other:?} is not a hash algorithm"),
        }
    }
}

/// TPM 2.0 structure tags (TPM_ST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    NoSessions = 0x8001,
    Sessions = 0x8002,
    AttestNv = 0x8014,
    AttestCommandAudit = 0x8015,
    AttestSessionAudit = 0x8016,
    AttestCertify = 0x8017,
    AttestQuote = 0x8018,
    AttestTime = 0x8019,
    AttestCreation = 0x801A,
    Creation = 0x8021,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            0x8014 => Some(TpmSt::AttestNv),
            0x8015 => Some(TpmSt::AttestCommandAudit),
            0x8016 => Some(TpmSt::AttestSessionAudit),
            0x8017 => Some(TpmSt::AttestCertify),
            0x8018 => Some(TpmSt::AttestQuote),
            0x8019 => Some(TpmSt::AttestTime),
            0x801A => Some(TpmSt::AttestCreation),
            0x8021 => Some(TpmSt::Creation),
            _ => None,
        }
    }
}

/// TPM 2.0 Object Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaObject(pub u32);

impl TpmaObject {
    pub const FIXED_TPM: u32 = 1 << 1;
    pub const ST_CLEAR: u32 = 1 << 2;
    pub const FIXED_PARENT: u32 = 1 << 4;
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    pub const NO_DA: u32 = 1 << 10;
    pub const ENCRYPTED_DUPLICATION: u32 = 1 << 11;
    pub const RESTRICTED: u32 = 1 << 16;
    pub const DECRYPT: u32 = 1 << 17;
    pub const SIGN_ENCRYPT: u32 = 1 << 18;

    pub fn new() -> Self {
        Self(0)
    }

    /// Attributes of a typical attestation key
    pub fn attestation_key() -> Self {
        Self::new()
            .with_fixed_tpm()
            .with_fixed_parent()
            .with_sensitive_data_origin()
            .with_user_with_auth()
            .with_no_da()
            .with_restricted()
            .with_sign_encrypt()
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn fixed_tpm(self) -> bool {
        self.contains(Self::FIXED_TPM)
    }

    pub fn fixed_parent(self) -> bool {
        self.contains(Self::FIXED_PARENT)
    }

    pub fn sensitive_data_origin(self) -> bool {
        self.contains(Self::SENSITIVE_DATA_ORIGIN)
    }

    pub fn restricted(self) -> bool {
        self.contains(Self::RESTRICTED)
    }

    pub fn with_fixed_tpm(mut self) -> Self {
        self.0 |= Self::FIXED_TPM;
        self
    }

    pub fn with_fixed_parent(mut self) -> Self {
        self.0 |= Self::FIXED_PARENT;
        self
    }

    pub fn with_sensitive_data_origin(mut self) -> Self {
        self.0 |= Self::SENSITIVE_DATA_ORIGIN;
        self
    }

    pub fn with_user_with_auth(mut self) -> Self {
        self.0 |= Self::USER_WITH_AUTH;
        self
    }

    pub fn with_no_da(mut self) -> Self {
        self.0 |= Self::NO_DA;
        self
    }

    pub fn with_restricted(mut self) -> Self {
        self.0 |= Self::RESTRICTED;
        self
    }

    pub fn with_sign_encrypt(mut self) -> Self {
        self.0 |= Self::SIGN_ENCRYPT;
        self
    }

    pub fn without(mut self, flag: u32) -> Self {
        self.0 &= !flag;
        self
    }
}

/// ECC Curve IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmEccCurve {
    None = 0x0000,
    NistP192 = 0x0001,
    NistP224 = 0x0002,
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
    BnP256 = 0x0010,
    BnP638 = 0x0011,
    Sm2P256 = 0x0020,
}

impl TpmEccCurve {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0000 => Some(TpmEccCurve::None),
            0x0001 => Some(TpmEccCurve::NistP192),
            0x0002 => Some(TpmEccCurve::NistP224),
            0x0003 => Some(TpmEccCurve::NistP256),
            0x0004 => Some(TpmEccCurve::NistP384),
            0x0005 => Some(TpmEccCurve::NistP521),
            0x0010 => Some(TpmEccCurve::BnP256),
            0x0011 => Some(TpmEccCurve::BnP638),
            0x0020 => Some(TpmEccCurve::Sm2P256),
            _ => None,
        }
    }
}

/// TPM 1.2 constants used by `TPM_PUBKEY` and the identity activation blobs
pub mod tpm12 {
    pub const ALG_RSA: u32 = 0x0000_0001;
    pub const ALG_AES128: u32 = 0x0000_0006;

    pub const ES_NONE: u16 = 0x0001;
    pub const ES_SYM_CBC_PKCS5PAD: u16 = 0x00ff;

    pub const SS_NONE: u16 = 0x0001;
    pub const SS_RSASSAPKCS1V15_SHA1: u16 = 0x0002;
}
