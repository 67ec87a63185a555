// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types

use crate::constants::*;
use crate::error::{malformed, unsupported, Result};
use crate::marshal::*;

/// TPM2B_DIGEST - Variable length digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bDigest {
    pub buffer: Vec<u8>,
}

impl Tpm2bDigest {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    pub fn empty() -> Self {
        Self { buffer: Vec::new() }
    }
}

impl Marshal for Tpm2bDigest {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.buffer);
    }
}

impl Unmarshal for Tpm2bDigest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPM2B_DATA - Variable length data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bData {
    pub buffer: Vec<u8>,
}

impl Tpm2bData {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    pub fn empty() -> Self {
        Self { buffer: Vec::new() }
    }
}

impl Marshal for Tpm2bData {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.buffer);
    }
}

impl Unmarshal for Tpm2bData {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPMT_HA - Hash value with algorithm
///
/// The marshalled form (`hashAlg || digest`) of an object's name alg and
/// public-area digest is the object's Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtHa {
    pub hash_alg: TpmAlgId,
    pub digest: Vec<u8>,
}

impl TpmtHa {
    pub fn new(hash_alg: TpmAlgId, digest: Vec<u8>) -> Self {
        Self { hash_alg, digest }
    }

    pub fn sha256(digest: Vec<u8>) -> Self {
        Self::new(TpmAlgId::Sha256, digest)
    }
}

impl Marshal for TpmtHa {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.hash_alg.to_u16());
        buf.put_bytes(&self.digest);
    }
}

impl Unmarshal for TpmtHa {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let hash_alg = TpmAlgId::parse(buf.get_u16()?)?;
        if !hash_alg.is_hash() {
            unsupported!("{hash_alg:?} is not a hash algorithm");
        }
        let digest = buf.get_bytes(hash_alg.digest_size())?;
        Ok(Self { hash_alg, digest })
    }
}

/// TPM2B_NAME - Name of an entity
///
/// Either a 4-byte handle or a `TPMT_HA` digest of the entity's public area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2bName {
    pub buffer: Vec<u8>,
}

impl Tpm2bName {
    pub fn new(data: Vec<u8>) -> Self {
        Self { buffer: data }
    }

    /// The digest form of the name; `None` for handle names or an
    /// unrecognised digest encoding.
    pub fn digest(&self) -> Option<TpmtHa> {
        if self.buffer.len() <= 4 {
            return None;
        }
        TpmtHa::from_bytes(&self.buffer).ok()
    }
}

impl Marshal for Tpm2bName {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_tpm2b(&self.buffer);
    }
}

impl Unmarshal for Tpm2bName {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPMS_PCR_SELECTION - PCR selection for a single hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>, // Bitmap of selected PCRs
}

impl TpmsPcrSelection {
    pub fn new(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        // At least 3 bytes for PCR 0-23
        let max_pcr = pcrs.iter().max().copied().unwrap_or(0);
        let size = ((max_pcr / 8) + 1).max(3) as usize;
        let mut pcr_select = vec![0u8; size];

        for &pcr in pcrs {
            let byte_idx = (pcr / 8) as usize;
            let bit_idx = pcr % 8;
            if byte_idx < pcr_select.len() {
                pcr_select[byte_idx] |= 1 << bit_idx;
            }
        }

        Self { hash, pcr_select }
    }
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.hash.to_u16());
        buf.put_u8(self.pcr_select.len() as u8);
        buf.put_bytes(&self.pcr_select);
    }
}

impl Unmarshal for TpmsPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let hash = TpmAlgId::parse(buf.get_u16()?)?;
        let size = buf.get_u8()? as usize;
        let pcr_select = buf.get_bytes(size)?;
        Ok(Self { hash, pcr_select })
    }
}

/// TPML_PCR_SELECTION - List of PCR selections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmlPcrSelection {
    pub pcr_selections: Vec<TpmsPcrSelection>,
}

impl TpmlPcrSelection {
    pub fn new(selections: Vec<TpmsPcrSelection>) -> Self {
        Self {
            pcr_selections: selections,
        }
    }

    pub fn single(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        Self {
            pcr_selections: vec![TpmsPcrSelection::new(hash, pcrs)],
        }
    }
}

impl Marshal for TpmlPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.pcr_selections.len() as u32);
        for sel in &self.pcr_selections {
            sel.marshal(buf);
        }
    }
}

impl Unmarshal for TpmlPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        // TPM2_NUM_PCR_BANKS is 16 on every TPM we know of
        if count > 16 {
            malformed!("too many PCR selections: {count}");
        }
        let mut pcr_selections = Vec::with_capacity(count);
        for _ in 0..count {
            pcr_selections.push(TpmsPcrSelection::unmarshal(buf)?);
        }
        Ok(Self { pcr_selections })
    }
}

/// TPMT_SYM_DEF_OBJECT - Symmetric algorithm definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl TpmtSymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }
}

impl Marshal for TpmtSymDef {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.algorithm.to_u16());
        if self.algorithm != TpmAlgId::Null {
            buf.put_u16(self.key_bits);
            buf.put_u16(self.mode.to_u16());
        }
    }
}

impl Unmarshal for TpmtSymDef {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let algorithm = TpmAlgId::parse(buf.get_u16()?)?;
        match algorithm {
            TpmAlgId::Null => Ok(Self::null()),
            TpmAlgId::Aes => {
                let key_bits = buf.get_u16()?;
                let mode = TpmAlgId::parse(buf.get_u16()?)?;
                Ok(Self {
                    algorithm,
                    key_bits,
                    mode,
                })
            }
            other => unsupported!("symmetric algorithm {other:?}"),
        }
    }
}

fn put_scheme(buf: &mut CommandBuffer, scheme: TpmAlgId, hash_alg: Option<TpmAlgId>) {
    buf.put_u16(scheme.to_u16());
    if let Some(hash) = hash_alg {
        buf.put_u16(hash.to_u16());
    }
}

/// TPMT_RSA_SCHEME - RSA signature/encryption scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtRsaScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl TpmtRsaScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }

    pub fn rsassa(hash: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::RsaSsa,
            hash_alg: Some(hash),
        }
    }
}

impl Marshal for TpmtRsaScheme {
    fn marshal(&self, buf: &mut CommandBuffer) {
        put_scheme(buf, self.scheme, self.hash_alg);
    }
}

impl Unmarshal for TpmtRsaScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let scheme = TpmAlgId::parse(buf.get_u16()?)?;
        let hash_alg = match scheme {
            TpmAlgId::Null | TpmAlgId::RsaEs => None,
            TpmAlgId::RsaSsa | TpmAlgId::RsaPss | TpmAlgId::Oaep => {
                Some(TpmAlgId::parse(buf.get_u16()?)?)
            }
            other => unsupported!("RSA scheme {other:?}"),
        };
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMT_ECC_SCHEME - ECC signature/key exchange scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtEccScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl TpmtEccScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }

    pub fn ecdsa(hash: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::EcDsa,
            hash_alg: Some(hash),
        }
    }
}

impl Marshal for TpmtEccScheme {
    fn marshal(&self, buf: &mut CommandBuffer) {
        put_scheme(buf, self.scheme, self.hash_alg);
    }
}

impl Unmarshal for TpmtEccScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let scheme = TpmAlgId::parse(buf.get_u16()?)?;
        let hash_alg = match scheme {
            TpmAlgId::Null => None,
            TpmAlgId::EcDsa | TpmAlgId::EcDh => Some(TpmAlgId::parse(buf.get_u16()?)?),
            other => unsupported!("ECC scheme {other:?}"),
        };
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMT_KDF_SCHEME - Key derivation scheme of an ECC key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtKdfScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl TpmtKdfScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }
}

impl Marshal for TpmtKdfScheme {
    fn marshal(&self, buf: &mut CommandBuffer) {
        put_scheme(buf, self.scheme, self.hash_alg);
    }
}

impl Unmarshal for TpmtKdfScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let scheme = TpmAlgId::parse(buf.get_u16()?)?;
        let hash_alg = match scheme {
            TpmAlgId::Null => None,
            TpmAlgId::Kdf1Sp80056a | TpmAlgId::Kdf1Sp800108 => {
                Some(TpmAlgId::parse(buf.get_u16()?)?)
            }
            other => unsupported!("KDF scheme {other:?}"),
        };
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMS_RSA_PARMS - RSA key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDef,
    pub scheme: TpmtRsaScheme,
    pub key_bits: u16,
    /// Zero means the default exponent 65537
    pub exponent: u32,
}

impl TpmsRsaParms {
    pub fn exponent(&self) -> u32 {
        if self.exponent == 0 {
            65537
        } else {
            self.exponent
        }
    }
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        self.symmetric.marshal(buf);
        self.scheme.marshal(buf);
        buf.put_u16(self.key_bits);
        buf.put_u32(self.exponent);
    }
}

impl Unmarshal for TpmsRsaParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            symmetric: TpmtSymDef::unmarshal(buf)?,
            scheme: TpmtRsaScheme::unmarshal(buf)?,
            key_bits: buf.get_u16()?,
            exponent: buf.get_u32()?,
        })
    }
}

/// TPMS_ECC_PARMS - ECC key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    pub symmetric: TpmtSymDef,
    pub scheme: TpmtEccScheme,
    /// Raw `TPMI_ECC_CURVE`; see [`TpmEccCurve::from_u16`]
    pub curve_id: u16,
    pub kdf: TpmtKdfScheme,
}

impl TpmsEccParms {
    pub fn curve(&self) -> Option<TpmEccCurve> {
        TpmEccCurve::from_u16(self.curve_id)
    }
}

impl Marshal for TpmsEccParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        self.symmetric.marshal(buf);
        self.scheme.marshal(buf);
        buf.put_u16(self.curve_id);
        self.kdf.marshal(buf);
    }
}

impl Unmarshal for TpmsEccParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            symmetric: TpmtSymDef::unmarshal(buf)?,
            scheme: TpmtEccScheme::unmarshal(buf)?,
            curve_id: buf.get_u16()?,
            kdf: TpmtKdfScheme::unmarshal(buf)?,
        })
    }
}

/// TPMS_KEYEDHASH_PARMS - Keyed hash parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsKeyedHashParms {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl Marshal for TpmsKeyedHashParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        put_scheme(buf, self.scheme, self.hash_alg);
    }
}

impl Unmarshal for TpmsKeyedHashParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let scheme = TpmAlgId::parse(buf.get_u16()?)?;
        let hash_alg = match scheme {
            TpmAlgId::Null => None,
            TpmAlgId::Hmac => Some(TpmAlgId::parse(buf.get_u16()?)?),
            other => unsupported!("keyed hash scheme {other:?}"),
        };
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMU_PUBLIC_PARMS - Public parameters union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublicParms {
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
    KeyedHash(TpmsKeyedHashParms),
    SymCipher(TpmtSymDef),
}

impl Marshal for TpmtPublicParms {
    fn marshal(&self, buf: &mut CommandBuffer) {
        match self {
            TpmtPublicParms::Rsa(p) => p.marshal(buf),
            TpmtPublicParms::Ecc(p) => p.marshal(buf),
            TpmtPublicParms::KeyedHash(p) => p.marshal(buf),
            TpmtPublicParms::SymCipher(p) => p.marshal(buf),
        }
    }
}

/// TPMU_PUBLIC_ID - Unique identifier union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublicUnique {
    Rsa(Vec<u8>),          // TPM2B_PUBLIC_KEY_RSA
    Ecc(Vec<u8>, Vec<u8>), // TPMS_ECC_POINT (x, y)
    KeyedHash(Vec<u8>),    // TPM2B_DIGEST
    SymCipher(Vec<u8>),    // TPM2B_DIGEST
}

impl Marshal for TpmtPublicUnique {
    fn marshal(&self, buf: &mut CommandBuffer) {
        match self {
            TpmtPublicUnique::Rsa(n) => buf.put_tpm2b(n),
            TpmtPublicUnique::Ecc(x, y) => {
                buf.put_tpm2b(x);
                buf.put_tpm2b(y);
            }
            TpmtPublicUnique::KeyedHash(d) | TpmtPublicUnique::SymCipher(d) => buf.put_tpm2b(d),
        }
    }
}

/// TPMT_PUBLIC - Public area of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: TpmaObject,
    pub auth_policy: Tpm2bDigest,
    pub parameters: TpmtPublicParms,
    pub unique: TpmtPublicUnique,
}

impl TpmtPublic {
    /// Template of a restricted RSASSA-SHA256 signing key with the given modulus
    pub fn rsa_attestation_key(modulus: Vec<u8>) -> Self {
        Self {
            type_alg: TpmAlgId::Rsa,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::attestation_key(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmtPublicParms::Rsa(TpmsRsaParms {
                symmetric: TpmtSymDef::null(),
                scheme: TpmtRsaScheme::rsassa(TpmAlgId::Sha256),
                key_bits: (modulus.len() * 8) as u16,
                exponent: 0,
            }),
            unique: TpmtPublicUnique::Rsa(modulus),
        }
    }

    /// Template of a restricted ECDSA-SHA256 signing key on NIST P-256
    pub fn ecc_attestation_key(x: Vec<u8>, y: Vec<u8>) -> Self {
        Self::ecc_attestation_key_on(TpmEccCurve::NistP256, TpmAlgId::Sha256, x, y)
    }

    /// ECDSA attestation key on `curve`, signing `hash_alg` digests
    pub fn ecc_attestation_key_on(
        curve: TpmEccCurve,
        hash_alg: TpmAlgId,
        x: Vec<u8>,
        y: Vec<u8>,
    ) -> Self {
        Self {
            type_alg: TpmAlgId::Ecc,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::attestation_key(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmtPublicParms::Ecc(TpmsEccParms {
                symmetric: TpmtSymDef::null(),
                scheme: TpmtEccScheme::ecdsa(hash_alg),
                curve_id: curve.to_u16(),
                kdf: TpmtKdfScheme::null(),
            }),
            unique: TpmtPublicUnique::Ecc(x, y),
        }
    }

    /// Compute the object's Name: `nameAlg || H_nameAlg(TPMT_PUBLIC)`
    pub fn name(&self) -> Result<TpmtHa> {
        let digest = self.name_alg.hash(&self.to_bytes())?;
        Ok(TpmtHa::new(self.name_alg, digest))
    }
}

impl Marshal for TpmtPublic {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.type_alg.to_u16());
        buf.put_u16(self.name_alg.to_u16());
        buf.put_u32(self.object_attributes.0);
        self.auth_policy.marshal(buf);
        self.parameters.marshal(buf);
        self.unique.marshal(buf);
    }
}

impl Unmarshal for TpmtPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let type_alg = TpmAlgId::parse(buf.get_u16()?)?;
        let name_alg = TpmAlgId::parse(buf.get_u16()?)?;
        let object_attributes = TpmaObject(buf.get_u32()?);
        let auth_policy = Tpm2bDigest::unmarshal(buf)?;
        let (parameters, unique) = match type_alg {
            TpmAlgId::Rsa => {
                let parms = TpmsRsaParms::unmarshal(buf)?;
                (
                    TpmtPublicParms::Rsa(parms),
                    TpmtPublicUnique::Rsa(buf.get_tpm2b()?),
                )
            }
            TpmAlgId::Ecc => {
                let parms = TpmsEccParms::unmarshal(buf)?;
                let x = buf.get_tpm2b()?;
                let y = buf.get_tpm2b()?;
                (TpmtPublicParms::Ecc(parms), TpmtPublicUnique::Ecc(x, y))
            }
            TpmAlgId::KeyedHash => {
                let parms = TpmsKeyedHashParms::unmarshal(buf)?;
                (
                    TpmtPublicParms::KeyedHash(parms),
                    TpmtPublicUnique::KeyedHash(buf.get_tpm2b()?),
                )
            }
            TpmAlgId::SymCipher => {
                let parms = TpmtSymDef::unmarshal(buf)?;
                (
                    TpmtPublicParms::SymCipher(parms),
                    TpmtPublicUnique::SymCipher(buf.get_tpm2b()?),
                )
            }
            other => unsupported!("public area of type {other:?}"),
        };
        Ok(Self {
            type_alg,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }
}
