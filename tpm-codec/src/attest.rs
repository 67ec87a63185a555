// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Creation data, attestation and signature structures

use crate::constants::*;
use crate::error::{malformed, unsupported, Result};
use crate::marshal::*;
use crate::types::*;

/// TPMS_CREATION_DATA - Parameters of the environment an object was created in
///
/// The TPM's `creationHash` is the name-alg digest of this structure in
/// marshalled form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCreationData {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
    pub locality: u8,
    pub parent_name_alg: u16,
    pub parent_name: Tpm2bName,
    pub parent_qualified_name: Tpm2bName,
    pub outside_info: Tpm2bData,
}

impl Marshal for TpmsCreationData {
    fn marshal(&self, buf: &mut CommandBuffer) {
        self.pcr_select.marshal(buf);
        self.pcr_digest.marshal(buf);
        buf.put_u8(self.locality);
        buf.put_u16(self.parent_name_alg);
        self.parent_name.marshal(buf);
        self.parent_qualified_name.marshal(buf);
        self.outside_info.marshal(buf);
    }
}

impl Unmarshal for TpmsCreationData {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            pcr_select: TpmlPcrSelection::unmarshal(buf)?,
            pcr_digest: Tpm2bDigest::unmarshal(buf)?,
            locality: buf.get_u8()?,
            parent_name_alg: buf.get_u16()?,
            parent_name: Tpm2bName::unmarshal(buf)?,
            parent_qualified_name: Tpm2bName::unmarshal(buf)?,
            outside_info: Tpm2bData::unmarshal(buf)?,
        })
    }
}

/// TPMS_CLOCK_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: u8,
}

impl Marshal for TpmsClockInfo {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u64(self.clock);
        buf.put_u32(self.reset_count);
        buf.put_u32(self.restart_count);
        buf.put_u8(self.safe);
    }
}

impl Unmarshal for TpmsClockInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            clock: buf.get_u64()?,
            reset_count: buf.get_u32()?,
            restart_count: buf.get_u32()?,
            safe: buf.get_u8()?,
        })
    }
}

/// TPMS_CREATION_INFO - Attested data of `TPM2_CertifyCreation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCreationInfo {
    pub object_name: Tpm2bName,
    pub creation_hash: Tpm2bDigest,
}

/// TPMS_QUOTE_INFO - Attested data of `TPM2_Quote`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsQuoteInfo {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
}

/// TPMS_CERTIFY_INFO - Attested data of `TPM2_Certify`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCertifyInfo {
    pub name: Tpm2bName,
    pub qualified_name: Tpm2bName,
}

/// TPMU_ATTEST - Attested data union, selected by the attestation tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuAttest {
    Creation(TpmsCreationInfo),
    Quote(TpmsQuoteInfo),
    Certify(TpmsCertifyInfo),
}

/// TPMS_ATTEST - Attestation structure signed by the TPM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub tag: TpmSt,
    pub qualified_signer: Tpm2bName,
    pub extra_data: Tpm2bData,
    pub clock_info: TpmsClockInfo,
    pub firmware_version: u64,
    pub attested: TpmuAttest,
}

impl TpmsAttest {
    pub fn creation_info(&self) -> Option<&TpmsCreationInfo> {
        match &self.attested {
            TpmuAttest::Creation(info) => Some(info),
            _ => None,
        }
    }
}

impl Marshal for TpmsAttest {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.magic);
        buf.put_u16(self.tag.to_u16());
        self.qualified_signer.marshal(buf);
        self.extra_data.marshal(buf);
        self.clock_info.marshal(buf);
        buf.put_u64(self.firmware_version);
        match &self.attested {
            TpmuAttest::Creation(info) => {
                info.object_name.marshal(buf);
                info.creation_hash.marshal(buf);
            }
            TpmuAttest::Quote(info) => {
                info.pcr_select.marshal(buf);
                info.pcr_digest.marshal(buf);
            }
            TpmuAttest::Certify(info) => {
                info.name.marshal(buf);
                info.qualified_name.marshal(buf);
            }
        }
    }
}

impl Unmarshal for TpmsAttest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let magic = buf.get_u32()?;
        let raw_tag = buf.get_u16()?;
        let Some(tag) = TpmSt::from_u16(raw_tag) else {
            malformed!("invalid attestation tag: 0x{raw_tag:04x}");
        };
        let qualified_signer = Tpm2bName::unmarshal(buf)?;
        let extra_data = Tpm2bData::unmarshal(buf)?;
        let clock_info = TpmsClockInfo::unmarshal(buf)?;
        let firmware_version = buf.get_u64()?;
        let attested = match tag {
            TpmSt::AttestCreation => TpmuAttest::Creation(TpmsCreationInfo {
                object_name: Tpm2bName::unmarshal(buf)?,
                creation_hash: Tpm2bDigest::unmarshal(buf)?,
            }),
            TpmSt::AttestQuote => TpmuAttest::Quote(TpmsQuoteInfo {
                pcr_select: TpmlPcrSelection::unmarshal(buf)?,
                pcr_digest: Tpm2bDigest::unmarshal(buf)?,
            }),
            TpmSt::AttestCertify => TpmuAttest::Certify(TpmsCertifyInfo {
                name: Tpm2bName::unmarshal(buf)?,
                qualified_name: Tpm2bName::unmarshal(buf)?,
            }),
            other => unsupported!("attestation type {other:?}"),
        };
        Ok(Self {
            magic,
            tag,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            attested,
        })
    }
}

/// TPMT_SIGNATURE - Algorithm-tagged signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtSignature {
    /// RSASSA or RSAPSS signature bytes
    Rsa {
        scheme: TpmAlgId,
        hash_alg: TpmAlgId,
        signature: Vec<u8>,
    },
    Ecdsa {
        hash_alg: TpmAlgId,
        r: Vec<u8>,
        s: Vec<u8>,
    },
    Null,
}

impl TpmtSignature {
    pub fn sig_alg(&self) -> TpmAlgId {
        match self {
            TpmtSignature::Rsa { scheme, .. } => *scheme,
            TpmtSignature::Ecdsa { .. } => TpmAlgId::EcDsa,
            TpmtSignature::Null => TpmAlgId::Null,
        }
    }
}

impl Marshal for TpmtSignature {
    fn marshal(&self, buf: &mut CommandBuffer) {
        match self {
            TpmtSignature::Rsa {
                scheme,
                hash_alg,
                signature,
            } => {
                buf.put_u16(scheme.to_u16());
                buf.put_u16(hash_alg.to_u16());
                buf.put_tpm2b(signature);
            }
            TpmtSignature::Ecdsa { hash_alg, r, s } => {
                buf.put_u16(TpmAlgId::EcDsa.to_u16());
                buf.put_u16(hash_alg.to_u16());
                buf.put_tpm2b(r);
                buf.put_tpm2b(s);
            }
            TpmtSignature::Null => buf.put_u16(TpmAlgId::Null.to_u16()),
        }
    }
}

impl Unmarshal for TpmtSignature {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let sig_alg = TpmAlgId::parse(buf.get_u16()?)?;
        match sig_alg {
            TpmAlgId::Null => Ok(TpmtSignature::Null),
            TpmAlgId::RsaSsa | TpmAlgId::RsaPss => Ok(TpmtSignature::Rsa {
                scheme: sig_alg,
                hash_alg: TpmAlgId::parse(buf.get_u16()?)?,
                signature: buf.get_tpm2b()?,
            }),
            TpmAlgId::EcDsa => Ok(TpmtSignature::Ecdsa {
                hash_alg: TpmAlgId::parse(buf.get_u16()?)?,
                r: buf.get_tpm2b()?,
                s: buf.get_tpm2b()?,
            }),
            other => unsupported!("signature algorithm {other:?}"),
        }
    }
}
