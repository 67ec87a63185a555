// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Public keys of endorsement and attestation keys

use p256::elliptic_curve::sec1::{EncodedPoint, FromEncodedPoint, ModulusSize, ToEncodedPoint};
use p256::elliptic_curve::{
    AffinePoint, Curve, CurveArithmetic, FieldBytes, FieldBytesSize, PublicKey as EcPublicKey,
};
use p256::pkcs8::DecodePublicKey as _;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use tpm_codec::{TpmAlgId, TpmEccCurve, TpmtPublic, TpmtPublicParms, TpmtPublicUnique};
use tracing::debug;

use crate::verify::VerifyError;

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_SECP256R1: &str = "1.2.840.10045.3.1.7";
const OID_SECP384R1: &str = "1.3.132.0.34";

/// A public key of one of the supported algorithms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    /// NIST P-256
    Ecc(p256::PublicKey),
    /// NIST P-384
    EccP384(p384::PublicKey),
}

impl PublicKey {
    /// Decode a DER `SubjectPublicKeyInfo`
    pub fn from_public_key_der(der: &[u8]) -> Result<Self, VerifyError> {
        let spki = rsa::pkcs8::spki::SubjectPublicKeyInfoRef::try_from(der)
            .map_err(|e| VerifyError::MalformedKey(format!("invalid SubjectPublicKeyInfo: {e}")))?;
        let malformed = |e: rsa::pkcs8::spki::Error| VerifyError::MalformedKey(e.to_string());
        let oid = spki.algorithm.oid.to_string();
        match oid.as_str() {
            OID_RSA_ENCRYPTION => {
                let key = RsaPublicKey::from_public_key_der(der).map_err(malformed)?;
                debug!("decoded RSA public key ({} bits)", key.size() * 8);
                Ok(PublicKey::Rsa(key))
            }
            OID_EC_PUBLIC_KEY => {
                let curve = spki.algorithm.parameters_oid().map_err(malformed)?.to_string();
                match curve.as_str() {
                    OID_SECP256R1 => {
                        let key = p256::PublicKey::from_public_key_der(der).map_err(malformed)?;
                        debug!("decoded ECC P-256 public key");
                        Ok(PublicKey::Ecc(key))
                    }
                    OID_SECP384R1 => {
                        let key = p384::PublicKey::from_public_key_der(der).map_err(malformed)?;
                        debug!("decoded ECC P-384 public key");
                        Ok(PublicKey::EccP384(key))
                    }
                    _ => Err(VerifyError::MalformedKey(format!(
                        "unsupported named curve: {curve}"
                    ))),
                }
            }
            _ => Err(VerifyError::MalformedKey(format!(
                "unsupported public key algorithm: {oid}"
            ))),
        }
    }

    /// Decode a PEM `PUBLIC KEY` block
    pub fn from_public_key_pem(pem: &str) -> Result<Self, VerifyError> {
        let block = ::pem::parse(pem).map_err(|e| VerifyError::MalformedKey(e.to_string()))?;
        if block.tag() != "PUBLIC KEY" {
            return Err(VerifyError::MalformedKey(format!(
                "expected a PUBLIC KEY block, got {}",
                block.tag()
            )));
        }
        Self::from_public_key_der(block.contents())
    }

    /// Build the key described by a TPM 2.0 public area
    pub fn from_tpmt_public(public: &TpmtPublic) -> Result<Self, VerifyError> {
        match (&public.parameters, &public.unique) {
            (TpmtPublicParms::Rsa(parms), TpmtPublicUnique::Rsa(modulus)) => {
                let n = BigUint::from_bytes_be(modulus);
                let e = BigUint::from(parms.exponent());
                let key =
                    RsaPublicKey::new(n, e).map_err(|e| VerifyError::MalformedKey(e.to_string()))?;
                Ok(PublicKey::Rsa(key))
            }
            (TpmtPublicParms::Ecc(parms), TpmtPublicUnique::Ecc(x, y)) => match parms.curve() {
                Some(TpmEccCurve::NistP256) => Ok(PublicKey::Ecc(ecc_point(x, y, "P-256")?)),
                Some(TpmEccCurve::NistP384) => Ok(PublicKey::EccP384(ecc_point(x, y, "P-384")?)),
                _ => Err(VerifyError::UnsupportedCurve(parms.curve_id)),
            },
            _ => Err(VerifyError::UnsupportedKey(public.type_alg)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::Ecc(_) | PublicKey::EccP384(_) => "ECC",
        }
    }

    /// The TPM algorithm of this key
    pub fn algorithm(&self) -> TpmAlgId {
        match self {
            PublicKey::Rsa(_) => TpmAlgId::Rsa,
            PublicKey::Ecc(_) | PublicKey::EccP384(_) => TpmAlgId::Ecc,
        }
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        PublicKey::Rsa(key)
    }
}

impl From<p256::PublicKey> for PublicKey {
    fn from(key: p256::PublicKey) -> Self {
        PublicKey::Ecc(key)
    }
}

impl From<p384::PublicKey> for PublicKey {
    fn from(key: p384::PublicKey) -> Self {
        PublicKey::EccP384(key)
    }
}

/// Left-pad a big-endian integer to a field element of curve `C`
pub(crate) fn field_bytes<C: Curve>(v: &[u8]) -> Option<FieldBytes<C>> {
    let start = v.iter().position(|&b| b != 0).unwrap_or(v.len());
    let v = &v[start..];
    let mut out = FieldBytes::<C>::default();
    let size = out.len();
    if v.len() > size {
        return None;
    }
    out[size - v.len()..].copy_from_slice(v);
    Some(out)
}

fn ecc_point<C>(x: &[u8], y: &[u8], curve: &str) -> Result<EcPublicKey<C>, VerifyError>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
{
    let (Some(x), Some(y)) = (field_bytes::<C>(x), field_bytes::<C>(y)) else {
        return Err(VerifyError::MalformedKey(format!(
            "ECC coordinate longer than the {curve} field"
        )));
    };
    let point = EncodedPoint::<C>::from_affine_coordinates(&x, &y, false);
    Option::<EcPublicKey<C>>::from(EcPublicKey::<C>::from_encoded_point(&point))
        .ok_or_else(|| VerifyError::MalformedKey(format!("point is not on {curve}")))
}
