// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Signature verification with a TPM 2.0 public area
//!
//! The digest algorithm is taken from the key's signing scheme, never from
//! the signature: a restricted key only signs with the scheme it was created
//! with.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::{ecdsa as p256_ecdsa, NistP256};
use p384::{ecdsa as p384_ecdsa, NistP384};
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;
use tpm_codec::{TpmAlgId, TpmtPublic, TpmtPublicParms, TpmtSignature};
use tracing::{debug, warn};

use crate::keys::{field_bytes, PublicKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{key:?} key cannot verify a {signature:?} signature")]
    AlgorithmMismatch { key: TpmAlgId, signature: TpmAlgId },
    #[error("signature scheme {0:?} not supported")]
    UnsupportedScheme(TpmAlgId),
    #[error("ECC curve 0x{0:04x} not supported")]
    UnsupportedCurve(u16),
    #[error("public key of alg {0:?} not supported")]
    UnsupportedKey(TpmAlgId),
    #[error("key has no usable signing hash ({0:?})")]
    UnsupportedHash(Option<TpmAlgId>),
    #[error("malformed public key: {0}")]
    MalformedKey(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature does not match")]
    BadSignature,
}

/// Verify `signature` over `message` with the key described by `key`
pub fn verify_signature(
    key: &TpmtPublic,
    message: &[u8],
    signature: &TpmtSignature,
) -> Result<(), VerifyError> {
    let hash_alg = signing_hash(key)?;
    let digest = hash_alg
        .hash(message)
        .map_err(|_| VerifyError::UnsupportedHash(Some(hash_alg)))?;
    debug!(
        "message ({} bytes) {hash_alg:?} digest: {}",
        message.len(),
        hex::encode(&digest)
    );

    match (PublicKey::from_tpmt_public(key)?, signature) {
        (
            PublicKey::Rsa(rsa_key),
            TpmtSignature::Rsa {
                scheme, signature, ..
            },
        ) => {
            if *scheme != TpmAlgId::RsaSsa {
                return Err(VerifyError::UnsupportedScheme(*scheme));
            }
            match rsa_key.verify(pkcs1v15(hash_alg)?, &digest, signature) {
                Ok(()) => {
                    debug!("RSA signature verification successful");
                    Ok(())
                }
                Err(e) => {
                    warn!("RSA signature verification failed: {e}");
                    Err(VerifyError::BadSignature)
                }
            }
        }
        (PublicKey::Ecc(ecc_key), TpmtSignature::Ecdsa { r, s, .. }) => {
            let (Some(r), Some(s)) = (field_bytes::<NistP256>(r), field_bytes::<NistP256>(s))
            else {
                return Err(VerifyError::MalformedSignature(
                    "ECDSA scalar longer than the P-256 order".into(),
                ));
            };
            let signature = p256_ecdsa::Signature::from_scalars(r, s)
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            ecdsa_outcome(
                p256_ecdsa::VerifyingKey::from(&ecc_key).verify_prehash(&digest, &signature),
            )
        }
        (PublicKey::EccP384(ecc_key), TpmtSignature::Ecdsa { r, s, .. }) => {
            let (Some(r), Some(s)) = (field_bytes::<NistP384>(r), field_bytes::<NistP384>(s))
            else {
                return Err(VerifyError::MalformedSignature(
                    "ECDSA scalar longer than the P-384 order".into(),
                ));
            };
            let signature = p384_ecdsa::Signature::from_scalars(r, s)
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            ecdsa_outcome(
                p384_ecdsa::VerifyingKey::from(&ecc_key).verify_prehash(&digest, &signature),
            )
        }
        (key, signature) => Err(VerifyError::AlgorithmMismatch {
            key: key.algorithm(),
            signature: signature.sig_alg(),
        }),
    }
}

fn ecdsa_outcome(result: Result<(), p256_ecdsa::signature::Error>) -> Result<(), VerifyError> {
    match result {
        Ok(()) => {
            debug!("ECC signature verification successful");
            Ok(())
        }
        Err(e) => {
            warn!("ECC signature verification failed: {e}");
            Err(VerifyError::BadSignature)
        }
    }
}

fn signing_hash(key: &TpmtPublic) -> Result<TpmAlgId, VerifyError> {
    let hash_alg = match &key.parameters {
        TpmtPublicParms::Rsa(parms) => parms.scheme.hash_alg,
        TpmtPublicParms::Ecc(parms) => parms.scheme.hash_alg,
        _ => return Err(VerifyError::UnsupportedKey(key.type_alg)),
    };
    match hash_alg {
        Some(alg) if alg.is_hash() => Ok(alg),
        other => Err(VerifyError::UnsupportedHash(other)),
    }
}

fn pkcs1v15(hash_alg: TpmAlgId) -> Result<Pkcs1v15Sign, VerifyError> {
    match hash_alg {
        TpmAlgId::Sha1 => Ok(Pkcs1v15Sign::new::<Sha1>()),
        TpmAlgId::Sha256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        TpmAlgId::Sha384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        TpmAlgId::Sha512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        other => Err(VerifyError::UnsupportedHash(Some(other))),
    }
}
