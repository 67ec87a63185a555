// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM key derivation functions
//!
//! - `KDFa`: SP800-108 counter mode with HMAC, used to derive the storage
//!   and integrity keys of a credential.
//! - `KDFe`: SP800-56A concatenation KDF, used to derive a seed from an
//!   ECDH shared secret.
//!
//! Both take the label without its NUL terminator and emit `bits` bits; when
//! `bits` is not a multiple of eight the excess high-order bits of the first
//! byte are cleared.

use hmac::{Mac, SimpleHmac};
use sha1::Sha1;
use sha2::digest::core_api::BlockSizeUser;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tpm_codec::TpmAlgId;

use crate::error::{ActivationError, Result};

/// HMAC of the concatenation of `parts` under `key`
pub fn hmac(hash_alg: TpmAlgId, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    fn run<D: Digest + BlockSizeUser>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(key)
            .map_err(|e| ActivationError::Challenge(format!("invalid HMAC key: {e}")))?;
        for part in parts {
            mac.update(part);
        }
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match hash_alg {
        TpmAlgId::Sha1 => run::<Sha1>(key, parts),
        TpmAlgId::Sha256 => run::<Sha256>(key, parts),
        TpmAlgId::Sha384 => run::<Sha384>(key, parts),
        TpmAlgId::Sha512 => run::<Sha512>(key, parts),
        other => Err(ActivationError::Challenge(format!(
            "{other:?} cannot be used for HMAC"
        ))),
    }
}

pub fn kdfa(
    hash_alg: TpmAlgId,
    key: &[u8],
    label: &str,
    context_u: &[u8],
    context_v: &[u8],
    bits: u32,
) -> Result<Vec<u8>> {
    expand(bits, |counter| {
        hmac(
            hash_alg,
            key,
            &[
                &counter.to_be_bytes(),
                label.as_bytes(),
                &[0],
                context_u,
                context_v,
                &bits.to_be_bytes(),
            ],
        )
    })
}

pub fn kdfe(
    hash_alg: TpmAlgId,
    z: &[u8],
    label: &str,
    party_u: &[u8],
    party_v: &[u8],
    bits: u32,
) -> Result<Vec<u8>> {
    expand(bits, |counter| {
        hash_alg
            .hash_parts(&[
                &counter.to_be_bytes(),
                z,
                label.as_bytes(),
                &[0],
                party_u,
                party_v,
            ])
            .map_err(|e| ActivationError::Challenge(e.to_string()))
    })
}

fn expand(bits: u32, mut block: impl FnMut(u32) -> Result<Vec<u8>>) -> Result<Vec<u8>> {
    let len = bits.div_ceil(8) as usize;
    let mut out = Vec::with_capacity(len);
    let mut counter = 1u32;
    while out.len() < len {
        out.extend_from_slice(&block(counter)?);
        counter += 1;
    }
    out.truncate(len);
    if bits % 8 != 0 {
        out[0] &= (1 << (bits % 8)) - 1;
    }
    Ok(out)
}
