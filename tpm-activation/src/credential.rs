// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 credential sealing (`TPM2_MakeCredential` performed off-TPM)
//!
//! The credential can only be recovered by `TPM2_ActivateCredential` on the
//! TPM holding both the EK private key and the object whose Name it is bound
//! to.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes256};
use p256::elliptic_curve::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use p256::elliptic_curve::{
    AffinePoint, CurveArithmetic, FieldBytes, FieldBytesSize, NonZeroScalar,
    PublicKey as EcPublicKey,
};
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tpm_codec::{CommandBuffer, Marshal, TpmAlgId, TpmtHa};
use tracing::debug;

use crate::error::{ActivationError, Result};
use crate::kdf::{hmac, kdfa, kdfe};
use crate::keys::PublicKey;
use crate::rng::FallibleRng;

pub const LABEL_IDENTITY: &str = "IDENTITY";
pub const LABEL_STORAGE: &str = "STORAGE";
pub const LABEL_INTEGRITY: &str = "INTEGRITY";

/// Seal `secret` to the object named `name`, protected by `ek`
///
/// `sym_block_size` is the size in bytes of the EK's symmetric key; the seed
/// of an RSA EK and the derived storage key both have this size.
///
/// Returns `(credential_blob, encrypted_secret)`, both `TPM2B`-framed and
/// ready for `TPM2_ActivateCredential`.
pub fn make_credential<R: CryptoRng + RngCore>(
    name: &TpmtHa,
    ek: &PublicKey,
    sym_block_size: usize,
    secret: &[u8],
    rng: &mut R,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let hash_alg = name.hash_alg;
    let digest_size = hash_alg.digest_size();
    if digest_size == 0 {
        return Err(ActivationError::Challenge(format!(
            "name algorithm {hash_alg:?} is not a hash"
        )));
    }
    if secret.len() > digest_size {
        return Err(ActivationError::Challenge(format!(
            "secret of {} bytes is longer than the {hash_alg:?} digest",
            secret.len()
        )));
    }
    let name_encoded = name.to_bytes();

    let (seed, encrypted_seed) = match ek {
        PublicKey::Rsa(ek) => rsa_seed(hash_alg, ek, sym_block_size, rng)?,
        PublicKey::Ecc(ek) => ecc_seed(hash_alg, ek, rng)?,
        PublicKey::EccP384(ek) => ecc_seed(hash_alg, ek, rng)?,
    };

    let sym_key = kdfa(
        hash_alg,
        &seed,
        LABEL_STORAGE,
        &name_encoded,
        &[],
        (sym_block_size * 8) as u32,
    )?;
    let mut enc_identity = {
        let mut cv = CommandBuffer::new();
        cv.put_tpm2b(secret);
        cv.into_vec()
    };
    cfb_encrypt(&sym_key, &mut enc_identity)?;

    let hmac_key = kdfa(
        hash_alg,
        &seed,
        LABEL_INTEGRITY,
        &[],
        &[],
        (digest_size * 8) as u32,
    )?;
    let integrity = hmac(hash_alg, &hmac_key, &[&enc_identity, &name_encoded])?;

    let mut id_object = CommandBuffer::new();
    id_object.put_tpm2b(&integrity);
    id_object.put_bytes(&enc_identity);

    let mut credential = CommandBuffer::new();
    credential.put_tpm2b(id_object.as_bytes());
    let mut encrypted_secret = CommandBuffer::new();
    encrypted_secret.put_tpm2b(&encrypted_seed);

    debug!(
        "sealed credential to {} EK: {} bytes, encrypted seed {} bytes",
        ek.type_name(),
        credential.len(),
        encrypted_secret.len()
    );
    Ok((credential.into_vec(), encrypted_secret.into_vec()))
}

fn rsa_seed<R: CryptoRng + RngCore>(
    hash_alg: TpmAlgId,
    ek: &RsaPublicKey,
    seed_len: usize,
    rng: &mut R,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut seed = vec![0u8; seed_len];
    rng.try_fill_bytes(&mut seed)
        .map_err(ActivationError::Randomness)?;
    let mut oaep_rng = FallibleRng::new(rng);
    let encrypted = ek
        .encrypt(&mut oaep_rng, identity_oaep(hash_alg)?, &seed)
        .map_err(|e| ActivationError::Challenge(format!("encrypting seed to the EK: {e}")))?;
    let encrypted = oaep_rng.check(encrypted)?;
    Ok((seed, encrypted))
}

fn identity_oaep(hash_alg: TpmAlgId) -> Result<Oaep> {
    let label = format!("{LABEL_IDENTITY}\0");
    match hash_alg {
        TpmAlgId::Sha1 => Ok(Oaep::new_with_label::<Sha1, _>(label)),
        TpmAlgId::Sha256 => Ok(Oaep::new_with_label::<Sha256, _>(label)),
        TpmAlgId::Sha384 => Ok(Oaep::new_with_label::<Sha384, _>(label)),
        TpmAlgId::Sha512 => Ok(Oaep::new_with_label::<Sha512, _>(label)),
        other => Err(ActivationError::Challenge(format!(
            "{other:?} cannot be used for OAEP"
        ))),
    }
}

fn ecc_seed<C, R>(
    hash_alg: TpmAlgId,
    ek: &EcPublicKey<C>,
    rng: &mut R,
) -> Result<(Vec<u8>, Vec<u8>)>
where
    C: CurveArithmetic,
    FieldBytesSize<C>: ModulusSize,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    R: CryptoRng + RngCore,
{
    let ephemeral = ephemeral_scalar::<C, R>(rng)?;
    let ephemeral_point = EcPublicKey::<C>::from_secret_scalar(&ephemeral).to_encoded_point(false);
    let ek_point = ek.to_encoded_point(false);
    let (Some(ephemeral_x), Some(ephemeral_y), Some(ek_x)) =
        (ephemeral_point.x(), ephemeral_point.y(), ek_point.x())
    else {
        return Err(ActivationError::Challenge("ECC point at infinity".into()));
    };

    let shared = diffie_hellman(ephemeral, ek.as_affine());
    let seed = kdfe(
        hash_alg,
        shared.raw_secret_bytes(),
        LABEL_IDENTITY,
        ephemeral_x,
        ek_x,
        (hash_alg.digest_size() * 8) as u32,
    )?;

    // TPMS_ECC_POINT
    let mut point = CommandBuffer::new();
    point.put_tpm2b(ephemeral_x);
    point.put_tpm2b(ephemeral_y);
    Ok((seed, point.into_vec()))
}

/// Draw a scalar in `[1, n)`, redrawing out-of-range candidates
fn ephemeral_scalar<C, R>(rng: &mut R) -> Result<NonZeroScalar<C>>
where
    C: CurveArithmetic,
    R: CryptoRng + RngCore,
{
    loop {
        let mut repr = FieldBytes::<C>::default();
        rng.try_fill_bytes(&mut repr)
            .map_err(ActivationError::Randomness)?;
        if let Some(scalar) = Option::<NonZeroScalar<C>>::from(NonZeroScalar::<C>::from_repr(repr))
        {
            return Ok(scalar);
        }
    }
}

fn cfb_encrypt(key: &[u8], buf: &mut [u8]) -> Result<()> {
    let iv = [0u8; 16];
    let invalid =
        |e: aes::cipher::InvalidLength| ActivationError::Challenge(format!("AES-CFB key: {e}"));
    match key.len() {
        16 => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .encrypt(buf),
        32 => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .encrypt(buf),
        n => {
            return Err(ActivationError::Challenge(format!(
                "no AES variant with a {n}-byte key"
            )))
        }
    }
    Ok(())
}
