// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 1.2 identity activation blobs (`TPM_ActivateIdentity`)
//!
//! The EK-encrypted part is a `TPM_ASYM_CA_CONTENTS` carrying a fresh
//! AES-128 key and the SHA-1 of the identity key; the secret itself travels
//! AES-CBC encrypted in a `TPM_SYM_CA_ATTESTATION`.

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPublicKey};
use sha1::{Digest, Sha1};
use tpm_codec::tpm12::{ALG_AES128, ES_SYM_CBC_PKCS5PAD, SS_NONE};
use tpm_codec::CommandBuffer;
use tpm_types::EncryptedCredential;
use tracing::debug;

use crate::error::{ActivationError, Result};
use crate::rng::FallibleRng;

const AES_KEY_SIZE: usize = 16;
const AES_BLOCK_SIZE: usize = 16;
const OAEP_LABEL: &str = "TCPA";

/// Size of a `TPM_SYMMETRIC_KEY_PARMS` that carries no IV
const PARM_SIZE: u32 = 12;

/// Challenge in the format `TPM_ActivateIdentity` consumes
pub fn generate_challenge<R: CryptoRng + RngCore>(
    rng: &mut R,
    ek: &RsaPublicKey,
    ak_public: &[u8],
    secret: &[u8],
) -> Result<EncryptedCredential> {
    let sealed = seal(rng, ek, ak_public, secret)?;

    let mut sym = CommandBuffer::new();
    sym.put_u32((sealed.iv.len() + sealed.ciphertext.len()) as u32);
    put_key_parms(&mut sym, PARM_SIZE);
    sym.put_u32(0);
    sym.put_bytes(&sealed.iv);
    sym.put_bytes(&sealed.ciphertext);

    debug!("generated TPM 1.2 challenge");
    Ok(EncryptedCredential {
        credential: sealed.asymmetric,
        secret: sym.into_vec(),
    })
}

/// Challenge in the format the TrouSerS daemon expects: the IV is carried
/// in the key parameters instead of in front of the ciphertext
pub fn generate_tcsd_challenge<R: CryptoRng + RngCore>(
    rng: &mut R,
    ek: &RsaPublicKey,
    ak_public: &[u8],
    secret: &[u8],
) -> Result<EncryptedCredential> {
    let sealed = seal(rng, ek, ak_public, secret)?;

    let mut sym = CommandBuffer::new();
    sym.put_u32(sealed.ciphertext.len() as u32);
    put_key_parms(&mut sym, PARM_SIZE + AES_BLOCK_SIZE as u32);
    sym.put_u32(AES_BLOCK_SIZE as u32);
    sym.put_bytes(&sealed.iv);
    sym.put_bytes(&sealed.ciphertext);

    debug!("generated TPM 1.2 challenge (TCSD format)");
    Ok(EncryptedCredential {
        credential: sealed.asymmetric,
        secret: sym.into_vec(),
    })
}

struct Sealed {
    asymmetric: Vec<u8>,
    iv: [u8; AES_BLOCK_SIZE],
    ciphertext: Vec<u8>,
}

fn seal<R: CryptoRng + RngCore>(
    rng: &mut R,
    ek: &RsaPublicKey,
    ak_public: &[u8],
    secret: &[u8],
) -> Result<Sealed> {
    let mut aes_key = [0u8; AES_KEY_SIZE];
    let mut iv = [0u8; AES_BLOCK_SIZE];
    rng.try_fill_bytes(&mut aes_key)
        .map_err(ActivationError::Randomness)?;
    rng.try_fill_bytes(&mut iv)
        .map_err(ActivationError::Randomness)?;

    // TPM_ASYM_CA_CONTENTS: TPM_SYMMETRIC_KEY || TPM_DIGEST
    let mut contents = CommandBuffer::new();
    contents.put_u32(ALG_AES128);
    contents.put_u16(ES_SYM_CBC_PKCS5PAD);
    contents.put_u16(AES_KEY_SIZE as u16);
    contents.put_bytes(&aes_key);
    contents.put_bytes(&Sha1::digest(ak_public));

    let mut oaep_rng = FallibleRng::new(rng);
    let asymmetric = ek
        .encrypt(
            &mut oaep_rng,
            Oaep::new_with_label::<Sha1, _>(OAEP_LABEL),
            contents.as_bytes(),
        )
        .map_err(|e| ActivationError::Challenge(format!("encrypting to the EK: {e}")))?;
    let asymmetric = oaep_rng.check(asymmetric)?;

    let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(&aes_key, &iv)
        .map_err(|e| ActivationError::Challenge(format!("AES-CBC key: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(secret);

    Ok(Sealed {
        asymmetric,
        iv,
        ciphertext,
    })
}

/// `TPM_KEY_PARMS` header followed by the fixed part of `TPM_SYMMETRIC_KEY_PARMS`
fn put_key_parms(buf: &mut CommandBuffer, parm_size: u32) {
    buf.put_u32(ALG_AES128);
    buf.put_u16(ES_SYM_CBC_PKCS5PAD);
    buf.put_u16(SS_NONE);
    buf.put_u32(parm_size);
    buf.put_u32((AES_KEY_SIZE * 8) as u32);
    buf.put_u32((AES_BLOCK_SIZE * 8) as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockDecryptMut;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPrivateKey;
    use tpm_codec::{Marshal, ResponseBuffer, Tpm12PubKey};

    const SECRET: [u8; 32] = [0x3c; 32];

    fn ek() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(include_str!("../samples/ek-rsa2048.pem")).unwrap()
    }

    fn ak_public() -> Vec<u8> {
        Tpm12PubKey::rsa_identity_key(vec![0xa5; 256]).to_bytes()
    }

    /// Recover the AES key from the asymmetric blob, checking its layout
    fn open_asymmetric(ek: &RsaPrivateKey, blob: &[u8], ak_public: &[u8]) -> Vec<u8> {
        let contents = ek
            .decrypt(Oaep::new_with_label::<Sha1, _>("TCPA"), blob)
            .unwrap();
        assert_eq!(contents.len(), 8 + 16 + 20);
        assert_eq!(&contents[..8], &[0, 0, 0, 6, 0, 0xff, 0, 0x10]);
        assert_eq!(&contents[24..], Sha1::digest(ak_public).as_slice());
        contents[8..24].to_vec()
    }

    fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .unwrap()
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .unwrap()
    }

    #[test]
    fn test_standard_format() {
        let ek = ek();
        let ak = ak_public();
        let challenge = generate_challenge(
            &mut StdRng::seed_from_u64(12),
            &ek.to_public_key(),
            &ak,
            &SECRET,
        )
        .unwrap();
        let key = open_asymmetric(&ek, &challenge.credential, &ak);

        let mut rd = ResponseBuffer::new(&challenge.secret);
        let cred_size = rd.get_u32().unwrap() as usize;
        assert_eq!(
            rd.get_bytes(20).unwrap(),
            [
                0x00, 0x00, 0x00, 0x06, // TPM_ALG_AES128
                0x00, 0xff, // TPM_ES_SYM_CBC_PKCS5PAD
                0x00, 0x01, // TPM_SS_NONE
                0x00, 0x00, 0x00, 0x0c, // parmSize
                0x00, 0x00, 0x00, 0x80, // keyLength
                0x00, 0x00, 0x00, 0x80, // blockSize
            ]
        );
        assert_eq!(rd.get_u32().unwrap(), 0);
        let iv = rd.get_bytes(16).unwrap();
        let ciphertext = rd.get_remaining();
        // 32 bytes of secret plus a full padding block
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(cred_size, 16 + 48);
        assert_eq!(decrypt(&key, &iv, &ciphertext), SECRET);
    }

    #[test]
    fn test_tcsd_format() {
        let ek = ek();
        let ak = ak_public();
        let challenge = generate_tcsd_challenge(
            &mut StdRng::seed_from_u64(12),
            &ek.to_public_key(),
            &ak,
            &SECRET,
        )
        .unwrap();
        let key = open_asymmetric(&ek, &challenge.credential, &ak);

        let mut rd = ResponseBuffer::new(&challenge.secret);
        let cred_size = rd.get_u32().unwrap() as usize;
        rd.skip(8).unwrap();
        assert_eq!(rd.get_u32().unwrap(), 28);
        assert_eq!(rd.get_u32().unwrap(), 128);
        assert_eq!(rd.get_u32().unwrap(), 128);
        assert_eq!(rd.get_u32().unwrap(), 16);
        let iv = rd.get_bytes(16).unwrap();
        let ciphertext = rd.get_remaining();
        assert_eq!(cred_size, ciphertext.len());
        assert_eq!(decrypt(&key, &iv, &ciphertext), SECRET);
    }

    #[test]
    fn test_reproducible_with_seeded_rng() {
        let ek = ek().to_public_key();
        let ak = ak_public();
        let a = generate_challenge(&mut StdRng::seed_from_u64(99), &ek, &ak, &SECRET).unwrap();
        let b = generate_challenge(&mut StdRng::seed_from_u64(99), &ek, &ak, &SECRET).unwrap();
        assert_eq!(a, b);

        let c = generate_challenge(&mut StdRng::seed_from_u64(100), &ek, &ak, &SECRET).unwrap();
        assert_ne!(a.secret, c.secret);
    }

    #[test]
    fn test_formats_share_key_material() {
        let ek = ek();
        let ak = ak_public();
        let standard =
            generate_challenge(&mut StdRng::seed_from_u64(5), &ek.to_public_key(), &ak, &SECRET)
                .unwrap();
        let tcsd = generate_tcsd_challenge(
            &mut StdRng::seed_from_u64(5),
            &ek.to_public_key(),
            &ak,
            &SECRET,
        )
        .unwrap();
        assert_eq!(standard.credential, tcsd.credential);
        // same IV and ciphertext, different framing
        assert_eq!(standard.secret[28..], tcsd.secret[28..]);
    }
}
