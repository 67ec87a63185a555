// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 1.2 public key structure

use crate::constants::tpm12::*;
use crate::error::{malformed, unsupported, Result};
use crate::marshal::*;

/// TPM_RSA_KEY_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tpm12RsaKeyParms {
    pub key_length: u32,
    pub num_primes: u32,
    /// Empty means the default exponent 65537
    pub exponent: Vec<u8>,
}

/// TPM_PUBKEY - TPM 1.2 public key, as returned for an identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tpm12PubKey {
    pub algorithm_id: u32,
    pub enc_scheme: u16,
    pub sig_scheme: u16,
    pub rsa_parms: Tpm12RsaKeyParms,
    pub modulus: Vec<u8>,
}

impl Tpm12PubKey {
    /// An RSA identity key (PKCS#1 v1.5 SHA-1 signatures) with the given modulus
    pub fn rsa_identity_key(modulus: Vec<u8>) -> Self {
        Self {
            algorithm_id: ALG_RSA,
            enc_scheme: ES_NONE,
            sig_scheme: SS_RSASSAPKCS1V15_SHA1,
            rsa_parms: Tpm12RsaKeyParms {
                key_length: (modulus.len() * 8) as u32,
                num_primes: 2,
                exponent: Vec::new(),
            },
            modulus,
        }
    }

    /// Size of the modulus in bits, counted in whole bytes after leading
    /// zero bytes are stripped
    pub fn bit_len(&self) -> usize {
        let first = self
            .modulus
            .iter()
            .position(|&b| b != 0)
            .unwrap_or(self.modulus.len());
        (self.modulus.len() - first) * 8
    }
}

impl Marshal for Tpm12PubKey {
    fn marshal(&self, buf: &mut CommandBuffer) {
        let mut parms = CommandBuffer::new();
        parms.put_u32(self.rsa_parms.key_length);
        parms.put_u32(self.rsa_parms.num_primes);
        parms.put_u32(self.rsa_parms.exponent.len() as u32);
        parms.put_bytes(&self.rsa_parms.exponent);

        buf.put_u32(self.algorithm_id);
        buf.put_u16(self.enc_scheme);
        buf.put_u16(self.sig_scheme);
        buf.put_u32(parms.len() as u32);
        buf.put_bytes(parms.as_bytes());
        buf.put_u32(self.modulus.len() as u32);
        buf.put_bytes(&self.modulus);
    }
}

impl Unmarshal for Tpm12PubKey {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let algorithm_id = buf.get_u32()?;
        let enc_scheme = buf.get_u16()?;
        let sig_scheme = buf.get_u16()?;
        let parms = buf.get_sized_u32()?;
        if algorithm_id != ALG_RSA {
            unsupported!("TPM 1.2 key algorithm 0x{algorithm_id:08x}");
        }

        let mut parms_buf = ResponseBuffer::new(&parms);
        let key_length = parms_buf.get_u32()?;
        let num_primes = parms_buf.get_u32()?;
        let exponent = parms_buf.get_sized_u32()?;
        parms_buf.finish()?;
        if exponent.len() > 4 {
            malformed!("RSA exponent of {} bytes", exponent.len());
        }

        let modulus = buf.get_sized_u32()?;
        if modulus.is_empty() {
            malformed!("empty RSA modulus");
        }

        Ok(Self {
            algorithm_id,
            enc_scheme,
            sig_scheme,
            rsa_parms: Tpm12RsaKeyParms {
                key_length,
                num_primes,
                exponent,
            },
            modulus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_layout() {
        let key = Tpm12PubKey::rsa_identity_key(vec![0x80; 256]);
        let bytes = key.to_bytes();
        assert_eq!(
            &bytes[..24],
            &[
                0x00, 0x00, 0x00, 0x01, // TPM_ALG_RSA
                0x00, 0x01, // TPM_ES_NONE
                0x00, 0x02, // TPM_SS_RSASSAPKCS1v15_SHA1
                0x00, 0x00, 0x00, 0x0c, // parmSize
                0x00, 0x00, 0x08, 0x00, // keyLength
                0x00, 0x00, 0x00, 0x02, // numPrimes
                0x00, 0x00, 0x00, 0x00, // exponentSize
            ]
        );
        assert_eq!(&bytes[24..28], &[0x00, 0x00, 0x01, 0x00]);

        let decoded = Tpm12PubKey::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.bit_len(), 2048);
        assert!(decoded.rsa_parms.exponent.is_empty());
    }

    #[test]
    fn test_bit_len_counts_whole_bytes() {
        let mut modulus = vec![0u8; 256];
        modulus[1] = 0x01;
        let key = Tpm12PubKey::rsa_identity_key(modulus);
        assert_eq!(key.bit_len(), 255 * 8);

        let mut modulus = vec![0xffu8; 256];
        modulus[0] = 0x7f;
        assert_eq!(Tpm12PubKey::rsa_identity_key(modulus).bit_len(), 2048);
        assert_eq!(Tpm12PubKey::rsa_identity_key(vec![0; 4]).bit_len(), 0);
    }

    #[test]
    fn test_reject_non_rsa() {
        let mut bytes = Tpm12PubKey::rsa_identity_key(vec![0x80; 128]).to_bytes();
        bytes[3] = 0x06;
        assert!(Tpm12PubKey::from_bytes(&bytes).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_truncated_modulus() {
        let bytes = Tpm12PubKey::rsa_identity_key(vec![0x80; 128]).to_bytes();
        assert!(Tpm12PubKey::from_bytes(&bytes[..100])
            .unwrap_err()
            .is_malformed());
    }
}
