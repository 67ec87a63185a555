// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Software stand-ins for the device side of activation: an AK that signs its
//! own creation attestation, and an EK that opens the resulting challenge the
//! way `TPM2_ActivateCredential` / `TPM_ActivateIdentity` would.

#![allow(dead_code)]

use aes::cipher::{block_padding::Pkcs7, AsyncStreamCipher, BlockDecryptMut, KeyIvInit};
use aes::Aes128;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey as _;
use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore, SeedableRng};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};
use tpm_activation::credential::{LABEL_IDENTITY, LABEL_INTEGRITY, LABEL_STORAGE};
use tpm_activation::kdf::{hmac, kdfa, kdfe};
use tpm_activation::{AttestationParameters, EncryptedCredential, PublicKey, TPM_GENERATED_VALUE};
use tpm_codec::{
    Marshal, ResponseBuffer, Tpm12PubKey, Tpm2bData, Tpm2bDigest, Tpm2bName, TpmAlgId,
    TpmEccCurve, TpmSt, TpmlPcrSelection, TpmsAttest, TpmsClockInfo, TpmsCreationData, TpmsCreationInfo,
    TpmtPublic, TpmtSignature, TpmuAttest,
};

pub fn init_logging() {
    tracing_subscriber::fmt::try_init().ok();
}

/// Private half of an attestation key
pub enum AkSigner {
    Rsa(RsaPrivateKey),
    Ecc(SigningKey),
    EccP384(p384::ecdsa::SigningKey),
}

impl AkSigner {
    pub fn rsa() -> Self {
        let key = RsaPrivateKey::from_pkcs8_pem(include_str!("../../samples/ak-rsa2048.pem"))
            .expect("Failed to load RSA AK");
        AkSigner::Rsa(key)
    }

    pub fn ecc() -> Self {
        let key = p256::SecretKey::from_pkcs8_pem(include_str!("../../samples/ak-p256.pem"))
            .expect("Failed to load ECC AK");
        AkSigner::Ecc(SigningKey::from(&key))
    }

    pub fn p384() -> Self {
        let key = p384::SecretKey::from_pkcs8_pem(include_str!("../../samples/ak-p384.pem"))
            .expect("Failed to load P-384 AK");
        AkSigner::EccP384(p384::ecdsa::SigningKey::from(&key))
    }

    pub fn template(&self) -> TpmtPublic {
        match self {
            AkSigner::Rsa(key) => TpmtPublic::rsa_attestation_key(key.n().to_bytes_be()),
            AkSigner::Ecc(key) => {
                let point = p256::PublicKey::from(key.verifying_key()).to_encoded_point(false);
                let x = point.x().expect("identity point").to_vec();
                let y = point.y().expect("identity point").to_vec();
                TpmtPublic::ecc_attestation_key(x, y)
            }
            AkSigner::EccP384(key) => {
                let point = p384::PublicKey::from(key.verifying_key()).to_encoded_point(false);
                let x = point.x().expect("identity point").to_vec();
                let y = point.y().expect("identity point").to_vec();
                TpmtPublic::ecc_attestation_key_on(TpmEccCurve::NistP384, TpmAlgId::Sha384, x, y)
            }
        }
    }

    /// Sign `message` with the template's scheme hash, as a TPM signs with a
    /// restricted key
    pub fn sign(&self, message: &[u8]) -> TpmtSignature {
        let digest = Sha256::digest(message);
        match self {
            AkSigner::Rsa(key) => TpmtSignature::Rsa {
                scheme: TpmAlgId::RsaSsa,
                hash_alg: TpmAlgId::Sha256,
                signature: key
                    .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .expect("RSA signing failed"),
            },
            AkSigner::Ecc(key) => {
                let signature: p256::ecdsa::Signature =
                    key.sign_prehash(&digest).expect("ECDSA signing failed");
                let (r, s) = signature.split_bytes();
                TpmtSignature::Ecdsa {
                    hash_alg: TpmAlgId::Sha256,
                    r: r.to_vec(),
                    s: s.to_vec(),
                }
            }
            AkSigner::EccP384(key) => {
                let signature: p384::ecdsa::Signature = key
                    .sign_prehash(&Sha384::digest(message))
                    .expect("ECDSA signing failed");
                let (r, s) = signature.split_bytes();
                TpmtSignature::Ecdsa {
                    hash_alg: TpmAlgId::Sha384,
                    r: r.to_vec(),
                    s: s.to_vec(),
                }
            }
        }
    }
}

/// A freshly created AK together with the evidence `TPM2_Create` returns
///
/// Fields are public so tests can tamper with them before calling
/// [`AkFixture::params`].
pub struct AkFixture {
    pub signer: AkSigner,
    pub public: TpmtPublic,
    pub create_data: TpmsCreationData,
    pub attest: TpmsAttest,
}

impl AkFixture {
    pub fn new(signer: AkSigner) -> Self {
        let public = signer.template();
        let create_data = TpmsCreationData {
            pcr_select: TpmlPcrSelection::new(vec![]),
            pcr_digest: Tpm2bDigest::empty(),
            locality: 0,
            parent_name_alg: TpmAlgId::Sha256.to_u16(),
            parent_name: Tpm2bName::new(vec![0x81, 0x00, 0x00, 0x01]),
            parent_qualified_name: Tpm2bName::new(vec![0x81, 0x00, 0x00, 0x01]),
            outside_info: Tpm2bData::empty(),
        };
        let creation_hash = Sha256::digest(create_data.to_bytes()).to_vec();
        let name = public.name().expect("Failed to compute AK name");
        let attest = TpmsAttest {
            magic: TPM_GENERATED_VALUE,
            tag: TpmSt::AttestCreation,
            qualified_signer: Tpm2bName::new(vec![0x40, 0x00, 0x00, 0x07]),
            extra_data: Tpm2bData::empty(),
            clock_info: TpmsClockInfo {
                clock: 1_234_567,
                reset_count: 3,
                restart_count: 0,
                safe: 1,
            },
            firmware_version: 0x0001_0002_0003_0004,
            attested: TpmuAttest::Creation(TpmsCreationInfo {
                object_name: Tpm2bName::new(name.to_bytes()),
                creation_hash: Tpm2bDigest::new(creation_hash),
            }),
        };
        Self {
            signer,
            public,
            create_data,
            attest,
        }
    }

    /// Marshalled Name the credential is bound to
    pub fn name(&self) -> Vec<u8> {
        self.public
            .name()
            .expect("Failed to compute AK name")
            .to_bytes()
    }

    /// Re-bind the attestation to the current public area
    pub fn refresh_name(&mut self) {
        let name = Tpm2bName::new(self.name());
        self.creation_info_mut().object_name = name;
    }

    pub fn creation_info_mut(&mut self) -> &mut TpmsCreationInfo {
        match &mut self.attest.attested {
            TpmuAttest::Creation(info) => info,
            _ => panic!("fixture attestation is not a creation attestation"),
        }
    }

    /// Marshal everything and sign the attestation as it currently stands
    pub fn params(&self) -> AttestationParameters {
        let create_attestation = self.attest.to_bytes();
        AttestationParameters {
            public: self.public.to_bytes(),
            use_tcsd_activation_format: false,
            create_data: self.create_data.to_bytes(),
            create_signature: self.signer.sign(&create_attestation).to_bytes(),
            create_attestation,
        }
    }
}

/// Private half of an endorsement key
pub enum EkPrivate {
    Rsa(RsaPrivateKey),
    Ecc(p256::SecretKey),
    EccP384(p384::SecretKey),
}

impl EkPrivate {
    pub fn rsa() -> Self {
        let key = RsaPrivateKey::from_pkcs8_pem(include_str!("../../samples/ek-rsa2048.pem"))
            .expect("Failed to load RSA EK");
        EkPrivate::Rsa(key)
    }

    pub fn ecc() -> Self {
        let key = p256::SecretKey::from_pkcs8_pem(include_str!("../../samples/ek-p256.pem"))
            .expect("Failed to load ECC EK");
        EkPrivate::Ecc(key)
    }

    pub fn p384() -> Self {
        let key = p384::SecretKey::from_pkcs8_pem(include_str!("../../samples/ek-p384.pem"))
            .expect("Failed to load P-384 EK");
        EkPrivate::EccP384(key)
    }

    pub fn public(&self) -> PublicKey {
        match self {
            EkPrivate::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            EkPrivate::Ecc(key) => PublicKey::Ecc(key.public_key()),
            EkPrivate::EccP384(key) => PublicKey::EccP384(key.public_key()),
        }
    }

    /// Recover the seed from the encrypted secret
    fn seed(&self, encrypted_secret: &[u8]) -> Vec<u8> {
        let mut rd = ResponseBuffer::new(encrypted_secret);
        let encrypted_seed = rd.get_tpm2b().expect("encrypted secret is not a TPM2B");
        rd.finish().expect("trailing bytes after encrypted secret");

        match self {
            EkPrivate::Rsa(key) => key
                .decrypt(
                    Oaep::new_with_label::<Sha256, _>(format!("{LABEL_IDENTITY}\0")),
                    &encrypted_seed,
                )
                .expect("Failed to decrypt seed"),
            EkPrivate::Ecc(key) => {
                let (x, sec1) = ephemeral_point(&encrypted_seed);
                let ephemeral =
                    p256::PublicKey::from_sec1_bytes(&sec1).expect("ephemeral point off curve");
                let shared =
                    p256::ecdh::diffie_hellman(key.to_nonzero_scalar(), ephemeral.as_affine());
                let ek_point = key.public_key().to_encoded_point(false);
                ecdh_seed(shared.raw_secret_bytes(), &x, ek_point.x().expect("identity point"))
            }
            EkPrivate::EccP384(key) => {
                let (x, sec1) = ephemeral_point(&encrypted_seed);
                let ephemeral =
                    p384::PublicKey::from_sec1_bytes(&sec1).expect("ephemeral point off curve");
                let shared =
                    p384::ecdh::diffie_hellman(key.to_nonzero_scalar(), ephemeral.as_affine());
                let ek_point = key.public_key().to_encoded_point(false);
                ecdh_seed(shared.raw_secret_bytes(), &x, ek_point.x().expect("identity point"))
            }
        }
    }

    /// What `TPM2_ActivateCredential` does with a SHA-256 named object
    pub fn activate_credential(&self, name: &[u8], challenge: &EncryptedCredential) -> Vec<u8> {
        let seed = self.seed(&challenge.secret);
        let sym_key = kdfa(TpmAlgId::Sha256, &seed, LABEL_STORAGE, name, &[], 128)
            .expect("KDFa STORAGE failed");
        let hmac_key =
            kdfa(TpmAlgId::Sha256, &seed, LABEL_INTEGRITY, &[], &[], 256).expect("KDFa failed");

        let mut rd = ResponseBuffer::new(&challenge.credential);
        let id_object = rd.get_tpm2b().expect("credential is not a TPM2B");
        rd.finish().expect("trailing bytes after credential");
        let mut rd = ResponseBuffer::new(&id_object);
        let integrity = rd.get_tpm2b().expect("missing integrity HMAC");
        let mut enc_identity = rd.get_remaining();

        let expected = hmac(TpmAlgId::Sha256, &hmac_key, &[&enc_identity, name]).unwrap();
        assert_eq!(integrity, expected, "credential integrity check failed");

        cfb_mode::Decryptor::<Aes128>::new_from_slices(&sym_key, &[0u8; 16])
            .unwrap()
            .decrypt(&mut enc_identity);
        let mut rd = ResponseBuffer::new(&enc_identity);
        let secret = rd.get_tpm2b().expect("credential value is not a TPM2B");
        rd.finish().expect("trailing bytes after credential value");
        secret
    }

    /// What `TPM_ActivateIdentity` followed by the symmetric decrypt does,
    /// for either TPM 1.2 blob layout
    pub fn activate_identity(&self, ak_public: &[u8], challenge: &EncryptedCredential) -> Vec<u8> {
        let EkPrivate::Rsa(key) = self else {
            panic!("TPM 1.2 EKs are RSA keys");
        };
        let contents = key
            .decrypt(Oaep::new_with_label::<Sha1, _>("TCPA"), &challenge.credential)
            .expect("Failed to decrypt TPM_ASYM_CA_CONTENTS");
        assert_eq!(&contents[24..], Sha1::digest(ak_public).as_slice());
        let aes_key = &contents[8..24];

        let mut rd = ResponseBuffer::new(&challenge.secret);
        let cred_size = rd.get_u32().unwrap() as usize;
        rd.skip(4 + 2 + 2 + 4 + 4 + 4).unwrap();
        let iv_size = rd.get_u32().unwrap() as usize;
        let parms_iv = rd.get_bytes(iv_size).unwrap();
        let data = rd.get_remaining();
        assert_eq!(data.len(), cred_size);
        let (iv, ciphertext) = if parms_iv.is_empty() {
            let (iv, ct) = data.split_at(16);
            (iv.to_vec(), ct.to_vec())
        } else {
            (parms_iv, data)
        };

        cbc::Decryptor::<Aes128>::new_from_slices(aes_key, &iv)
            .unwrap()
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .expect("Failed to decrypt credential")
    }
}

/// Split a `TPMS_ECC_POINT` into its x coordinate and SEC1 encoding
fn ephemeral_point(encrypted_seed: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut rd = ResponseBuffer::new(encrypted_seed);
    let x = rd.get_tpm2b().expect("missing point x");
    let y = rd.get_tpm2b().expect("missing point y");
    rd.finish().expect("trailing bytes after ECC point");

    let mut sec1 = vec![0x04];
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    (x, sec1)
}

fn ecdh_seed(shared: &[u8], ephemeral_x: &[u8], ek_x: &[u8]) -> Vec<u8> {
    kdfe(TpmAlgId::Sha256, shared, LABEL_IDENTITY, ephemeral_x, ek_x, 256).expect("KDFe failed")
}

/// `TPM_PUBKEY` of the RSA AK sample, as a TPM 1.2 identity key
pub fn tpm12_ak_public() -> Vec<u8> {
    let AkSigner::Rsa(key) = AkSigner::rsa() else {
        unreachable!()
    };
    Tpm12PubKey::rsa_identity_key(key.n().to_bytes_be()).to_bytes()
}

/// A random source that is always out of entropy
pub struct FailingRng;

impl RngCore for FailingRng {
    fn next_u32(&mut self) -> u32 {
        panic!("infallible draw from FailingRng")
    }

    fn next_u64(&mut self) -> u64 {
        panic!("infallible draw from FailingRng")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        panic!("infallible draw from FailingRng")
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new("entropy source unavailable"))
    }
}

impl CryptoRng for FailingRng {}

/// A seeded random source that serves `draws` requests and then runs dry
pub struct ExhaustingRng {
    draws: usize,
    inner: StdRng,
}

impl ExhaustingRng {
    pub fn new(draws: usize) -> Self {
        Self {
            draws,
            inner: StdRng::seed_from_u64(7),
        }
    }
}

impl RngCore for ExhaustingRng {
    fn next_u32(&mut self) -> u32 {
        panic!("infallible draw from ExhaustingRng")
    }

    fn next_u64(&mut self) -> u64 {
        panic!("infallible draw from ExhaustingRng")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        panic!("infallible draw from ExhaustingRng")
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        if self.draws == 0 {
            return Err(rand::Error::new("entropy source exhausted"));
        }
        self.draws -= 1;
        self.inner.try_fill_bytes(dest)
    }
}

impl CryptoRng for ExhaustingRng {}
