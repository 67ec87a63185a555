// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Attestation key policy
//!
//! An AK is only worth activating if the TPM can prove it generated the key
//! itself, that the key never leaves the TPM, and that the key is restricted
//! (it refuses to sign data that mimics a TPM-generated structure). On TPM 2.0
//! the creation attestation, signed by the AK, carries that proof.

use tpm_codec::{
    Tpm12PubKey, TpmSt, TpmsAttest, TpmsCreationData, TpmtPublic, TpmtPublicParms,
    TpmtPublicUnique, TpmtSignature, Unmarshal, TPM_GENERATED_VALUE,
};
use tpm_types::AttestationParameters;
use tracing::debug;

use crate::error::{input, mismatch, policy, ActivationError, Result};
use crate::verify::verify_signature;
use crate::{MIN_ECC_BITS, MIN_RSA_BITS, MIN_SIGNATURE_LEN};

/// TPM 1.2 identity keys are only checked for strength.
///
/// The TPM 1.2 flow carries no creation attestation, so nothing here proves
/// the key is TPM-resident; activation itself is the only binding to the EK.
pub(crate) fn check_tpm12(ak: &AttestationParameters) -> Result<()> {
    let public =
        Tpm12PubKey::from_bytes(&ak.public).map_err(ActivationError::decode("TPM 1.2 public key"))?;
    let bits = public.bit_len();
    if bits < MIN_RSA_BITS {
        policy!(
            "attestation key too small: must be at least {MIN_RSA_BITS} bits but was {bits} bits"
        );
    }
    debug!("TPM 1.2 attestation key accepted ({bits} bits)");
    Ok(())
}

pub(crate) fn check_tpm20(ak: &AttestationParameters) -> Result<()> {
    if ak.create_signature.len() < MIN_SIGNATURE_LEN {
        input!(
            "signature is too short to be valid: only {} bytes",
            ak.create_signature.len()
        );
    }

    let public = TpmtPublic::from_bytes(&ak.public).map_err(ActivationError::decode("public key"))?;
    TpmsCreationData::from_bytes(&ak.create_data)
        .map_err(ActivationError::decode("creation data"))?;
    let attest = TpmsAttest::from_bytes(&ak.create_attestation)
        .map_err(ActivationError::decode("creation attestation"))?;

    if attest.tag != TpmSt::AttestCreation {
        mismatch!(
            "attestation does not apply to creation data, got tag 0x{:04x}",
            attest.tag.to_u16()
        );
    }
    let Some(creation) = attest.creation_info() else {
        mismatch!("attestation carries no creation info");
    };

    check_strength(&public)?;

    let Ok(creation_hash) = public.name_alg.hash(&ak.create_data) else {
        policy!("name algorithm {:?} not supported", public.name_alg);
    };
    if creation_hash != creation.creation_hash.buffer {
        mismatch!("creation data does not match the attested creation hash");
    }

    if attest.magic != TPM_GENERATED_VALUE {
        mismatch!("creation attestation was not produced by a TPM");
    }

    let attrs = public.object_attributes;
    if !attrs.fixed_tpm() {
        policy!("AK is exportable");
    }
    if !attrs.restricted() {
        policy!("AK is not restricted to attestation");
    }
    if !attrs.fixed_parent() {
        policy!("AK can be duplicated to another parent");
    }
    if !attrs.sensitive_data_origin() {
        policy!("AK private part was not generated by the TPM");
    }

    let Ok(name) = public.name() else {
        policy!("name algorithm {:?} not supported", public.name_alg);
    };
    if creation.object_name.digest() != Some(name) {
        mismatch!("creation attestation refers to a different key");
    }

    let signature = TpmtSignature::from_bytes(&ak.create_signature)
        .map_err(ActivationError::decode("creation signature"))?;
    verify_signature(&public, &ak.create_attestation, &signature)?;

    debug!("TPM 2.0 attestation key accepted ({:?})", public.type_alg);
    Ok(())
}

fn check_strength(public: &TpmtPublic) -> Result<()> {
    match (&public.parameters, &public.unique) {
        (TpmtPublicParms::Rsa(parms), _) => {
            let bits = parms.key_bits as usize;
            if bits < MIN_RSA_BITS {
                policy!(
                    "attestation key too small: must be at least {MIN_RSA_BITS} bits but was {bits} bits"
                );
            }
        }
        (TpmtPublicParms::Ecc(_), TpmtPublicUnique::Ecc(x, y)) => {
            for coord in [x, y] {
                let bits = coord.len() * 8;
                if bits < MIN_ECC_BITS {
                    policy!(
                        "attestation key too small: must be at least {MIN_ECC_BITS} bits but was {bits} bits"
                    );
                }
            }
        }
        _ => policy!("public key of alg {:?} not supported", public.type_alg),
    }
    Ok(())
}
