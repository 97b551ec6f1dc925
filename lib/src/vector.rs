//! Recomputes the authentication vector a network should have used, so the
//! RES and MAC seen on the air can be checked against it.

use thiserror::Error;

use crate::milenage::Milenage;
use crate::profile::{AuthAlgorithm, OperatorKey, SimProfile};
use crate::util::xor_bytes;

const RAND_LEN: usize = 16;
const AUTN_LEN: usize = 16;
const KEY_LEN: usize = 16;
const AMF_LEN: usize = 2;

/// Why a vector could not be computed. None of these are faults: most
/// captures are analysed without subscriber key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationUnavailable {
    #[error("no subscriber profile is loaded")]
    NoProfile,
    #[error("the subscriber key is not known")]
    NoKey,
    #[error("the authentication algorithm is not known")]
    NoAlgorithm,
    #[error("neither OP nor OPc is configured")]
    NoOperatorKey,
    #[error("the AMF is not configured")]
    NoAmf,
    #[error("{field} is {actual} bytes long, expected {expected}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVector {
    pub xres: Vec<u8>,
    pub ck: Vec<u8>,
    pub ik: Vec<u8>,
    pub ak: Vec<u8>,
    /// SQN recovered from AUTN with the computed AK
    pub sqn: Vec<u8>,
    /// MAC as received in AUTN
    pub mac: Vec<u8>,
    pub xmac: Vec<u8>,
}

impl AuthVector {
    pub fn mac_matches(&self) -> bool {
        self.mac == self.xmac
    }
}

/// Computes the vector for `rand`/`autn` with the algorithm and key material
/// of `profile`.
pub fn compute_vector(
    profile: Option<&SimProfile>,
    rand: &[u8],
    autn: &[u8],
) -> Result<AuthVector, VerificationUnavailable> {
    let profile = profile.ok_or(VerificationUnavailable::NoProfile)?;
    let key = profile.key.as_deref().ok_or(VerificationUnavailable::NoKey)?;
    let algorithm = profile.auth.ok_or(VerificationUnavailable::NoAlgorithm)?;
    let amf = profile.amf.as_deref().ok_or(VerificationUnavailable::NoAmf)?;
    match algorithm {
        AuthAlgorithm::Milenage => {
            let operator_key = profile
                .operator_key
                .as_ref()
                .ok_or(VerificationUnavailable::NoOperatorKey)?;
            compute_milenage(key, operator_key, rand, autn, amf)
        }
        AuthAlgorithm::Xor => compute_xor(key, rand, autn, amf),
    }
}

pub fn compute_milenage(
    key: &[u8],
    operator_key: &OperatorKey,
    rand: &[u8],
    autn: &[u8],
    amf: &[u8],
) -> Result<AuthVector, VerificationUnavailable> {
    let key: [u8; KEY_LEN] = fixed("key", key)?;
    let rand: [u8; RAND_LEN] = fixed("RAND", rand)?;
    let autn: [u8; AUTN_LEN] = fixed("AUTN", autn)?;
    let amf: [u8; AMF_LEN] = fixed("AMF", amf)?;
    let milenage = match operator_key {
        OperatorKey::Op(op) => Milenage::with_op(&key, &fixed("OP", op)?),
        OperatorKey::Opc(opc) => Milenage::with_opc(&key, &fixed("OPc", opc)?),
    };

    let out = milenage.f2345(&rand);
    let mut sqn = [0u8; 6];
    for (i, s) in sqn.iter_mut().enumerate() {
        *s = autn[i] ^ out.ak[i];
    }
    let xmac = milenage.f1(&rand, &sqn, &amf);

    Ok(AuthVector {
        xres: out.res.to_vec(),
        ck: out.ck.to_vec(),
        ik: out.ik.to_vec(),
        ak: out.ak.to_vec(),
        sqn: sqn.to_vec(),
        mac: autn[8..16].to_vec(),
        xmac: xmac.to_vec(),
    })
}

/// The XOR test algorithm (TS 34.108 8.1.2) as used by srsRAN test SIMs.
pub fn compute_xor(
    key: &[u8],
    rand: &[u8],
    autn: &[u8],
    amf: &[u8],
) -> Result<AuthVector, VerificationUnavailable> {
    let key: [u8; KEY_LEN] = fixed("key", key)?;
    let rand: [u8; RAND_LEN] = fixed("RAND", rand)?;
    let autn: [u8; AUTN_LEN] = fixed("AUTN", autn)?;
    let amf: [u8; AMF_LEN] = fixed("AMF", amf)?;

    let xdout = xor_bytes(&key, &rand);
    let ck = rotated(&xdout, 1);
    let ik = rotated(&xdout, 2);
    let ak = xdout[3..9].to_vec();
    let sqn = xor_bytes(&autn[0..6], &ak);
    let mut cdout = sqn.clone();
    cdout.extend_from_slice(&amf);
    let xmac = xor_bytes(&xdout[0..8], &cdout);

    Ok(AuthVector {
        xres: xdout,
        ck,
        ik,
        ak,
        sqn,
        mac: autn[8..16].to_vec(),
        xmac,
    })
}

fn rotated(bytes: &[u8], by: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.rotate_left(by);
    out
}

fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], VerificationUnavailable> {
    bytes.try_into().map_err(|_| VerificationUnavailable::InvalidLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_profile(key: Vec<u8>) -> SimProfile {
        SimProfile {
            auth: Some(AuthAlgorithm::Xor),
            key: Some(key),
            amf: Some(vec![0x00, 0x00]),
            ..Default::default()
        }
    }

    #[test]
    fn test_xor_all_zero() {
        let profile = xor_profile(vec![0; 16]);
        let vector = compute_vector(Some(&profile), &[0; 16], &[0; 16]).unwrap();
        assert_eq!(vector.xres, vec![0; 16]);
        assert_eq!(vector.ak, vec![0; 6]);
        assert_eq!(vector.xmac, vec![0; 8]);
        assert!(vector.mac_matches());
    }

    #[test]
    fn test_xor_derivation() {
        let key: Vec<u8> = (0u8..16).collect();
        let rand = [0xffu8; 16];
        let mut autn = [0u8; 16];
        autn[0..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        let vector = compute_xor(&key, &rand, &autn, &[0x80, 0x00]).unwrap();

        let xdout: Vec<u8> = (0u8..16).map(|b| b ^ 0xff).collect();
        assert_eq!(vector.xres, xdout);
        assert_eq!(vector.ck[0], xdout[1]);
        assert_eq!(vector.ck[15], xdout[0]);
        assert_eq!(vector.ik[0], xdout[2]);
        assert_eq!(vector.ak, xdout[3..9].to_vec());
        assert_eq!(vector.sqn[0], 1 ^ xdout[3]);
        assert_eq!(vector.xmac[6], 0x80 ^ xdout[6]);
        assert_eq!(vector.xmac[7], xdout[7]);
    }

    #[test]
    fn test_xor_is_deterministic() {
        let profile = xor_profile((10u8..26).collect());
        let rand: Vec<u8> = (100u8..116).collect();
        let autn: Vec<u8> = (50u8..66).collect();
        let first = compute_vector(Some(&profile), &rand, &autn).unwrap();
        let second = compute_vector(Some(&profile), &rand, &autn).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unavailable_reasons() {
        assert_eq!(
            compute_vector(None, &[0; 16], &[0; 16]),
            Err(VerificationUnavailable::NoProfile)
        );
        let no_key = SimProfile {
            auth: Some(AuthAlgorithm::Xor),
            ..Default::default()
        };
        assert_eq!(
            compute_vector(Some(&no_key), &[0; 16], &[0; 16]),
            Err(VerificationUnavailable::NoKey)
        );
        let mut no_algorithm = xor_profile(vec![0; 16]);
        no_algorithm.auth = None;
        assert_eq!(
            compute_vector(Some(&no_algorithm), &[0; 16], &[0; 16]),
            Err(VerificationUnavailable::NoAlgorithm)
        );
        let mut no_op = xor_profile(vec![0; 16]);
        no_op.auth = Some(AuthAlgorithm::Milenage);
        assert_eq!(
            compute_vector(Some(&no_op), &[0; 16], &[0; 16]),
            Err(VerificationUnavailable::NoOperatorKey)
        );
    }

    #[test]
    fn test_short_rand_is_unavailable() {
        let profile = xor_profile(vec![0; 16]);
        assert_eq!(
            compute_vector(Some(&profile), &[0; 8], &[0; 16]),
            Err(VerificationUnavailable::InvalidLength {
                field: "RAND",
                expected: 16,
                actual: 8
            })
        );
    }

    // TS 35.207 test set 1 with an AUTN built from its SQN, AK and MAC-A
    #[test]
    fn test_milenage_vector() {
        let key = hex::decode("465b5ce8b199b49faa5f0a2ee238a6bc").unwrap();
        let rand = hex::decode("23553cbe9637a89d218ae64dae47bf35").unwrap();
        let op = hex::decode("cdc202d5123e20f62b6d676ac72cb318").unwrap();
        let sqn = hex::decode("ff9bb4d0b607").unwrap();
        let ak = hex::decode("aa689c648370").unwrap();
        let mut autn = xor_bytes(&sqn, &ak);
        autn.extend_from_slice(&[0xb9, 0xb9]);
        autn.extend_from_slice(&hex::decode("4a9ffac354dfafb3").unwrap());

        let profile = SimProfile {
            auth: Some(AuthAlgorithm::Milenage),
            key: Some(key),
            operator_key: Some(OperatorKey::Op(op)),
            amf: Some(vec![0xb9, 0xb9]),
            ..Default::default()
        };
        let vector = compute_vector(Some(&profile), &rand, &autn).unwrap();
        assert_eq!(vector.sqn, sqn);
        assert_eq!(hex::encode(&vector.xres), "a54211d5e3ba50bf");
        assert!(vector.mac_matches());
    }
}
