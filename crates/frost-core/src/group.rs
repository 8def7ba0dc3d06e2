//! Group and scalar field helpers over secp256k1
//!
//! The protocol only needs a prime-order group with a generator, scalar
//! arithmetic and a hash onto the scalar field; `k256` provides the first two
//! and this module adds the hashing and fixed-size encodings used on the wire.

use crate::{Error, Result};
use k256::{
    elliptic_curve::{bigint::U256, group::GroupEncoding, ops::Reduce, PrimeField},
    CompressedPoint, FieldBytes, ProjectivePoint, Scalar,
};
use sha2::{Digest, Sha256};

/// Length of a compressed group element
pub const POINT_LEN: usize = 33;

/// Length of an encoded scalar
pub const SCALAR_LEN: usize = 32;

/// Hash a domain tag and a list of inputs onto the scalar field
///
/// The tag and every part are length-prefixed so distinct inputs can never
/// collide through concatenation.
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let digest = FieldBytes::from(hash_to_bytes(domain, parts));
    <Scalar as Reduce<U256>>::reduce_bytes(&digest)
}

/// Hash a domain tag and a list of inputs to 32 bytes
pub fn hash_to_bytes(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u64).to_be_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Encode a group element in compressed form (identity is all zeros)
pub fn encode_point(point: &ProjectivePoint) -> [u8; POINT_LEN] {
    let mut out = [0u8; POINT_LEN];
    out.copy_from_slice(point.to_bytes().as_slice());
    out
}

/// Decode a compressed group element
pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    if bytes.len() != POINT_LEN {
        return Err(Error::Deserialization(format!(
            "Invalid point length: {}",
            bytes.len()
        )));
    }
    let repr = CompressedPoint::clone_from_slice(bytes);
    Option::<ProjectivePoint>::from(ProjectivePoint::from_bytes(&repr))
        .ok_or_else(|| Error::Deserialization("Invalid point encoding".into()))
}

/// Encode a scalar as 32 big-endian bytes
pub fn encode_scalar(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    let mut out = [0u8; SCALAR_LEN];
    out.copy_from_slice(scalar.to_bytes().as_slice());
    out
}

/// Decode a canonical scalar encoding
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() != SCALAR_LEN {
        return Err(Error::Deserialization(format!(
            "Invalid scalar length: {}",
            bytes.len()
        )));
    }
    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or_else(|| Error::Deserialization("Non-canonical scalar".into()))
}

pub(crate) mod scalar_serde {
    use k256::Scalar;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&super::encode_scalar(scalar))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        super::decode_scalar(&bytes).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod point_serde {
    use k256::ProjectivePoint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(point: &ProjectivePoint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&super::encode_point(point))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ProjectivePoint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        super::decode_point(&bytes).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod point_vec_serde {
    use k256::ProjectivePoint;
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(points: &[ProjectivePoint], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(points.len()))?;
        for point in points {
            seq.serialize_element(&super::encode_point(point).to_vec())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<ProjectivePoint>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Vec<Vec<u8>> = Vec::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|bytes| super::decode_point(bytes).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};

    #[test]
    fn test_point_encoding() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let point = ProjectivePoint::GENERATOR * Scalar::random(&mut rng);

        let decoded = decode_point(&encode_point(&point)).unwrap();
        assert_eq!(decoded, point);

        let identity = decode_point(&encode_point(&ProjectivePoint::IDENTITY)).unwrap();
        assert_eq!(identity, ProjectivePoint::IDENTITY);

        assert!(decode_point(&[2u8; 32]).is_err());
    }

    #[test]
    fn test_scalar_rejects_non_canonical() {
        // The group order itself is not a canonical scalar
        let order =
            hex::decode("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141").unwrap();
        assert!(decode_scalar(&order).is_err());

        let one = decode_scalar(&encode_scalar(&Scalar::ONE)).unwrap();
        assert_eq!(one, Scalar::ONE);
    }

    #[test]
    fn test_hash_domain_separation() {
        let a = hash_to_scalar(b"domain-a", &[b"input"]);
        let b = hash_to_scalar(b"domain-b", &[b"input"]);
        assert_ne!(a, b);

        // Length prefixes keep split points distinct
        let c = hash_to_scalar(b"domain-a", &[b"in", b"put"]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scalar_hash_is_reduced_byte_hash() {
        let bytes = hash_to_bytes(b"domain-a", &[b"input"]);
        let reduced = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(bytes));
        assert_eq!(hash_to_scalar(b"domain-a", &[b"input"]), reduced);
    }
}
