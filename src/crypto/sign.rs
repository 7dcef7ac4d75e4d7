use ed25519_dalek::{Signature as DalekSig, Signer as DalekSigner, Verifier as DalekVerifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::de::Error as DeError;
use std::fmt;

use crate::crypto::{CryptoError, Keypair, PublicKey};

/// Detached ed25519 signature. Hex encoded in JSON, raw bytes in bincode.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidSignature(s.to_string()))?;
        if bytes.len() != 64 {
            return Err(CryptoError::InvalidSignature(s.to_string()));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &self.to_hex()[..16])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            s.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            Signature::from_hex(&s).map_err(D::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(d)?;
            let arr: [u8; 64] = bytes
                .try_into()
                .map_err(|_| D::Error::custom("signature must be 64 bytes"))?;
            Ok(Signature(arr))
        }
    }
}

/// Trait for signing
pub trait Signer {
    fn sign(&self, msg: &[u8]) -> Signature;
}

/// Trait for verifying
pub trait Verifier {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError>;
}

impl Signer for Keypair {
    fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.keypair.sign(msg);
        Signature(sig.to_bytes())
    }
}

impl Verifier for PublicKey {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        let pk = self.to_dalek()?;
        let ds = DalekSig::try_from(&sig.0[..])
            .map_err(|_| CryptoError::InvalidSignature(sig.to_hex()))?;
        pk.verify(msg, &ds).map_err(|_| CryptoError::VerificationFailed)
    }
}
