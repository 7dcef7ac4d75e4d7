use ed25519_dalek::{Keypair as DalekKeypair, PublicKey as DalekPublic, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::de::Error as DeError;
use std::fmt;
use std::str::FromStr;

use crate::crypto::hash::{digest_to_u64, sha256};
use crate::crypto::CryptoError;

/// 32-byte ed25519 public key. Hex encoded in JSON, raw bytes in bincode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        if s.len() != 64 {
            return Err(CryptoError::InvalidPublicKey(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey(s.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Account address owned by this key.
    pub fn address(&self) -> Address {
        Address(digest_to_u64(&sha256(&self.0)))
    }

    pub(crate) fn to_dalek(&self) -> Result<DalekPublic, CryptoError> {
        DalekPublic::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey(self.to_hex()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(s)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            PublicKey::from_hex(&s).map_err(D::Error::custom)
        } else {
            Ok(PublicKey(<[u8; 32]>::deserialize(d)?))
        }
    }
}

/// Numeric account address, rendered as `<u64>L`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}L", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}L)", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_suffix('L')
            .ok_or_else(|| CryptoError::InvalidAddress(s.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::InvalidAddress(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(Address)
            .map_err(|_| CryptoError::InvalidAddress(s.to_string()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_string())
        } else {
            s.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            s.parse().map_err(D::Error::custom)
        } else {
            Ok(Address(u64::deserialize(d)?))
        }
    }
}

/// Ed25519 keypair derived from a passphrase (secret = sha256(passphrase)).
pub struct Keypair {
    pub(crate) keypair: DalekKeypair,
}

impl Keypair {
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CryptoError> {
        Self::from_seed(&sha256(passphrase.as_bytes()))
    }

    /// Construct from raw 32-byte secret seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_bytes(seed)
            .map_err(|e| CryptoError::InvalidSignature(format!("bad secret seed: {}", e)))?;
        let public = DalekPublic::from(&secret);
        Ok(Self { keypair: DalekKeypair { secret, public } })
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.keypair.public.to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public().address()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("public", &self.public()).finish_non_exhaustive()
    }
}
