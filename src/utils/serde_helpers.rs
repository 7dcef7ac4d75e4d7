use serde::{Deserialize, Deserializer, Serializer};
use serde::de::Error as DeError;

/// Serialize bytes as hex string
pub fn as_hex<S>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&hex::encode(bytes))
}

/// Deserialize hex string into a fixed-size array
pub fn from_hex_array<'de, D, const N: usize>(d: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    let bytes = hex::decode(&s).map_err(D::Error::custom)?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| D::Error::custom(format!("expected {} bytes, got {}", N, b.len())))
}
