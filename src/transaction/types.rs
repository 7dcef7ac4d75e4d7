//! Transaction model: type tags, typed assets, the byte layout that gets signed,
//! and content-addressed ids.
//!
//! Byte layout (signing payload):
//! `type(1) | timestamp(4 LE) | senderPublicKey(32) | recipient(8 BE, zero if none)
//!  | amount(8 LE) | fee(8 LE) | asset bytes`.
//! The sender signs `sha256(payload)`, the second signature covers
//! `sha256(payload | signature)`, multisig members sign the payload hash.
//! The id is derived from `payload | signature | signSignature`; collected member
//! signatures never participate, so collecting them cannot change the id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::de::Error as DeError;
use std::fmt;
use std::str::FromStr;

use crate::crypto::hash::{digest_to_u64, sha256, Hash32};
use crate::crypto::{Address, Keypair, PublicKey, Signature, Signer, Verifier};

/// Content-addressed transaction id, rendered as a decimal string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.0)
    }
}

impl FromStr for TxId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(TxId)
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.0.to_string())
        } else {
            s.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            s.parse().map_err(D::Error::custom)
        } else {
            Ok(TxId(u64::deserialize(d)?))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TransactionType {
    Transfer,
    SecondSignature,
    Delegate,
    Vote,
    Multisignature,
    Dapp,
    InTransfer,
    OutTransfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 8] = [
        TransactionType::Transfer,
        TransactionType::SecondSignature,
        TransactionType::Delegate,
        TransactionType::Vote,
        TransactionType::Multisignature,
        TransactionType::Dapp,
        TransactionType::InTransfer,
        TransactionType::OutTransfer,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Schema name used in validation messages.
    pub fn schema_name(self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::SecondSignature => "signature",
            TransactionType::Delegate => "delegate",
            TransactionType::Vote => "vote",
            TransactionType::Multisignature => "multisignature",
            TransactionType::Dapp => "dapp",
            TransactionType::InTransfer => "inTransfer",
            TransactionType::OutTransfer => "outTransfer",
        }
    }
}

impl From<TransactionType> for u8 {
    fn from(t: TransactionType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for TransactionType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        TransactionType::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| format!("Unknown transaction type {}", v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigAsset {
    pub min: u32,
    pub lifetime: u32,
    /// `+<publicKey>` entries exactly as signed.
    pub keysgroup: Vec<String>,
}

impl MultisigAsset {
    /// Member keys with their operator stripped. Entries that do not parse are skipped;
    /// admitted transactions have already passed the schema check.
    pub fn members(&self) -> Vec<PublicKey> {
        self.keysgroup
            .iter()
            .filter_map(|k| k.strip_prefix('+'))
            .filter_map(|k| PublicKey::from_hex(k).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappAsset {
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
    pub category: u8,
    pub link: String,
    pub icon: Option<String>,
}

/// Type-specific payload. The variant always matches `Transaction::kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Asset {
    Transfer { data: Option<String> },
    #[serde(rename = "signature", rename_all = "camelCase")]
    SecondSignature { public_key: PublicKey },
    Delegate { username: String },
    Votes(Vec<String>),
    Multisignature(MultisigAsset),
    Dapp(DappAsset),
    #[serde(rename_all = "camelCase")]
    InTransfer { dapp_id: TxId },
    #[serde(rename_all = "camelCase")]
    OutTransfer { dapp_id: TxId, transaction_id: TxId },
}

impl Asset {
    pub fn kind(&self) -> TransactionType {
        match self {
            Asset::Transfer { .. } => TransactionType::Transfer,
            Asset::SecondSignature { .. } => TransactionType::SecondSignature,
            Asset::Delegate { .. } => TransactionType::Delegate,
            Asset::Votes(_) => TransactionType::Vote,
            Asset::Multisignature(_) => TransactionType::Multisignature,
            Asset::Dapp(_) => TransactionType::Dapp,
            Asset::InTransfer { .. } => TransactionType::InTransfer,
            Asset::OutTransfer { .. } => TransactionType::OutTransfer,
        }
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Asset::Transfer { data } => {
                if let Some(d) = data {
                    out.extend_from_slice(d.as_bytes());
                }
            }
            Asset::SecondSignature { public_key } => out.extend_from_slice(&public_key.0),
            Asset::Delegate { username } => out.extend_from_slice(username.as_bytes()),
            Asset::Votes(votes) => out.extend_from_slice(votes.concat().as_bytes()),
            Asset::Multisignature(m) => {
                out.extend_from_slice(&m.min.to_le_bytes());
                out.extend_from_slice(&m.lifetime.to_le_bytes());
                out.extend_from_slice(m.keysgroup.concat().as_bytes());
            }
            Asset::Dapp(d) => {
                out.extend_from_slice(d.name.as_bytes());
                for opt in [&d.description, &d.tags] {
                    if let Some(s) = opt {
                        out.extend_from_slice(s.as_bytes());
                    }
                }
                out.extend_from_slice(d.link.as_bytes());
                if let Some(icon) = &d.icon {
                    out.extend_from_slice(icon.as_bytes());
                }
                out.push(d.kind);
                out.push(d.category);
            }
            Asset::InTransfer { dapp_id } => out.extend_from_slice(dapp_id.to_string().as_bytes()),
            Asset::OutTransfer { dapp_id, transaction_id } => {
                out.extend_from_slice(dapp_id.to_string().as_bytes());
                out.extend_from_slice(transaction_id.to_string().as_bytes());
            }
        }
    }
}

/// One collected multisignature approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSignature {
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// Transaction fields before the sender signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub kind: TransactionType,
    pub timestamp: u32,
    pub sender_public_key: PublicKey,
    pub recipient_id: Option<Address>,
    pub amount: u64,
    pub fee: u64,
    pub asset: Asset,
}

impl UnsignedTransaction {
    fn payload(&self) -> Vec<u8> {
        payload_bytes(
            self.kind,
            self.timestamp,
            &self.sender_public_key,
            self.recipient_id,
            self.amount,
            self.fee,
            &self.asset,
        )
    }

    /// Sign with the sender key (and the second key when the account has one).
    pub fn sign(self, sender: &Keypair, second: Option<&Keypair>) -> Transaction {
        let payload = self.payload();
        let signature = sender.sign(&sha256(&payload));
        let sign_signature = second.map(|kp| {
            let mut buf = payload.clone();
            buf.extend_from_slice(&signature.0);
            kp.sign(&sha256(&buf))
        });
        let mut tx = Transaction {
            id: TxId(0),
            kind: self.kind,
            timestamp: self.timestamp,
            sender_public_key: self.sender_public_key,
            recipient_id: self.recipient_id,
            amount: self.amount,
            fee: self.fee,
            asset: self.asset,
            signature,
            sign_signature,
            signatures: Vec::new(),
        };
        tx.id = tx.compute_id();
        tx
    }
}

fn payload_bytes(
    kind: TransactionType,
    timestamp: u32,
    sender: &PublicKey,
    recipient: Option<Address>,
    amount: u64,
    fee: u64,
    asset: &Asset,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.push(kind.as_u8());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&sender.0);
    out.extend_from_slice(&recipient.map(|a| a.0).unwrap_or(0).to_be_bytes());
    out.extend_from_slice(&amount.to_le_bytes());
    out.extend_from_slice(&fee.to_le_bytes());
    asset.write_bytes(&mut out);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TxId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: u32,
    pub sender_public_key: PublicKey,
    pub recipient_id: Option<Address>,
    pub amount: u64,
    pub fee: u64,
    pub asset: Asset,
    pub signature: Signature,
    pub sign_signature: Option<Signature>,
    #[serde(default)]
    pub signatures: Vec<MemberSignature>,
}

impl Transaction {
    pub fn sender(&self) -> Address {
        self.sender_public_key.address()
    }

    fn payload(&self) -> Vec<u8> {
        payload_bytes(
            self.kind,
            self.timestamp,
            &self.sender_public_key,
            self.recipient_id,
            self.amount,
            self.fee,
            &self.asset,
        )
    }

    /// Hash signed by the sender and by multisig members.
    pub fn signing_hash(&self) -> Hash32 {
        sha256(&self.payload())
    }

    fn second_signing_hash(&self) -> Hash32 {
        let mut buf = self.payload();
        buf.extend_from_slice(&self.signature.0);
        sha256(&buf)
    }

    pub fn compute_id(&self) -> TxId {
        let mut buf = self.payload();
        buf.extend_from_slice(&self.signature.0);
        if let Some(s) = &self.sign_signature {
            buf.extend_from_slice(&s.0);
        }
        TxId(digest_to_u64(&sha256(&buf)))
    }

    pub fn verify_signature(&self) -> bool {
        self.sender_public_key
            .verify(&self.signing_hash(), &self.signature)
            .is_ok()
    }

    pub fn verify_second_signature(&self, second_public_key: &PublicKey) -> bool {
        match &self.sign_signature {
            Some(sig) => second_public_key.verify(&self.second_signing_hash(), sig).is_ok(),
            None => false,
        }
    }

    pub fn verify_member_signature(&self, member: &MemberSignature) -> bool {
        member
            .public_key
            .verify(&self.signing_hash(), &member.signature)
            .is_ok()
    }

    /// Produce a member approval for this transaction.
    pub fn member_sign(&self, member: &Keypair) -> MemberSignature {
        MemberSignature {
            public_key: member.public(),
            signature: member.sign(&self.signing_hash()),
        }
    }

    pub fn multisig_asset(&self) -> Option<&MultisigAsset> {
        match &self.asset {
            Asset::Multisignature(m) => Some(m),
            _ => None,
        }
    }
}
