//! Schema validation: turns a raw JSON transaction into a typed `Transaction` and checks
//! every stateless field constraint before any business logic runs.
//!
//! Validation is pure. The first offending field wins and is reported together with the
//! specific constraint it violated.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::crypto::{Address, PublicKey, Signature};
use crate::node::config::{MultisigConstraints, ProtocolConfig};
use crate::transaction::types::{
    Asset, DappAsset, MemberSignature, MultisigAsset, Transaction, TransactionType, TxId,
};

pub const MAX_TRANSFER_DATA: usize = 64;
pub const MAX_USERNAME: usize = 20;
pub const MAX_DAPP_NAME: usize = 32;
pub const MAX_DAPP_TEXT: usize = 160;
pub const MAX_DAPP_CATEGORY: u8 = 8;

/// The constraint a field broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Malformed(String),
    Required,
    WrongType { expected: &'static str, found: &'static str },
    TooShort { len: usize, min: usize },
    TooLong { len: usize, max: usize },
    StringTooShort { len: usize, min: usize },
    StringTooLong { len: usize, max: usize },
    BelowMinimum { value: i64, min: i64 },
    AboveMaximum { value: i64, max: i64 },
    Format { format: &'static str, value: String },
    InvalidMember,
    InvalidOperator,
    InvalidPublicKey,
    ContainsSender,
    DuplicateKey,
    MinExceedsKeysgroup,
    /// Stateless rule with a fixed message.
    Rule(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct SchemaError {
    /// Schema the field belongs to (`transaction`, `multisignature`, ...).
    pub schema: &'static str,
    pub field: &'static str,
    pub violation: Violation,
}

impl SchemaError {
    pub fn new(schema: &'static str, field: &'static str, violation: Violation) -> Self {
        Self { schema, field, violation }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new("transaction", "body", Violation::Malformed(detail.into()))
    }

    fn message(&self) -> String {
        let bound = match &self.violation {
            Violation::Malformed(detail) => return format!("Invalid transaction body - {}", detail),
            Violation::Required => format!("Missing required property: {}", self.field),
            Violation::WrongType { expected, found } => {
                format!("Expected type {} but found type {}", expected, found)
            }
            Violation::TooShort { len, min } => format!("Array is too short ({}), minimum {}", len, min),
            Violation::TooLong { len, max } => format!("Array is too long ({}), maximum {}", len, max),
            Violation::StringTooShort { len, min } => {
                format!("String is too short ({} chars), minimum {}", len, min)
            }
            Violation::StringTooLong { len, max } => {
                format!("String is too long ({} chars), maximum {}", len, max)
            }
            Violation::BelowMinimum { value, min } => format!("Value {} is less than minimum {}", value, min),
            Violation::AboveMaximum { value, max } => format!("Value {} is greater than maximum {}", value, max),
            Violation::Format { format, value } => {
                format!("Object didn't pass validation for format {}: {}", format, value)
            }
            Violation::InvalidMember => return "Invalid member in keysgroup".into(),
            Violation::InvalidOperator => return "Invalid math operator in multisignature keysgroup".into(),
            Violation::InvalidPublicKey => return "Invalid public key in multisignature keysgroup".into(),
            Violation::ContainsSender => {
                return "Invalid multisignature keysgroup. Can not contain sender".into()
            }
            Violation::DuplicateKey => {
                return "Encountered duplicate public key in multisignature keysgroup".into()
            }
            Violation::MinExceedsKeysgroup => {
                return "Invalid multisignature min. Must be less than or equal to keysgroup size".into()
            }
            Violation::Rule(msg) => return (*msg).to_string(),
        };
        format!("Invalid transaction body - Failed to validate {} schema: {}", self.schema, bound)
    }
}

type SchemaResult<T> = Result<T, SchemaError>;

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required<'a>(obj: &'a Value, schema: &'static str, field: &'static str) -> SchemaResult<&'a Value> {
    match obj.get(field) {
        Some(Value::Null) | None => Err(SchemaError::new(schema, field, Violation::Required)),
        Some(v) => Ok(v),
    }
}

fn optional<'a>(obj: &'a Value, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn as_str<'a>(v: &'a Value, schema: &'static str, field: &'static str) -> SchemaResult<&'a str> {
    v.as_str().ok_or_else(|| {
        SchemaError::new(schema, field, Violation::WrongType { expected: "string", found: json_type(v) })
    })
}

fn as_i64(v: &Value, schema: &'static str, field: &'static str) -> SchemaResult<i64> {
    v.as_i64().ok_or_else(|| {
        SchemaError::new(schema, field, Violation::WrongType { expected: "integer", found: json_type(v) })
    })
}

/// Amounts may arrive as JSON numbers or decimal strings.
fn as_amount(v: &Value, field: &'static str) -> SchemaResult<u64> {
    match v {
        Value::Number(n) => n.as_u64().ok_or_else(|| match n.as_i64() {
            Some(value) => SchemaError::new("transaction", field, Violation::BelowMinimum { value, min: 0 }),
            None => SchemaError::new(
                "transaction",
                field,
                Violation::WrongType { expected: "integer", found: json_type(v) },
            ),
        }),
        Value::String(s) => s.parse::<u64>().map_err(|_| {
            SchemaError::new("transaction", field, Violation::Format { format: "amount", value: s.clone() })
        }),
        other => Err(SchemaError::new(
            "transaction",
            field,
            Violation::WrongType { expected: "integer", found: json_type(other) },
        )),
    }
}

fn as_array<'a>(v: &'a Value, schema: &'static str, field: &'static str) -> SchemaResult<&'a Vec<Value>> {
    v.as_array().ok_or_else(|| {
        SchemaError::new(schema, field, Violation::WrongType { expected: "array", found: json_type(v) })
    })
}

fn parse_public_key(s: &str, schema: &'static str, field: &'static str) -> SchemaResult<PublicKey> {
    PublicKey::from_hex(s).map_err(|_| {
        SchemaError::new(schema, field, Violation::Format { format: "publicKey", value: s.to_string() })
    })
}

fn parse_signature(s: &str, field: &'static str) -> SchemaResult<Signature> {
    Signature::from_hex(s).map_err(|_| {
        SchemaError::new("transaction", field, Violation::Format { format: "signature", value: s.to_string() })
    })
}

fn parse_id(s: &str, schema: &'static str, field: &'static str) -> SchemaResult<TxId> {
    if s.is_empty() || s.len() > 20 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SchemaError::new(schema, field, Violation::Format { format: "id", value: s.to_string() }));
    }
    s.parse::<TxId>()
        .map_err(|_| SchemaError::new(schema, field, Violation::Format { format: "id", value: s.to_string() }))
}

fn check_string_len(s: &str, min: usize, max: usize, schema: &'static str, field: &'static str) -> SchemaResult<()> {
    let len = s.chars().count();
    if len < min {
        return Err(SchemaError::new(schema, field, Violation::StringTooShort { len, min }));
    }
    if len > max {
        return Err(SchemaError::new(schema, field, Violation::StringTooLong { len, max }));
    }
    Ok(())
}

fn check_bounds(value: i64, min: i64, max: i64, schema: &'static str, field: &'static str) -> SchemaResult<()> {
    if value < min {
        return Err(SchemaError::new(schema, field, Violation::BelowMinimum { value, min }));
    }
    if value > max {
        return Err(SchemaError::new(schema, field, Violation::AboveMaximum { value, max }));
    }
    Ok(())
}

fn check_positive(amount: u64, schema: &'static str, field: &'static str) -> SchemaResult<()> {
    if amount == 0 {
        return Err(SchemaError::new(schema, field, Violation::BelowMinimum { value: 0, min: 1 }));
    }
    Ok(())
}

fn check_optional_len(v: &Option<String>, max: usize, schema: &'static str, field: &'static str) -> SchemaResult<()> {
    match v {
        Some(s) => check_string_len(s, 0, max, schema, field),
        None => Ok(()),
    }
}

/// Validates raw and typed transactions against the protocol's field constraints.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    multisig: MultisigConstraints,
    max_votes_per_transaction: usize,
}

impl SchemaValidator {
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self {
            multisig: protocol.multisig.clone(),
            max_votes_per_transaction: protocol.max_votes_per_transaction,
        }
    }

    /// Multisignature asset rules, in order: keysgroup length, `min` bounds, `lifetime`
    /// bounds, `min <= keysgroup.len()`, then each member (present, `+` operator, valid
    /// key, not the sender), then duplicates.
    pub fn check_multisignature(
        &self,
        min: i64,
        lifetime: i64,
        keysgroup: &[&str],
        sender: &PublicKey,
    ) -> SchemaResult<Vec<PublicKey>> {
        const S: &str = "multisignature";
        let c = &self.multisig;
        let len = keysgroup.len();
        if len < c.keysgroup_min_items {
            return Err(SchemaError::new(S, "keysgroup", Violation::TooShort { len, min: c.keysgroup_min_items }));
        }
        if len > c.keysgroup_max_items {
            return Err(SchemaError::new(S, "keysgroup", Violation::TooLong { len, max: c.keysgroup_max_items }));
        }
        check_bounds(min, c.min.minimum, c.min.maximum, S, "min")?;
        check_bounds(lifetime, c.lifetime.minimum, c.lifetime.maximum, S, "lifetime")?;
        if min > len as i64 {
            return Err(SchemaError::new(S, "min", Violation::MinExceedsKeysgroup));
        }

        let mut members = Vec::with_capacity(len);
        for entry in keysgroup {
            if entry.is_empty() {
                return Err(SchemaError::new(S, "keysgroup", Violation::InvalidMember));
            }
            let key = entry
                .strip_prefix('+')
                .ok_or_else(|| SchemaError::new(S, "keysgroup", Violation::InvalidOperator))?;
            let pk = PublicKey::from_hex(key)
                .map_err(|_| SchemaError::new(S, "keysgroup", Violation::InvalidPublicKey))?;
            if &pk == sender {
                return Err(SchemaError::new(S, "keysgroup", Violation::ContainsSender));
            }
            members.push(pk);
        }

        let mut seen = HashSet::with_capacity(members.len());
        if !members.iter().all(|pk| seen.insert(*pk)) {
            return Err(SchemaError::new(S, "keysgroup", Violation::DuplicateKey));
        }
        Ok(members)
    }

    /// Stateless checks on a typed transaction. Runs on every admitted transaction and
    /// again on transactions arriving inside externally produced blocks.
    pub fn validate_transaction(&self, tx: &Transaction) -> SchemaResult<()> {
        const T: &str = "transaction";
        if tx.asset.kind() != tx.kind {
            return Err(SchemaError::malformed("Asset does not match transaction type"));
        }
        let schema = tx.kind.schema_name();

        match &tx.asset {
            Asset::Transfer { data } => {
                if tx.recipient_id.is_none() {
                    return Err(SchemaError::new(T, "recipientId", Violation::Required));
                }
                check_positive(tx.amount, T, "amount")?;
                check_optional_len(data, MAX_TRANSFER_DATA, schema, "data")?;
            }
            Asset::SecondSignature { .. } | Asset::Delegate { .. } | Asset::Multisignature(_) | Asset::Dapp(_) => {
                if tx.recipient_id.is_some() {
                    return Err(SchemaError::new(T, "recipientId", Violation::Rule("Invalid recipient")));
                }
                if tx.amount != 0 {
                    return Err(SchemaError::new(T, "amount", Violation::Rule("Invalid transaction amount")));
                }
            }
            Asset::Votes(_) => {
                if tx.recipient_id != Some(tx.sender()) {
                    return Err(SchemaError::new(T, "recipientId", Violation::Rule("Invalid recipient")));
                }
                if tx.amount != 0 {
                    return Err(SchemaError::new(T, "amount", Violation::Rule("Invalid transaction amount")));
                }
            }
            Asset::InTransfer { .. } => {
                if tx.recipient_id.is_some() {
                    return Err(SchemaError::new(T, "recipientId", Violation::Rule("Invalid recipient")));
                }
                check_positive(tx.amount, T, "amount")?;
            }
            Asset::OutTransfer { .. } => {
                if tx.recipient_id.is_none() {
                    return Err(SchemaError::new(T, "recipientId", Violation::Required));
                }
                check_positive(tx.amount, T, "amount")?;
            }
        }

        match &tx.asset {
            Asset::Delegate { username } => self.check_username(username),
            Asset::Votes(votes) => self.check_votes(votes),
            Asset::Multisignature(m) => {
                let keys: Vec<&str> = m.keysgroup.iter().map(String::as_str).collect();
                self.check_multisignature(m.min as i64, m.lifetime as i64, &keys, &tx.sender_public_key)
                    .map(|_| ())
            }
            Asset::Dapp(d) => self.check_dapp(d),
            _ => Ok(()),
        }
    }

    fn check_username(&self, username: &str) -> SchemaResult<()> {
        const S: &str = "delegate";
        check_string_len(username, 1, MAX_USERNAME, S, "username")?;
        if username != username.to_lowercase() {
            return Err(SchemaError::new(S, "username", Violation::Rule("Username must be lowercase")));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || "!@$&_.".contains(c)) {
            return Err(SchemaError::new(
                S,
                "username",
                Violation::Rule("Username can only contain alphanumeric characters with the exception of !@$&_."),
            ));
        }
        if username.parse::<Address>().is_ok() || username.to_uppercase().parse::<Address>().is_ok() {
            return Err(SchemaError::new(S, "username", Violation::Rule("Username can not be a potential address")));
        }
        Ok(())
    }

    fn check_votes(&self, votes: &[String]) -> SchemaResult<()> {
        const S: &str = "vote";
        if votes.is_empty() {
            return Err(SchemaError::new(S, "votes", Violation::TooShort { len: 0, min: 1 }));
        }
        if votes.len() > self.max_votes_per_transaction {
            return Err(SchemaError::new(
                S,
                "votes",
                Violation::TooLong { len: votes.len(), max: self.max_votes_per_transaction },
            ));
        }
        let mut seen = HashSet::new();
        for v in votes {
            let key = v
                .strip_prefix('+')
                .or_else(|| v.strip_prefix('-'))
                .and_then(|k| PublicKey::from_hex(k).ok())
                .ok_or_else(|| {
                    SchemaError::new(S, "votes", Violation::Format { format: "signedPublicKey", value: v.clone() })
                })?;
            if !seen.insert(key) {
                return Err(SchemaError::new(
                    S,
                    "votes",
                    Violation::Rule("Multiple votes for same delegate are not allowed"),
                ));
            }
        }
        Ok(())
    }

    fn check_dapp(&self, d: &DappAsset) -> SchemaResult<()> {
        const S: &str = "dapp";
        check_string_len(d.name.trim(), 1, MAX_DAPP_NAME, S, "name")?;
        check_optional_len(&d.description, MAX_DAPP_TEXT, S, "description")?;
        check_optional_len(&d.tags, MAX_DAPP_TEXT, S, "tags")?;
        if d.kind != 0 {
            return Err(SchemaError::new(S, "type", Violation::Rule("Invalid application type")));
        }
        if d.category > MAX_DAPP_CATEGORY {
            return Err(SchemaError::new(S, "category", Violation::Rule("Invalid application category")));
        }
        if !d.link.to_lowercase().ends_with(".zip") {
            return Err(SchemaError::new(S, "link", Violation::Rule("Invalid application link")));
        }
        if let Some(icon) = &d.icon {
            let icon = icon.to_lowercase();
            if ![".png", ".jpeg", ".jpg"].iter().any(|ext| icon.ends_with(ext)) {
                return Err(SchemaError::new(S, "icon", Violation::Rule("Invalid application icon file type")));
            }
        }
        Ok(())
    }

    /// Parse and validate a raw JSON transaction body.
    pub fn normalize(&self, raw: &Value) -> SchemaResult<Transaction> {
        const T: &str = "transaction";
        if !raw.is_object() {
            return Err(SchemaError::malformed(format!("Expected type object but found type {}", json_type(raw))));
        }

        let kind_raw = as_i64(required(raw, T, "type")?, T, "type")?;
        let kind = u8::try_from(kind_raw)
            .map_err(|_| format!("Unknown transaction type {}", kind_raw))
            .and_then(TransactionType::try_from)
            .map_err(SchemaError::malformed)?;

        let timestamp = as_i64(required(raw, T, "timestamp")?, T, "timestamp")?;
        check_bounds(timestamp, 0, u32::MAX as i64, T, "timestamp")?;
        let sender_public_key =
            parse_public_key(as_str(required(raw, T, "senderPublicKey")?, T, "senderPublicKey")?, T, "senderPublicKey")?;
        let recipient_id = match optional(raw, "recipientId") {
            Some(v) => {
                let s = as_str(v, T, "recipientId")?;
                Some(s.parse::<Address>().map_err(|_| {
                    SchemaError::new(T, "recipientId", Violation::Format { format: "address", value: s.to_string() })
                })?)
            }
            None => None,
        };
        let amount = as_amount(required(raw, T, "amount")?, "amount")?;
        let fee = as_amount(required(raw, T, "fee")?, "fee")?;
        let signature = parse_signature(as_str(required(raw, T, "signature")?, T, "signature")?, "signature")?;
        let sign_signature = match optional(raw, "signSignature") {
            Some(v) => Some(parse_signature(as_str(v, T, "signSignature")?, "signSignature")?),
            None => None,
        };
        let signatures = match optional(raw, "signatures") {
            Some(v) => as_array(v, T, "signatures")?
                .iter()
                .map(|s| {
                    let pk = parse_public_key(as_str(required(s, T, "publicKey")?, T, "publicKey")?, T, "publicKey")?;
                    let sig = parse_signature(as_str(required(s, T, "signature")?, T, "signature")?, "signatures")?;
                    Ok(MemberSignature { public_key: pk, signature: sig })
                })
                .collect::<SchemaResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let empty = Value::Object(Default::default());
        let asset_raw = optional(raw, "asset").unwrap_or(&empty);
        let asset = self.parse_asset(kind, asset_raw, &sender_public_key)?;

        let mut tx = Transaction {
            id: TxId(0),
            kind,
            timestamp: timestamp as u32,
            sender_public_key,
            recipient_id,
            amount,
            fee,
            asset,
            signature,
            sign_signature,
            signatures,
        };
        tx.id = tx.compute_id();
        if let Some(v) = optional(raw, "id") {
            let claimed = as_str(v, T, "id")?;
            if claimed != tx.id.to_string() {
                return Err(SchemaError::new(T, "id", Violation::Rule("Invalid transaction id")));
            }
        }

        self.validate_transaction(&tx)?;
        Ok(tx)
    }

    fn parse_asset(&self, kind: TransactionType, asset: &Value, sender: &PublicKey) -> SchemaResult<Asset> {
        Ok(match kind {
            TransactionType::Transfer => {
                let inner = optional(asset, "transfer").unwrap_or(asset);
                let data = match optional(inner, "data") {
                    Some(v) => Some(as_str(v, "transfer", "data")?.to_string()),
                    None => None,
                };
                Asset::Transfer { data }
            }
            TransactionType::SecondSignature => {
                const S: &str = "signature";
                let inner = required(asset, S, "signature")?;
                let pk = parse_public_key(as_str(required(inner, S, "publicKey")?, S, "publicKey")?, S, "publicKey")?;
                Asset::SecondSignature { public_key: pk }
            }
            TransactionType::Delegate => {
                const S: &str = "delegate";
                let inner = required(asset, S, "delegate")?;
                let username = as_str(required(inner, S, "username")?, S, "username")?;
                Asset::Delegate { username: username.to_string() }
            }
            TransactionType::Vote => {
                const S: &str = "vote";
                let votes = as_array(required(asset, S, "votes")?, S, "votes")?
                    .iter()
                    .map(|v| as_str(v, S, "votes").map(str::to_string))
                    .collect::<SchemaResult<Vec<_>>>()?;
                Asset::Votes(votes)
            }
            TransactionType::Multisignature => {
                const S: &str = "multisignature";
                let inner = required(asset, S, "multisignature")?;
                let keysgroup_raw = as_array(required(inner, S, "keysgroup")?, S, "keysgroup")?;
                let min = as_i64(required(inner, S, "min")?, S, "min")?;
                let lifetime = as_i64(required(inner, S, "lifetime")?, S, "lifetime")?;
                // non-string members surface as an invalid member in keysgroup order
                let keysgroup: Vec<&str> = keysgroup_raw.iter().map(|v| v.as_str().unwrap_or("")).collect();
                self.check_multisignature(min, lifetime, &keysgroup, sender)?;
                Asset::Multisignature(MultisigAsset {
                    min: min as u32,
                    lifetime: lifetime as u32,
                    keysgroup: keysgroup.into_iter().map(str::to_string).collect(),
                })
            }
            TransactionType::Dapp => {
                const S: &str = "dapp";
                let inner = required(asset, S, "dapp")?;
                let opt_str = |field: &'static str| -> SchemaResult<Option<String>> {
                    match optional(inner, field) {
                        Some(v) => Ok(Some(as_str(v, S, field)?.to_string())),
                        None => Ok(None),
                    }
                };
                let small = |field: &'static str| -> SchemaResult<u8> {
                    let v = as_i64(required(inner, S, field)?, S, field)?;
                    check_bounds(v, 0, u8::MAX as i64, S, field)?;
                    Ok(v as u8)
                };
                Asset::Dapp(DappAsset {
                    name: as_str(required(inner, S, "name")?, S, "name")?.to_string(),
                    description: opt_str("description")?,
                    tags: opt_str("tags")?,
                    kind: small("type")?,
                    category: small("category")?,
                    link: as_str(required(inner, S, "link")?, S, "link")?.to_string(),
                    icon: opt_str("icon")?,
                })
            }
            TransactionType::InTransfer => {
                const S: &str = "inTransfer";
                let inner = required(asset, S, "inTransfer")?;
                let dapp_id = parse_id(as_str(required(inner, S, "dappId")?, S, "dappId")?, S, "dappId")?;
                Asset::InTransfer { dapp_id }
            }
            TransactionType::OutTransfer => {
                const S: &str = "outTransfer";
                let inner = required(asset, S, "outTransfer")?;
                let dapp_id = parse_id(as_str(required(inner, S, "dappId")?, S, "dappId")?, S, "dappId")?;
                let transaction_id =
                    parse_id(as_str(required(inner, S, "transactionId")?, S, "transactionId")?, S, "transactionId")?;
                Asset::OutTransfer { dapp_id, transaction_id }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn validator() -> SchemaValidator {
        SchemaValidator::new(&ProtocolConfig::default())
    }

    fn members(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("+{}", Keypair::from_passphrase(&format!("member {}", i)).unwrap().public().to_hex()))
            .collect()
    }

    fn check(min: i64, lifetime: i64, keys: &[String]) -> SchemaResult<Vec<PublicKey>> {
        let sender = Keypair::from_passphrase("sender").unwrap().public();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        validator().check_multisignature(min, lifetime, &refs, &sender)
    }

    #[test]
    fn test_keysgroup_length_bounds() {
        let err = check(1, 24, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transaction body - Failed to validate multisignature schema: Array is too short (0), minimum 1"
        );
        assert_eq!(err.field, "keysgroup");

        let err = check(2, 24, &members(16)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transaction body - Failed to validate multisignature schema: Array is too long (16), maximum 15"
        );
        assert_eq!(check(2, 24, &members(15)).unwrap().len(), 15);
        assert_eq!(check(1, 24, &members(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_min_and_lifetime_bounds() {
        let keys = members(15);
        assert_eq!(
            check(16, 24, &keys).unwrap_err().to_string(),
            "Invalid transaction body - Failed to validate multisignature schema: Value 16 is greater than maximum 15"
        );
        assert_eq!(
            check(0, 24, &keys).unwrap_err().to_string(),
            "Invalid transaction body - Failed to validate multisignature schema: Value 0 is less than minimum 1"
        );
        assert_eq!(
            check(2, 73, &keys).unwrap_err().to_string(),
            "Invalid transaction body - Failed to validate multisignature schema: Value 73 is greater than maximum 72"
        );
        let err = check(2, 0, &keys).unwrap_err();
        assert_eq!(err.field, "lifetime");
        assert_eq!(err.violation, Violation::BelowMinimum { value: 0, min: 1 });
    }

    #[test]
    fn test_min_above_keysgroup_size() {
        let err = check(4, 24, &members(3)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid multisignature min. Must be less than or equal to keysgroup size");
    }

    #[test]
    fn test_member_rules() {
        let mut keys = members(2);
        let pk = keys[0][1..].to_string();

        keys.push(String::new());
        assert_eq!(check(2, 24, &keys).unwrap_err().to_string(), "Invalid member in keysgroup");

        keys[2] = pk.clone();
        assert_eq!(
            check(2, 24, &keys).unwrap_err().to_string(),
            "Invalid math operator in multisignature keysgroup"
        );
        keys[2] = format!("-{}", pk);
        assert_eq!(check(2, 24, &keys).unwrap_err().violation, Violation::InvalidOperator);
        keys[2] = "+".into();
        assert_eq!(check(2, 24, &keys).unwrap_err().to_string(), "Invalid public key in multisignature keysgroup");
        keys[2] = format!("++{}", pk);
        assert_eq!(check(2, 24, &keys).unwrap_err().violation, Violation::InvalidPublicKey);

        let sender = Keypair::from_passphrase("sender").unwrap().public();
        keys[2] = format!("+{}", sender.to_hex());
        assert_eq!(
            check(2, 24, &keys).unwrap_err().to_string(),
            "Invalid multisignature keysgroup. Can not contain sender"
        );

        keys[2] = format!("+{}", pk);
        assert_eq!(
            check(2, 24, &keys).unwrap_err().to_string(),
            "Encountered duplicate public key in multisignature keysgroup"
        );
    }

    #[test]
    fn test_normalize_multisig_json() {
        let sender = Keypair::from_passphrase("sender").unwrap();
        let keys = members(3);
        let tx = crate::transaction::types::UnsignedTransaction {
            kind: TransactionType::Multisignature,
            timestamp: 100,
            sender_public_key: sender.public(),
            recipient_id: None,
            amount: 0,
            fee: 20 * crate::node::config::COIN,
            asset: Asset::Multisignature(MultisigAsset { min: 2, lifetime: 24, keysgroup: keys }),
        }
        .sign(&sender, None);
        let raw = serde_json::json!({
            "type": 4,
            "timestamp": 100,
            "senderPublicKey": sender.public().to_hex(),
            "amount": 0,
            "fee": "2000000000",
            "asset": serde_json::to_value(&tx.asset).unwrap(),
            "signature": tx.signature.to_hex(),
            "id": tx.id.to_string(),
        });
        let parsed = validator().normalize(&raw).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn test_normalize_rejects_non_string_member_and_bad_body() {
        let sender = Keypair::from_passphrase("sender").unwrap();
        let raw = serde_json::json!({
            "type": 4,
            "timestamp": 1,
            "senderPublicKey": sender.public().to_hex(),
            "amount": 0,
            "fee": 0,
            "asset": { "multisignature": { "min": 1, "lifetime": 1, "keysgroup": [42] } },
            "signature": hex::encode([0u8; 64]),
        });
        assert_eq!(validator().normalize(&raw).unwrap_err().violation, Violation::InvalidMember);

        let err = validator().normalize(&serde_json::json!("nope")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid transaction body - "));

        let err = validator().normalize(&serde_json::json!({ "type": 9 })).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transaction body - Unknown transaction type 9");
    }

    #[test]
    fn test_amount_reports_real_value() {
        let err = as_amount(&serde_json::json!(-5), "amount").unwrap_err();
        assert_eq!(err.violation, Violation::BelowMinimum { value: -5, min: 0 });
        let err = as_amount(&serde_json::json!(1.5), "amount").unwrap_err();
        assert_eq!(err.violation, Violation::WrongType { expected: "integer", found: "number" });
        assert_eq!(as_amount(&serde_json::json!(u64::MAX), "amount").unwrap(), u64::MAX);

        let sender = Keypair::from_passphrase("sender").unwrap();
        let transfer = |amount| {
            crate::transaction::types::UnsignedTransaction {
                kind: TransactionType::Transfer,
                timestamp: 1,
                sender_public_key: sender.public(),
                recipient_id: Some(sender.address()),
                amount,
                fee: crate::node::config::COIN / 10,
                asset: Asset::Transfer { data: None },
            }
            .sign(&sender, None)
        };
        assert!(validator().validate_transaction(&transfer(u64::MAX)).is_ok());
        assert_eq!(
            validator().validate_transaction(&transfer(0)).unwrap_err().violation,
            Violation::BelowMinimum { value: 0, min: 1 }
        );
    }

    #[test]
    fn test_username_rules() {
        let v = validator();
        assert!(v.check_username("genesis_1").is_ok());
        assert!(v.check_username("Upper").is_err());
        assert!(v.check_username("has space").is_err());
        assert!(v.check_username("1234l").is_err());
        assert_eq!(
            v.check_username("aaaaaaaaaaaaaaaaaaaaa").unwrap_err().violation,
            Violation::StringTooLong { len: 21, max: 20 }
        );
    }

    #[test]
    fn test_vote_rules() {
        let v = validator();
        let pk = Keypair::from_passphrase("delegate").unwrap().public().to_hex();
        assert!(v.check_votes(&[format!("+{}", pk)]).is_ok());
        assert!(v.check_votes(&[]).is_err());
        assert!(v.check_votes(&[pk.clone()]).is_err());
        assert!(v.check_votes(&[format!("+{}", pk), format!("-{}", pk)]).is_err());
    }
}
