use crate::crypto::PublicKey;
use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, Transaction, TransactionType};

use super::TransactionProcessor;

/// Type 3: add (`+pk`) or remove (`-pk`) votes for delegates.
pub struct VoteProcessor {
    max_votes_per_account: usize,
}

impl VoteProcessor {
    pub fn new(max_votes_per_account: usize) -> Self {
        Self { max_votes_per_account }
    }
}

enum VoteOp {
    Add(PublicKey),
    Remove(PublicKey),
}

fn parse_votes(tx: &Transaction) -> Result<Vec<VoteOp>, TransactionError> {
    let Asset::Votes(votes) = &tx.asset else {
        return Err(TransactionError::rule("Invalid transaction asset"));
    };
    votes
        .iter()
        .map(|v| {
            let parse = |k: &str| PublicKey::from_hex(k).map_err(|_| TransactionError::rule("Invalid vote format"));
            if let Some(k) = v.strip_prefix('+') {
                Ok(VoteOp::Add(parse(k)?))
            } else if let Some(k) = v.strip_prefix('-') {
                Ok(VoteOp::Remove(parse(k)?))
            } else {
                Err(TransactionError::rule("Invalid vote format"))
            }
        })
        .collect()
}

impl VoteProcessor {
    fn resulting_votes(&self, tx: &Transaction, sender: &Account, view: &dyn StateView) -> Result<Vec<PublicKey>, TransactionError> {
        let mut votes = sender.votes.clone();
        for op in parse_votes(tx)? {
            match op {
                VoteOp::Add(key) => {
                    let is_delegate = view.account(&key.address()).map_or(false, |a| a.is_delegate);
                    if !is_delegate {
                        return Err(TransactionError::rule("Delegate not found"));
                    }
                    if votes.contains(&key) {
                        return Err(TransactionError::rule(
                            "Failed to add vote, account has already voted for this delegate",
                        ));
                    }
                    votes.push(key);
                }
                VoteOp::Remove(key) => {
                    let pos = votes.iter().position(|k| *k == key).ok_or_else(|| {
                        TransactionError::rule("Failed to remove vote, account has not voted for this delegate")
                    })?;
                    votes.remove(pos);
                }
            }
        }
        if votes.len() > self.max_votes_per_account {
            return Err(TransactionError::rule(format!(
                "Maximum number of {} votes exceeded",
                self.max_votes_per_account
            )));
        }
        Ok(votes)
    }
}

impl TransactionProcessor for VoteProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::Vote
    }

    fn validate(&self, tx: &Transaction, sender: &Account, view: &dyn StateView) -> Result<(), TransactionError> {
        self.resulting_votes(tx, sender, view).map(|_| ())
    }

    fn apply_to(&self, tx: &Transaction, mut sender: Account, view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        sender.votes = self.resulting_votes(tx, &sender, view)?;
        let mut diff = StateDiff::default();
        diff.put_account(sender);
        Ok(diff)
    }
}
