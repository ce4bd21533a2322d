//! Address and wallet projection.
//!
//! Applies merged balance deltas to the balance and history tables, moves
//! amounts from locked to unlocked, keeps wallets' address gap filled and
//! rebuilds projections from the UTXO store after a reorg.

use sea_orm::ConnectionTrait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::errors::IngestError;
use crate::domain::models::{
    Authorities, Balance, HistoryEntry, TokenBalance, Utxo, Wallet, WalletStatus,
};
use crate::domain::services::{AddressDeriver, OwnerBalanceMap};
use crate::infrastructure::persistence::error::DbError;
use crate::infrastructure::persistence::Repositories;

/// Result of filling a wallet's address gap
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GapOutcome {
    /// Addresses attached to the wallet, newly derived or claimed
    pub new_addresses: Vec<String>,
    /// Claimed addresses that already had transactions
    pub absorbed: Vec<String>,
}

impl GapOutcome {
    pub fn absorbed_history(&self) -> bool {
        !self.absorbed.is_empty()
    }
}

fn min_expiry(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn empty_balance(token_id: &str) -> TokenBalance {
    TokenBalance {
        token_id: token_id.to_string(),
        unlocked_balance: 0,
        locked_balance: 0,
        lock_expires: None,
        unlocked_authorities: Authorities::NONE,
        locked_authorities: Authorities::NONE,
        transactions: 0,
    }
}

/// Add a delta to a stored row, counting one more transaction
fn apply_delta(row: &TokenBalance, delta: &Balance) -> TokenBalance {
    TokenBalance {
        token_id: row.token_id.clone(),
        unlocked_balance: row.unlocked_balance + delta.unlocked,
        locked_balance: row.locked_balance + delta.locked,
        lock_expires: min_expiry(row.lock_expires, delta.lock_expires),
        unlocked_authorities: row.unlocked_authorities
            | delta.unlocked_authorities.granted_bits(),
        locked_authorities: row.locked_authorities | delta.locked_authorities.granted_bits(),
        transactions: row.transactions + 1,
    }
}

/// Per (owner, token) aggregate of a set of UTXOs
#[derive(Debug, Default, Clone)]
struct UtxoTotals {
    unlocked: i64,
    locked: i64,
    lock_expires: Option<i64>,
    unlocked_authorities: Authorities,
    locked_authorities: Authorities,
}

impl UtxoTotals {
    fn add(&mut self, utxo: &Utxo) {
        if utxo.locked {
            self.locked += utxo.value;
            self.locked_authorities = self.locked_authorities | utxo.authorities;
            self.lock_expires = min_expiry(self.lock_expires, utxo.timelock);
        } else {
            self.unlocked += utxo.value;
            self.unlocked_authorities = self.unlocked_authorities | utxo.authorities;
        }
    }
}

fn totals_by_owner_token(utxos: &[Utxo]) -> BTreeMap<(String, String), UtxoTotals> {
    let mut totals: BTreeMap<(String, String), UtxoTotals> = BTreeMap::new();
    for utxo in utxos {
        totals
            .entry((utxo.address.clone(), utxo.token_id.clone()))
            .or_default()
            .add(utxo);
    }
    totals
}

/// Applies ledger effects to address and wallet projections
#[derive(Clone)]
pub struct Projector {
    deriver: Arc<dyn AddressDeriver>,
}

impl Projector {
    pub fn new(deriver: Arc<dyn AddressDeriver>) -> Self {
        Self { deriver }
    }

    /// Apply one transaction's per-address deltas.
    /// Must run after the UTXO store reflects the transaction, since negative
    /// authority changes are resolved from the remaining unspent outputs.
    pub async fn apply_address_deltas<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        tx_id: &str,
        timestamp: i64,
        deltas: &OwnerBalanceMap,
    ) -> Result<(), DbError> {
        if deltas.is_empty() {
            return Ok(());
        }

        let addresses: Vec<String> = deltas.keys().cloned().collect();
        repos.address.ensure(&addresses).await?;
        repos.address.increment_transactions(&addresses).await?;

        let mut history = Vec::new();
        for (address, tokens) in deltas {
            for (token_id, delta) in tokens.iter() {
                history.push((
                    address.clone(),
                    HistoryEntry {
                        tx_id: tx_id.to_string(),
                        token_id: token_id.clone(),
                        balance: delta.total(),
                        timestamp,
                        voided: false,
                    },
                ));

                let current = repos
                    .balance
                    .address_balance(address, token_id)
                    .await?
                    .unwrap_or_else(|| empty_balance(token_id));
                let mut updated = apply_delta(&current, delta);

                if delta.has_negative_authority() {
                    let (unlocked, locked) = self
                        .authorities_from_utxos(repos, address, token_id)
                        .await?;
                    updated.unlocked_authorities = unlocked;
                    updated.locked_authorities = locked;
                }

                repos.balance.save_address_balance(address, &updated).await?;
            }
        }
        repos.history.save_address_history(&history).await?;

        Ok(())
    }

    /// Apply one transaction's per-wallet deltas. Runs after the address deltas,
    /// whose balances are the source for negative authority changes.
    pub async fn apply_wallet_deltas<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        tx_id: &str,
        timestamp: i64,
        deltas: &OwnerBalanceMap,
    ) -> Result<(), DbError> {
        let mut history = Vec::new();
        for (wallet_id, tokens) in deltas {
            for (token_id, delta) in tokens.iter() {
                history.push((
                    wallet_id.clone(),
                    HistoryEntry {
                        tx_id: tx_id.to_string(),
                        token_id: token_id.clone(),
                        balance: delta.total(),
                        timestamp,
                        voided: false,
                    },
                ));

                let current = repos
                    .balance
                    .wallet_balance(wallet_id, token_id)
                    .await?
                    .unwrap_or_else(|| empty_balance(token_id));
                let mut updated = apply_delta(&current, delta);

                if delta.has_negative_authority() {
                    let (unlocked, locked) = self
                        .authorities_from_addresses(repos, wallet_id, token_id)
                        .await?;
                    updated.unlocked_authorities = unlocked;
                    updated.locked_authorities = locked;
                }

                repos.balance.save_wallet_balance(wallet_id, &updated).await?;
            }
        }
        repos.history.save_wallet_history(&history).await?;

        Ok(())
    }

    /// Move just-unlocked outputs from locked to unlocked balances.
    /// The UTXO store must already have cleared their `locked` flag.
    pub async fn apply_unlock<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        unlocked: &[Utxo],
    ) -> Result<(), DbError> {
        if unlocked.is_empty() {
            return Ok(());
        }

        let moved = totals_by_owner_token(
            &unlocked
                .iter()
                .map(|u| Utxo {
                    locked: false,
                    ..u.clone()
                })
                .collect::<Vec<_>>(),
        );

        let addresses: Vec<String> = moved
            .keys()
            .map(|(address, _)| address.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let remaining = totals_by_owner_token(
            &repos
                .utxo
                .unspent_for_addresses(&addresses)
                .await?
                .into_iter()
                .filter(|u| u.locked)
                .collect::<Vec<_>>(),
        );

        for ((address, token_id), amount) in &moved {
            let current = repos
                .balance
                .address_balance(address, token_id)
                .await?
                .unwrap_or_else(|| empty_balance(token_id));
            let still_locked = remaining.get(&(address.clone(), token_id.clone()));

            let updated = TokenBalance {
                unlocked_balance: current.unlocked_balance + amount.unlocked,
                locked_balance: current.locked_balance - amount.unlocked,
                unlocked_authorities: current.unlocked_authorities | amount.unlocked_authorities,
                locked_authorities: still_locked
                    .map(|t| t.locked_authorities)
                    .unwrap_or_default(),
                lock_expires: still_locked.and_then(|t| t.lock_expires),
                ..current
            };
            repos.balance.save_address_balance(address, &updated).await?;
        }

        // Wallet rows follow the same move, for wallets already tracking balances
        let owners = repos.address.find_many(&addresses).await?;
        let wallet_ids: Vec<String> = owners
            .iter()
            .filter_map(|a| a.wallet_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ready: BTreeSet<String> = repos
            .wallet
            .lock_many(&wallet_ids)
            .await?
            .into_iter()
            .filter(|w| w.status == WalletStatus::Ready)
            .map(|w| w.wallet_id)
            .collect();

        let mut by_wallet: BTreeMap<(String, String), UtxoTotals> = BTreeMap::new();
        for owner in &owners {
            let Some(wallet_id) = owner.wallet_id.as_ref().filter(|id| ready.contains(*id)) else {
                continue;
            };
            for ((address, token_id), amount) in &moved {
                if address != &owner.address {
                    continue;
                }
                let entry = by_wallet
                    .entry((wallet_id.clone(), token_id.clone()))
                    .or_default();
                entry.unlocked += amount.unlocked;
                entry.unlocked_authorities =
                    entry.unlocked_authorities | amount.unlocked_authorities;
            }
        }

        for ((wallet_id, token_id), amount) in &by_wallet {
            let current = repos
                .balance
                .wallet_balance(wallet_id, token_id)
                .await?
                .unwrap_or_else(|| empty_balance(token_id));
            let (locked_authorities, lock_expires) =
                self.locked_state_from_addresses(repos, wallet_id, token_id).await?;

            let updated = TokenBalance {
                unlocked_balance: current.unlocked_balance + amount.unlocked,
                locked_balance: current.locked_balance - amount.unlocked,
                unlocked_authorities: current.unlocked_authorities | amount.unlocked_authorities,
                locked_authorities,
                lock_expires,
                ..current
            };
            repos.balance.save_wallet_balance(wallet_id, &updated).await?;
        }

        Ok(())
    }

    /// Derive and attach addresses until `max_gap` unused addresses follow the
    /// highest used one. Known addresses without an owner are claimed in place.
    pub async fn maintain_gap<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet: &Wallet,
    ) -> Result<GapOutcome, IngestError> {
        let known = repos.address.wallet_addresses(&wallet.wallet_id).await?;
        let mut last_used = known
            .iter()
            .filter(|a| a.transactions > 0)
            .filter_map(|a| a.derivation_index)
            .max()
            .unwrap_or(-1);
        let mut highest = known
            .iter()
            .filter_map(|a| a.derivation_index)
            .max()
            .unwrap_or(-1);

        let mut outcome = GapOutcome::default();
        while highest < last_used + wallet.max_gap {
            let start = highest + 1;
            let count = last_used + wallet.max_gap - highest;
            let derived = self
                .deriver
                .derive_addresses(&wallet.xpubkey, start as u32, count as u32)?;

            for (index, address) in derived {
                if let Some(existing) = repos.address.find(&address).await? {
                    if let Some(owner) = existing.wallet_id.as_ref() {
                        if owner != &wallet.wallet_id {
                            return Err(IngestError::Consistency(format!(
                                "address {} derived for wallet {} belongs to wallet {}",
                                address, wallet.wallet_id, owner
                            )));
                        }
                    }
                    if existing.transactions > 0 {
                        last_used = last_used.max(index);
                        outcome.absorbed.push(address.clone());
                    }
                }
                repos
                    .address
                    .claim(&address, &wallet.wallet_id, index)
                    .await?;
                outcome.new_addresses.push(address);
            }
            highest = start + count - 1;
        }

        Ok(outcome)
    }

    /// Write wallet history for every transaction touching `addresses`, grouped
    /// per (tx, token) over all of the wallet's addresses
    pub async fn seed_wallet_history<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet_id: &str,
        addresses: &[String],
    ) -> Result<(), DbError> {
        let tx_ids: BTreeSet<String> = repos
            .history
            .address_history(addresses)
            .await?
            .into_iter()
            .map(|(_, entry)| entry.tx_id)
            .collect();
        if tx_ids.is_empty() {
            return Ok(());
        }

        let owned: Vec<String> = repos
            .address
            .wallet_addresses(wallet_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();

        let mut grouped: BTreeMap<(String, String), HistoryEntry> = BTreeMap::new();
        for (_, entry) in repos.history.address_history(&owned).await? {
            if !tx_ids.contains(&entry.tx_id) {
                continue;
            }
            grouped
                .entry((entry.tx_id.clone(), entry.token_id.clone()))
                .and_modify(|e| e.balance += entry.balance)
                .or_insert(entry);
        }

        let rows: Vec<(String, HistoryEntry)> = grouped
            .into_values()
            .map(|entry| (wallet_id.to_string(), entry))
            .collect();
        repos.history.save_wallet_history(&rows).await
    }

    /// Recompute address balances and transaction counts from unspent outputs
    /// and non-voided history
    pub async fn rebuild_address_balances<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        addresses: &[String],
    ) -> Result<(), DbError> {
        if addresses.is_empty() {
            return Ok(());
        }

        let totals = totals_by_owner_token(&repos.utxo.unspent_for_addresses(addresses).await?);
        let history = repos.history.address_history(addresses).await?;

        let mut row_counts: BTreeMap<(String, String), i32> = BTreeMap::new();
        let mut tx_counts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (address, entry) in &history {
            *row_counts
                .entry((address.clone(), entry.token_id.clone()))
                .or_default() += 1;
            tx_counts
                .entry(address.clone())
                .or_default()
                .insert(entry.tx_id.clone());
        }

        repos.balance.delete_address_balances(addresses).await?;

        let keys: BTreeSet<(String, String)> =
            totals.keys().chain(row_counts.keys()).cloned().collect();
        for (address, token_id) in keys {
            let key = (address.clone(), token_id.clone());
            let sums = totals.get(&key).cloned().unwrap_or_default();
            let row = TokenBalance {
                token_id: token_id.clone(),
                unlocked_balance: sums.unlocked,
                locked_balance: sums.locked,
                lock_expires: sums.lock_expires,
                unlocked_authorities: sums.unlocked_authorities,
                locked_authorities: sums.locked_authorities,
                transactions: row_counts.get(&key).copied().unwrap_or(0),
            };
            repos.balance.save_address_balance(&address, &row).await?;
        }

        for address in addresses {
            let count = tx_counts.get(address).map(|txs| txs.len()).unwrap_or(0);
            repos
                .address
                .set_transactions(address, count as i32)
                .await?;
        }

        Ok(())
    }

    /// Recompute a wallet's balances from its addresses' balances and its
    /// non-voided history
    pub async fn rebuild_wallet_balances<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet_id: &str,
    ) -> Result<(), DbError> {
        let addresses: Vec<String> = repos
            .address
            .wallet_addresses(wallet_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();

        let mut rows: BTreeMap<String, TokenBalance> = BTreeMap::new();
        for (_, balance) in repos.balance.address_balances(&addresses).await? {
            let row = rows
                .entry(balance.token_id.clone())
                .or_insert_with(|| empty_balance(&balance.token_id));
            row.unlocked_balance += balance.unlocked_balance;
            row.locked_balance += balance.locked_balance;
            row.lock_expires = min_expiry(row.lock_expires, balance.lock_expires);
            row.unlocked_authorities = row.unlocked_authorities | balance.unlocked_authorities;
            row.locked_authorities = row.locked_authorities | balance.locked_authorities;
        }

        for entry in repos.history.wallet_history(wallet_id).await? {
            rows.entry(entry.token_id.clone())
                .or_insert_with(|| empty_balance(&entry.token_id))
                .transactions += 1;
        }

        repos.balance.delete_wallet_balances(wallet_id).await?;
        for row in rows.values() {
            repos.balance.save_wallet_balance(wallet_id, row).await?;
        }

        Ok(())
    }

    /// Capabilities still backed by unspent authority outputs of an address
    async fn authorities_from_utxos<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        address: &str,
        token_id: &str,
    ) -> Result<(Authorities, Authorities), DbError> {
        let mut unlocked = Authorities::NONE;
        let mut locked = Authorities::NONE;
        for utxo in repos
            .utxo
            .unspent_for_addresses(&[address.to_string()])
            .await?
            .iter()
            .filter(|u| u.token_id == token_id && u.is_authority())
        {
            if utxo.locked {
                locked = locked | utxo.authorities;
            } else {
                unlocked = unlocked | utxo.authorities;
            }
        }
        Ok((unlocked, locked))
    }

    /// Capabilities held by any address of a wallet
    async fn authorities_from_addresses<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet_id: &str,
        token_id: &str,
    ) -> Result<(Authorities, Authorities), DbError> {
        let mut unlocked = Authorities::NONE;
        let mut locked = Authorities::NONE;
        for (_, balance) in self.wallet_address_balances(repos, wallet_id, token_id).await? {
            unlocked = unlocked | balance.unlocked_authorities;
            locked = locked | balance.locked_authorities;
        }
        Ok((unlocked, locked))
    }

    /// Locked capabilities and earliest expiry across a wallet's addresses
    async fn locked_state_from_addresses<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet_id: &str,
        token_id: &str,
    ) -> Result<(Authorities, Option<i64>), DbError> {
        let mut locked = Authorities::NONE;
        let mut expires = None;
        for (_, balance) in self.wallet_address_balances(repos, wallet_id, token_id).await? {
            locked = locked | balance.locked_authorities;
            expires = min_expiry(expires, balance.lock_expires);
        }
        Ok((locked, expires))
    }

    async fn wallet_address_balances<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        wallet_id: &str,
        token_id: &str,
    ) -> Result<Vec<(String, TokenBalance)>, DbError> {
        let addresses: Vec<String> = repos
            .address
            .wallet_addresses(wallet_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();

        Ok(repos
            .balance
            .address_balances(&addresses)
            .await?
            .into_iter()
            .filter(|(_, b)| b.token_id == token_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AuthorityDelta;

    #[test]
    fn test_apply_delta_ors_granted_bits_and_keeps_earliest_expiry() {
        let row = TokenBalance {
            lock_expires: Some(200),
            unlocked_authorities: Authorities::MELT,
            transactions: 2,
            ..empty_balance("t1")
        };
        let delta = Balance {
            unlocked: 5,
            locked: 3,
            lock_expires: Some(100),
            unlocked_authorities: AuthorityDelta { mint: 1, melt: 0 },
            locked_authorities: AuthorityDelta::default(),
        };
        let updated = apply_delta(&row, &delta);
        assert_eq!(updated.unlocked_balance, 5);
        assert_eq!(updated.locked_balance, 3);
        assert_eq!(updated.lock_expires, Some(100));
        assert_eq!(updated.unlocked_authorities, Authorities(0b11));
        assert_eq!(updated.transactions, 3);
    }

    #[test]
    fn test_utxo_totals_split_locked_and_unlocked() {
        let base = Utxo {
            tx_id: "tx".to_string(),
            index: 0,
            token_id: "00".to_string(),
            address: "A".to_string(),
            value: 10,
            authorities: Authorities::NONE,
            timelock: None,
            heightlock: None,
            locked: false,
            spent_by: None,
            tx_proposal_id: None,
            tx_proposal_index: None,
        };
        let locked = Utxo {
            index: 1,
            value: 4,
            locked: true,
            timelock: Some(50),
            ..base.clone()
        };
        let totals = totals_by_owner_token(&[base, locked]);
        let entry = &totals[&("A".to_string(), "00".to_string())];
        assert_eq!(entry.unlocked, 10);
        assert_eq!(entry.locked, 4);
        assert_eq!(entry.lock_expires, Some(50));
    }
}
