//! Balance deltas and the merge that combines them.
//!
//! A [`Balance`] is the effect of one or more inputs/outputs on an owner's
//! holdings of a single token. Merging is component-wise addition, except for
//! `lock_expires` which keeps the earliest pending expiration.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::BitOr;

/// Capability bitmask stored at rest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authorities(pub i32);

impl Authorities {
    pub const NONE: Authorities = Authorities(0);
    pub const MINT: Authorities = Authorities(0b01);
    pub const MELT: Authorities = Authorities(0b10);

    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn has_mint(&self) -> bool {
        self.0 & Self::MINT.0 != 0
    }

    pub fn has_melt(&self) -> bool {
        self.0 & Self::MELT.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 & (Self::MINT.0 | Self::MELT.0) == 0
    }
}

impl BitOr for Authorities {
    type Output = Authorities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Authorities(self.0 | rhs.0)
    }
}

/// Signed per-capability change carried through a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDelta {
    pub mint: i32,
    pub melt: i32,
}

impl AuthorityDelta {
    /// +1 for each capability present in `bits`
    pub fn granted(bits: Authorities) -> Self {
        Self {
            mint: i32::from(bits.has_mint()),
            melt: i32::from(bits.has_melt()),
        }
    }

    /// -1 for each capability present in `bits`
    pub fn consumed(bits: Authorities) -> Self {
        Self::granted(bits).negated()
    }

    pub fn negated(&self) -> Self {
        Self {
            mint: -self.mint,
            melt: -self.melt,
        }
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            mint: self.mint + other.mint,
            melt: self.melt + other.melt,
        }
    }

    pub fn has_negative(&self) -> bool {
        self.mint < 0 || self.melt < 0
    }

    /// Capabilities with a positive net change
    pub fn granted_bits(&self) -> Authorities {
        let mut bits = 0;
        if self.mint > 0 {
            bits |= Authorities::MINT.0;
        }
        if self.melt > 0 {
            bits |= Authorities::MELT.0;
        }
        Authorities(bits)
    }

    pub fn is_zero(&self) -> bool {
        self.mint == 0 && self.melt == 0
    }
}

/// Effect on one owner's holdings of one token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub unlocked: i64,
    pub locked: i64,
    /// Earliest timelock among the locked amounts, if any
    pub lock_expires: Option<i64>,
    pub unlocked_authorities: AuthorityDelta,
    pub locked_authorities: AuthorityDelta,
}

fn min_expiry(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

impl Balance {
    pub fn merge(&self, other: &Balance) -> Balance {
        Balance {
            unlocked: self.unlocked + other.unlocked,
            locked: self.locked + other.locked,
            lock_expires: min_expiry(self.lock_expires, other.lock_expires),
            unlocked_authorities: self.unlocked_authorities.merge(&other.unlocked_authorities),
            locked_authorities: self.locked_authorities.merge(&other.locked_authorities),
        }
    }

    /// Net amount change, used as the history entry
    pub fn total(&self) -> i64 {
        self.unlocked + self.locked
    }

    pub fn has_negative_authority(&self) -> bool {
        self.unlocked_authorities.has_negative() || self.locked_authorities.has_negative()
    }
}

/// Per-token balances of a single owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBalanceMap(BTreeMap<String, Balance>);

impl TokenBalanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(token_id: &str, balance: Balance) -> Self {
        let mut map = Self::new();
        map.add(token_id, balance);
        map
    }

    /// Merge `balance` into the entry of `token_id`
    pub fn add(&mut self, token_id: &str, balance: Balance) {
        let merged = match self.0.get(token_id) {
            Some(existing) => existing.merge(&balance),
            None => balance,
        };
        self.0.insert(token_id.to_string(), merged);
    }

    pub fn merge(&self, other: &TokenBalanceMap) -> TokenBalanceMap {
        let mut result = self.clone();
        for (token_id, balance) in other.iter() {
            result.add(token_id, *balance);
        }
        result
    }

    pub fn get(&self, token_id: &str) -> Option<&Balance> {
        self.0.get(token_id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Balance> {
        self.0.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(unlocked: i64, locked: i64, lock_expires: Option<i64>) -> Balance {
        Balance {
            unlocked,
            locked,
            lock_expires,
            ..Balance::default()
        }
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = balance(5, 3, Some(100));
        let b = balance(-2, 7, Some(50));
        assert_eq!(a.merge(&b), b.merge(&a));
        assert_eq!(a.merge(&b).lock_expires, Some(50));
    }

    #[test]
    fn test_merge_is_associative() {
        let a = balance(1, 0, None);
        let b = balance(2, 4, Some(30));
        let c = Balance {
            unlocked_authorities: AuthorityDelta { mint: 1, melt: -1 },
            ..balance(-3, 1, Some(20))
        };
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn test_lock_expires_ignores_missing_values() {
        let a = balance(0, 1, None);
        let b = balance(0, 1, Some(77));
        assert_eq!(a.merge(&b).lock_expires, Some(77));
        assert_eq!(b.merge(&a).lock_expires, Some(77));
        assert_eq!(a.merge(&a).lock_expires, None);
    }

    #[test]
    fn test_empty_balance_is_identity() {
        let a = balance(9, 2, Some(12));
        assert_eq!(a.merge(&Balance::default()), a);
    }

    #[test]
    fn test_authority_delta_bits() {
        let granted = AuthorityDelta::granted(Authorities(0b11));
        assert_eq!(granted, AuthorityDelta { mint: 1, melt: 1 });
        let net = granted.merge(&AuthorityDelta::consumed(Authorities::MINT));
        assert_eq!(net.granted_bits(), Authorities::MELT);
        assert!(!net.has_negative());
        assert!(AuthorityDelta::consumed(Authorities::MELT).has_negative());
    }

    #[test]
    fn test_token_map_merge() {
        let mut a = TokenBalanceMap::single("00", balance(10, 0, None));
        a.add("t1", balance(0, 5, Some(9)));
        let b = TokenBalanceMap::single("00", balance(-4, 0, None));
        let merged = a.merge(&b);
        assert_eq!(merged.get("00").map(|b| b.unlocked), Some(6));
        assert_eq!(merged.get("t1").map(|b| b.locked), Some(5));
        assert_eq!(merged.len(), 2);
    }
}
