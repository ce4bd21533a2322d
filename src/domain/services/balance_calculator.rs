use std::collections::{BTreeMap, HashMap};

use crate::domain::models::{
    Authorities, AuthorityDelta, Balance, TokenBalanceMap, TxInput, TxOutput,
};

/// Per-owner token balances produced from a transaction
pub type OwnerBalanceMap = BTreeMap<String, TokenBalanceMap>;

/// Computes balance deltas from transaction inputs and outputs
pub struct BalanceCalculator;

impl BalanceCalculator {
    /// Whether an output created now is locked.
    /// `heightlocked` is set for block rewards, which mature with height.
    pub fn is_locked(timelock: Option<i64>, now: i64, heightlocked: bool) -> bool {
        heightlocked || timelock.map(|t| t > now).unwrap_or(false)
    }

    /// Delta contributed by a newly created output
    pub fn output_balance(output: &TxOutput, now: i64, heightlocked: bool) -> Balance {
        let locked = Self::is_locked(output.decoded.timelock, now, heightlocked);
        let (amount, authorities) = if output.is_authority() {
            (0, AuthorityDelta::granted(Authorities(output.value as i32)))
        } else {
            (output.value, AuthorityDelta::default())
        };

        if locked {
            Balance {
                locked: amount,
                lock_expires: output.decoded.timelock.filter(|t| *t > now),
                locked_authorities: authorities,
                ..Balance::default()
            }
        } else {
            Balance {
                unlocked: amount,
                unlocked_authorities: authorities,
                ..Balance::default()
            }
        }
    }

    /// Delta contributed by consuming an output. Spent outputs are always
    /// unlocked by the time they are consumed.
    pub fn input_balance(input: &TxInput) -> Balance {
        if input.is_authority() {
            Balance {
                unlocked_authorities: AuthorityDelta::consumed(Authorities(input.value as i32)),
                ..Balance::default()
            }
        } else {
            Balance {
                unlocked: -input.value,
                ..Balance::default()
            }
        }
    }

    /// Merge the deltas of all inputs and outputs per address.
    /// Entries without a decoded address are skipped.
    pub fn address_balance_map(
        inputs: &[TxInput],
        outputs: &[TxOutput],
        now: i64,
        heightlocked: bool,
    ) -> OwnerBalanceMap {
        let mut map = OwnerBalanceMap::new();

        for input in inputs {
            if let Some(address) = &input.decoded.address {
                map.entry(address.clone())
                    .or_default()
                    .add(&input.token, Self::input_balance(input));
            }
        }

        for output in outputs {
            if let Some(address) = &output.decoded.address {
                map.entry(address.clone())
                    .or_default()
                    .add(&output.token, Self::output_balance(output, now, heightlocked));
            }
        }

        map
    }

    /// Re-aggregate address balances into wallet balances.
    /// `address_wallets` maps each address to its owning wallet; other addresses are dropped.
    pub fn wallet_balance_map(
        address_wallets: &HashMap<String, String>,
        address_balances: &OwnerBalanceMap,
    ) -> OwnerBalanceMap {
        let mut map = OwnerBalanceMap::new();

        for (address, balances) in address_balances {
            if let Some(wallet_id) = address_wallets.get(address) {
                let entry = map.entry(wallet_id.clone()).or_default();
                *entry = entry.merge(balances);
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DecodedScript, TOKEN_AUTHORITY_MASK};

    fn output(address: &str, value: i64, token: &str, timelock: Option<i64>) -> TxOutput {
        TxOutput {
            value,
            token_data: 0,
            token: token.to_string(),
            decoded: DecodedScript {
                address: Some(address.to_string()),
                timelock,
            },
        }
    }

    fn input_of(tx_id: &str, index: i32, out: &TxOutput) -> TxInput {
        TxInput {
            tx_id: tx_id.to_string(),
            index,
            value: out.value,
            token_data: out.token_data,
            token: out.token.clone(),
            decoded: out.decoded.clone(),
        }
    }

    #[test]
    fn test_input_cancels_output_of_same_owner() {
        let out = output("A", 10, "00", None);
        let inp = input_of("tx1", 0, &out);
        let created = BalanceCalculator::output_balance(&out, 0, false);
        let consumed = BalanceCalculator::input_balance(&inp);
        assert_eq!(created.merge(&consumed).total(), 0);
    }

    #[test]
    fn test_inputs_of_other_owner_do_not_cancel() {
        let out = output("A", 10, "00", None);
        let mut inp = input_of("tx1", 0, &out);
        inp.decoded.address = Some("B".to_string());
        let map = BalanceCalculator::address_balance_map(&[inp], &[out], 0, false);
        assert_eq!(map["A"].get("00").map(|b| b.unlocked), Some(10));
        assert_eq!(map["B"].get("00").map(|b| b.unlocked), Some(-10));
    }

    #[test]
    fn test_timelocked_output_is_locked() {
        let out = output("A", 7, "00", Some(500));
        let balance = BalanceCalculator::output_balance(&out, 100, false);
        assert_eq!(balance.locked, 7);
        assert_eq!(balance.unlocked, 0);
        assert_eq!(balance.lock_expires, Some(500));

        let expired = BalanceCalculator::output_balance(&out, 600, false);
        assert_eq!(expired.unlocked, 7);
        assert_eq!(expired.lock_expires, None);
    }

    #[test]
    fn test_block_reward_is_locked_without_expiry() {
        let out = output("M", 6400, "00", None);
        let balance = BalanceCalculator::output_balance(&out, 100, true);
        assert_eq!(balance.locked, 6400);
        assert_eq!(balance.lock_expires, None);
    }

    #[test]
    fn test_authority_output_grants_bits_without_amount() {
        let mut out = output("A", 0b11, "t1", None);
        out.token_data = TOKEN_AUTHORITY_MASK | 1;
        let balance = BalanceCalculator::output_balance(&out, 0, false);
        assert_eq!(balance.unlocked, 0);
        assert_eq!(balance.unlocked_authorities, AuthorityDelta { mint: 1, melt: 1 });

        let consumed = BalanceCalculator::input_balance(&input_of("tx", 0, &out));
        assert_eq!(consumed.unlocked_authorities, AuthorityDelta { mint: -1, melt: -1 });
    }

    #[test]
    fn test_wallet_map_groups_addresses() {
        let outputs = vec![
            output("A1", 3, "00", None),
            output("A2", 4, "00", None),
            output("X", 5, "00", None),
        ];
        let by_address = BalanceCalculator::address_balance_map(&[], &outputs, 0, false);
        let mut owners = HashMap::new();
        owners.insert("A1".to_string(), "w1".to_string());
        owners.insert("A2".to_string(), "w1".to_string());
        let by_wallet = BalanceCalculator::wallet_balance_map(&owners, &by_address);
        assert_eq!(by_wallet.len(), 1);
        assert_eq!(by_wallet["w1"].get("00").map(|b| b.unlocked), Some(7));
    }
}
