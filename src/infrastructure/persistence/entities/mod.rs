pub mod address_balances;
pub mod address_tx_history;
pub mod addresses;
pub mod tokens;
pub mod transactions;
pub mod tx_proposal_outputs;
pub mod tx_proposals;
pub mod utxos;
pub mod wallet_balances;
pub mod wallet_tx_history;
pub mod wallets;
