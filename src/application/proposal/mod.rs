//! Transaction proposals: input selection, change and UTXO reservation.

pub mod builder;

pub use builder::ProposalBuilder;
