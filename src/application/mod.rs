pub mod indexer;
pub mod proposal;
pub mod wallet;
