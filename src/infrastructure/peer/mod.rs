pub mod client;
pub mod error;

pub use client::{ChainPeer, HttpChainPeer};
pub use error::PeerError;
