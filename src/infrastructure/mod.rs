pub mod notify;
pub mod peer;
pub mod persistence;
