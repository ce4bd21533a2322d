pub mod address_deriver;
pub mod balance_calculator;
pub mod input_selection;

// Re-export services for direct imports
pub use address_deriver::{AddressDeriver, Bip32AddressDeriver};
pub use balance_calculator::{BalanceCalculator, OwnerBalanceMap};
pub use input_selection::{InputSelector, LargestFirst, SelectorRegistry, DEFAULT_SELECTION_ALGO};
