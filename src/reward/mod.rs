pub mod definition;
pub mod vault;

pub use definition::Reward;
pub use vault::RewardVault;
