pub mod allocation;
pub mod ledger;
pub mod lot_pool;
pub mod production;
pub mod requirements;
