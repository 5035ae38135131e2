pub mod coc_lot;
pub mod company;
pub mod lot_allocation;
pub mod production_record;
pub mod rejected_module;
