pub mod actor;
pub mod claim;
pub mod delivery;
pub mod event;
pub mod inventory;
pub mod order;
pub mod tracking;
