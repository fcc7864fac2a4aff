//! Domain model: value objects, entities and the storage port.

pub mod account;
pub mod card;
pub mod credit;
pub mod money;
pub mod ports;
