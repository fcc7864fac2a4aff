//! Storage gateway adapters.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod unit_of_work;
