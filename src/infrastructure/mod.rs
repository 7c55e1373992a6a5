//! Adapters behind the domain ports: stores, the sandbox gateway and the event bus.

pub mod event_bus;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox_gateway;
