//! Record store implementations

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryEmployeeStore;
pub use postgres::{PostgresConfig, PostgresEmployeeStore};
