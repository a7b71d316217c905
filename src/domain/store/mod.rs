//! Record store contract

pub mod repository;

pub use repository::EmployeeStore;
