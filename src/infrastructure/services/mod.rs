//! Application services

pub mod employee_service;

pub use employee_service::{EmployeeService, LogicConfig};
