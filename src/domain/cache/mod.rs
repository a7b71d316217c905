//! Cache contract and miss signals

pub mod repository;

pub use repository::{CacheError, EmployeeCache, MissKind};

/// Counter key for a per-record cache outcome
pub fn employee_counter_key(emp_no: i64) -> String {
    format!("employee_{}", emp_no)
}

/// Counter key for a per-search cache outcome
pub fn search_counter_key(fingerprint: &str) -> String {
    format!("employee_search_{}", fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_keys() {
        assert_eq!(employee_counter_key(42), "employee_42");
        assert_eq!(search_counter_key("abc123"), "employee_search_abc123");
    }
}
