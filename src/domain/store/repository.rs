//! Record store contract consumed by the read-through orchestrator

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::employee::{Employee, EmployeePartial, EmployeeSearch};
use crate::domain::DomainError;

/// The authoritative employee store.
///
/// The cache layer holds copies; this store is the single source of truth
/// and the linearization point for cross-process consistency.
#[async_trait]
pub trait EmployeeStore: Send + Sync + Debug {
    /// Creates a new employee from the set fields of the partial
    async fn create(&self, partial: &EmployeePartial) -> Result<Employee, DomainError>;

    /// Reads an employee by id; `DomainError::NotFound` when absent
    async fn read(&self, emp_no: i64) -> Result<Employee, DomainError>;

    /// Runs a multi-key search; an empty descriptor returns all records
    async fn search(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, DomainError>;

    /// Applies the set fields of the partial to an existing employee
    async fn update(
        &self,
        emp_no: i64,
        partial: &EmployeePartial,
    ) -> Result<Employee, DomainError>;

    /// Deletes an employee; `DomainError::NotFound` when absent
    async fn delete(&self, emp_no: i64) -> Result<(), DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock store that counts fall-through calls, for orchestrator tests
    #[derive(Debug, Default)]
    pub struct MockEmployeeStore {
        employees: Mutex<BTreeMap<i64, Employee>>,
        next_emp_no: AtomicUsize,
        read_calls: AtomicUsize,
        search_calls: AtomicUsize,
        error: Mutex<Option<String>>,
    }

    impl MockEmployeeStore {
        pub fn new() -> Self {
            Self {
                next_emp_no: AtomicUsize::new(1),
                ..Default::default()
            }
        }

        pub fn with_employee(self, employee: Employee) -> Self {
            self.employees
                .lock()
                .unwrap()
                .insert(employee.emp_no, employee);
            self
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.error.lock().unwrap() = Some(error.into());
            self
        }

        /// Number of `read` calls that reached the store
        pub fn read_calls(&self) -> usize {
            self.read_calls.load(Ordering::SeqCst)
        }

        /// Number of `search` calls that reached the store
        pub fn search_calls(&self) -> usize {
            self.search_calls.load(Ordering::SeqCst)
        }

        fn check_error(&self) -> Result<(), DomainError> {
            if let Some(error) = self.error.lock().unwrap().clone() {
                return Err(DomainError::storage(error));
            }
            Ok(())
        }

        fn matches(search: &EmployeeSearch, employee: &Employee) -> bool {
            if !search.emp_nos.is_empty() && !search.emp_nos.contains(&employee.emp_no) {
                return false;
            }
            if !search.first_names.is_empty()
                && !search.first_names.contains(&employee.first_name)
            {
                return false;
            }
            if !search.last_names.is_empty() && !search.last_names.contains(&employee.last_name)
            {
                return false;
            }
            if let Some(gender) = &search.gender {
                if &employee.gender != gender {
                    return false;
                }
            }
            true
        }
    }

    #[async_trait]
    impl EmployeeStore for MockEmployeeStore {
        async fn create(&self, partial: &EmployeePartial) -> Result<Employee, DomainError> {
            self.check_error()?;
            let emp_no = self.next_emp_no.fetch_add(1, Ordering::SeqCst) as i64;
            let employee = Employee {
                emp_no,
                birth_date: partial.birth_date.unwrap_or_default(),
                first_name: partial.first_name.clone().unwrap_or_default(),
                last_name: partial.last_name.clone().unwrap_or_default(),
                gender: partial.gender.clone().unwrap_or_default(),
                hire_date: partial.hire_date.unwrap_or_default(),
            };
            self.employees
                .lock()
                .unwrap()
                .insert(emp_no, employee.clone());
            Ok(employee)
        }

        async fn read(&self, emp_no: i64) -> Result<Employee, DomainError> {
            self.check_error()?;
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            self.employees
                .lock()
                .unwrap()
                .get(&emp_no)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))
        }

        async fn search(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, DomainError> {
            self.check_error()?;
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .employees
                .lock()
                .unwrap()
                .values()
                .filter(|e| Self::matches(search, e))
                .cloned()
                .collect())
        }

        async fn update(
            &self,
            emp_no: i64,
            partial: &EmployeePartial,
        ) -> Result<Employee, DomainError> {
            self.check_error()?;
            let mut employees = self.employees.lock().unwrap();
            let employee = employees
                .get_mut(&emp_no)
                .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))?;
            partial.apply_to(employee);
            Ok(employee.clone())
        }

        async fn delete(&self, emp_no: i64) -> Result<(), DomainError> {
            self.check_error()?;
            self.employees
                .lock()
                .unwrap()
                .remove(&emp_no)
                .map(|_| ())
                .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_store_crud() {
            let store = MockEmployeeStore::new();

            let created = store
                .create(&EmployeePartial {
                    first_name: Some("Georgi".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(created.emp_no, 1);

            let read = store.read(created.emp_no).await.unwrap();
            assert_eq!(read, created);

            store.delete(created.emp_no).await.unwrap();
            assert!(store.read(created.emp_no).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_store_counts_reads() {
            let store = MockEmployeeStore::new();
            let _ = store.read(7).await;
            let _ = store.read(7).await;
            assert_eq!(store.read_calls(), 2);
        }

        #[tokio::test]
        async fn test_mock_store_search_by_ids() {
            let store = MockEmployeeStore::new();
            for _ in 0..3 {
                store.create(&EmployeePartial::default()).await.unwrap();
            }

            let found = store
                .search(&EmployeeSearch::by_emp_nos(vec![1, 3]))
                .await
                .unwrap();
            let emp_nos: Vec<i64> = found.iter().map(|e| e.emp_no).collect();
            assert_eq!(emp_nos, vec![1, 3]);
        }
    }
}
