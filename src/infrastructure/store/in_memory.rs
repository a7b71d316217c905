//! In-memory record store for tests and storeless development

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::employee::{Employee, EmployeePartial, EmployeeSearch};
use crate::domain::store::EmployeeStore;
use crate::domain::DomainError;

/// Map-backed employee store with a monotonic id sequence
#[derive(Debug)]
pub struct InMemoryEmployeeStore {
    employees: RwLock<BTreeMap<i64, Employee>>,
    next_emp_no: AtomicI64,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self {
            employees: RwLock::new(BTreeMap::new()),
            next_emp_no: AtomicI64::new(1),
        }
    }

    /// Seeds a record, advancing the id sequence past it
    pub fn with_employee(self, employee: Employee) -> Self {
        self.next_emp_no
            .fetch_max(employee.emp_no + 1, Ordering::SeqCst);
        self.employees
            .write()
            .unwrap()
            .insert(employee.emp_no, employee);
        self
    }

    fn matches(search: &EmployeeSearch, employee: &Employee) -> bool {
        if !search.emp_nos.is_empty() && !search.emp_nos.contains(&employee.emp_no) {
            return false;
        }
        if !search.first_names.is_empty() && !search.first_names.contains(&employee.first_name) {
            return false;
        }
        if !search.last_names.is_empty() && !search.last_names.contains(&employee.last_name) {
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

impl Default for InMemoryEmployeeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn create(&self, partial: &EmployeePartial) -> Result<Employee, DomainError> {
        let emp_no = self.next_emp_no.fetch_add(1, Ordering::SeqCst);
        let employee = Employee {
            emp_no,
            birth_date: partial.birth_date.unwrap_or_default(),
            first_name: partial.first_name.clone().unwrap_or_default(),
            last_name: partial.last_name.clone().unwrap_or_default(),
            gender: partial.gender.clone().unwrap_or_default(),
            hire_date: partial.hire_date.unwrap_or_default(),
        };
        self.employees
            .write()
            .unwrap()
            .insert(emp_no, employee.clone());
        Ok(employee)
    }

    async fn read(&self, emp_no: i64) -> Result<Employee, DomainError> {
        self.employees
            .read()
            .unwrap()
            .get(&emp_no)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))
    }

    async fn search(&self, search: &EmployeeSearch) -> Result<Vec<Employee>, DomainError> {
        Ok(self
            .employees
            .read()
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
        let mut employees = self.employees.write().unwrap();
        let employee = employees
            .get_mut(&emp_no)
            .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))?;
        partial.apply_to(employee);
        Ok(employee.clone())
    }

    async fn delete(&self, emp_no: i64) -> Result<(), DomainError> {
        self.employees
            .write()
            .unwrap()
            .remove(&emp_no)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found(format!("employee {} not found", emp_no)))
    }
}
