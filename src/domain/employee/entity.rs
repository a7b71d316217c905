//! Employee record types

use serde::{Deserialize, Serialize};

/// An employee record as stored in the record store and cached as JSON bytes.
///
/// Dates are epoch seconds; `gender` is the record store's single-character
/// enumeration carried as a string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub emp_no: i64,
    pub birth_date: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub hire_date: i64,
}

impl Employee {
    /// Serializes the record to the JSON bytes used by the cache tiers
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserializes a record from cached JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Partial employee used for create and update operations.
///
/// Absent fields are left untouched by an update and defaulted by a create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<i64>,
}

impl EmployeePartial {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.birth_date.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.gender.is_none()
            && self.hire_date.is_none()
    }

    /// Applies the set fields on top of an existing record
    pub fn apply_to(&self, employee: &mut Employee) {
        if let Some(birth_date) = self.birth_date {
            employee.birth_date = birth_date;
        }
        if let Some(first_name) = &self.first_name {
            employee.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            employee.last_name = last_name.clone();
        }
        if let Some(gender) = &self.gender {
            employee.gender = gender.clone();
        }
        if let Some(hire_date) = self.hire_date {
            employee.hire_date = hire_date;
        }
    }
}
