//! Employee search descriptor and fingerprint derivation

use std::collections::HashMap;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Query parameter carrying a comma-joined id list
pub const PARAM_EMP_NOS: &str = "emp_nos";
/// Query parameter carrying comma-joined first-name fragments
pub const PARAM_FIRST_NAMES: &str = "first_names";
/// Query parameter carrying comma-joined last-name fragments
pub const PARAM_LAST_NAMES: &str = "last_names";
/// Query parameter carrying the gender filter
pub const PARAM_GENDER: &str = "gender";

/// A multi-key employee search.
///
/// Two descriptors that compare equal serialize to the same canonical bytes
/// and therefore share a fingerprint; the serialization always emits every
/// field so that equality and fingerprint equality cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSearch {
    #[serde(default)]
    pub emp_nos: Vec<i64>,
    #[serde(default)]
    pub first_names: Vec<String>,
    #[serde(default)]
    pub last_names: Vec<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl EmployeeSearch {
    /// Search matching exactly the given ids
    pub fn by_emp_nos(emp_nos: impl Into<Vec<i64>>) -> Self {
        Self {
            emp_nos: emp_nos.into(),
            ..Default::default()
        }
    }

    /// True when no criterion is set; the empty search is the key under
    /// which single-record fills are published
    pub fn is_empty(&self) -> bool {
        self.emp_nos.is_empty()
            && self.first_names.is_empty()
            && self.last_names.is_empty()
            && self.gender.is_none()
    }

    /// Canonical byte encoding used as the fingerprint preimage
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deterministic cache key: lowercase hex MD5 over the canonical
    /// encoding. Not a security primitive, only a stable 128-bit key.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = self.canonical_bytes()?;
        let mut hasher = Md5::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Projects the descriptor to a query-parameter map
    pub fn to_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if !self.emp_nos.is_empty() {
            let emp_nos: Vec<String> = self.emp_nos.iter().map(|n| n.to_string()).collect();
            params.insert(PARAM_EMP_NOS.to_string(), emp_nos.join(","));
        }
        if !self.first_names.is_empty() {
            params.insert(PARAM_FIRST_NAMES.to_string(), self.first_names.join(","));
        }
        if !self.last_names.is_empty() {
            params.insert(PARAM_LAST_NAMES.to_string(), self.last_names.join(","));
        }
        if let Some(gender) = &self.gender {
            params.insert(PARAM_GENDER.to_string(), gender.clone());
        }
        params
    }

    /// Rebuilds a descriptor from a query-parameter map; unknown keys and
    /// unparseable ids are skipped
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut search = Self::default();
        for (key, value) in params {
            match key.to_lowercase().as_str() {
                PARAM_EMP_NOS => {
                    search.emp_nos.extend(
                        value
                            .split(',')
                            .filter_map(|v| v.trim().parse::<i64>().ok()),
                    );
                }
                PARAM_FIRST_NAMES => {
                    search
                        .first_names
                        .extend(value.split(',').map(|v| v.trim().to_string()));
                }
                PARAM_LAST_NAMES => {
                    search
                        .last_names
                        .extend(value.split(',').map(|v| v.trim().to_string()));
                }
                PARAM_GENDER => {
                    if !value.is_empty() {
                        search.gender = Some(value.clone());
                    }
                }
                _ => {}
            }
        }
        search
    }
}
