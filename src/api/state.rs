//! Application state for shared services

use std::sync::Arc;

use crate::domain::cache::EmployeeCache;
use crate::infrastructure::metrics::{CacheCounters, Timers};
use crate::infrastructure::services::EmployeeService;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub employee_service: Arc<EmployeeService>,
    /// The cache backend, exposed for the diagnostics surface; absent when
    /// caching is disabled
    pub cache: Option<Arc<dyn EmployeeCache>>,
    pub counters: Arc<CacheCounters>,
    pub timers: Arc<Timers>,
}

impl AppState {
    pub fn new(
        employee_service: Arc<EmployeeService>,
        cache: Option<Arc<dyn EmployeeCache>>,
        counters: Arc<CacheCounters>,
        timers: Arc<Timers>,
    ) -> Self {
        Self {
            employee_service,
            cache,
            counters,
            timers,
        }
    }
}
