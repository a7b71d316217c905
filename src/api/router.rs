use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::diagnostics;
use super::employees;
use super::health;
use super::middleware::correlation_middleware;
use super::state::AppState;

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/employees", put(employees::create_employee))
        .route("/employees/search", get(employees::search_employees))
        .route(
            "/employees/{emp_no}",
            get(employees::read_employee)
                .post(employees::update_employee)
                .delete(employees::delete_employee),
        )
        .route("/cache", delete(diagnostics::clear_cache))
        .route(
            "/cachecounters",
            get(diagnostics::read_cache_counters).delete(diagnostics::clear_cache_counters),
        )
        .route(
            "/timers",
            get(diagnostics::read_timers).delete(diagnostics::clear_timers),
        )
        .with_state(state)
        .layer(middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::{CacheCounters, Timers};
    use crate::infrastructure::services::{EmployeeService, LogicConfig};
    use crate::infrastructure::store::InMemoryEmployeeStore;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryEmployeeStore::new());
        let service = Arc::new(EmployeeService::new(store, LogicConfig::default()));
        AppState::new(
            service,
            None,
            Arc::new(CacheCounters::new()),
            Arc::new(Timers::new()),
        )
    }

    #[tokio::test]
    async fn test_router_builds() {
        let _router = create_router(test_state());
    }
}
