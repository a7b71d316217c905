//! Employee CRUD and search endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::employee::{Employee, EmployeePartial, EmployeeSearch};

/// Request envelope for create and update
#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeRequest {
    pub employee_partial: EmployeePartial,
}

/// Response envelope for single-record operations
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeResponse {
    pub employee: Employee,
}

/// Response envelope for search
#[derive(Debug, Clone, Serialize)]
pub struct EmployeesResponse {
    pub employees: Vec<Employee>,
}

/// PUT /employees
pub async fn create_employee(
    State(state): State<AppState>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<EmployeeResponse>, ApiError> {
    let index = state.timers.start("employee_create");
    let result = state
        .employee_service
        .create(&request.employee_partial)
        .await;
    state.timers.stop("employee_create", index);
    let employee = result?;
    Ok(Json(EmployeeResponse { employee }))
}

/// GET /employees/{emp_no}
pub async fn read_employee(
    State(state): State<AppState>,
    Path(emp_no): Path<String>,
) -> Result<Json<EmployeeResponse>, ApiError> {
    let emp_no = parse_emp_no(&emp_no)?;
    let index = state.timers.start("employee_read");
    let result = state.employee_service.read(emp_no).await;
    state.timers.stop("employee_read", index);
    let employee = result?;
    Ok(Json(EmployeeResponse { employee }))
}

/// GET /employees/search?emp_nos=1,2,3
pub async fn search_employees(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<EmployeesResponse>, ApiError> {
    let search = EmployeeSearch::from_params(&params);
    let index = state.timers.start("employee_search");
    let result = state.employee_service.search(&search).await;
    state.timers.stop("employee_search", index);
    let employees = result?;
    Ok(Json(EmployeesResponse { employees }))
}

/// POST /employees/{emp_no}
pub async fn update_employee(
    State(state): State<AppState>,
    Path(emp_no): Path<String>,
    Json(request): Json<EmployeeRequest>,
) -> Result<Json<EmployeeResponse>, ApiError> {
    let emp_no = parse_emp_no(&emp_no)?;
    let index = state.timers.start("employee_update");
    let result = state
        .employee_service
        .update(emp_no, &request.employee_partial)
        .await;
    state.timers.stop("employee_update", index);
    let employee = result?;
    Ok(Json(EmployeeResponse { employee }))
}

/// DELETE /employees/{emp_no}
pub async fn delete_employee(
    State(state): State<AppState>,
    Path(emp_no): Path<String>,
) -> Result<StatusCode, ApiError> {
    let emp_no = parse_emp_no(&emp_no)?;
    let index = state.timers.start("employee_delete");
    let result = state.employee_service.delete(emp_no).await;
    state.timers.stop("employee_delete", index);
    result?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_emp_no(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid employee number: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_emp_no() {
        assert_eq!(parse_emp_no("42").unwrap(), 42);
        assert!(parse_emp_no("forty-two").is_err());
        assert!(parse_emp_no("").is_err());
    }

    #[test]
    fn test_request_envelope_shape() {
        let request: EmployeeRequest = serde_json::from_str(
            r#"{"employee_partial": {"first_name": "Georgi", "gender": "M"}}"#,
        )
        .unwrap();
        assert_eq!(
            request.employee_partial.first_name,
            Some("Georgi".to_string())
        );
        assert!(request.employee_partial.birth_date.is_none());
    }

    #[test]
    fn test_response_envelope_shape() {
        let response = EmployeeResponse {
            employee: Employee {
                emp_no: 42,
                birth_date: 0,
                first_name: "Georgi".to_string(),
                last_name: "Facello".to_string(),
                gender: "M".to_string(),
                hire_date: 0,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["employee"]["emp_no"], 42);
    }
}
