use axum::Json;
use serde::Serialize;

/// Success envelope: `{"success": true, "data": ..., "warnings": [...]}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data, warnings: Vec::new() })
}

pub fn ok_with_warnings<T: Serialize>(data: T, warnings: Vec<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data, warnings })
}
