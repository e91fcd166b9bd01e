//! API response envelope
//!
//! Every JSON response follows `{ success, data?, error? }`; errors are
//! rendered by `AppError`'s `IntoResponse`.

use serde::Serialize;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            data: Some(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let response = ApiResponse::ok(serde_json::json!({"syncId": "abc"}));
        let body = serde_json::to_value(&response.0).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["syncId"], "abc");
    }
}
