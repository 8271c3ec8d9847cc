//! HTTP/REST API types

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP API endpoint paths
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const LOGOUT: &str = "/api/v1/auth/logout";
    pub const GLOBAL_SECURITY_SETTINGS: &str = "/api/v1/settings/security/global";
    pub const INSTITUTE_SECURITY_SETTINGS: &str = "/api/v1/settings/security/institute";
    pub const ACCOUNT_LOCKOUT: &str = "/api/v1/admin/accounts/:identifier/lockout";

    /// Prefix of every rate-limited route
    pub const API_PREFIX: &str = "/api/";
}

/// Key/value settings as submitted by and returned to the admin forms
pub type SettingsMap = BTreeMap<String, String>;

/// Login request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Success envelope: `{success, message, data}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Error envelope: `{success: false, message, errorCode, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    /// HTTP status code of the response
    pub error_code: u16,
    /// RFC 3339 time the error was produced
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Version information
    pub version: String,

    /// Uptime in seconds
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_deserialization() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"admin@example.com","password":"Secret1!"}"#).unwrap();
        assert_eq!(req.email, "admin@example.com");
        assert_eq!(req.password, "Secret1!");
    }

    #[test]
    fn test_success_envelope() {
        let resp = ApiResponse::success("Login successful", "token".to_string());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Login successful");
        assert_eq!(json["data"], "token");

        let json = serde_json::to_value(ApiResponse::message("Logged out")).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_error_envelope_uses_camel_case() {
        let json = serde_json::to_value(ErrorResponse::new(423, "Account is locked")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], 423);
        assert_eq!(json["message"], "Account is locked");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
