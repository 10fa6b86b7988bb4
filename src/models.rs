//! Wire types for the SmartPantry REST API. Field names follow the server's camelCase JSON.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ApiResult, NormalizedError};
use crate::session::{Credential, Identity};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Body of both `/auth/login` and `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthResponse {
    pub fn into_session(self) -> ApiResult<(Credential, Identity)> {
        let credential = Credential::parse(self.token)
            .map_err(|e| NormalizedError::local(format!("server issued a malformed credential: {}", e)))?;
        Ok((credential, Identity::new(self.username, self.roles)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpiryStatus {
    Green,
    Yellow,
    Red,
}

/// Product as returned by the server; `expiry_status` and `days_remaining` are computed there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub quantity: i32,
    pub expiration_date: NaiveDate,
    pub category_name: String,
    pub category_id: i64,
    pub expiry_status: ExpiryStatus,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: String,
    pub quantity: i32,
    pub expiration_date: NaiveDate,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRequest {
    pub name: String,
}
