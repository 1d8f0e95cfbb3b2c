//! Account creation: the identity collaborator behind the account gate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IdentityError;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 8;

/// Durable account reference that submissions are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// Details collected on the account-creation step.
#[derive(Debug, Clone)]
pub struct AccountRequest {
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
}

impl AccountRequest {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Reject requests the identity service would refuse anyway.
    pub fn validate(&self) -> Result<(), IdentityError> {
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(IdentityError::Invalid {
                reason: format!("'{email}' is not a valid email address"),
            });
        }
        if self.password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::Invalid {
                reason: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(IdentityError::Invalid {
                reason: "first and last name are required".to_string(),
            });
        }
        Ok(())
    }
}

/// External account-creation service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, request: &AccountRequest) -> Result<Identity, IdentityError>;
}

/// In-process provider for development and tests. Emails are unique
/// (case-insensitive).
#[derive(Default)]
pub struct LocalIdentityProvider {
    accounts: RwLock<HashMap<String, Identity>>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_identity(&self, request: &AccountRequest) -> Result<Identity, IdentityError> {
        let email = request.email.trim().to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(IdentityError::AlreadyExists { email });
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.clone(),
        };
        accounts.insert(email, identity.clone());
        info!(identity_id = %identity.id, "Local identity created");
        Ok(identity)
    }
}

/// Hosted auth service reached over HTTP.
///
/// Sends `POST {base_url}/signup` with the credentials and reads the new
/// account id from `id` or `user.id` in the JSON response.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_identity(&self, request: &AccountRequest) -> Result<Identity, IdentityError> {
        let url = format!("{}/signup", self.base_url);
        let body = serde_json::json!({
            "email": request.email.trim(),
            "password": request.password.expose_secret(),
            "data": {
                "first_name": request.first_name.trim(),
                "last_name": request.last_name.trim(),
            },
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder
                .header("apikey", key.expose_secret())
                .bearer_auth(key.expose_secret());
        }

        debug!(url = %url, "Creating identity");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                IdentityError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                IdentityError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                409 => IdentityError::AlreadyExists {
                    email: request.email.trim().to_string(),
                },
                400 | 422 => IdentityError::Invalid { reason: text },
                code => IdentityError::RequestFailed {
                    reason: format!("HTTP {code}: {text}"),
                },
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| IdentityError::InvalidResponse {
                    reason: e.to_string(),
                })?;
        let id = json
            .get("id")
            .or_else(|| json.get("user").and_then(|u| u.get("id")))
            .and_then(|v| v.as_str())
            .ok_or_else(|| IdentityError::InvalidResponse {
                reason: "missing account id".to_string(),
            })?;
        let id = Uuid::parse_str(id).map_err(|e| IdentityError::InvalidResponse {
            reason: format!("account id is not a UUID: {e}"),
        })?;

        info!(identity_id = %id, "Identity created");
        Ok(Identity {
            id,
            email: request.email.trim().to_lowercase(),
        })
    }
}
