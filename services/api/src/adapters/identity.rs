//! services/api/src/adapters/identity.rs
//!
//! Verifies access tokens against the hosted identity provider (Supabase Auth).
//! Sign-up, login and session refresh all happen on the provider's side.

use async_trait::async_trait;
use mock_exam_core::ports::{IdentityProvider, PortError, PortResult};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

pub struct SupabaseAuth {
    http: Client,
    user_endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AuthUser {
    id: Uuid,
}

impl SupabaseAuth {
    pub fn new(http: Client, supabase_url: &str, api_key: String) -> Self {
        Self {
            http,
            user_endpoint: format!("{}/auth/v1/user", supabase_url.trim_end_matches('/')),
            api_key,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn verify_access_token(&self, token: &str) -> PortResult<Uuid> {
        let response = self
            .http
            .get(&self.user_endpoint)
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| PortError::Upstream(e.to_string()))?;
                Ok(user.id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized),
            other => {
                warn!("Identity provider answered {} while verifying a token", other);
                Err(PortError::Upstream(format!(
                    "Identity provider returned HTTP {}",
                    other
                )))
            }
        }
    }
}
