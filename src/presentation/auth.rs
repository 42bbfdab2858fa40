//! JWT Authenticator
//!
//! Validates Identify tokens against the shared signing secret and binds
//! the connection to the token's subject.

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::domain::{Authenticator, UserIdentity};
use crate::shared::error::GatewayError;

/// JWT claims for token validation
#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// HS256 token validation against a shared secret.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, credential: &str) -> Result<UserIdentity, GatewayError> {
        let token_data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| GatewayError::Unauthorized(format!("Invalid token: {}", e)))?;

        let user_id = token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|e| GatewayError::Unauthorized(format!("Invalid user ID in token: {}", e)))?;

        Ok(UserIdentity {
            user_id,
            display_name: None,
        })
    }
}
