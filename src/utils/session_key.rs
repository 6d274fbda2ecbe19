use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants;
use crate::error::GatewayError;

/// Claims carried by signed session keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionKeyClaims {
    pub iss: String,
    pub sub: String,
    pub iat: u64,
    /// Endpoint that issued the key; lets a backend route admin requests
    /// back to the right gateway instance.
    pub edp: String,
}

/// Issues opaque session keys for connections whose connect callback did
/// not choose one.
///
/// Without a secret the key is a bare uuid. With a secret the key is an
/// HS256-signed JWT whose subject is the uuid, so backends can verify that
/// a key presented later was issued by this gateway.
#[derive(Clone)]
pub struct SessionKeyGen {
    endpoint: String,
    secret: Option<EncodingKey>,
}

impl SessionKeyGen {
    pub fn new(endpoint: impl Into<String>, secret: Option<&str>) -> Self {
        SessionKeyGen {
            endpoint: endpoint.into(),
            secret: secret.map(|s| EncodingKey::from_secret(s.as_bytes())),
        }
    }

    pub fn generate(&self) -> Result<String, GatewayError> {
        let id = Uuid::new_v4().to_string();
        let secret = match &self.secret {
            None => return Ok(id),
            Some(secret) => secret,
        };

        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatewayError::KeyGen(e.to_string()))?
            .as_secs();
        let claims = SessionKeyClaims {
            iss: constants::SESSION_KEY_ISSUER.to_string(),
            sub: id,
            iat,
            edp: self.endpoint.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, secret)
            .map_err(|e| GatewayError::KeyGen(e.to_string()))
    }
}
