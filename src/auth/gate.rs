//! # Authentication Gate
//!
//! Turns the `Authorization: Basic base64(id:secret)` header into a typed
//! [`SessionCredential`] that handlers receive as an explicit argument.
//!
//! The gate only checks the *shape* of the credential. It never looks the
//! session up, so a rejected request reveals nothing about whether a session
//! exists. Verifying the secret against the stored hash is the turn
//! pipeline's job.

use crate::error::AppError;
use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::future::{ready, Ready};
use thiserror::Error;

const BASIC_PREFIX: &str = "basic ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingHeader,

    #[error("authorization scheme is not Basic")]
    UnsupportedScheme,

    #[error("credential is not valid base64 text")]
    MalformedEncoding,

    #[error("credential has no id:secret separator")]
    MissingSeparator,

    #[error("credential has an empty id or secret")]
    EmptyField,
}

/// Session identifier and presented secret taken from a request.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub session_id: String,
    secret: String,
}

impl SessionCredential {
    pub fn new(session_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Parse the raw value of an `Authorization` header.
    pub fn from_header_value(value: &str) -> Result<Self, AuthError> {
        let value = value.trim();
        let encoded = match value.get(..BASIC_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(BASIC_PREFIX) => &value[BASIC_PREFIX.len()..],
            _ => return Err(AuthError::UnsupportedScheme),
        };

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::MalformedEncoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedEncoding)?;

        // Split on the first colon; anything after it belongs to the secret
        let (session_id, secret) = decoded.split_once(':').ok_or(AuthError::MissingSeparator)?;
        if session_id.is_empty() || secret.is_empty() {
            return Err(AuthError::EmptyField);
        }

        Ok(Self::new(session_id, secret))
    }

    fn from_request_headers(req: &HttpRequest) -> Result<Self, AuthError> {
        let value = req
            .headers()
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::MalformedEncoding)?;
        Self::from_header_value(value)
    }
}

// Keep the secret out of any debug output
impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("session_id", &self.session_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl FromRequest for SessionCredential {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_request_headers(req).map_err(|err| {
            tracing::debug!(reason = %err, "Rejected request credential");
            AppError::Unauthenticated
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn test_parses_id_and_secret() {
        let credential = SessionCredential::from_header_value(&basic("abc-123:s3cretKey9")).unwrap();
        assert_eq!(credential.session_id, "abc-123");
        assert_eq!(credential.secret(), "s3cretKey9");
    }

    #[test]
    fn test_splits_on_first_colon_only() {
        let credential = SessionCredential::from_header_value(&basic("id:sec:ret")).unwrap();
        assert_eq!(credential.session_id, "id");
        assert_eq!(credential.secret(), "sec:ret");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = format!("basic {}", STANDARD.encode("id:secret"));
        assert!(SessionCredential::from_header_value(&header).is_ok());
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert_eq!(
            SessionCredential::from_header_value("Bearer abc"),
            Err(AuthError::UnsupportedScheme)
        );
        assert_eq!(SessionCredential::from_header_value("Bas"), Err(AuthError::UnsupportedScheme));
        assert_eq!(
            SessionCredential::from_header_value("Basic %%%"),
            Err(AuthError::MalformedEncoding)
        );
        assert_eq!(
            SessionCredential::from_header_value(&basic("no-separator")),
            Err(AuthError::MissingSeparator)
        );
        assert_eq!(SessionCredential::from_header_value(&basic(":secret")), Err(AuthError::EmptyField));
        assert_eq!(SessionCredential::from_header_value(&basic("id:")), Err(AuthError::EmptyField));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = SessionCredential::new("id", "topsecret");
        let printed = format!("{:?}", credential);
        assert!(printed.contains("id"));
        assert!(!printed.contains("topsecret"));
    }

    #[actix_web::test]
    async fn test_extractor_requires_header() {
        let req = TestRequest::default().to_http_request();
        let result = SessionCredential::extract(&req).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, basic("id:secret")))
            .to_http_request();
        let credential = SessionCredential::extract(&req).await.unwrap();
        assert_eq!(credential.session_id, "id");
    }
}
