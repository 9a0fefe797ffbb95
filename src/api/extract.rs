//! Request extractors

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON request body whose failures are reported as `AppError`.
///
/// A missing or blank body yields `T::default()` so that the handler's own
/// field checks produce the error message. Malformed JSON and wrongly typed
/// fields are a 400 with a JSON `error` body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;

        parse_body(&bytes).map(JsonBody)
    }
}

fn parse_body<T>(bytes: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(bytes).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        AppError::validation(format!("Invalid JSON body: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Body {
        #[serde(default)]
        token: Option<String>,
    }

    #[test]
    fn test_blank_body_is_default() {
        let body: Body = parse_body(b"").unwrap();
        assert!(body.token.is_none());

        let body: Body = parse_body(b" \n").unwrap();
        assert!(body.token.is_none());
    }

    #[test]
    fn test_wrong_type_is_validation_error() {
        let err = parse_body::<Body>(br#"{"token": 5}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().starts_with("Invalid JSON body"));
    }

    #[test]
    fn test_malformed_json_is_validation_error() {
        assert!(matches!(
            parse_body::<Body>(b"{\"token\":"),
            Err(AppError::Validation(_))
        ));
    }
}
