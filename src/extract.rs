use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// `Json` whose rejections render as `AppError` bodies
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` whose rejections render as `AppError` bodies
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// JSON body parsed after the handler has checked permissions
pub fn json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("request body is required"));
    }
    serde_json::from_slice(body).map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))
}

/// JSON body that may be left out entirely; an empty body yields `T::default()`
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| AppError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Body {
        note: Option<String>,
    }

    #[test]
    fn empty_body_is_default() {
        assert_eq!(optional_json::<Body>(&Bytes::new()).unwrap(), Body::default());
        assert_eq!(optional_json::<Body>(&Bytes::from_static(b" \n")).unwrap(), Body::default());
    }

    #[test]
    fn required_body_must_be_present() {
        let err = json_body::<Body>(&Bytes::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let parsed: Body = json_body(&Bytes::from_static(b"{}")).unwrap();
        assert_eq!(parsed, Body::default());
    }

    #[test]
    fn malformed_or_unknown_fields_are_bad_requests() {
        for raw in [&b"{"[..], b"{\"nope\":1}"] {
            let err = optional_json::<Body>(&Bytes::copy_from_slice(raw)).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
        }
        let parsed: Body = optional_json(&Bytes::from_static(br#"{"note":"x"}"#)).unwrap();
        assert_eq!(parsed.note.as_deref(), Some("x"));
    }
}
