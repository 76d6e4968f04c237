//! Request extractors that reject with [`ApiError`]

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Query string extractor whose rejection uses the JSON error body.
///
/// A missing or malformed parameter becomes [`ApiError::BadRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Params {
        id: String,
    }

    async fn extract(uri: &str) -> Result<ApiQuery<Params>, ApiError> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        ApiQuery::<Params>::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_query_is_parsed() {
        let ApiQuery(params) = extract("/x?id=u1").await.unwrap();
        assert_eq!(params.id, "u1");
    }

    #[tokio::test]
    async fn test_missing_param_is_bad_request() {
        let err = extract("/x").await.unwrap_err();
        match err {
            ApiError::BadRequest(msg) => assert!(msg.contains("id"), "unexpected message: {msg}"),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }
}
