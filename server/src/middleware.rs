//! Request extractors

use alloy::primitives::Address;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::models::parse_address;

pub const CALLER_HEADER: &str = "x-caller-address";

/// Identity of the account making the request.
///
/// Taken from the `X-Caller-Address` header, which the fronting gateway sets
/// after authenticating the wallet signature.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Address);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| AppError::BadRequest("Missing X-Caller-Address header".to_string()))?
            .to_str()
            .map_err(|_| AppError::BadRequest("Malformed X-Caller-Address header".to_string()))?;

        Ok(Caller(parse_address(value)?))
    }
}
