use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to sign API token: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub iat: i64,
}

/// Signs an HS256 token with the API secret, the form the Cube API accepts
/// in its `Authorization` header.
pub fn mint_token(secret: &str, issued_at: i64) -> Result<String, TokenError> {
    let claims = Claims { iat: issued_at };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    #[test]
    fn minted_token_verifies_with_same_secret() {
        let token = mint_token("a-string-secret-at-least-256-bits-long", 1_769_636_556).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"a-string-secret-at-least-256-bits-long"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims, Claims { iat: 1_769_636_556 });

        let wrong = decode::<Claims>(&token, &DecodingKey::from_secret(b"other"), &validation);
        assert!(wrong.is_err());
    }
}
