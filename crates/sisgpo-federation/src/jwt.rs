//! HS256 signing and verification of SSO assertions.

use crate::claims::AssertionClaims;
use crate::error::FederationError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Clock skew tolerated when verifying an assertion.
const VERIFY_LEEWAY_SECS: u64 = 5;

/// Sign assertion claims with the shared secret using HS256.
///
/// # Errors
///
/// Returns `FederationError::MissingSecret` for an empty secret and
/// `FederationError::Signing` if encoding fails.
pub fn sign_assertion(claims: &AssertionClaims, secret: &[u8]) -> Result<String, FederationError> {
    if secret.is_empty() {
        return Err(FederationError::MissingSecret);
    }

    let key = EncodingKey::from_secret(secret);
    let header = Header::new(Algorithm::HS256);

    encode(&header, claims, &key).map_err(|e| FederationError::Signing(e.to_string()))
}

/// Decode and validate an assertion signed with the shared secret.
///
/// Only HS256 is accepted; `exp` is enforced.
pub fn verify_assertion(token: &str, secret: &[u8]) -> Result<AssertionClaims, FederationError> {
    if secret.is_empty() {
        return Err(FederationError::MissingSecret);
    }

    let key = DecodingKey::from_secret(secret);

    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256];
    validation.leeway = VERIFY_LEEWAY_SECS;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<AssertionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(map_jwt_error)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> FederationError {
    use jsonwebtoken::errors::ErrorKind;

    let reason = match err.kind() {
        ErrorKind::ExpiredSignature => "assertion has expired".to_string(),
        ErrorKind::InvalidSignature => "invalid signature".to_string(),
        ErrorKind::InvalidAlgorithm => "unsupported algorithm".to_string(),
        ErrorKind::InvalidToken => "malformed token".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing claim {claim}"),
        _ => err.to_string(),
    };
    FederationError::InvalidAssertion(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SECRET: &[u8] = b"test-shared-secret";

    fn claims() -> AssertionClaims {
        AssertionClaims::builder()
            .subject("42")
            .display_name("Sgt. Silva")
            .email("silva@cbm.example")
            .origin("sisgpo-gateway")
            .expires_in_secs(90)
            .build()
    }

    #[test]
    fn test_sign_produces_three_part_token() {
        let token = sign_assertion(&claims(), SECRET).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_sign_uses_hs256() {
        let token = sign_assertion(&claims(), SECRET).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
    }

    #[test]
    fn test_sign_rejects_empty_secret() {
        let err = sign_assertion(&claims(), b"").unwrap_err();
        assert!(matches!(err, FederationError::MissingSecret));
    }

    #[test]
    fn test_verify_valid_assertion() {
        let original = claims();
        let token = sign_assertion(&original, SECRET).unwrap();

        let decoded = verify_assertion(&token, SECRET).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = sign_assertion(&claims(), SECRET).unwrap();
        let err = verify_assertion(&token, b"another-secret").unwrap_err();
        assert!(err.to_string().contains("invalid signature"));
    }

    #[test]
    fn test_verify_expired_assertion() {
        let expired = AssertionClaims::builder()
            .subject("42")
            .email("silva@cbm.example")
            .issued_at(Utc::now().timestamp() - 600)
            .expires_in_secs(90)
            .build();
        let token = sign_assertion(&expired, SECRET).unwrap();

        let err = verify_assertion(&token, SECRET).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_verify_malformed_token() {
        let err = verify_assertion("not-a-jwt", SECRET).unwrap_err();
        assert!(matches!(err, FederationError::InvalidAssertion(_)));
    }
}
