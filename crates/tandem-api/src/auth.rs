use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, Validation, decode};

use tandem_gateway::history::HistoryService;
use tandem_types::api::Claims;
use tandem_types::store::ChannelMembershipStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub history: HistoryService,
    pub members: Arc<dyn ChannelMembershipStore>,
    pub jwt_secret: String,
    /// Budget for the membership lookup.
    pub store_timeout: Duration,
}

/// Check signature and expiry of a bearer token issued with `secret`.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn token(secret: &str, exp: usize) -> String {
        let claims = Claims { sub: "ana".into(), exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let claims = verify_token("s3cret", &token("s3cret", 4_000_000_000)).unwrap();
        assert_eq!(claims.sub, "ana");
    }

    #[test]
    fn wrong_secret_or_expired_is_refused() {
        assert!(verify_token("other", &token("s3cret", 4_000_000_000)).is_err());
        assert!(verify_token("s3cret", &token("s3cret", 1_000)).is_err());
    }
}
