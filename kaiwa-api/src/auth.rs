use async_trait::async_trait;
use uuid::Uuid;

use crate::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

/// Source of the bearer token attached to every service call.
#[async_trait(?Send)]
pub trait AuthProvider {
    /// Fails with `Error::Unauthenticated` when there is no session.
    async fn token(&self) -> Result<AuthToken, Error>;
}
