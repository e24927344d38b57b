use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

/// The authenticated caller of one request.
///
/// Built by [`auth_middleware`](crate::auth::middleware::auth_middleware) from a
/// verified access token and passed explicitly into every leave operation.
/// It lives exactly as long as the request; signing out revokes the refresh
/// token so no new context can be minted once the access token expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: u64, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn is_reviewer(&self) -> bool {
        self.role.is_reviewer()
    }
}

impl FromRequest for AuthContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthContext>() {
            Some(ctx) => ready(Ok(ctx.clone())),
            None => ready(Err(ErrorUnauthorized("Missing session"))),
        }
    }
}
