use crate::{
    auth::{
        context::AuthContext,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{
        role::Role,
        user::{AccountState, User},
    },
    models::{Claims, LoginReqDto, RegisterReqDto, TokenPair, TokenType},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issues an access/refresh pair and records the refresh token's jti.
async fn issue_token_pair(
    user_id: u64,
    username: &str,
    role_id: u8,
    pool: &MySqlPool,
    config: &Config,
) -> Result<TokenPair, HttpResponse> {
    let access_token = generate_access_token(
        user_id,
        username.to_string(),
        role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    );
    let refresh = generate_refresh_token(
        user_id,
        username.to_string(),
        role_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    let (access_token, (refresh_token, refresh_claims)) = match (access_token, refresh) {
        (Ok(access), Ok(refresh)) => (access, refresh),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, user_id, "Failed to sign tokens");
            return Err(HttpResponse::InternalServerError().finish());
        }
    };

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    {
        error!(error = %e, "Failed to store refresh token");
        return Err(HttpResponse::InternalServerError().finish());
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Verifies a Bearer refresh token from the request.
fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let claims = verify_token(bearer_token(req)?, &config.jwt_secret).ok()?;
    (claims.token_type == TokenType::Refresh).then_some(claims)
}

/// true  => username AVAILABLE
/// false => username TAKEN
pub async fn is_username_available(username: &str, pool: &MySqlPool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1)")
        .bind(username)
        .fetch_one(pool)
        .await
        .map(|exists| exists == 0)
        .unwrap_or(false) // fail-safe
}

/// Self-registration; new identities always get the employee role
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReqDto,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Empty username or password"),
        (status = 409, description = "Username already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    user: web::Json<RegisterReqDto>,
    pool: web::Data<MySqlPool>,
) -> impl Responder {
    let username = user.username.trim().to_lowercase();

    if username.is_empty() || user.password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Username and password must not be empty"
        }));
    }

    if !is_username_available(&username, pool.get_ref()).await {
        return HttpResponse::Conflict().json(json!({
            "error": "Username already taken"
        }));
    }

    let hashed = match hash_password(&user.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "Failed to hash password");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let result = sqlx::query("INSERT INTO users (username, password, role_id) VALUES (?, ?, ?)")
        .bind(&username)
        .bind(hashed)
        .bind(Role::Employee.id())
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(_) => {
            info!(%username, "User registered");
            HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            }))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
            HttpResponse::Conflict().json(json!({
                "error": "Username already exists"
            }))
        }
        Err(e) => {
            error!(error = %e, "Failed to register user");
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            }))
        }
    }
}

/// Credential login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = TokenPair),
        (status = 400, description = "Username or password required"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    // 2️⃣ Fetch user
    let db_user = match sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(user)) if user.is_active => user,
        Ok(Some(_)) => {
            info!("Invalid credentials: user inactive");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    if Role::from_id(db_user.role_id).is_none() {
        error!(user_id = db_user.id, role_id = db_user.role_id, "User has unknown role");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    // 4️⃣ Tokens
    let pair = match issue_token_pair(
        db_user.id,
        &db_user.username,
        db_user.role_id,
        pool.get_ref(),
        &config,
    )
    .await
    {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    // 5️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    HttpResponse::Ok().json(pair)
}

/// Rotates a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, revoked or non-refresh token, or inactive account")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::Unauthorized().finish();
    };

    // revoke-and-check in one statement so a token rotates at most once
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND user_id = ? AND revoked = FALSE
        "#,
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(pool.get_ref())
    .await;

    match revoked {
        Ok(result) if result.rows_affected() == 1 => {}
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // role and activity come from the row, not from the old token
    let account = sqlx::query_as::<_, AccountState>(
        "SELECT username, role_id, is_active FROM users WHERE id = ?",
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await;

    let (account, role) = match account {
        Ok(Some(account)) => match account.active_role() {
            Some(role) => (account, role),
            None => {
                info!(user_id = claims.user_id, "Refresh refused: account inactive");
                return HttpResponse::Unauthorized().finish();
            }
        },
        Ok(None) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match issue_token_pair(
        claims.user_id,
        &account.username,
        role.id(),
        pool.get_ref(),
        &config,
    )
    .await
    {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(resp) => resp,
    }
}

/// Signs out by revoking the refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out (also when the token was unknown)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    // only refresh tokens can sign out
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "jdoe")]
    pub username: String,
    pub role: Role,
    pub is_reviewer: bool,
}

impl From<AuthContext> for SessionResponse {
    fn from(ctx: AuthContext) -> Self {
        Self {
            is_reviewer: ctx.is_reviewer(),
            user_id: ctx.user_id,
            username: ctx.username,
            role: ctx.role,
        }
    }
}

/// The identity behind the current access token
#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Current identity", body = SessionResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn session(auth: AuthContext) -> impl Responder {
    HttpResponse::Ok().json(SessionResponse::from(auth))
}
