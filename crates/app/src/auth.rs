use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use aqua_talent_core::portal::Portal;
use aqua_talent_core::types::Role;

use crate::problem::{json_body, ProblemResponse};
use crate::router::{request_portal, AppState};
use crate::workflow::{CompanyRegistration, StudentRegistration};

const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a password as `salt$hex(HMAC-SHA256(salt, password))`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let digest = password_digest(&salt, password);
    format!("{salt}${}", hex::encode(digest))
}

/// Checks a password against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let actual = password_digest(salt, password);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn password_digest(salt: &str, password: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match Hmac::<Sha256>::new_from_slice(salt.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(password.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(String),
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Issues and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // Expiry is checked against the application clock in `verify`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, subject: &str, role: Role, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Sign(err.to_string()))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AuthUser, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        let claims = data.claims;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Invalid("token_expired".to_string()));
        }
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        Ok(AuthUser {
            id: claims.sub,
            role,
        })
    }
}

/// Caller identified by a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProblemResponse::unauthorized("missing_token", "bearer token required"))?;

        state.tokens().verify(token, state.now()).map_err(|err| {
            warn!(stage = "auth", error = %err, "rejected bearer token");
            ProblemResponse::unauthorized("invalid_token", "bearer token is invalid or expired")
        })
    }
}

macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, $role:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub String);

        #[axum::async_trait]
        impl FromRequestParts<AppState> for $name {
            type Rejection = ProblemResponse;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                let user = AuthUser::from_request_parts(parts, state).await?;
                if user.role != $role {
                    return Err(ProblemResponse::forbidden(format!(
                        "{} access required",
                        $role.as_str()
                    )));
                }
                Ok(Self(user.id))
            }
        }
    };
}

role_extractor!(
    /// Authenticated student; holds the student id.
    StudentUser,
    Role::Student
);
role_extractor!(
    /// Authenticated company; holds the company id.
    CompanyUser,
    Role::Company
);
role_extractor!(
    /// Authenticated administrator; holds the account id.
    AdminUser,
    Role::Admin
);

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

pub async fn register_student(
    State(state): State<AppState>,
    payload: Result<Json<RegisterStudentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let request = json_body(payload)?;
    let email = normalize_email(&request.email)?;
    validate_password(&request.password)?;
    let full_name = required_text("full_name", &request.full_name)?;

    let student = state
        .workflow()
        .register_student(StudentRegistration {
            email,
            password_hash: hash_password(&request.password),
            full_name,
            university: request.university,
            major: request.major,
            graduation_year: request.graduation_year,
        })
        .await?;

    let token = issue_token(&state, &student.id, Role::Student)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "role": Role::Student, "profile": student })),
    ))
}

pub async fn register_company(
    State(state): State<AppState>,
    payload: Result<Json<RegisterCompanyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let request = json_body(payload)?;
    let email = normalize_email(&request.email)?;
    validate_password(&request.password)?;
    let name = required_text("name", &request.name)?;

    let company = state
        .workflow()
        .register_company(CompanyRegistration {
            email,
            password_hash: hash_password(&request.password),
            name,
            industry: request.industry,
            location: request.location,
            website: request.website,
            description: request.description,
        })
        .await?;

    let token = issue_token(&state, &company.id, Role::Company)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "role": Role::Company, "profile": company })),
    ))
}

/// Signs in through the portal named by the `Host` header.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ProblemResponse> {
    let request = json_body(payload)?;
    let portal = request_portal(&headers);
    let role = request.role.unwrap_or_else(|| portal.home_role());
    if portal.home_role() != role && portal != Portal::Main {
        counter!("auth_logins_total", "role" => role.as_str(), "result" => "portal_mismatch")
            .increment(1);
        return Err(ProblemResponse::new(
            StatusCode::FORBIDDEN,
            "portal_mismatch",
            format!("{} accounts cannot sign in on the {} portal", role, portal.as_str()),
        ));
    }

    let email = request.email.trim().to_lowercase();
    let account = state.storage().accounts().find_by_email(role, &email).await?;
    let Some(account) = account.filter(|account| verify_password(&request.password, &account.password_hash))
    else {
        counter!("auth_logins_total", "role" => role.as_str(), "result" => "invalid_credentials")
            .increment(1);
        return Err(ProblemResponse::unauthorized(
            "invalid_credentials",
            "email or password is incorrect",
        ));
    };

    let token = issue_token(&state, &account.id, account.role)?;
    counter!("auth_logins_total", "role" => role.as_str(), "result" => "success").increment(1);
    info!(stage = "auth", account_id = %account.id, role = role.as_str(), portal = portal.as_str(), "login succeeded");
    Ok(Json(json!({ "token": token, "role": account.role })))
}

/// Returns the caller's identity and profile.
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ProblemResponse> {
    let profile = match user.role {
        Role::Student => serde_json::to_value(state.storage().students().fetch(&user.id).await?),
        Role::Company => serde_json::to_value(state.storage().companies().fetch(&user.id).await?),
        Role::Admin => Ok(Value::Null),
    }
    .map_err(|err| ProblemResponse::internal(err.to_string()))?;

    Ok(Json(json!({ "id": user.id, "role": user.role, "profile": profile })))
}

fn issue_token(state: &AppState, subject: &str, role: Role) -> Result<String, ProblemResponse> {
    state.tokens().issue(subject, role, state.now()).map_err(|err| {
        tracing::error!(stage = "auth", error = %err, "failed to issue token");
        ProblemResponse::internal("failed to issue token")
    })
}

fn normalize_email(raw: &str) -> Result<String, ProblemResponse> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);
    if valid {
        Ok(email)
    } else {
        Err(ProblemResponse::bad_request("invalid_email", "email address is not valid"))
    }
}

fn validate_password(password: &str) -> Result<(), ProblemResponse> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ProblemResponse::bad_request(
            "weak_password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// Trims a mandatory text field, refusing blank values.
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, ProblemResponse> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProblemResponse::bad_request(
            "missing_field",
            format!("{field} must not be blank"),
        ));
    }
    Ok(trimmed.to_string())
}
