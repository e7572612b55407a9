use axum::{extract::State, http::StatusCode, response::Json, Extension};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::user::{
    AuthResponse, Claims, CreateAdmin, CreateUser, LoginUser, User, UserResponse,
};
use crate::policy::{self, Operation, Principal, Role};
use crate::state::AppState;

fn issue_token(user: &User) -> Result<String> {
    let claims = Claims {
        sub: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        username: user.username.clone(),
        role: user.role.as_str().to_string(),
        exp: (Utc::now().timestamp() + 86400) as usize, // 24 hours
    };

    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|_| AppError::AuthError)
}

async fn insert_user(
    state: &AppState,
    username: &str,
    password: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    role: Role,
) -> Result<User> {
    let collection: Collection<User> = state.db.collection("users");

    let filter = doc! {
        "$or": [
            { "username": username },
            { "email": email }
        ]
    };
    if collection.find_one(filter).await?.is_some() {
        return Err(AppError::DuplicateKey);
    }

    let password_hash = hash(password, DEFAULT_COST).map_err(|_| AppError::AuthError)?;

    let user = User {
        id: Some(ObjectId::new()),
        username: username.to_string(),
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        password_hash,
        role,
        created_at: Utc::now(),
    };

    collection.insert_one(&user).await?;
    Ok(user)
}

// Open endpoint used to bootstrap the first admin account.
pub async fn create_admin(
    State(state): State<AppState>,
    Json(payload): Json<CreateAdmin>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    payload.validate()?;

    let user = insert_user(
        &state,
        &payload.username,
        &payload.password,
        &payload.email,
        &payload.first_name,
        &payload.last_name,
        Role::Admin,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    policy::authorize(&principal, Operation::CreateUser)?;
    payload.validate()?;

    let user = insert_user(
        &state,
        &payload.username,
        &payload.password,
        &payload.email,
        &payload.first_name,
        &payload.last_name,
        payload.role,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginUser>,
) -> Result<Json<AuthResponse>> {
    let collection: Collection<User> = state.db.collection("users");

    let user = collection
        .find_one(doc! { "username": &payload.username })
        .await?
        .ok_or(AppError::AuthError)?;

    let valid = verify(&payload.password, &user.password_hash).map_err(|_| AppError::AuthError)?;
    if !valid {
        return Err(AppError::AuthError);
    }

    let token = issue_token(&user)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
        token,
        role: user.role,
    }))
}
