use axum::{middleware, routing::post, Router};

use crate::handlers::auth;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/create-user", post(auth::create_user))
        .route_layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/create-admin", post(auth::create_admin))
        .route("/login", post(auth::login))
        .merge(protected)
}
