use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::costs::CostCollector;
use crate::error::ApiError;
use crate::gateway::event::{cors_headers, GatewayEvent, GatewayResponse};
use crate::state::AppState;
use crate::store::{CUSTOMERS_TABLE, DIRECTORY_TABLE};
use crate::users::repo::UserRepo;
use crate::users::types::{NewUser, PublicUser};

/// Single gateway entry point. Routes by exact path + method match, stamps
/// the fixed CORS headers on every response, and is the one place an
/// `ApiError` becomes a status code and body.
pub async fn handle(state: &AppState, event: GatewayEvent) -> GatewayResponse {
    let headers = cors_headers(&state.config.allowed_origin);
    match route(state, &event).await {
        Ok((status, body)) => GatewayResponse::new(status, headers, body.as_ref()),
        Err(err) => {
            if err.status().is_server_error() {
                error!(path = %event.path, method = %event.method, error = ?err, "request failed");
            } else {
                warn!(path = %event.path, method = %event.method, error = %err, "request rejected");
            }
            let body = json!({ "error": err.public_message() });
            GatewayResponse::new(err.status().as_u16(), headers, Some(&body))
        }
    }
}

async fn route(state: &AppState, event: &GatewayEvent) -> Result<(u16, Option<Value>), ApiError> {
    match (event.path.as_str(), event.method.as_str()) {
        ("/api/health", "GET") => health(),
        // CORS preflight, any path.
        (_, "OPTIONS") => Ok((200, None)),
        ("/api/auth/signup", "POST") => signup(state, parse_body(event)?).await,
        ("/api/auth/login", "POST") => login(state, parse_body(event)?).await,
        ("/api/customers", "POST") => create_customer(state, parse_body(event)?).await,
        ("/api/users", "POST") => create_directory_user(state, parse_body(event)?).await,
        ("/api/costs", "GET") => {
            let user_id = event
                .query_string_parameters
                .get("userId")
                .map(String::as_str);
            fetch_costs(state, user_id).await
        }
        _ => Err(ApiError::NotFound),
    }
}

// --- request bodies ---

#[derive(Debug, Deserialize)]
struct SignupRequest {
    username: String,
    password: String,
    fullname: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CustomerRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryUserRequest {
    email: String,
    name: String,
}

// --- route handlers ---

fn health() -> Result<(u16, Option<Value>), ApiError> {
    Ok((
        200,
        Some(json!({ "status": "healthy", "timestamp": now_rfc3339()? })),
    ))
}

async fn signup(state: &AppState, req: SignupRequest) -> Result<(u16, Option<Value>), ApiError> {
    require(&req.username, "username")?;
    require(&req.password, "password")?;
    require(&req.fullname, "fullname")?;

    let hash = hash_password(&req.password).map_err(ApiError::Internal)?;
    let repo = UserRepo::new(state.store.clone());
    let user = repo
        .add(NewUser {
            username: req.username,
            password: hash,
            fullname: req.fullname,
            img_url: None,
            is_owner: None,
        })
        .await?;

    let token = JwtKeys::new(&state.config.jwt)
        .sign(user.id, &user.username)
        .map_err(ApiError::Internal)?;

    info!(user_id = %user.id, "user signed up");
    Ok((
        200,
        Some(json!({ "token": token, "user": PublicUser::from(user) })),
    ))
}

async fn login(state: &AppState, req: LoginRequest) -> Result<(u16, Option<Value>), ApiError> {
    let repo = UserRepo::new(state.store.clone());

    // Unknown username and wrong password are indistinguishable to the
    // caller: both surface the same 401 body.
    let Some(user) = repo.get_by_username(&req.username).await? else {
        warn!("login rejected");
        return Err(ApiError::Auth);
    };
    if !verify_password(&req.password, &user.password).map_err(ApiError::Internal)? {
        warn!(user_id = %user.id, "login rejected");
        return Err(ApiError::Auth);
    }

    let token = JwtKeys::new(&state.config.jwt)
        .sign(user.id, &user.username)
        .map_err(ApiError::Internal)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        200,
        Some(json!({ "token": token, "user": PublicUser::from(user) })),
    ))
}

async fn create_customer(
    state: &AppState,
    req: CustomerRequest,
) -> Result<(u16, Option<Value>), ApiError> {
    require(&req.name, "name")?;

    let customer_id = Uuid::new_v4();
    let item = json!({
        "customer_id": customer_id,
        "name": req.name,
        "created_at": now_rfc3339()?,
    });
    state
        .store
        .put(CUSTOMERS_TABLE, "customer_id", into_item(item)?)
        .await?;

    info!(%customer_id, "customer registered");
    Ok((
        200,
        Some(json!({
            "message": "Customer registered successfully",
            "customerId": customer_id,
        })),
    ))
}

async fn create_directory_user(
    state: &AppState,
    req: DirectoryUserRequest,
) -> Result<(u16, Option<Value>), ApiError> {
    require(&req.name, "name")?;
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("invalid email".into()));
    }

    let user_id = Uuid::new_v4();
    let item = json!({
        "user_id": user_id,
        "email": req.email,
        "name": req.name,
        "created_at": now_rfc3339()?,
    });
    state
        .store
        .put(DIRECTORY_TABLE, "user_id", into_item(item)?)
        .await?;

    info!(%user_id, "directory user created");
    Ok((201, Some(json!({ "message": "User created successfully" }))))
}

async fn fetch_costs(
    state: &AppState,
    user_id: Option<&str>,
) -> Result<(u16, Option<Value>), ApiError> {
    let collector = CostCollector::new(state.store.clone(), state.costs.clone());
    let data = collector.collect(user_id).await?;
    Ok((
        200,
        Some(json!({
            "message": "Cost data retrieved and saved successfully",
            "data": data,
        })),
    ))
}

// --- helpers ---

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn parse_body<T: DeserializeOwned>(event: &GatewayEvent) -> Result<T, ApiError> {
    let body = event
        .body
        .as_deref()
        .ok_or_else(|| ApiError::Validation("request body is required".into()))?;
    serde_json::from_str(body)
        .map_err(|e| ApiError::Validation(format!("malformed request body: {e}")))
}

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn now_rfc3339() -> Result<String, ApiError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(e.into()))
}

fn into_item(value: Value) -> Result<crate::store::Item, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::Internal(anyhow::anyhow!(
            "row did not serialize to an object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::COST_REPORTS_TABLE;
    use std::collections::HashMap;

    fn event(method: &str, path: &str, body: Option<Value>) -> GatewayEvent {
        GatewayEvent {
            path: path.to_string(),
            method: method.to_string(),
            body: body.map(|v| v.to_string()),
            query_string_parameters: HashMap::new(),
        }
    }

    fn body_json(resp: &GatewayResponse) -> Value {
        serde_json::from_str(&resp.body).expect("response body is JSON")
    }

    async fn signup_alice(state: &AppState) -> GatewayResponse {
        handle(
            state,
            event(
                "POST",
                "/api/auth/signup",
                Some(json!({
                    "username": "alice",
                    "password": "p4ssword!",
                    "fullname": "Alice Smith"
                })),
            ),
        )
        .await
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let state = AppState::fake();
        let resp = handle(&state, event("GET", "/api/health", None)).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(body_json(&resp)["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn options_preflight_succeeds_on_any_path() {
        let state = AppState::fake();
        let resp = handle(&state, event("OPTIONS", "/anything/at/all", None)).await;
        assert_eq!(resp.status_code, 200);
        assert!(resp.body.is_empty());
        assert_eq!(
            resp.headers.get("Access-Control-Allow-Origin"),
            Some(&"http://app.test".to_string())
        );
    }

    #[tokio::test]
    async fn signup_returns_token_and_projection_without_password() {
        let state = AppState::fake();
        let resp = signup_alice(&state).await;
        assert_eq!(resp.status_code, 200);

        let body = body_json(&resp);
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert_eq!(body["user"]["username"], json!("alice"));
        assert_eq!(body["user"]["count"], json!(0));
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn signup_then_login_succeeds() {
        let state = AppState::fake();
        signup_alice(&state).await;

        let resp = handle(
            &state,
            event(
                "POST",
                "/api/auth/login",
                Some(json!({ "username": "alice", "password": "p4ssword!" })),
            ),
        )
        .await;
        assert_eq!(resp.status_code, 200);
        let body = body_json(&resp);
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn bad_password_and_unknown_user_are_indistinguishable() {
        let state = AppState::fake();
        signup_alice(&state).await;

        let wrong_password = handle(
            &state,
            event(
                "POST",
                "/api/auth/login",
                Some(json!({ "username": "alice", "password": "nope" })),
            ),
        )
        .await;
        let unknown_user = handle(
            &state,
            event(
                "POST",
                "/api/auth/login",
                Some(json!({ "username": "mallory", "password": "nope" })),
            ),
        )
        .await;

        assert_eq!(wrong_password.status_code, 401);
        assert_eq!(unknown_user.status_code, 401);
        assert_eq!(wrong_password.body, unknown_user.body);
    }

    #[tokio::test]
    async fn signup_with_missing_field_is_rejected() {
        let state = AppState::fake();
        let resp = handle(
            &state,
            event(
                "POST",
                "/api/auth/signup",
                Some(json!({ "username": "bob", "password": "p4ssword!", "fullname": " " })),
            ),
        )
        .await;
        assert_eq!(resp.status_code, 400);
    }

    #[tokio::test]
    async fn customer_registration_returns_the_new_id() {
        let state = AppState::fake();
        let resp = handle(
            &state,
            event("POST", "/api/customers", Some(json!({ "name": "Acme" }))),
        )
        .await;
        assert_eq!(resp.status_code, 200);
        let body = body_json(&resp);
        assert_eq!(body["message"], json!("Customer registered successfully"));
        assert!(body["customerId"].is_string());
    }

    #[tokio::test]
    async fn directory_user_requires_a_well_formed_email() {
        let state = AppState::fake();
        let bad = handle(
            &state,
            event(
                "POST",
                "/api/users",
                Some(json!({ "email": "not-an-email", "name": "Jo" })),
            ),
        )
        .await;
        assert_eq!(bad.status_code, 400);

        let good = handle(
            &state,
            event(
                "POST",
                "/api/users",
                Some(json!({ "email": "jo@example.com", "name": "Jo" })),
            ),
        )
        .await;
        assert_eq!(good.status_code, 201);
        assert_eq!(
            body_json(&good)["message"],
            json!("User created successfully")
        );
    }

    #[tokio::test]
    async fn costs_without_user_returns_fresh_window_and_persists() {
        let state = AppState::fake();
        let resp = handle(&state, event("GET", "/api/costs", None)).await;
        assert_eq!(resp.status_code, 200);

        let body = body_json(&resp);
        assert!(body["data"].is_array());

        let rows = state.store.scan(COST_REPORTS_TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], json!("system"));
    }

    #[tokio::test]
    async fn costs_with_user_returns_stored_reports() {
        let state = AppState::fake();
        let mut ev = event("GET", "/api/costs", None);
        ev.query_string_parameters
            .insert("userId".into(), "u1".into());
        let resp = handle(&state, ev).await;
        assert_eq!(resp.status_code, 200);

        // The just-written report for u1 is the only stored row.
        let data = &body_json(&resp)["data"];
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert_eq!(data[0]["user_id"], json!("u1"));
    }

    #[tokio::test]
    async fn unmatched_routes_are_404_with_cors_headers() {
        let state = AppState::fake();
        for (method, path) in [
            ("GET", "/api/nope"),
            ("POST", "/api/health"),
            ("DELETE", "/api/customers"),
        ] {
            let resp = handle(&state, event(method, path, None)).await;
            assert_eq!(resp.status_code, 404, "{method} {path}");
            assert_eq!(body_json(&resp)["error"], json!("Not Found"));
            assert!(resp.headers.contains_key("Access-Control-Allow-Origin"));
            assert!(resp.headers.contains_key("Access-Control-Allow-Methods"));
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_400_not_a_500() {
        let state = AppState::fake();
        let mut ev = event("POST", "/api/auth/signup", None);
        ev.body = Some("{not json".into());
        let resp = handle(&state, ev).await;
        assert_eq!(resp.status_code, 400);
    }
}
