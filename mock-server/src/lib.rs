use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub firstname: String,
    pub lastname: String,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// Users in insertion order.
pub type Db = Arc<RwLock<Vec<User>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/directory", get(directory))
        .route("/response", get(ok_response).post(ok_response))
        .route("/echo", post(echo))
        .route("/status/{code}", get(status))
        .route("/slow/{millis}", get(slow))
        .route("/bytes/{len}", get(filler))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    Json(db.read().await.clone())
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<CreateUser>,
) -> (StatusCode, Json<User>) {
    let user = User {
        id: Uuid::new_v4(),
        firstname: input.firstname,
        lastname: input.lastname,
    };
    db.write().await.push(user.clone());
    tracing::debug!(id = %user.id, "user created");
    (StatusCode::CREATED, Json(user))
}

async fn get_user(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, StatusCode> {
    let users = db.read().await;
    users
        .iter()
        .find(|u| u.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>, StatusCode> {
    let mut users = db.write().await;
    let user = users
        .iter_mut()
        .find(|u| u.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(firstname) = input.firstname {
        user.firstname = firstname;
    }
    if let Some(lastname) = input.lastname {
        user.lastname = lastname;
    }
    Ok(Json(user.clone()))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<Uuid>) -> StatusCode {
    let mut users = db.write().await;
    let before = users.len();
    users.retain(|u| u.id != id);
    if users.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

/// The user list wrapped in an envelope: `{"users": [...], "count": n}`.
async fn directory(State(db): State<Db>) -> Json<Value> {
    let users = db.read().await.clone();
    let count = users.len();
    Json(json!({ "users": users, "count": count }))
}

async fn ok_response() -> Json<Value> {
    Json(json!({ "response": "OK" }))
}

async fn echo(body: Bytes) -> Bytes {
    body
}

/// Replies with the requested status and a JSON body that would decode fine.
async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let code = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((code, Json(json!({ "users": [], "response": "status" }))))
}

async fn slow(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(json!({ "response": "OK" }))
}

/// `len` bytes of filler, for exercising large bodies.
async fn filler(Path(len): Path<usize>) -> Bytes {
    Bytes::from(vec![b'x'; len])
}
