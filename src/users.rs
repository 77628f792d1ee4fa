//! `/api/users` CRUD handlers.
//!
//! A thin pass-through to a [`RecordStore`]. Client mistakes are answered
//! here with `400`/`404` and a `{"Message": …}` body; store failures are
//! returned as errors and become the pipeline's `500` envelope.
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | GET | `/api/users?page=&pageSize=` | 200 list |
//! | GET | `/api/users/{id}` | 200 user |
//! | POST | `/api/users` | 201 + `Location` |
//! | PUT | `/api/users/{id}` | 204 |
//! | DELETE | `/api/users/{id}` | 204 |

use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::json;

use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::store::{RecordStore, StoreError, User};

const DEFAULT_PAGE_SIZE: usize = 10;

/// Registers the users endpoints on `router`.
pub fn routes(router: Router, store: Arc<dyn RecordStore>) -> Router {
    let (s1, s2, s3, s4, s5) = (
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        store,
    );
    router
        .on(Method::GET, "/api/users", move |req: Request| list(Arc::clone(&s1), req))
        .on(Method::POST, "/api/users", move |req: Request| create(Arc::clone(&s2), req))
        .on(Method::GET, "/api/users/{id}", move |req: Request| get(Arc::clone(&s3), req))
        .on(Method::PUT, "/api/users/{id}", move |req: Request| update(Arc::clone(&s4), req))
        .on(Method::DELETE, "/api/users/{id}", move |req: Request| delete(Arc::clone(&s5), req))
}

fn message(status: StatusCode, text: &str) -> Response {
    Response::json_value(status, &json!({ "Message": text }))
}

fn user_not_found(id: u64) -> Response {
    message(StatusCode::NOT_FOUND, &format!("User with ID {id} not found."))
}

fn path_id(req: &Request) -> Result<u64, Response> {
    req.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| message(StatusCode::BAD_REQUEST, "Invalid user ID."))
}

/// Positive integer query parameter, `default` when absent.
fn positive(req: &Request, key: &str, default: usize) -> Option<usize> {
    match req.query(key) {
        None => Some(default),
        Some(raw) => raw.parse().ok().filter(|n| *n > 0),
    }
}

fn parse_user(req: &Request) -> Result<User, Response> {
    serde_json::from_slice(req.body())
        .map_err(|_| message(StatusCode::BAD_REQUEST, "Request body must be a JSON user object."))
}

fn validate(user: &User) -> Result<(), Response> {
    if user.name.trim().is_empty() || user.email.trim().is_empty() {
        return Err(message(StatusCode::BAD_REQUEST, "Name and Email are required."));
    }
    if !is_email(&user.email) {
        return Err(message(StatusCode::BAD_REQUEST, "Invalid Email address."));
    }
    Ok(())
}

/// Exactly one `@`, not at either end.
fn is_email(email: &str) -> bool {
    let mut parts = email.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}

async fn list(store: Arc<dyn RecordStore>, req: Request) -> Result<Response, StoreError> {
    let (Some(page), Some(page_size)) = (
        positive(&req, "page", 1),
        positive(&req, "pageSize", DEFAULT_PAGE_SIZE),
    ) else {
        return Ok(message(StatusCode::BAD_REQUEST, "Page and pageSize must be greater than 0."));
    };

    let users = store.list(page, page_size).await?;
    if users.is_empty() {
        return Ok(message(
            StatusCode::NOT_FOUND,
            "No users found for the specified page and page size.",
        ));
    }
    Ok(Response::json_value(StatusCode::OK, &users))
}

async fn get(store: Arc<dyn RecordStore>, req: Request) -> Result<Response, StoreError> {
    let id = match path_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };
    Ok(match store.get(id).await? {
        Some(user) => Response::json_value(StatusCode::OK, &user),
        None => user_not_found(id),
    })
}

async fn create(store: Arc<dyn RecordStore>, req: Request) -> Result<Response, StoreError> {
    let user = match parse_user(&req).and_then(|u| validate(&u).map(|()| u)) {
        Ok(user) => user,
        Err(res) => return Ok(res),
    };

    let created = store.create(user).await?;
    tracing::info!(id = created.id, "user created");

    let mut res = Response::json_value(StatusCode::CREATED, &created);
    if let Ok(location) = http::HeaderValue::from_str(&format!("/api/users/{}", created.id)) {
        res.headers.insert(http::header::LOCATION, location);
    }
    Ok(res)
}

async fn update(store: Arc<dyn RecordStore>, req: Request) -> Result<Response, StoreError> {
    let id = match path_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };
    let user = match parse_user(&req) {
        Ok(user) => user,
        Err(res) => return Ok(res),
    };
    if user.id != id {
        return Ok(message(
            StatusCode::BAD_REQUEST,
            "The provided ID does not match the user's ID.",
        ));
    }
    if let Err(res) = validate(&user) {
        return Ok(res);
    }

    Ok(if store.update(id, user).await? {
        Response::status(StatusCode::NO_CONTENT)
    } else {
        user_not_found(id)
    })
}

async fn delete(store: Arc<dyn RecordStore>, req: Request) -> Result<Response, StoreError> {
    let id = match path_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };
    Ok(if store.delete(id).await? {
        Response::status(StatusCode::NO_CONTENT)
    } else {
        user_not_found(id)
    })
}
