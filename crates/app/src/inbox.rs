use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use aqua_talent_core::notify::ADMIN_RECIPIENT;
use aqua_talent_core::types::{Notification, Role};

use crate::auth::AuthUser;
use crate::problem::{parse_param, ProblemResponse};
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub unread_only: Option<String>,
}

/// Administrators share one inbox.
fn recipient(user: &AuthUser) -> &str {
    match user.role {
        Role::Admin => ADMIN_RECIPIENT,
        Role::Student | Role::Company => &user.id,
    }
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Notification>>, ProblemResponse> {
    let unread_only =
        parse_param::<bool>("unread_only", params.unread_only.as_deref())?.unwrap_or(false);
    let notifications = state
        .storage()
        .notifications()
        .list_for(user.role, recipient(&user), unread_only)
        .await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ProblemResponse> {
    let count = state
        .storage()
        .notifications()
        .unread_count(user.role, recipient(&user))
        .await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ProblemResponse> {
    let notification = state
        .storage()
        .notifications()
        .mark_read(&id, user.role, recipient(&user))
        .await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ProblemResponse> {
    let updated = state
        .storage()
        .notifications()
        .mark_all_read(user.role, recipient(&user))
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use crate::testing::{bearer, read_json, send, setup};
    use aqua_talent_core::types::CompanyStatus;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn notifications_are_scoped_to_their_recipient() {
        let ctx = setup().await;
        let admin = bearer(&ctx.admin_token().await);
        let (company_id, company_token) = ctx.register_company("hr@aqua.test").await;
        let (_, other_token) = ctx.register_company("other@aqua.test").await;
        ctx.decide_company(&company_id, CompanyStatus::Approved).await;
        let company = bearer(&company_token);

        let (_, body) = send(&ctx.app, Method::GET, "/notifications/unread-count", Some(&admin), None).await;
        assert_eq!(body["count"], 2, "both registrations reach the admin inbox");

        let (status, body) = send(&ctx.app, Method::GET, "/notifications", Some(&company), None).await;
        assert_eq!(status, StatusCode::OK);
        let notices = body.as_array().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0]["kind"], "company_approved");
        let notice_id = notices[0]["id"].as_str().unwrap().to_string();

        let read_path = format!("/notifications/{notice_id}/read");
        let (status, _) = send(&ctx.app, Method::POST, &read_path, Some(&bearer(&other_token)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&ctx.app, Method::POST, &read_path, Some(&company), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_read"], true);

        let (_, body) = send(&ctx.app, Method::GET, "/notifications?unread_only=true", Some(&company), None).await;
        assert!(body.as_array().unwrap().is_empty());

        let (_, body) = send(&ctx.app, Method::POST, "/notifications/read-all", Some(&admin), None).await;
        assert_eq!(body["updated"], 2);
    }

    #[tokio::test]
    async fn bad_unread_filter_is_a_problem_response() {
        let ctx = setup().await;
        let (_, token) = ctx.register_student("rina@example.test").await;

        let request = Request::builder()
            .uri("/notifications?unread_only=maybe")
            .header(header::AUTHORIZATION, bearer(&token))
            .body(Body::empty())
            .unwrap();
        let response = ctx.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/problem+json");
        let body = read_json(response).await;
        assert_eq!(body["type"], "invalid_parameter");
    }
}
