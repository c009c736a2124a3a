//! Group management endpoint handlers.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::http::WardenState;
use crate::http::guard::{self, GROUPS_RESOURCE, GROUPS_SCOPE, item_resource};
use crate::types::Group;

/// Query parameters of `GET /warden/groups`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindParams {
    pub member: Option<String>,
}

/// Body of the member endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembersBody {
    #[serde(default)]
    pub members: Vec<String>,
}

/// `GET /warden/groups?member=<subject>`
pub async fn find_groups(
    State(state): State<WardenState>,
    headers: HeaderMap,
    params: Result<Query<FindParams>, QueryRejection>,
) -> AuthResult<Json<Vec<String>>> {
    guard::authorize(&state, &headers, GROUPS_RESOURCE, "list", GROUPS_SCOPE).await?;
    let Query(params) = params.map_err(|e| AuthError::invalid_argument(e.to_string()))?;
    let member = params
        .member
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AuthError::invalid_argument("query parameter 'member' is required"))?;

    Ok(Json(state.groups.find_group_names(&member).await?))
}

/// `POST /warden/groups`
///
/// Assigns a UUID when the body carries no id.
pub async fn create_group(
    State(state): State<WardenState>,
    headers: HeaderMap,
    body: Result<Json<Group>, JsonRejection>,
) -> AuthResult<Response> {
    guard::authorize(&state, &headers, GROUPS_RESOURCE, "create", GROUPS_SCOPE).await?;
    let Json(mut group) = body.map_err(|r| AuthError::invalid_argument(r.body_text()))?;
    if group.id.is_empty() {
        group.id = Uuid::new_v4().to_string();
    }
    group.normalize();

    state.groups.create_group(&group).await?;
    tracing::info!(group_id = %group.id, members = group.members.len(), "Group created");
    Ok((StatusCode::CREATED, Json(group)).into_response())
}

/// `GET /warden/groups/{id}`
pub async fn get_group(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AuthResult<Json<Group>> {
    guard::authorize(&state, &headers, &item_resource(GROUPS_RESOURCE, &id), "get", GROUPS_SCOPE)
        .await?;
    Ok(Json(state.groups.get_group(&id).await?))
}

/// `DELETE /warden/groups/{id}`
pub async fn delete_group(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AuthResult<StatusCode> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(GROUPS_RESOURCE, &id),
        "delete",
        GROUPS_SCOPE,
    )
    .await?;
    state.groups.delete_group(&id).await?;
    tracing::info!(group_id = %id, "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /warden/groups/{id}/members`
pub async fn add_members(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<MembersBody>, JsonRejection>,
) -> AuthResult<StatusCode> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(GROUPS_RESOURCE, &id),
        "members.add",
        GROUPS_SCOPE,
    )
    .await?;
    let Json(body) = body.map_err(|r| AuthError::invalid_argument(r.body_text()))?;
    state.groups.add_members(&id, &body.members).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /warden/groups/{id}/members`
pub async fn remove_members(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<MembersBody>, JsonRejection>,
) -> AuthResult<StatusCode> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(GROUPS_RESOURCE, &id),
        "members.remove",
        GROUPS_SCOPE,
    )
    .await?;
    let Json(body) = body.map_err(|r| AuthError::invalid_argument(r.body_text()))?;
    state.groups.remove_members(&id, &body.members).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::http::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_group_lifecycle() {
        let app = TestApp::new().await;

        let (status, _, group) = app
            .send(
                Method::POST,
                "/warden/groups",
                None,
                Some(json!({"members": ["zoe", "bob", "zoe"]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(group["members"], json!(["bob", "zoe"]));
        let id = group["id"].as_str().unwrap().to_string();
        let uri = format!("/warden/groups/{id}");
        let members_uri = format!("{uri}/members");

        let (status, _, _) = app
            .send(Method::POST, &members_uri, None, Some(json!({"members": ["amy", "bob"]})))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, _, fetched) = app.send(Method::GET, &uri, None, None).await;
        assert_eq!(fetched["members"], json!(["amy", "bob", "zoe"]));

        let (status, _, _) = app
            .send(Method::DELETE, &members_uri, None, Some(json!({"members": ["zoe", "nobody"]})))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, _, fetched) = app.send(Method::GET, &uri, None, None).await;
        assert_eq!(fetched["members"], json!(["amy", "bob"]));

        let (status, _, _) = app.send(Method::DELETE, &uri, None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = app.send(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = app
            .send(Method::POST, &members_uri, None, Some(json!({"members": ["amy"]})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_find_groups_by_member() {
        let app = TestApp::new().await;

        let (status, _, body) = app.send(Method::GET, "/warden/groups?member=ken", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["group1"]));

        let (_, _, body) = app.send(Method::GET, "/warden/groups?member=alice", None, None).await;
        assert_eq!(body, json!([]));

        let (status, _, _) = app.send(Method::GET, "/warden/groups", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_group_conflicts() {
        let app = TestApp::new().await;
        let (status, _, _) = app
            .send(Method::POST, "/warden/groups", None, Some(json!({"id": "group1"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
