//! Policy management endpoint handlers.
//!
//! `GET /policies` accepts at most one of `subject`, `resource` and `query`
//! plus `limit`/`offset`, and reports the unpaged total in `X-Total-Count`.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AuthError;
use crate::http::WardenState;
use crate::http::guard::{self, POLICIES_RESOURCE, POLICIES_SCOPE, item_resource};
use crate::policy::Policy;
use crate::{AuthResult, config::PaginationConfig};

/// Header carrying the number of policies matching a listing.
pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters of `GET /policies`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub subject: Option<String>,
    pub resource: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListParams {
    fn filter(&self) -> AuthResult<Filter<'_>> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        match (
            non_empty(&self.subject),
            non_empty(&self.resource),
            non_empty(&self.query),
        ) {
            (None, None, None) => Ok(Filter::All),
            (Some(s), None, None) => Ok(Filter::Subject(s)),
            (None, Some(r), None) => Ok(Filter::Resource(r)),
            (None, None, Some(q)) => Ok(Filter::Search(q)),
            _ => Err(AuthError::invalid_argument(
                "subject, resource and query are mutually exclusive",
            )),
        }
    }

    fn page(&self, limits: PaginationConfig) -> (usize, usize) {
        let limit = match self.limit {
            None | Some(0) => limits.default_limit,
            Some(limit) => limit.min(limits.max_limit),
        };
        (limit, self.offset.unwrap_or(0))
    }
}

enum Filter<'a> {
    All,
    Subject(&'a str),
    Resource(&'a str),
    Search(&'a str),
}

fn body_error(rejection: impl std::fmt::Display) -> AuthError {
    AuthError::invalid_argument(rejection.to_string())
}

fn with_total(total: u64, policies: Vec<Policy>) -> Response {
    let mut response = Json(policies).into_response();
    response
        .headers_mut()
        .insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));
    response
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /policies`
pub async fn list_policies(
    State(state): State<WardenState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AuthResult<Response> {
    guard::authorize(&state, &headers, POLICIES_RESOURCE, "list", POLICIES_SCOPE).await?;
    let Query(params) = params.map_err(body_error)?;
    let (limit, offset) = params.page(state.pagination);

    let matching = match params.filter()? {
        Filter::All => {
            let total = state.policies.count().await?;
            let page = state.policies.list(limit, offset).await?;
            return Ok(with_total(total, page));
        }
        Filter::Subject(subject) => state.policies.find_by_subject(subject).await?,
        Filter::Resource(resource) => state.policies.find_by_resource(resource).await?,
        Filter::Search(query) => state.policies.search(query).await?,
    };

    let total = matching.len() as u64;
    let page = matching.into_iter().skip(offset).take(limit).collect();
    Ok(with_total(total, page))
}

/// `POST /policies`
///
/// Assigns a UUID when the body carries no id.
pub async fn create_policy(
    State(state): State<WardenState>,
    headers: HeaderMap,
    body: Result<Json<Policy>, JsonRejection>,
) -> AuthResult<Response> {
    guard::authorize(&state, &headers, POLICIES_RESOURCE, "create", POLICIES_SCOPE).await?;
    let Json(mut policy) = body.map_err(|r| body_error(r.body_text()))?;
    if policy.id.is_empty() {
        policy.id = Uuid::new_v4().to_string();
    }

    state.policies.create(&policy).await?;
    tracing::info!(policy_id = %policy.id, "Policy created");

    let location = HeaderValue::from_str(&format!("/policies/{}", policy.id))
        .map_err(|e| AuthError::invalid_argument(format!("invalid policy id: {e}")))?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(policy),
    )
        .into_response())
}

/// `GET /policies/{id}`
pub async fn get_policy(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AuthResult<Json<Policy>> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(POLICIES_RESOURCE, &id),
        "get",
        POLICIES_SCOPE,
    )
    .await?;
    Ok(Json(state.policies.get(&id).await?))
}

/// `PUT /policies/{id}`
pub async fn update_policy(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Policy>, JsonRejection>,
) -> AuthResult<Json<Policy>> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(POLICIES_RESOURCE, &id),
        "update",
        POLICIES_SCOPE,
    )
    .await?;
    let Json(mut policy) = body.map_err(|r| body_error(r.body_text()))?;
    if policy.id.is_empty() {
        policy.id.clone_from(&id);
    } else if policy.id != id {
        return Err(AuthError::invalid_argument(format!(
            "policy id '{}' does not match path id '{id}'",
            policy.id
        )));
    }

    state.policies.update(&policy).await?;
    tracing::info!(policy_id = %policy.id, "Policy updated");
    Ok(Json(policy))
}

/// `DELETE /policies/{id}`
pub async fn delete_policy(
    State(state): State<WardenState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AuthResult<StatusCode> {
    guard::authorize(
        &state,
        &headers,
        &item_resource(POLICIES_RESOURCE, &id),
        "delete",
        POLICIES_SCOPE,
    )
    .await?;
    state.policies.delete(&id).await?;
    tracing::info!(policy_id = %id, "Policy deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::TestApp;
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_policies_with_total() {
        let app = TestApp::new().await;

        let (status, headers, body) = app.send(Method::GET, "/policies", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[&TOTAL_COUNT_HEADER], "3");
        let ids: Vec<_> = body.as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
        assert_eq!(ids, vec![json!("1"), json!("2"), json!("3")]);

        let (_, headers, body) = app
            .send(Method::GET, "/policies?limit=1&offset=1", None, None)
            .await;
        assert_eq!(headers[&TOTAL_COUNT_HEADER], "3");
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_list_filters() {
        let app = TestApp::new().await;

        let (_, _, body) = app.send(Method::GET, "/policies?subject=group1", None, None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "3");

        let (_, headers, body) = app
            .send(Method::GET, "/policies?resource=forbidden_matrix", None, None)
            .await;
        assert_eq!(headers[&TOTAL_COUNT_HEADER], "2");
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _, body) = app.send(Method::GET, "/policies?query=ALICE", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "1");
    }

    #[tokio::test]
    async fn test_exclusive_filters_are_rejected() {
        let app = TestApp::new().await;
        for uri in [
            "/policies?subject=alice&resource=matrix",
            "/policies?query=x&subject=alice",
            "/policies?query=x&resource=matrix",
            "/policies?limit=abc",
        ] {
            let (status, _, _) = app.send(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[test]
    fn test_page_limits() {
        let limits = PaginationConfig::default();
        assert_eq!(ListParams::default().page(limits), (100, 0));
        let params = ListParams {
            limit: Some(10_000),
            offset: Some(7),
            ..ListParams::default()
        };
        assert_eq!(params.page(limits), (500, 7));
    }

    #[tokio::test]
    async fn test_policy_crud() {
        let app = TestApp::new().await;

        let (status, headers, created) = app
            .send(
                Method::POST,
                "/policies",
                None,
                Some(json!({
                    "subjects": ["bob"],
                    "resources": ["rn:docs:<.*>"],
                    "actions": ["read"],
                    "effect": "allow",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(headers[header::LOCATION], format!("/policies/{id}").as_str());

        let (status, _, fetched) = app.send(Method::GET, &format!("/policies/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, _, updated) = app
            .send(
                Method::PUT,
                &format!("/policies/{id}"),
                None,
                Some(json!({"subjects": ["bob", "carol"], "resources": ["x"], "actions": ["read"], "effect": "deny"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], id.as_str());
        assert_eq!(updated["effect"], "deny");

        let (status, _, _) = app
            .send(Method::PUT, &format!("/policies/{id}"), None, Some(json!({"id": "other"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = app.send(Method::DELETE, &format!("/policies/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = app.send(Method::GET, &format!("/policies/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = app.send(Method::DELETE, &format!("/policies/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_templates() {
        let app = TestApp::new().await;

        let (status, _, _) = app
            .send(Method::POST, "/policies", None, Some(json!({"id": "1"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _, _) = app
            .send(
                Method::POST,
                "/policies",
                None,
                Some(json!({"id": "bad", "subjects": ["<unclosed"]})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
