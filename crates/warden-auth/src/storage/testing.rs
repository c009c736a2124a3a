//! Shared contract checks for storage implementations.
//!
//! Each backend runs these against its own store. Identifiers are suffixed
//! with a fresh UUID so the checks can run against a shared database.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthError;
use crate::policy::{ConditionSpec, Effect, Policy};
use crate::storage::{GrantStorage, GroupStorage, PolicyStorage};
use crate::types::{Client, GrantRequest, Group, Session, SessionKind, truncate_to_micros};

/// Client every fixture request is issued to.
#[must_use]
pub fn client() -> Client {
    Client::new("siri", vec!["core".to_string(), "offline".to_string()])
}

/// A request for `alice` with granted scope `core`.
///
/// `requested_at` carries nanoseconds below microsecond precision; see
/// [`stored`] for the value a store hands back.
#[must_use]
pub fn request(id: &str) -> GrantRequest {
    let now = OffsetDateTime::now_utc()
        .replace_nanosecond(123_456_789)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let mut session = Session::new("alice")
        .with_expiry(SessionKind::Access, now + time::Duration::hours(1))
        .with_expiry(SessionKind::Refresh, now + time::Duration::days(30));
    session
        .access_token_extra
        .insert("foo".to_string(), serde_json::json!("bar"));

    let mut r = GrantRequest::new(id, now, client(), session)
        .with_scopes(&["core", "offline"], &["core"]);
    r.form = vec![("redirect_uri".to_string(), "https://app.example.com/cb".to_string())];
    r
}

/// `req` as any store returns it, with `requested_at` cut to microseconds.
#[must_use]
pub fn stored(req: &GrantRequest) -> GrantRequest {
    let mut req = req.clone();
    req.requested_at = truncate_to_micros(req.requested_at);
    req
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Create, get, delete and revoke on every kind.
pub async fn check_grant_storage(store: &dyn GrantStorage) {
    for kind in SessionKind::ALL {
        let sig = unique("sig");
        let req = request(&unique("req"));

        store.create(kind, &sig, &req).await.unwrap();
        let fetched = store.get(kind, &sig).await.unwrap();
        assert_ne!(fetched, req);
        assert_eq!(fetched, stored(&req));
        assert_eq!(fetched.requested_at.nanosecond(), 123_456_000);

        let err = store.create(kind, &sig, &req).await.unwrap_err();
        assert!(matches!(err, AuthError::Duplicate { .. }), "{kind}: {err}");

        store.delete(kind, &sig).await.unwrap();
        let err = store.get(kind, &sig).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }), "{kind}: {err}");

        let err = store.delete(kind, &sig).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound { .. }), "{kind}: {err}");
    }

    // the same signature may exist once per kind
    let sig = unique("shared");
    let req = request(&unique("req"));
    store.create(SessionKind::Access, &sig, &req).await.unwrap();
    store.create(SessionKind::Refresh, &sig, &req).await.unwrap();

    // revocation only touches the targeted kind and is idempotent
    store.revoke_access_token(&req.id).await.unwrap();
    store.revoke_access_token(&req.id).await.unwrap();
    assert!(store.get(SessionKind::Access, &sig).await.is_err());
    assert_eq!(store.get(SessionKind::Refresh, &sig).await.unwrap(), stored(&req));

    store.revoke_refresh_token(&req.id).await.unwrap();
    assert!(store.get(SessionKind::Refresh, &sig).await.is_err());

    store
        .revoke_by_request_id(SessionKind::Code, &unique("missing"))
        .await
        .unwrap();

    let sig = unique("implicit");
    store.implicit_access_token(&sig, &req).await.unwrap();
    assert_eq!(store.get(SessionKind::Access, &sig).await.unwrap(), stored(&req));

    let mut empty = request(&unique("req"));
    empty.requested_scopes.clear();
    empty.granted_scopes.clear();
    empty.form.clear();
    let sig = unique("empty");
    store.create(SessionKind::Access, &sig, &empty).await.unwrap();
    let fetched = store.get(SessionKind::Access, &sig).await.unwrap();
    assert!(fetched.granted_scopes.is_empty());
    assert!(fetched.requested_scopes.is_empty());
}

/// Code exchange and refresh rotation.
pub async fn check_grant_transitions(store: &dyn GrantStorage) {
    let req = request(&unique("req"));
    let (code, access, refresh) = (unique("c1"), unique("a1"), unique("r1"));

    store.create(SessionKind::Code, &code, &req).await.unwrap();
    store
        .persist_authorize_code_grant(&code, &access, Some(refresh.as_str()), &req)
        .await
        .unwrap();
    assert!(matches!(
        store.get(SessionKind::Code, &code).await,
        Err(AuthError::NotFound { .. })
    ));
    assert_eq!(store.get(SessionKind::Access, &access).await.unwrap(), stored(&req));
    assert_eq!(store.get(SessionKind::Refresh, &refresh).await.unwrap(), stored(&req));

    // replaying the code fails and writes nothing
    let replay_access = unique("a-replay");
    let err = store
        .persist_authorize_code_grant(&code, &replay_access, None, &req)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));
    assert!(store.get(SessionKind::Access, &replay_access).await.is_err());

    let (access2, refresh2) = (unique("a2"), unique("r2"));
    store
        .persist_refresh_token_grant(&refresh, &access2, &refresh2, &req)
        .await
        .unwrap();
    assert!(matches!(
        store.get(SessionKind::Refresh, &refresh).await,
        Err(AuthError::NotFound { .. })
    ));
    assert_eq!(store.get(SessionKind::Access, &access2).await.unwrap(), stored(&req));
    assert_eq!(store.get(SessionKind::Refresh, &refresh2).await.unwrap(), stored(&req));

    // a second rotation of the spent token fails
    let err = store
        .persist_refresh_token_grant(&refresh, &unique("a3"), &unique("r3"), &req)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound { .. }));

    // a colliding access signature aborts the whole exchange
    let code2 = unique("c2");
    store.create(SessionKind::Code, &code2, &req).await.unwrap();
    let err = store
        .persist_authorize_code_grant(&code2, &access2, None, &req)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Duplicate { .. }));
    assert_eq!(store.get(SessionKind::Code, &code2).await.unwrap(), stored(&req));

    // without a refresh signature only the access session is written
    let access3 = unique("a4");
    store
        .persist_authorize_code_grant(&code2, &access3, None, &req)
        .await
        .unwrap();
    assert!(store.get(SessionKind::Access, &access3).await.is_ok());
}

/// Two rotations of one refresh token race; exactly one wins.
pub async fn check_concurrent_refresh(store: Arc<dyn GrantStorage>) {
    let req = request(&unique("req"));
    let refresh = unique("r1");
    store
        .create(SessionKind::Refresh, &refresh, &req)
        .await
        .unwrap();

    let spawn = |n: u8| {
        let store = Arc::clone(&store);
        let (refresh, req) = (refresh.clone(), req.clone());
        tokio::spawn(async move {
            store
                .persist_refresh_token_grant(
                    &refresh,
                    &unique(&format!("a{n}")),
                    &unique(&format!("r{n}")),
                    &req,
                )
                .await
        })
    };
    let (first, second) = (spawn(1), spawn(2));
    let results = [first.await.unwrap(), second.await.unwrap()];

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "{results:?}");
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(result, AuthError::NotFound { .. } | AuthError::Duplicate { .. }),
            "{result}"
        );
    }
}

fn policy(id: &str, subjects: &[&str], resources: &[&str], effect: Effect) -> Policy {
    Policy {
        id: id.to_string(),
        description: format!("fixture {id}"),
        subjects: subjects.iter().map(|s| (*s).to_string()).collect(),
        effect,
        resources: resources.iter().map(|s| (*s).to_string()).collect(),
        actions: vec!["create".to_string(), "decide".to_string()],
        conditions: Default::default(),
    }
}

/// CRUD, pagination, lookups and search.
pub async fn check_policy_storage(store: &dyn PolicyStorage) {
    let tag = Uuid::new_v4().simple().to_string();
    let subject = format!("alice-{tag}");
    let group = format!("group-{tag}");
    let resource = format!("matrix-{tag}");
    let before = store.count().await.unwrap();

    let other_resource = format!("other-{tag}");
    let forbidden = format!("forbidden_{resource}");

    let mut p1 = policy(
        &format!("{tag}-1"),
        &[subject.as_str(), group.as_str()],
        &[resource.as_str(), "rn:hydra:token<.*>"],
        Effect::Allow,
    );
    p1.conditions.insert(
        "ip".to_string(),
        ConditionSpec::new("CIDRCondition", serde_json::json!({"cidr": "10.0.0.0/8"})),
    );
    let p2 = policy(&format!("{tag}-2"), &["<.*>"], &[other_resource.as_str()], Effect::Allow);
    let p3 = policy(&format!("{tag}-3"), &[group.as_str()], &[forbidden.as_str()], Effect::Deny);

    for p in [&p3, &p1, &p2] {
        store.create(p).await.unwrap();
    }
    assert_eq!(store.count().await.unwrap(), before + 3);
    assert_eq!(store.get(&p1.id).await.unwrap(), p1);

    let err = store.create(&p1).await.unwrap_err();
    assert!(matches!(err, AuthError::Duplicate { .. }));

    let broken = policy(&format!("{tag}-broken"), &["<[a-z>"], &[resource.as_str()], Effect::Allow);
    let err = store.create(&broken).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidArgument { .. }), "{err}");
    let mut unbalanced = p1.clone();
    unbalanced.resources.push("rn:<.*".to_string());
    let err = store.update(&unbalanced).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidArgument { .. }), "{err}");

    // listing is ordered by id
    let all = store.list(usize::MAX >> 1, 0).await.unwrap();
    let ours: Vec<_> = all.iter().filter(|p| p.id.starts_with(&tag)).map(|p| p.id.clone()).collect();
    assert_eq!(ours, vec![p1.id.clone(), p2.id.clone(), p3.id.clone()]);
    let ids: Vec<_> = all.iter().map(|p| p.id.clone()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let page = store.list(1, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[0]);
    assert!(store.list(10, ids.len()).await.unwrap().is_empty());

    let by_subject = store.find_by_subject(&subject).await.unwrap();
    assert!(by_subject.iter().any(|p| p.id == p1.id));
    assert!(by_subject.iter().any(|p| p.id == p2.id));
    assert!(!by_subject.iter().any(|p| p.id == p3.id));

    let by_resource = store.find_by_resource("rn:hydra:token:abc").await.unwrap();
    assert!(by_resource.iter().any(|p| p.id == p1.id));
    assert!(!by_resource.iter().any(|p| p.id == p3.id));

    let found = store.search(&format!("FORBIDDEN_MATRIX-{tag}")).await.unwrap();
    assert_eq!(found.iter().map(|p| p.id.clone()).collect::<Vec<_>>(), vec![p3.id.clone()]);
    let found = store.search(&format!("%{tag}")).await.unwrap();
    assert!(found.is_empty(), "wildcards in the query are literal");
    let found = store.search(&format!("{tag}' OR '1'='1")).await.unwrap();
    assert!(found.is_empty());

    let mut updated = p2.clone();
    updated.effect = Effect::Deny;
    updated.description = "now denies".to_string();
    store.update(&updated).await.unwrap();
    assert_eq!(store.get(&p2.id).await.unwrap(), updated);

    let ghost = policy(&format!("{tag}-ghost"), &[], &[], Effect::Allow);
    assert!(matches!(store.update(&ghost).await, Err(AuthError::NotFound { .. })));

    for p in [&p1, &p2, &p3] {
        store.delete(&p.id).await.unwrap();
    }
    assert!(matches!(store.get(&p1.id).await, Err(AuthError::NotFound { .. })));
    assert!(matches!(store.delete(&p1.id).await, Err(AuthError::NotFound { .. })));
    assert_eq!(store.count().await.unwrap(), before);
}

/// CRUD and set-semantic membership.
pub async fn check_group_storage(store: &dyn GroupStorage) {
    let id = unique("group");
    let other = unique("group");
    let ken = unique("ken");
    let alice = unique("alice");

    store
        .create_group(&Group::new(id.clone(), [ken.clone()]))
        .await
        .unwrap();
    store
        .create_group(&Group::new(other.clone(), Vec::new()))
        .await
        .unwrap();
    assert!(matches!(
        store.create_group(&Group::new(id.clone(), Vec::new())).await,
        Err(AuthError::Duplicate { .. })
    ));
    assert!(matches!(
        store.create_group(&Group::default()).await,
        Err(AuthError::InvalidArgument { .. })
    ));

    let members = vec![alice.clone(), ken.clone()];
    store.add_members(&id, &members).await.unwrap();
    store.add_members(&id, &members).await.unwrap();
    let mut expected = members.clone();
    expected.sort();
    assert_eq!(store.get_group(&id).await.unwrap().members, expected);

    store.add_members(&other, &[ken.clone()]).await.unwrap();
    let mut groups = vec![id.clone(), other.clone()];
    groups.sort();
    assert_eq!(store.find_group_names(&ken).await.unwrap(), groups);
    assert!(store.find_group_names(&unique("nobody")).await.unwrap().is_empty());

    store.remove_members(&id, &[ken.clone(), unique("absent")]).await.unwrap();
    store.remove_members(&id, &[ken.clone()]).await.unwrap();
    assert_eq!(store.get_group(&id).await.unwrap().members, vec![alice.clone()]);
    assert_eq!(store.find_group_names(&ken).await.unwrap(), vec![other.clone()]);

    assert!(matches!(
        store.add_members(&unique("missing"), &[ken.clone()]).await,
        Err(AuthError::NotFound { .. })
    ));

    store.delete_group(&id).await.unwrap();
    store.delete_group(&other).await.unwrap();
    assert!(matches!(store.get_group(&id).await, Err(AuthError::NotFound { .. })));
    assert!(matches!(store.delete_group(&id).await, Err(AuthError::NotFound { .. })));
    assert!(store.find_group_names(&alice).await.unwrap().is_empty());
}
