//! 拦截管道集成测试：直接用合成请求驱动命名管道

use authz_server::{
    error::AppError,
    models::auth::AuthUser,
    pipeline::{stages::CLIENT_SECRET as CLIENT_SECRET_HEADER, InboundRequest, ShortCircuit},
    repository::IdentityStore,
};
use axum::http::{header, Method};

mod common;
use common::{bearer, spawn_app, CLIENT_SECRET};

fn authed(method: Method, token: &str) -> InboundRequest {
    InboundRequest::new(method)
        .header(header::AUTHORIZATION, &bearer(token))
        .header(header::CONTENT_TYPE, "application/json")
}

#[tokio::test]
async fn test_group_admin_end_to_end() {
    let app = spawn_app().await;
    let alice = app.register("alice", "alice@example.com").await;
    app.grant(&alice, "admin", Some(7), None).await;
    let token = app.token_for(&alice);

    let request = |group: &str| {
        authed(Method::GET, &token)
            .header(CLIENT_SECRET_HEADER, CLIENT_SECRET)
            .path_param("group_id", group)
    };

    let run = app.state.pipelines.group_admin.run(&request("7")).await;
    assert!(run.outcome.is_ok());
    assert_eq!(
        run.context.auth_user,
        Some(AuthUser {
            user_id: alice.id,
            user_uuid: alice.uuid,
            service_id: Some(app.service.id),
        })
    );

    let run = app.state.pipelines.group_admin.run(&request("8")).await;
    assert!(matches!(
        run.outcome,
        Err(ShortCircuit::Reject(AppError::Forbidden))
    ));
}

#[tokio::test]
async fn test_group_user_accepts_either_role() {
    let app = spawn_app().await;
    let bob = app.register("bob", "bob@example.com").await;
    app.grant(&bob, "user", Some(7), Some(app.service.id)).await;
    let token = app.token_for(&bob);

    let req = authed(Method::GET, &token)
        .header(CLIENT_SECRET_HEADER, CLIENT_SECRET)
        .path_param("group_id", "7");

    assert!(app.state.pipelines.group_user.run(&req).await.outcome.is_ok());
    assert!(matches!(
        app.state.pipelines.group_admin.run(&req).await.outcome,
        Err(ShortCircuit::Reject(AppError::Forbidden))
    ));
}

#[tokio::test]
async fn test_role_scoped_to_other_service_is_ignored() {
    let app = spawn_app().await;
    let other = app.store.save_service("search", "other-secret").await.unwrap();
    let bob = app.register("bob", "bob@example.com").await;
    app.grant(&bob, "admin", Some(7), Some(other.id)).await;
    let token = app.token_for(&bob);

    let req = authed(Method::GET, &token)
        .header(CLIENT_SECRET_HEADER, CLIENT_SECRET)
        .path_param("group_id", "7");

    assert!(matches!(
        app.state.pipelines.group_admin.run(&req).await.outcome,
        Err(ShortCircuit::Reject(AppError::Forbidden))
    ));
}

#[tokio::test]
async fn test_operator_bypasses_client_secret() {
    let app = spawn_app().await;
    let operator = app
        .store
        .find_user_by_email(common::OPERATOR_EMAIL)
        .await
        .unwrap();
    let token = app.token_for(&operator);

    // operator pipeline never asks for a secret
    let req = authed(Method::POST, &token).query_param("type", "operator");
    assert!(app.state.pipelines.operator.run(&req).await.outcome.is_ok());

    // tenant-secret gate lets operator-type calls through
    assert!(app
        .state
        .pipelines
        .tenant_secret
        .run(&req)
        .await
        .outcome
        .is_ok());

    // without the marker the secret is required
    let plain = authed(Method::POST, &token);
    match app.state.pipelines.tenant_secret.run(&plain).await.outcome {
        Err(ShortCircuit::Reject(AppError::BadRequest(msg))) => {
            assert_eq!(msg, "Required Client-Secret")
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_operator_pipeline_rejects_tenant_admin() {
    let app = spawn_app().await;
    let alice = app.register("alice", "alice@example.com").await;
    app.grant(&alice, "admin", None, None).await;
    let token = app.token_for(&alice);

    let req = authed(Method::POST, &token).query_param("type", "operator");
    assert!(matches!(
        app.state.pipelines.operator.run(&req).await.outcome,
        Err(ShortCircuit::Reject(AppError::Forbidden))
    ));
}

#[tokio::test]
async fn test_store_failure_fails_closed() {
    let app = spawn_app().await;
    let alice = app.register("alice", "alice@example.com").await;
    app.grant(&alice, "admin", Some(7), None).await;
    let token = app.token_for(&alice);
    app.store.set_failing(true);

    let req = authed(Method::GET, &token)
        .header(CLIENT_SECRET_HEADER, CLIENT_SECRET)
        .path_param("group_id", "7");

    for pipeline in [
        &app.state.pipelines.authenticated_user,
        &app.state.pipelines.group_admin,
        &app.state.pipelines.group_user,
        &app.state.pipelines.operator,
    ] {
        let run = pipeline.run(&req).await;
        assert!(
            matches!(run.outcome, Err(ShortCircuit::Reject(AppError::Internal(_)))),
            "{} did not fail closed",
            pipeline.name()
        );
        assert!(run.context.auth_user.is_none());
    }
}

#[tokio::test]
async fn test_unknown_client_secret_is_unauthorized() {
    let app = spawn_app().await;
    let alice = app.register("alice", "alice@example.com").await;
    let token = app.token_for(&alice);

    let req = authed(Method::GET, &token).header(CLIENT_SECRET_HEADER, "not-a-tenant");
    assert!(matches!(
        app.state.pipelines.authenticated_user.run(&req).await.outcome,
        Err(ShortCircuit::Reject(AppError::Unauthorized))
    ));
}

#[tokio::test]
async fn test_group_pipeline_requires_integer_group() {
    let app = spawn_app().await;
    let alice = app.register("alice", "alice@example.com").await;
    let token = app.token_for(&alice);

    let req = authed(Method::GET, &token)
        .header(CLIENT_SECRET_HEADER, CLIENT_SECRET)
        .path_param("group_id", "seven");

    match app.state.pipelines.group_user.run(&req).await.outcome {
        Err(ShortCircuit::Reject(AppError::BadRequest(msg))) => {
            assert_eq!(msg, "Path parameter is only integer")
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
