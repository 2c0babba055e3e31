//! Request interception pipeline
//!
//! A pipeline is an ordered list of [`Stage`]s driven by a loop that stops at
//! the first short-circuit. Each run has exactly one panic boundary: a stage
//! that panics turns into a generic internal error.

pub mod stages;

use crate::{
    auth::{Claims, TokenCodec},
    error::AppError,
    models::{
        auth::AuthUser,
        role::{ADMIN_ROLE, USER_ROLE},
    },
    services::AuthorizationResolver,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, RawPathParams},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method},
};
use futures::FutureExt;
use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use stages::{
    Authorize, AuthorizeOperator, ClientSecretCheck, HeaderCheck, IdentityResolve, RoleScope,
    TokenDecode,
};

/// Query parameter value that marks an operator-type call
pub const OPERATOR_TYPE: &str = "operator";

/// Transport-independent view of an inbound request
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
}

impl InboundRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: HashMap::new(),
            path_params: HashMap::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn query_param(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn path_param(mut self, key: &str, value: &str) -> Self {
        self.path_params.insert(key.to_string(), value.to_string());
        self
    }

    /// Build from axum request parts (path params are available once routed)
    pub async fn from_parts(parts: &mut Parts) -> Self {
        let path_params = match RawPathParams::from_request_parts(parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            headers: parts.headers.clone(),
            query,
            path_params,
        }
    }

    /// `type=operator` (case-insensitive)
    pub fn is_operator_call(&self) -> bool {
        self.query
            .get("type")
            .is_some_and(|t| t.eq_ignore_ascii_case(OPERATOR_TYPE))
    }

    /// `group_id` from the path, falling back to the query string
    pub fn group_id(&self) -> Result<Option<i64>, AppError> {
        match self
            .path_params
            .get("group_id")
            .or_else(|| self.query.get("group_id"))
        {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AppError::BadRequest("Path parameter is only integer".to_string())),
            None => Ok(None),
        }
    }
}

/// Request-scoped state written by stages
#[derive(Debug, Default)]
pub struct RequestContext {
    pub client_secret: Option<String>,
    pub claims: Option<Claims>,
    pub auth_user: Option<AuthUser>,
    /// Headers applied to the response whatever the outcome
    pub response_headers: HeaderMap,
}

/// Why a pipeline stopped early
#[derive(Debug)]
pub enum ShortCircuit {
    /// CORS pre-flight, answered with an empty success
    Preflight,
    Reject(AppError),
}

impl From<AppError> for ShortCircuit {
    fn from(err: AppError) -> Self {
        ShortCircuit::Reject(err)
    }
}

impl ShortCircuit {
    fn label(&self) -> &'static str {
        match self {
            ShortCircuit::Preflight => "preflight",
            ShortCircuit::Reject(AppError::BadRequest(_)) => "bad_request",
            ShortCircuit::Reject(AppError::Unauthorized) => "unauthorized",
            ShortCircuit::Reject(AppError::Forbidden) => "forbidden",
            ShortCircuit::Reject(_) => "error",
        }
    }
}

/// One check in a pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, req: &InboundRequest, ctx: &mut RequestContext)
        -> Result<(), ShortCircuit>;
}

/// Result of running a pipeline
#[derive(Debug)]
pub struct PipelineRun {
    pub context: RequestContext,
    pub outcome: Result<(), ShortCircuit>,
}

pub struct Pipeline {
    name: &'static str,
    stages: Vec<Box<dyn Stage>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Pipeline {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, req: &InboundRequest) -> PipelineRun {
        let mut context = RequestContext::default();

        let result = AssertUnwindSafe(self.drive(req, &mut context))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                tracing::error!(
                    pipeline = self.name,
                    panic = %panic_message(payload.as_ref()),
                    "Pipeline stage panicked"
                );
                Err(ShortCircuit::Reject(AppError::Internal(
                    "pipeline stage panicked".to_string(),
                )))
            }
        };

        let label = match &outcome {
            Ok(()) => "allow",
            Err(sc) => sc.label(),
        };
        metrics::counter!(
            "authz_pipeline_decisions_total",
            "pipeline" => self.name,
            "outcome" => label
        )
        .increment(1);

        PipelineRun { context, outcome }
    }

    async fn drive(
        &self,
        req: &InboundRequest,
        ctx: &mut RequestContext,
    ) -> Result<(), ShortCircuit> {
        for stage in &self.stages {
            if let Err(short_circuit) = stage.run(req, ctx).await {
                tracing::debug!(
                    pipeline = self.name,
                    stage = stage.name(),
                    outcome = short_circuit.label(),
                    "Pipeline short-circuited"
                );
                return Err(short_circuit);
            }
        }
        Ok(())
    }
}

/// The named pipelines protected routes are wrapped in
#[derive(Clone)]
pub struct Pipelines {
    pub header_only: Arc<Pipeline>,
    pub tenant_secret: Arc<Pipeline>,
    pub authenticated_user: Arc<Pipeline>,
    pub group_admin: Arc<Pipeline>,
    pub group_user: Arc<Pipeline>,
    pub operator: Arc<Pipeline>,
}

const ADMIN_ONLY: &[&str] = &[ADMIN_ROLE];
const ADMIN_OR_USER: &[&str] = &[ADMIN_ROLE, USER_ROLE];

impl Pipelines {
    pub fn new(codec: Arc<TokenCodec>, resolver: Arc<AuthorizationResolver>) -> Self {
        let authenticated = |name: &'static str, roles: &'static [&'static str], scope| {
            Pipeline::new(name)
                .stage(HeaderCheck)
                .stage(ClientSecretCheck::required())
                .stage(TokenDecode::new(codec.clone()))
                .stage(IdentityResolve::new(resolver.clone()))
                .stage(Authorize::new(resolver.clone(), roles, scope))
        };

        Self {
            header_only: Arc::new(Pipeline::new("header_only").stage(HeaderCheck)),
            tenant_secret: Arc::new(
                Pipeline::new("tenant_secret")
                    .stage(HeaderCheck)
                    .stage(ClientSecretCheck::operator_bypass()),
            ),
            authenticated_user: Arc::new(authenticated(
                "authenticated_user",
                &[],
                RoleScope::Tenant,
            )),
            group_admin: Arc::new(authenticated("group_admin", ADMIN_ONLY, RoleScope::Group)),
            group_user: Arc::new(authenticated("group_user", ADMIN_OR_USER, RoleScope::Group)),
            operator: Arc::new(
                Pipeline::new("operator")
                    .stage(HeaderCheck)
                    .stage(TokenDecode::new(codec.clone()))
                    .stage(IdentityResolve::new(resolver.clone()))
                    .stage(AuthorizeOperator::new(resolver.clone())),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryIdentityStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _: &InboundRequest, _: &mut RequestContext) -> Result<(), ShortCircuit> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Reject;

    #[async_trait]
    impl Stage for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        async fn run(&self, _: &InboundRequest, _: &mut RequestContext) -> Result<(), ShortCircuit> {
            Err(AppError::Forbidden.into())
        }
    }

    struct Explode;

    #[async_trait]
    impl Stage for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        async fn run(&self, _: &InboundRequest, _: &mut RequestContext) -> Result<(), ShortCircuit> {
            panic!("driver error: connection reset by peer");
        }
    }

    #[tokio::test]
    async fn test_first_short_circuit_wins() {
        let hits = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new("test")
            .stage(Counting(hits.clone()))
            .stage(Reject)
            .stage(Counting(hits.clone()));

        let run = pipeline.run(&InboundRequest::new(Method::GET)).await;

        assert!(matches!(
            run.outcome,
            Err(ShortCircuit::Reject(AppError::Forbidden))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_internal_error() {
        let pipeline = Pipeline::new("test").stage(HeaderCheck).stage(Explode);

        let run = pipeline.run(&InboundRequest::new(Method::GET)).await;

        match run.outcome {
            Err(ShortCircuit::Reject(err)) => {
                assert_eq!(err.code(), 500);
                assert_eq!(err.user_message(), "Internal server error");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // headers written before the panic survive
        assert!(run
            .context
            .response_headers
            .contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_allows() {
        let run = Pipeline::new("empty").run(&InboundRequest::new(Method::GET)).await;
        assert!(run.outcome.is_ok());
    }

    #[test]
    fn test_named_pipeline_composition() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let codec = Arc::new(
            TokenCodec::new("test_secret_key_32_characters_long!", 3600, true).unwrap(),
        );
        let resolver = Arc::new(AuthorizationResolver::new(store));
        let pipelines = Pipelines::new(codec, resolver);

        assert_eq!(pipelines.header_only.stage_names(), vec!["header_check"]);
        assert_eq!(
            pipelines.tenant_secret.stage_names(),
            vec!["header_check", "client_secret_check"]
        );
        assert_eq!(
            pipelines.group_admin.stage_names(),
            vec![
                "header_check",
                "client_secret_check",
                "token_decode",
                "identity_resolve",
                "authorize"
            ]
        );
        assert_eq!(
            pipelines.operator.stage_names(),
            vec![
                "header_check",
                "token_decode",
                "identity_resolve",
                "authorize_operator"
            ]
        );
    }

    #[test]
    fn test_group_id_parsing() {
        let req = InboundRequest::new(Method::GET).path_param("group_id", "7");
        assert_eq!(req.group_id().unwrap(), Some(7));

        let req = InboundRequest::new(Method::GET).query_param("group_id", "9");
        assert_eq!(req.group_id().unwrap(), Some(9));

        let req = InboundRequest::new(Method::GET).path_param("group_id", "seven");
        assert!(matches!(req.group_id(), Err(AppError::BadRequest(_))));

        assert_eq!(InboundRequest::new(Method::GET).group_id().unwrap(), None);
    }

    #[test]
    fn test_operator_call_detection() {
        let req = InboundRequest::new(Method::POST).query_param("type", "Operator");
        assert!(req.is_operator_call());
        assert!(!InboundRequest::new(Method::POST).is_operator_call());
    }
}
