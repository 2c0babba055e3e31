//! Pipeline stages

use super::{InboundRequest, RequestContext, ShortCircuit, Stage};
use crate::{
    auth::{extract_token, TokenCodec},
    error::AppError,
    services::{AuthorizationResolver, Scope},
};
use async_trait::async_trait;
use axum::http::{
    header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use std::sync::Arc;

pub const CLIENT_SECRET: HeaderName = HeaderName::from_static("client-secret");

const JSON: &str = "application/json";

fn internal(what: &str) -> ShortCircuit {
    AppError::Internal(format!("{} ran out of order", what)).into()
}

/// 响应头与请求内容类型检查
pub struct HeaderCheck;

impl HeaderCheck {
    fn is_json(req: &InboundRequest) -> bool {
        req.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON))
    }
}

#[async_trait]
impl Stage for HeaderCheck {
    fn name(&self) -> &'static str {
        "header_check"
    }

    async fn run(&self, req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        let headers = &mut ctx.response_headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));

        if req.method == Method::OPTIONS {
            return Err(ShortCircuit::Preflight);
        }

        if req.method != Method::GET && !Self::is_json(req) {
            return Err(AppError::BadRequest("Need to content type is only json.".to_string()).into());
        }

        Ok(())
    }
}

/// Requires the tenant's `Client-Secret` header
pub struct ClientSecretCheck {
    operator_bypass: bool,
}

impl ClientSecretCheck {
    pub fn required() -> Self {
        Self {
            operator_bypass: false,
        }
    }

    /// Operator-type calls (`type=operator`) skip the check
    pub fn operator_bypass() -> Self {
        Self {
            operator_bypass: true,
        }
    }
}

#[async_trait]
impl Stage for ClientSecretCheck {
    fn name(&self) -> &'static str {
        "client_secret_check"
    }

    async fn run(&self, req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        if self.operator_bypass && req.is_operator_call() {
            return Ok(());
        }

        let secret = req
            .headers
            .get(CLIENT_SECRET)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest("Required Client-Secret".to_string()))?;

        ctx.client_secret = Some(secret.to_string());
        Ok(())
    }
}

pub struct TokenDecode {
    codec: Arc<TokenCodec>,
}

impl TokenDecode {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Stage for TokenDecode {
    fn name(&self) -> &'static str {
        "token_decode"
    }

    async fn run(&self, req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        let token = extract_token(&req.headers)?;
        ctx.claims = Some(self.codec.decode(&token)?);
        Ok(())
    }
}

pub struct IdentityResolve {
    resolver: Arc<AuthorizationResolver>,
}

impl IdentityResolve {
    pub fn new(resolver: Arc<AuthorizationResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for IdentityResolve {
    fn name(&self) -> &'static str {
        "identity_resolve"
    }

    async fn run(&self, _req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        let claims = ctx.claims.as_ref().ok_or_else(|| internal("identity_resolve"))?;
        let user = self
            .resolver
            .resolve_identity(claims, ctx.client_secret.as_deref())
            .await?;
        ctx.auth_user = Some(user);
        Ok(())
    }
}

/// Which scope a role check is made in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    /// Tenant-wide: only the resolved service narrows the lookup
    Tenant,
    /// The `group_id` of the request must be present
    Group,
}

pub struct Authorize {
    resolver: Arc<AuthorizationResolver>,
    required: &'static [&'static str],
    scope: RoleScope,
}

impl Authorize {
    pub fn new(
        resolver: Arc<AuthorizationResolver>,
        required: &'static [&'static str],
        scope: RoleScope,
    ) -> Self {
        Self {
            resolver,
            required,
            scope,
        }
    }
}

#[async_trait]
impl Stage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn run(&self, req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        let user = ctx.auth_user.as_ref().ok_or_else(|| internal("authorize"))?;

        let scope = match self.scope {
            RoleScope::Tenant => Scope {
                group_id: None,
                service_id: user.service_id,
            },
            RoleScope::Group => {
                let group_id = req
                    .group_id()?
                    .ok_or_else(|| AppError::BadRequest("Required group_id".to_string()))?;
                Scope::group(group_id, user.service_id)
            }
        };

        self.resolver.authorize(user, self.required, scope).await?;
        Ok(())
    }
}

pub struct AuthorizeOperator {
    resolver: Arc<AuthorizationResolver>,
}

impl AuthorizeOperator {
    pub fn new(resolver: Arc<AuthorizationResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for AuthorizeOperator {
    fn name(&self) -> &'static str {
        "authorize_operator"
    }

    async fn run(&self, _req: &InboundRequest, ctx: &mut RequestContext) -> Result<(), ShortCircuit> {
        let user = ctx
            .auth_user
            .as_ref()
            .ok_or_else(|| internal("authorize_operator"))?;
        self.resolver.authorize_operator(user).await?;
        Ok(())
    }
}
