//! 令牌服务：登录签发、刷新

use super::authorization::gate;
use crate::{
    auth::{ApiKeyGenerator, PasswordHasher, TokenCodec},
    error::AppError,
    models::{
        auth::{LoginRequest, RefreshTokenRequest, TokenResponse},
        token::{NewToken, Token, BEARER},
        user::User,
    },
    repository::IdentityStore,
};
use std::sync::Arc;

pub struct TokenService {
    store: Arc<dyn IdentityStore>,
    codec: Arc<TokenCodec>,
    hasher: PasswordHasher,
}

impl TokenService {
    pub fn new(store: Arc<dyn IdentityStore>, codec: Arc<TokenCodec>) -> Self {
        Self {
            store,
            codec,
            hasher: PasswordHasher::new(),
        }
    }

    /// 用户登录
    ///
    /// With `operator` set the user must also hold an operator policy.
    pub async fn login(&self, req: LoginRequest, operator: bool) -> Result<TokenResponse, AppError> {
        // 获取用户
        let user = self
            .store
            .find_user_by_email(&req.email)
            .await
            .map_err(|e| gate(e, AppError::Unauthorized))?;

        // 验证密码
        self.hasher.verify(&req.password, &user.password_hash)?;

        if operator {
            self.store
                .find_operator_policy(user.uuid)
                .await
                .map_err(|e| gate(e, AppError::Forbidden))?;
        }

        let (pair, _) = self.mint(&user).await?;

        tracing::info!(user_uuid = %user.uuid, operator, "Token issued");
        metrics::counter!("authz_tokens_issued_total", "kind" => "login").increment(1);

        Ok(pair)
    }

    /// Exchange a refresh token for a new pair; the old record is superseded
    ///
    /// With `operator` set the owner must hold an operator policy, since the
    /// operator marker is what lets the call skip the Client-Secret check.
    /// The new pair is persisted before the old record is retired, so a failed
    /// write leaves the presented refresh token usable.
    pub async fn refresh(
        &self,
        req: RefreshTokenRequest,
        operator: bool,
    ) -> Result<TokenResponse, AppError> {
        let hash = ApiKeyGenerator::hash(&req.refresh_token);

        let record = self
            .store
            .find_token_by_refresh_hash(&hash)
            .await
            .map_err(|e| gate(e, AppError::Unauthorized))?;

        if record.superseded_at.is_some() {
            tracing::warn!(user_uuid = %record.user_uuid, "Superseded refresh token presented");
            return Err(AppError::Unauthorized);
        }

        let user = self
            .store
            .find_user_by_uuid(record.user_uuid)
            .await
            .map_err(|e| gate(e, AppError::Unauthorized))?;

        if operator {
            self.store
                .find_operator_policy(user.uuid)
                .await
                .map_err(|e| gate(e, AppError::Forbidden))?;
        }

        let (pair, fresh) = self.mint(&user).await?;

        // 并发刷新时只有一个能成功
        if let Err(e) = self.store.supersede_token(record.id).await {
            // the losing pair was never handed out
            if let Err(retire) = self.store.supersede_token(fresh.id).await {
                tracing::warn!(error = %retire, token_id = fresh.id, "Failed to retire unused refresh token");
            }
            return Err(gate(e, AppError::Unauthorized));
        }

        metrics::counter!("authz_tokens_issued_total", "kind" => "refresh").increment(1);

        Ok(pair)
    }

    /// Sign a token for `user` and persist the hash of a fresh refresh token
    async fn mint(&self, user: &User) -> Result<(TokenResponse, Token), AppError> {
        let token = self.codec.issue(&user.username, user.uuid)?;
        let refresh_token = ApiKeyGenerator::generate_refresh_token();

        let record = self
            .store
            .save_token(NewToken {
                token: token.clone(),
                refresh_token_hash: ApiKeyGenerator::hash(&refresh_token),
                user_uuid: user.uuid,
            })
            .await?;

        let pair = TokenResponse {
            token_type: BEARER.to_string(),
            token,
            refresh_token,
        };
        Ok((pair, record))
    }
}
