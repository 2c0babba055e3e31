//! 多租户认证与授权服务
//! 令牌签发、拦截管道、基于角色的授权

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
