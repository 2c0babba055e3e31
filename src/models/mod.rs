//! 数据模型模块
//! 身份、RBAC 实体及其请求/响应 DTO

pub mod auth;
pub mod role;
pub mod tenant;
pub mod token;
pub mod user;
