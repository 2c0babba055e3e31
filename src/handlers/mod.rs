//! HTTP 处理器模块

pub mod auth;
pub mod extract;
pub mod group;
pub mod health;
pub mod operator;
pub mod user;
