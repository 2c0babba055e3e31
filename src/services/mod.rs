//! Business logic services layer

pub mod authorization;
pub mod bootstrap;
pub mod group_service;
pub mod policy_cache;
pub mod tenant_service;
pub mod token_service;
pub mod user_service;

pub use authorization::{AuthorizationResolver, Scope};
pub use bootstrap::{BootstrapError, BootstrapSeeder, SeedOutcome};
pub use group_service::GroupService;
pub use policy_cache::{spawn_policy_refresh, PolicyCache, PolicySnapshot};
pub use tenant_service::TenantService;
pub use token_service::TokenService;
pub use user_service::UserService;
