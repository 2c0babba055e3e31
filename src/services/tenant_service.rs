//! Tenant (service) administration, operator only

use crate::{
    auth::ApiKeyGenerator,
    error::{AppError, StoreError},
    models::tenant::{AddServicePermissionRequest, CreateServiceRequest, Service, ServicePermission},
    repository::IdentityStore,
};
use std::sync::Arc;
use validator::Validate;

pub struct TenantService {
    store: Arc<dyn IdentityStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Create a tenant with a freshly generated Client-Secret
    pub async fn create_service(&self, req: CreateServiceRequest) -> Result<Service, AppError> {
        req.validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let api_key = ApiKeyGenerator::generate_service_key();
        let service = self
            .store
            .save_service(&req.name, &api_key)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::Conflict("Service already exists".to_string()),
                other => other.into(),
            })?;

        tracing::info!(service_id = service.id, name = %service.name, "Service created");
        Ok(service)
    }

    pub async fn add_permission(
        &self,
        service_id: i64,
        req: AddServicePermissionRequest,
    ) -> Result<ServicePermission, AppError> {
        self.store.find_service_by_id(service_id).await?;
        let permission = self
            .store
            .find_permission_by_name(&req.permission_name)
            .await?;

        let binding = self
            .store
            .save_service_permission(permission.id, service_id)
            .await?;

        tracing::info!(service_id, permission = %permission.name, "Service permission added");
        Ok(binding)
    }
}
