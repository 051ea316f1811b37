use std::sync::Arc;

use axum::extract::FromRef;
use common_auth::IdentityBuilder;

use crate::metrics::ServiceMetrics;
use crate::store::ProjectStore;

/// Role requirements per protected operation.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    pub workflow_roles: Vec<String>,
    pub admin_roles: Vec<String>,
}

/// Shared application state used by handlers.
#[derive(Clone)]
pub struct AppState {
    pub(crate) identity: Arc<IdentityBuilder>,
    pub(crate) store: Arc<ProjectStore>,
    pub(crate) metrics: Arc<ServiceMetrics>,
    pub(crate) policy: Arc<RoutePolicy>,
}

impl AppState {
    pub fn new(
        identity: Arc<IdentityBuilder>,
        store: Arc<ProjectStore>,
        metrics: Arc<ServiceMetrics>,
        policy: RoutePolicy,
    ) -> Self {
        Self {
            identity,
            store,
            metrics,
            policy: Arc::new(policy),
        }
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}

impl FromRef<AppState> for Arc<IdentityBuilder> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}
