use std::sync::Arc;

use fleet_repositories::{AlertRepository, AuditLogRepository, DeviceRepository};
use fleet_store::ConnectionManager;

use crate::audit::AuditRecorder;

#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<DeviceRepository>,
    pub alerts: Arc<AlertRepository>,
    pub audit_logs: Arc<AuditLogRepository>,
    pub audit: Arc<AuditRecorder>,
    pub manager: ConnectionManager,
    pub auth_token: Arc<String>,
}

impl AppState {
    pub fn new(manager: ConnectionManager, auth_token: impl Into<String>) -> Self {
        let audit_logs = Arc::new(AuditLogRepository::new(manager.clone()));
        let audit = Arc::new(AuditRecorder::new(AuditLogRepository::new(manager.clone())));
        Self {
            devices: Arc::new(DeviceRepository::new(manager.clone())),
            alerts: Arc::new(AlertRepository::new(manager.clone())),
            audit_logs,
            audit,
            manager,
            auth_token: Arc::new(auth_token.into()),
        }
    }
}
