use admissions::config::AdmissionsConfig;
use admissions::workflows::admission::{
    AcademicYear, AdmissionPorts, AdmissionService, InMemoryAdmissionStore,
    InMemoryParentAccounts, OutboxNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Admission service plus handles on the process-local adapters behind it.
pub(crate) struct InMemoryAdmissions {
    pub(crate) service: Arc<AdmissionService>,
    pub(crate) store: Arc<InMemoryAdmissionStore>,
    pub(crate) accounts: Arc<InMemoryParentAccounts>,
    pub(crate) outbox: Arc<OutboxNotifier>,
}

pub(crate) fn in_memory_admissions(config: &AdmissionsConfig) -> InMemoryAdmissions {
    let store = Arc::new(InMemoryAdmissionStore::default());
    let accounts = Arc::new(InMemoryParentAccounts::new(config.password_hash_cost));
    let outbox = Arc::new(OutboxNotifier::default());
    let service = Arc::new(AdmissionService::new(
        AdmissionPorts {
            applications: store.clone(),
            students: store.clone(),
            credentials: accounts.clone(),
            notifications: outbox.clone(),
        },
        config,
    ));

    InMemoryAdmissions {
        service,
        store,
        accounts,
        outbox,
    }
}

pub(crate) fn parse_academic_year(raw: &str) -> Result<AcademicYear, String> {
    raw.trim()
        .parse::<AcademicYear>()
        .map_err(|err| err.to_string())
}
