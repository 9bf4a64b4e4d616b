use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::config::AdmissionsConfig;
use crate::workflows::admission::domain::{
    AcademicYear, Actor, Application, ApplicationId, ApplicationStatus, ApplicationSubmission,
    Gender, LeadSource, ParentAccountId, ParentType, ReferenceNumber, Standard, Student,
    StudentId, TrackingToken,
};
use crate::workflows::admission::memory::{
    InMemoryAdmissionStore, InMemoryParentAccounts, OutboxNotifier,
};
use crate::workflows::admission::numbering::SequenceScope;
use crate::workflows::admission::repository::{
    ApplicationRecord, ApplicationRepository, CredentialError, CredentialIssuer, Notification,
    NotificationError, NotificationSender, ParentAccountRequest, ProvisionedAccount,
    RepositoryError, StudentRegistry,
};
use crate::workflows::admission::service::{AdmissionPorts, AdmissionService, StatusUpdate};

pub(super) const PARENT_EMAIL: &str = "meena.r@example.com";

pub(super) fn config() -> AdmissionsConfig {
    AdmissionsConfig {
        academic_year: Some(AcademicYear::new(2025)),
        password_hash_cost: 4,
        ..AdmissionsConfig::default()
    }
}

pub(super) fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        branch: None,
        student_name: "Aarav R".to_string(),
        gender: Gender::Male,
        date_of_birth: "2021-01-01".to_string(),
        applying_for_class: Standard::PreKg,
        source: LeadSource::SocialMedia,
        parent_type: ParentType::Mother,
        parent_name: "Meena R".to_string(),
        mobile: "9876543210".to_string(),
        email: PARENT_EMAIL.to_string(),
        remarks: None,
        documents_link: None,
        payment_receipt_link: None,
    }
}

pub(super) fn sibling_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        student_name: "Diya R".to_string(),
        gender: Gender::Female,
        date_of_birth: "2020-08-14".to_string(),
        source: LeadSource::SiblingReference,
        ..submission()
    }
}

pub(super) fn staff() -> Actor {
    Actor::staff("Priya")
}

/// Service wired to the in-memory adapters, with handles for inspection.
pub(super) struct Harness {
    pub service: Arc<AdmissionService>,
    pub store: Arc<InMemoryAdmissionStore>,
    pub accounts: Arc<InMemoryParentAccounts>,
    pub outbox: Arc<OutboxNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|_, ports| ports)
    }

    /// Build with some ports swapped for test doubles.
    pub fn with(
        customize: impl FnOnce(&Arc<InMemoryAdmissionStore>, AdmissionPorts) -> AdmissionPorts,
    ) -> Self {
        let store = Arc::new(InMemoryAdmissionStore::default());
        let accounts = Arc::new(InMemoryParentAccounts::new(4));
        let outbox = Arc::new(OutboxNotifier::default());
        let ports = customize(
            &store,
            AdmissionPorts {
                applications: store.clone(),
                students: store.clone(),
                credentials: accounts.clone(),
                notifications: outbox.clone(),
            },
        );
        Self {
            service: Arc::new(AdmissionService::new(ports, &config())),
            store,
            accounts,
            outbox,
        }
    }

    pub fn submit(&self) -> Application {
        self.service.submit(submission()).expect("submission succeeds")
    }

    pub fn status_of(&self, id: &ApplicationId) -> ApplicationStatus {
        self.service.get(id).expect("application exists").application.status
    }

    pub fn move_to(&self, id: &ApplicationId, status: ApplicationStatus) {
        let remarks = (status == ApplicationStatus::OnHold).then(|| "awaiting TC".to_string());
        self.service
            .update_status(
                id,
                StatusUpdate {
                    status,
                    remarks,
                    admission: None,
                },
                staff(),
            )
            .expect("transition succeeds");
    }

    /// Submit and walk the application to `documents_verified`.
    pub fn verified_application(&self) -> Application {
        let application = self.submit();
        self.move_to(&application.id, ApplicationStatus::DocumentsPending);
        self.move_to(&application.id, ApplicationStatus::DocumentsVerified);
        self.service
            .get(&application.id)
            .expect("application exists")
            .application
    }
}

/// Student registry whose inserts always fail; everything else hits the real store.
pub(super) struct FailingStudents {
    pub inner: Arc<InMemoryAdmissionStore>,
}

impl StudentRegistry for FailingStudents {
    fn next_sequence(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        self.inner.next_sequence(scope)
    }

    fn insert(&self, _student: Student) -> Result<Student, RepositoryError> {
        Err(RepositoryError::Unavailable("student registry offline".into()))
    }

    fn remove(&self, id: &StudentId) -> Result<(), RepositoryError> {
        self.inner.remove(id)
    }

    fn find_by_application(&self, id: &ApplicationId) -> Result<Option<Student>, RepositoryError> {
        self.inner.find_by_application(id)
    }
}

/// Registry that lets another staff member reject the application while the
/// student row is being written.
pub(super) struct RacingStudents {
    pub inner: Arc<InMemoryAdmissionStore>,
}

impl StudentRegistry for RacingStudents {
    fn next_sequence(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        self.inner.next_sequence(scope)
    }

    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut record = ApplicationRepository::fetch(&*self.inner, &student.application_id)?
            .ok_or(RepositoryError::NotFound)?;
        record.application.status = ApplicationStatus::Rejected;
        ApplicationRepository::update(&*self.inner, record)?;
        StudentRegistry::insert(&*self.inner, student)
    }

    fn remove(&self, id: &StudentId) -> Result<(), RepositoryError> {
        self.inner.remove(id)
    }

    fn find_by_application(&self, id: &ApplicationId) -> Result<Option<Student>, RepositoryError> {
        self.inner.find_by_application(id)
    }
}

pub(super) struct FailingCredentials;

impl CredentialIssuer for FailingCredentials {
    fn provision(
        &self,
        _request: &ParentAccountRequest,
    ) -> Result<ProvisionedAccount, CredentialError> {
        Err(CredentialError::Unavailable("auth provider timed out".into()))
    }

    fn revoke(&self, _account: &ParentAccountId) -> Result<(), CredentialError> {
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationSender for FailingNotifier {
    fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay refused".into()))
    }
}

/// Reports a reference collision for the first `collisions` inserts.
pub(super) struct CollidingApplications {
    pub inner: Arc<InMemoryAdmissionStore>,
    pub collisions: usize,
    pub attempts: AtomicUsize,
}

impl ApplicationRepository for CollidingApplications {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.collisions {
            return Err(RepositoryError::Conflict);
        }
        ApplicationRepository::insert(&*self.inner, record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        ApplicationRepository::update(&*self.inner, record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        ApplicationRepository::fetch(&*self.inner, id)
    }

    fn find_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.find_by_reference(reference)
    }

    fn find_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.find_by_token(token)
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list()
    }
}

/// Serves a frozen copy of one application to every fetch once `freeze` is
/// called, like a reader that loaded the row before another writer committed.
pub(super) struct StaleReads {
    pub inner: Arc<InMemoryAdmissionStore>,
    pub frozen: Mutex<Option<ApplicationRecord>>,
}

impl StaleReads {
    pub fn new(inner: &Arc<InMemoryAdmissionStore>) -> Self {
        Self {
            inner: inner.clone(),
            frozen: Mutex::new(None),
        }
    }

    pub fn freeze(&self, id: &ApplicationId) {
        let record = ApplicationRepository::fetch(&*self.inner, id).expect("fetch");
        *self.frozen.lock().expect("frozen lock") = record;
    }
}

impl ApplicationRepository for StaleReads {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        ApplicationRepository::insert(&*self.inner, record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        ApplicationRepository::update(&*self.inner, record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let frozen = self.frozen.lock().expect("frozen lock").clone();
        match frozen {
            Some(record) if &record.application.id == id => Ok(Some(record)),
            _ => ApplicationRepository::fetch(&*self.inner, id),
        }
    }

    fn find_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.find_by_reference(reference)
    }

    fn find_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.find_by_token(token)
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) struct UnavailableApplications;

impl ApplicationRepository for UnavailableApplications {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn update(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn find_by_reference(
        &self,
        _reference: &ReferenceNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn find_by_token(
        &self,
        _token: &TrackingToken,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".into()))
    }
}

pub(super) fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
