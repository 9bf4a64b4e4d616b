//! Process-local adapters for the admission ports. One mutex guards each store,
//! so version checks and counter increments are atomic with the write they guard.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::domain::{
    ApplicationId, ParentAccountId, ReferenceNumber, Student, StudentId, TrackingToken,
};
use super::numbering::SequenceScope;
use super::repository::{
    ApplicationRecord, ApplicationRepository, CredentialError, CredentialIssuer, Notification,
    NotificationError, NotificationSender, ParentAccountRequest, ProvisionedAccount,
    RepositoryError, StudentRegistry,
};

#[derive(Debug, Default)]
struct StoreState {
    applications: HashMap<ApplicationId, ApplicationRecord>,
    by_reference: HashMap<ReferenceNumber, ApplicationId>,
    by_token: HashMap<TrackingToken, ApplicationId>,
    students: HashMap<StudentId, Student>,
    student_by_application: HashMap<ApplicationId, StudentId>,
    sequences: HashMap<SequenceScope, u32>,
}

/// Applications, students and sequence counters held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAdmissionStore {
    state: Mutex<StoreState>,
}

impl InMemoryAdmissionStore {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("admission store mutex poisoned".into()))
    }

    pub fn student_count(&self) -> usize {
        self.state().map(|state| state.students.len()).unwrap_or(0)
    }
}

impl ApplicationRepository for InMemoryAdmissionStore {
    fn insert(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.state()?;
        let application = &record.application;
        if state.applications.contains_key(&application.id)
            || state.by_reference.contains_key(&application.reference_number)
            || state.by_token.contains_key(&application.tracking_token)
        {
            return Err(RepositoryError::Conflict);
        }

        record.version = 1;
        let id = application.id.clone();
        state
            .by_reference
            .insert(application.reference_number.clone(), id.clone());
        state
            .by_token
            .insert(application.tracking_token.clone(), id.clone());
        state.applications.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.state()?;
        let stored = state
            .applications
            .get_mut(&record.application.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != record.version {
            return Err(RepositoryError::Conflict);
        }

        record.version += 1;
        *stored = record.clone();
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.state()?.applications.get(id).cloned())
    }

    fn find_by_reference(
        &self,
        reference: &ReferenceNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .by_reference
            .get(reference)
            .and_then(|id| state.applications.get(id))
            .cloned())
    }

    fn find_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .by_token
            .get(token)
            .and_then(|id| state.applications.get(id))
            .cloned())
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self.state()?.applications.values().cloned().collect())
    }
}

impl StudentRegistry for InMemoryAdmissionStore {
    fn next_sequence(&self, scope: &SequenceScope) -> Result<u32, RepositoryError> {
        let mut state = self.state()?;
        let counter = state.sequences.entry(scope.clone()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut state = self.state()?;
        if state
            .student_by_application
            .contains_key(&student.application_id)
        {
            return Err(RepositoryError::Conflict);
        }
        state
            .student_by_application
            .insert(student.application_id.clone(), student.id.clone());
        state.students.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn remove(&self, id: &StudentId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let student = state.students.remove(id).ok_or(RepositoryError::NotFound)?;
        state.student_by_application.remove(&student.application_id);
        Ok(())
    }

    fn find_by_application(&self, id: &ApplicationId) -> Result<Option<Student>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .student_by_application
            .get(id)
            .and_then(|student_id| state.students.get(student_id))
            .cloned())
    }
}

/// Parent login stored by [`InMemoryParentAccounts`].
#[derive(Debug, Clone)]
pub struct ParentAccount {
    pub id: ParentAccountId,
    pub email: String,
    pub full_name: String,
    pub mobile: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Parent accounts keyed by login email, passwords hashed with bcrypt.
#[derive(Debug)]
pub struct InMemoryParentAccounts {
    accounts: Mutex<HashMap<String, ParentAccount>>,
    hash_cost: u32,
}

impl InMemoryParentAccounts {
    pub fn new(hash_cost: u32) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            hash_cost,
        }
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<String, ParentAccount>>, CredentialError> {
        self.accounts
            .lock()
            .map_err(|_| CredentialError::Unavailable("account store mutex poisoned".into()))
    }

    pub fn find(&self, email: &str) -> Option<ParentAccount> {
        self.accounts()
            .ok()
            .and_then(|accounts| accounts.get(&email.to_ascii_lowercase()).cloned())
    }

    /// Check a login attempt against the stored hash.
    pub fn verify(&self, email: &str, password: &str) -> bool {
        self.find(email)
            .map(|account| bcrypt::verify(password, &account.password_hash).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.accounts().map(|accounts| accounts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialIssuer for InMemoryParentAccounts {
    fn provision(
        &self,
        request: &ParentAccountRequest,
    ) -> Result<ProvisionedAccount, CredentialError> {
        let email = request.email.to_ascii_lowercase();
        if let Some(existing) = self.accounts()?.get(&email) {
            return Ok(ProvisionedAccount {
                account_id: existing.id.clone(),
                login_email: existing.email.clone(),
                created: false,
            });
        }

        let password_hash = bcrypt::hash(&request.initial_password, self.hash_cost)
            .map_err(|err| CredentialError::Hashing(err.to_string()))?;

        let mut accounts = self.accounts()?;
        // Another admit for the same parent may have won while we were hashing.
        if let Some(existing) = accounts.get(&email) {
            return Ok(ProvisionedAccount {
                account_id: existing.id.clone(),
                login_email: existing.email.clone(),
                created: false,
            });
        }

        let account = ParentAccount {
            id: ParentAccountId(Uuid::new_v4().to_string()),
            email: email.clone(),
            full_name: request.full_name.clone(),
            mobile: request.mobile.clone(),
            password_hash,
            created_at: Utc::now(),
        };
        let provisioned = ProvisionedAccount {
            account_id: account.id.clone(),
            login_email: email.clone(),
            created: true,
        };
        accounts.insert(email, account);
        Ok(provisioned)
    }

    fn revoke(&self, account: &ParentAccountId) -> Result<(), CredentialError> {
        self.accounts()?.retain(|_, stored| &stored.id != account);
        Ok(())
    }
}

/// Notification sender that keeps every message in an outbox.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    outbox: Mutex<Vec<Notification>>,
}

impl OutboxNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

impl NotificationSender for OutboxNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        debug!(
            template = ?notification.template,
            application_id = %notification.application_id.0,
            "queued parent notification"
        );
        self.outbox
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".into()))?
            .push(notification);
        Ok(())
    }
}
