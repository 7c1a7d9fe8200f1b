#![forbid(unsafe_code)]

use wetcheck_contracts::audit::{AuditEventInput, AuditSeverity};
use wetcheck_contracts::auth::{AuthSession, SubjectId, UserProfile, UserRole};
use wetcheck_contracts::{IsoUtcTimestamp, ReasonCodeId};
use wetcheck_storage::audit::AuditLedger;
use wetcheck_storage::docstore::{DocumentStore, StorageError};
use wetcheck_storage::profiles::ProfileRepo;

pub mod reason_codes {
    use wetcheck_contracts::ReasonCodeId;

    // Session/profile ledger rows, 0x5345 = "SE".
    pub const SES_OK_FIRST_ADMIN_ELECTED: ReasonCodeId = ReasonCodeId(0x5345_0001);
    pub const SES_OK_PROFILE_CREATED: ReasonCodeId = ReasonCodeId(0x5345_0002);
    pub const SES_WARN_PROFILE_FALLBACK: ReasonCodeId = ReasonCodeId(0x5345_00F1);
}

/// Capability interface over the identity provider. The wizard never
/// talks to the provider directly; it receives a `SessionContext` built
/// from one of these at sign-in.
pub trait IdentityProvider {
    fn current_session(&self) -> Option<AuthSession>;
    fn observe_session_changes(&mut self, observer: Box<dyn FnMut(Option<AuthSession>) + Send>);
    fn sign_out(&mut self);
}

/// Sign-in failures mapped to operator-readable messages. Never fatal;
/// the shell re-prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub code: String,
    pub message: String,
}

impl AuthFailure {
    pub fn from_provider_code(code: &str) -> Self {
        let message = match code {
            "auth/invalid-credential" | "auth/wrong-password" => {
                "Incorrect email or password. Please try again."
            }
            "auth/user-not-found" => "No account found for that email address.",
            "auth/too-many-requests" => {
                "Too many attempts. Please wait a moment and try again."
            }
            "auth/network-request-failed" => {
                "Network problem while signing in. Check your connection and retry."
            }
            _ => "Sign-in failed. Please try again.",
        };
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Everything downstream code needs about the signed-in user. Built once
/// at sign-in, passed explicitly into constructors, dropped at sign-out;
/// there is no ambient current-user state anywhere in this workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub session: AuthSession,
    pub profile: UserProfile,
    /// True when the profile is the in-memory fallback rather than a
    /// stored row; the shell may want to retry bootstrap later.
    pub profile_is_fallback: bool,
}

/// Resolve (or create) the role profile for a freshly signed-in subject.
///
/// The very first subject ever seen becomes the admin; everyone after
/// that starts as a company user. If storage is unreachable the user is
/// let in anyway on an in-memory lowest-privilege profile rather than
/// being locked out, and a Warn row records that the privilege decision
/// was made without backend confirmation.
pub fn bootstrap_profile<S: DocumentStore>(
    store: &mut S,
    ledger: &mut AuditLedger,
    now: &IsoUtcTimestamp,
    session: &AuthSession,
) -> SessionContext {
    match try_bootstrap(store, ledger, now, session) {
        Ok(profile) => SessionContext {
            session: session.clone(),
            profile,
            profile_is_fallback: false,
        },
        Err(err) => {
            log_row(
                ledger,
                now,
                AuditSeverity::Warn,
                reason_codes::SES_WARN_PROFILE_FALLBACK,
                format!(
                    "profile bootstrap failed for {}: {err:?}; granting fallback role",
                    session.subject_id.as_str()
                ),
            );
            SessionContext {
                session: session.clone(),
                profile: UserProfile {
                    email: session.email.clone(),
                    role: UserRole::FALLBACK,
                    company: None,
                    created_at: String::new(),
                },
                profile_is_fallback: true,
            }
        }
    }
}

fn try_bootstrap<S: DocumentStore>(
    store: &mut S,
    ledger: &mut AuditLedger,
    now: &IsoUtcTimestamp,
    session: &AuthSession,
) -> Result<UserProfile, StorageError> {
    if let Some(existing) = ProfileRepo::fetch(store, &session.subject_id)? {
        return Ok(existing);
    }
    let role = if ProfileRepo::any_admin_exists(store)? {
        UserRole::Company
    } else {
        UserRole::Admin
    };
    let profile = UserProfile {
        email: session.email.clone(),
        role,
        company: None,
        created_at: now.as_str().to_string(),
    };
    ProfileRepo::create(store, &session.subject_id, &profile)?;
    let code = if role == UserRole::Admin {
        reason_codes::SES_OK_FIRST_ADMIN_ELECTED
    } else {
        reason_codes::SES_OK_PROFILE_CREATED
    };
    log_row(
        ledger,
        now,
        AuditSeverity::Info,
        code,
        format!("profile created for {}", session.subject_id.as_str()),
    );
    Ok(profile)
}

fn log_row(
    ledger: &mut AuditLedger,
    now: &IsoUtcTimestamp,
    severity: AuditSeverity,
    code: ReasonCodeId,
    detail: String,
) {
    // Ledger rows are advisory; a malformed row must never break sign-in.
    if let Ok(input) = AuditEventInput::v1(now.clone(), severity, "session", code, Some(detail)) {
        let _ = ledger.append(input);
    }
}

/// Deterministic in-memory provider for tests and the desktop shell's
/// offline mode.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    session: Option<AuthSession>,
    observers: Vec<Box<dyn FnMut(Option<AuthSession>) + Send>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, subject_id: SubjectId, email: &str) {
        let session = AuthSession::new(subject_id, email);
        self.session = Some(session.clone());
        for observer in &mut self.observers {
            observer(Some(session.clone()));
        }
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn current_session(&self) -> Option<AuthSession> {
        self.session.clone()
    }

    fn observe_session_changes(&mut self, observer: Box<dyn FnMut(Option<AuthSession>) + Send>) {
        self.observers.push(observer);
    }

    fn sign_out(&mut self) {
        self.session = None;
        for observer in &mut self.observers {
            observer(None);
        }
    }
}
