//! Typed secret storage bound to the environment scope.
//!
//! Secrets are tagged variants stored under a unique string id. Binding a
//! secret publishes derived entries into the execution's
//! [`EnvironmentStore`]; unbinding removes exactly those entries and then
//! the secret, so a bind/unbind pair leaves the environment observably
//! unchanged. Both operations run inside one critical section and are
//! atomic from the outside.
//!
//! Secret material never appears in `Debug` output, error messages, or
//! [`SecretStore::list`] summaries.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::context::EnvironmentStore;

/// Visibility scope of a stored secret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SecretScope {
    /// Available to every stage of the execution.
    #[default]
    Global,
    /// Reserved for engine-internal credentials.
    System,
}

impl SecretScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretScope::Global => "GLOBAL",
            SecretScope::System => "SYSTEM",
        }
    }
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a [`Secret`] variant, safe to log and compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretKind {
    PlainText,
    UsernamePassword,
    SshUserPrivateKey,
    AwsCredentials,
    FileCredential,
    CertificateCredential,
    StringCredential,
}

impl SecretKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::PlainText => "plain-text",
            SecretKind::UsernamePassword => "username-password",
            SecretKind::SshUserPrivateKey => "ssh-user-private-key",
            SecretKind::AwsCredentials => "aws-credentials",
            SecretKind::FileCredential => "file-credential",
            SecretKind::CertificateCredential => "certificate-credential",
            SecretKind::StringCredential => "string-credential",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged credential value.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    PlainText {
        text: String,
    },
    UsernamePassword {
        username: String,
        password: String,
    },
    SshUserPrivateKey {
        private_key: String,
        passphrase: Option<String>,
    },
    AwsCredentials {
        access_key: String,
        secret_key: String,
    },
    FileCredential {
        filename: String,
        content: Vec<u8>,
    },
    CertificateCredential {
        password: String,
        keystore: Vec<u8>,
    },
    StringCredential {
        secret: String,
    },
}

impl Secret {
    #[must_use]
    pub fn kind(&self) -> SecretKind {
        match self {
            Secret::PlainText { .. } => SecretKind::PlainText,
            Secret::UsernamePassword { .. } => SecretKind::UsernamePassword,
            Secret::SshUserPrivateKey { .. } => SecretKind::SshUserPrivateKey,
            Secret::AwsCredentials { .. } => SecretKind::AwsCredentials,
            Secret::FileCredential { .. } => SecretKind::FileCredential,
            Secret::CertificateCredential { .. } => SecretKind::CertificateCredential,
            Secret::StringCredential { .. } => SecretKind::StringCredential,
        }
    }

    /// Environment entries derived from this secret for `id`.
    ///
    /// Single-value variants publish under the id itself; multi-field
    /// variants publish `{ID}_{FIELD}` keys with the id upper-cased.
    fn derived_env(&self, id: &str) -> Vec<(String, String)> {
        let upper = id.to_uppercase();
        match self {
            Secret::PlainText { text } => vec![(id.to_string(), text.clone())],
            Secret::StringCredential { secret } => vec![(id.to_string(), secret.clone())],
            Secret::UsernamePassword { username, password } => vec![
                (format!("{upper}_USERNAME"), username.clone()),
                (format!("{upper}_PASSWORD"), password.clone()),
            ],
            Secret::SshUserPrivateKey {
                private_key,
                passphrase,
            } => {
                let mut entries = vec![(format!("{upper}_SSH_KEY"), private_key.clone())];
                if let Some(passphrase) = passphrase {
                    entries.push((format!("{upper}_SSH_PASSPHRASE"), passphrase.clone()));
                }
                entries
            }
            Secret::AwsCredentials {
                access_key,
                secret_key,
            } => vec![
                (format!("{upper}_ACCESS_KEY_ID"), access_key.clone()),
                (format!("{upper}_SECRET_ACCESS_KEY"), secret_key.clone()),
            ],
            Secret::FileCredential { filename, .. } => {
                vec![(format!("{upper}_FILE"), filename.clone())]
            }
            Secret::CertificateCredential { password, .. } => {
                vec![(format!("{upper}_PASSWORD"), password.clone())]
            }
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({}, <redacted>)", self.kind())
    }
}

/// Non-sensitive listing entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretSummary {
    pub id: String,
    pub kind: SecretKind,
    pub scope: SecretScope,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SecretError {
    #[error("duplicate secret id '{id}'")]
    #[diagnostic(
        code(pipewright::secrets::duplicate),
        help("Unbind the existing secret first, or choose a different id.")
    )]
    Duplicate { id: String },

    #[error("no such secret '{id}'")]
    #[diagnostic(code(pipewright::secrets::missing))]
    Missing { id: String },

    /// Both the stored and requested kinds are named so callers can see
    /// which side is wrong.
    #[error("mismatched secret '{id}': stored {stored}, requested {requested}")]
    #[diagnostic(code(pipewright::secrets::kind_mismatch))]
    KindMismatch {
        id: String,
        stored: SecretKind,
        requested: SecretKind,
    },
}

#[derive(Debug)]
struct StoredSecret {
    secret: Secret,
    scope: SecretScope,
    env_keys: Vec<String>,
}

/// Secret store tied to one execution's environment manager.
///
/// All mutation goes through a single lock; derived env publication happens
/// within the same critical section so `bind`/`unbind` are atomic from the
/// outside.
#[derive(Debug)]
pub struct SecretStore {
    env: Arc<EnvironmentStore>,
    inner: Mutex<FxHashMap<String, StoredSecret>>,
}

impl SecretStore {
    pub fn new(env: Arc<EnvironmentStore>) -> Self {
        Self {
            env,
            inner: Mutex::new(FxHashMap::default()),
        }
    }

    /// Bind with the default `GLOBAL` scope.
    pub fn bind(&self, id: &str, secret: Secret) -> Result<(), SecretError> {
        self.bind_scoped(id, secret, SecretScope::Global)
    }

    /// Store the secret and publish its derived environment entries.
    pub fn bind_scoped(
        &self,
        id: &str,
        secret: Secret,
        scope: SecretScope,
    ) -> Result<(), SecretError> {
        let mut inner = self.inner.lock();
        if inner.contains_key(id) {
            return Err(SecretError::Duplicate { id: id.to_string() });
        }
        let entries = secret.derived_env(id);
        let env_keys = entries.iter().map(|(k, _)| k.clone()).collect();
        for (key, value) in entries {
            self.env.set(key, value);
        }
        inner.insert(
            id.to_string(),
            StoredSecret {
                secret,
                scope,
                env_keys,
            },
        );
        Ok(())
    }

    /// Remove every derived env entry, then the secret. Idempotent after
    /// the first call.
    pub fn unbind(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(stored) = inner.remove(id) {
            for key in &stored.env_keys {
                self.env.remove(key);
            }
        }
    }

    /// Retrieve a secret, verifying the stored variant matches `kind`.
    pub fn get(&self, id: &str, kind: SecretKind) -> Result<Secret, SecretError> {
        let inner = self.inner.lock();
        let stored = inner
            .get(id)
            .ok_or_else(|| SecretError::Missing { id: id.to_string() })?;
        if stored.secret.kind() != kind {
            return Err(SecretError::KindMismatch {
                id: id.to_string(),
                stored: stored.secret.kind(),
                requested: kind,
            });
        }
        Ok(stored.secret.clone())
    }

    /// Ids, kinds, and scopes of all bound secrets; never values.
    #[must_use]
    pub fn list(&self) -> Vec<SecretSummary> {
        let inner = self.inner.lock();
        let mut summaries: Vec<SecretSummary> = inner
            .iter()
            .map(|(id, stored)| SecretSummary {
                id: id.clone(),
                kind: stored.secret.kind(),
                scope: stored.scope,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
