//! Read-only credential storage for bot accounts
//!
//! Loads a JSON file containing one record per bot: account id,
//! password, and the base64 shared secret used for one-time logon
//! codes. The file is the single source of truth and is read exactly
//! once at startup; the resulting set is immutable, so session
//! behavior is reproducible in tests with injected fake credentials.
//!
//! Pool size equals the number of records; account ids must be unique.

use std::path::Path;

use common::{Error, Result, Secret};
use serde::Deserialize;
use tracing::{info, warn};

/// One bot's login material. Immutable after load.
#[derive(Debug, Clone)]
pub struct Credential {
    pub account_id: String,
    pub password: Secret<String>,
    /// Base64-encoded shared secret for the one-time-code generator.
    pub shared_secret: Secret<String>,
}

/// On-disk record shape. Secrets are wrapped after deserialization so
/// `Secret` never needs a `Deserialize` impl.
#[derive(Deserialize)]
struct RawCredential {
    account_id: String,
    password: String,
    shared_secret: String,
}

/// Ordered, immutable set of bot credentials.
#[derive(Debug)]
pub struct CredentialSet {
    credentials: Vec<Credential>,
}

impl CredentialSet {
    /// Load and validate the credential file.
    ///
    /// Fails on unreadable or unparseable files, empty fields, or
    /// duplicate account ids. Warns when the file is readable by other
    /// users, since it holds passwords and shared secrets.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| {
                Error::Credentials(format!("reading credential file {}: {e}", path.display()))
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = tokio::fs::metadata(path).await {
                let mode = metadata.permissions().mode() & 0o777;
                if mode & 0o077 != 0 {
                    warn!(
                        path = %path.display(),
                        mode = format!("{mode:o}"),
                        "credential file is readable by other users, expected 0600"
                    );
                }
            }
        }

        let raw: Vec<RawCredential> = serde_json::from_str(&contents)
            .map_err(|e| Error::Credentials(format!("parsing credential file: {e}")))?;

        let mut credentials = Vec::with_capacity(raw.len());
        for record in raw {
            if record.account_id.is_empty() {
                return Err(Error::Credentials("empty account_id".into()));
            }
            if record.password.is_empty() || record.shared_secret.is_empty() {
                return Err(Error::Credentials(format!(
                    "account {} has an empty password or shared_secret",
                    record.account_id
                )));
            }
            if credentials
                .iter()
                .any(|c: &Credential| c.account_id == record.account_id)
            {
                return Err(Error::Credentials(format!(
                    "duplicate account id {}",
                    record.account_id
                )));
            }
            credentials.push(Credential {
                account_id: record.account_id,
                password: Secret::new(record.password),
                shared_secret: Secret::new(record.shared_secret),
            });
        }

        info!(path = %path.display(), accounts = credentials.len(), "loaded bot credentials");
        Ok(Self { credentials })
    }

    /// All credentials, in file order.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Number of configured bots (equals the pool size).
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether no bots are configured.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_file(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("bots.json");
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn loads_ordered_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"[
                {"account_id":"bot-1","password":"pw1","shared_secret":"c2VjcmV0MQ=="},
                {"account_id":"bot-2","password":"pw2","shared_secret":"c2VjcmV0Mg=="}
            ]"#,
        )
        .await;

        let set = CredentialSet::load(&path).await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.credentials()[0].account_id, "bot-1");
        assert_eq!(set.credentials()[1].account_id, "bot-2");
        assert_eq!(set.credentials()[0].password.expose(), "pw1");
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = CredentialSet::load(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(Error::Credentials(_))));
    }

    #[tokio::test]
    async fn invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "not json").await;
        assert!(matches!(
            CredentialSet::load(&path).await,
            Err(Error::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_account_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"[
                {"account_id":"bot-1","password":"a","shared_secret":"eA=="},
                {"account_id":"bot-1","password":"b","shared_secret":"eQ=="}
            ]"#,
        )
        .await;
        let err = CredentialSet::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("duplicate account id bot-1"));
    }

    #[tokio::test]
    async fn empty_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"[{"account_id":"bot-1","password":"","shared_secret":"eA=="}]"#,
        )
        .await;
        assert!(matches!(
            CredentialSet::load(&path).await,
            Err(Error::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn empty_list_is_valid_but_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "[]").await;
        let set = CredentialSet::load(&path).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn secrets_are_redacted_in_debug() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"[{"account_id":"bot-1","password":"pw1","shared_secret":"c2VjcmV0"}]"#,
        )
        .await;
        let set = CredentialSet::load(&path).await.unwrap();
        let debug = format!("{:?}", set.credentials()[0]);
        assert!(!debug.contains("pw1"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
