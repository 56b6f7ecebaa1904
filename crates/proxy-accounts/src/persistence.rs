use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::account::{Account, Credentials};

#[derive(Debug, Serialize, Deserialize)]
struct StoredAccount {
    email: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "clientSecret")]
    client_secret: String,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Account> for StoredAccount {
    fn from(account: &Account) -> Self {
        Self {
            email: account.email.clone(),
            refresh_token: account.credentials.refresh_token.clone(),
            client_id: account.credentials.client_id.clone(),
            client_secret: account.credentials.client_secret.clone(),
            created_at: account.created_at,
        }
    }
}

impl From<StoredAccount> for Account {
    fn from(stored: StoredAccount) -> Self {
        let mut account = Account::new(
            stored.email,
            Credentials {
                refresh_token: stored.refresh_token,
                client_id: stored.client_id,
                client_secret: stored.client_secret,
            },
        );
        account.created_at = stored.created_at;
        account
    }
}

/// Load the persisted account list from `path`.
///
/// A missing or corrupt file is not fatal: it yields an empty pool so a
/// fresh deployment can still start and accounts can be added later.
pub fn load(path: &Path) -> Vec<Account> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "no persisted accounts file, starting with an empty pool");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<StoredAccount>>(&contents) {
        Ok(stored) => stored.into_iter().map(Account::from).collect(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "accounts file is corrupt, starting with an empty pool");
            Vec::new()
        }
    }
}

/// Persist `accounts` to `path` via a temp-file-then-rename so a crash
/// mid-write never leaves a truncated file in its place.
pub fn save(path: &Path, accounts: &[Account]) -> std::io::Result<()> {
    let stored: Vec<StoredAccount> = accounts.iter().map(StoredAccount::from).collect();
    let body = serde_json::to_string_pretty(&stored)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
