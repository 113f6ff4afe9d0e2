use std::io;
use std::path::Path;

use dashmap::DashMap;
use serde::Deserialize;
use ulid::Ulid;

/// An authenticated caller. The engine never sees raw tokens — only this.
/// `admin` is a plain capability flag checked per operation, not a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Ulid,
    pub name: String,
    pub admin: bool,
}

impl Caller {
    /// Owner-or-admin: the authorization rule used by every booking
    /// operation.
    pub fn may_act_on(&self, owner: Ulid) -> bool {
        self.admin || self.user_id == owner
    }
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    token: String,
    user_id: Ulid,
    name: String,
    #[serde(default)]
    admin: bool,
}

/// Opaque bearer token → caller mapping, seeded at startup. Identity issuing
/// itself lives outside this service.
pub struct TokenRegistry {
    tokens: DashMap<String, Caller>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    /// Load a JSON array of `{token, user_id, name, admin?}` entries.
    pub fn load_file(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<TokenEntry> = serde_json::from_str(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let registry = Self::new();
        for entry in entries {
            registry.register(
                entry.token,
                Caller {
                    user_id: entry.user_id,
                    name: entry.name,
                    admin: entry.admin,
                },
            );
        }
        Ok(registry)
    }

    pub fn register(&self, token: String, caller: Caller) {
        self.tokens.insert(token, caller);
    }

    pub fn authenticate(&self, token: &str) -> Option<Caller> {
        let caller = self.tokens.get(token).map(|e| e.value().clone());
        if caller.is_none() {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
        }
        caller
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(admin: bool) -> Caller {
        Caller {
            user_id: Ulid::new(),
            name: "Ada Lovelace".into(),
            admin,
        }
    }

    #[test]
    fn authenticate_known_and_unknown_tokens() {
        let registry = TokenRegistry::new();
        let ada = caller(false);
        registry.register("tok-ada".into(), ada.clone());

        assert_eq!(registry.authenticate("tok-ada"), Some(ada));
        assert_eq!(registry.authenticate("tok-nobody"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn owner_or_admin_rule() {
        let ada = caller(false);
        let root = caller(true);
        let other = Ulid::new();

        assert!(ada.may_act_on(ada.user_id));
        assert!(!ada.may_act_on(other));
        assert!(root.may_act_on(other)); // admin bypasses ownership
    }

    #[test]
    fn load_file_parses_entries() {
        let dir = std::env::temp_dir().join("stayd_test_auth");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokens.json");
        let uid = Ulid::new();
        std::fs::write(
            &path,
            format!(
                r#"[{{"token": "t1", "user_id": "{uid}", "name": "Ada Lovelace"}},
                    {{"token": "t2", "user_id": "{}", "name": "Root", "admin": true}}]"#,
                Ulid::new()
            ),
        )
        .unwrap();

        let registry = TokenRegistry::load_file(&path).unwrap();
        assert_eq!(registry.len(), 2);
        let ada = registry.authenticate("t1").unwrap();
        assert_eq!(ada.user_id, uid);
        assert!(!ada.admin);
        assert!(registry.authenticate("t2").unwrap().admin);
        let _ = std::fs::remove_file(&path);
    }
}
