use crate::client::storage::KeyValueStorage;

const TOKEN_KEY: &str = "token";

/// Holds the bearer token across client restarts.
pub struct SessionStore<S> {
    storage: S,
    token: Option<String>,
}

impl<S: KeyValueStorage> SessionStore<S> {
    pub fn load(storage: S) -> Self {
        let token = storage.get(TOKEN_KEY);
        Self { storage, token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
        self.storage.set(TOKEN_KEY, token);
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.storage.remove(TOKEN_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    #[test]
    fn token_survives_reload() {
        let mut store = SessionStore::load(MemoryStorage::new());
        assert_eq!(store.token(), None);

        store.set_token("abc123");
        assert_eq!(store.token(), Some("abc123"));

        let storage = store.storage;
        let reloaded = SessionStore::load(storage);
        assert_eq!(reloaded.token(), Some("abc123"));
    }

    #[test]
    fn clear_removes_persisted_token() {
        let mut store = SessionStore::load(MemoryStorage::new());
        store.set_token("abc123");
        store.clear();

        assert_eq!(store.token(), None);

        let reloaded = SessionStore::load(store.storage);
        assert_eq!(reloaded.token(), None);
    }
}
