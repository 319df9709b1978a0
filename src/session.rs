use std::sync::Arc;

use tracing::info;

use crate::store::CredentialStore;

/// Zero-argument side effect that moves the user to a login surface.
pub type NavigateFn = Box<dyn Fn() + Send + Sync>;

/// Clears both stored credentials and fires the navigation effect.
///
/// Runs synchronously from failure paths and is never awaited: rejections
/// reach callers independently of navigation completing. Idempotent, so the
/// no-refresh-credential path can invoke it even when storage is already
/// empty.
pub struct SessionTeardown {
    store: Arc<dyn CredentialStore>,
    access_key: String,
    refresh_key: String,
    navigate: NavigateFn,
}

impl SessionTeardown {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
        navigate: NavigateFn,
    ) -> Self {
        Self {
            store,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
            navigate,
        }
    }

    pub fn run(&self) {
        self.store.remove(&self.access_key);
        self.store.remove(&self.refresh_key);
        info!("session torn down; navigating to login");
        (self.navigate)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryCredentialStore;

    fn teardown_with_counter() -> (Arc<MemoryCredentialStore>, Arc<AtomicUsize>, SessionTeardown) {
        let store = Arc::new(MemoryCredentialStore::new());
        let navigations = Arc::new(AtomicUsize::new(0));
        let counter = navigations.clone();
        let teardown = SessionTeardown::new(
            store.clone() as Arc<dyn CredentialStore>,
            "access_token",
            "refresh_token",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (store, navigations, teardown)
    }

    #[test]
    fn clears_both_credentials_and_navigates() {
        let (store, navigations, teardown) = teardown_with_counter();
        store.set("access_token", "a1");
        store.set("refresh_token", "r1");

        teardown.run();

        assert_eq!(store.get("access_token"), None);
        assert_eq!(store.get("refresh_token"), None);
        assert_eq!(navigations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_idempotent_when_credentials_are_already_absent() {
        let (store, navigations, teardown) = teardown_with_counter();

        teardown.run();
        teardown.run();

        assert_eq!(store.get("access_token"), None);
        assert_eq!(navigations.load(Ordering::SeqCst), 2);
    }
}
