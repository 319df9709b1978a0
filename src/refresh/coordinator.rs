//! Single-flight refresh coordination.
//!
//! The coordinator owns the `Idle`/`Refreshing` flag and the pending queue
//! behind one mutex. The lock is only ever held for the check-and-set and the
//! settle step, never across an await: correctness under concurrent callers
//! comes from the queue being the sole synchronization mechanism, exactly one
//! caller ever becoming the driver of a refresh cycle.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::errors::Error;
use crate::session::SessionTeardown;
use crate::store::CredentialStore;
use crate::telemetry::refresh::RefreshTelemetry;
use crate::token::CredentialPair;

use super::queue::{PendingQueue, QueueResult};

struct CoordinatorState {
    refreshing: bool,
    queue: PendingQueue,
}

pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    teardown: Arc<SessionTeardown>,
    access_key: String,
    refresh_key: String,
    refresh_timeout: Duration,
    state: Mutex<CoordinatorState>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        teardown: Arc<SessionTeardown>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            teardown,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
            refresh_timeout,
            state: Mutex::new(CoordinatorState {
                refreshing: false,
                queue: PendingQueue::new(),
            }),
        }
    }

    /// Resolves the current expiry event for one caller.
    ///
    /// The first caller to arrive while idle becomes the driver: it dispatches
    /// `refresh_call` with the stored refresh credential (at most once per
    /// cycle) and settles the queue when the call completes. Any caller
    /// arriving while a refresh is in flight enqueues instead and shares the
    /// driver's outcome. Returns the access credential to replay with.
    ///
    /// With no refresh credential stored there is nothing to refresh with:
    /// session teardown runs immediately and the caller gets
    /// [`Error::MissingRefreshCredential`] so it can fall back to its
    /// original failure.
    pub async fn refresh_or_wait<F, Fut>(&self, refresh_call: F) -> Result<String, Error>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<CredentialPair, Error>>,
    {
        // The waiter case awaits outside this block so the guard's scope ends
        // before the await; the compiler's Send analysis otherwise considers
        // the guard live across it even after an explicit drop.
        let first_caller = {
            let mut state = self.lock_state();
            if state.refreshing {
                let waiter = state.queue.enqueue();
                debug!(queued = state.queue.len(), "refresh in flight; caller queued");
                Err(waiter)
            } else {
                match self.store.get(&self.refresh_key) {
                    Some(credential) => {
                        state.refreshing = true;
                        Ok(credential)
                    }
                    None => {
                        drop(state);
                        warn!("no refresh credential stored; tearing down session");
                        self.teardown.run();
                        return Err(Error::MissingRefreshCredential);
                    }
                }
            }
        };
        let refresh_credential = match first_caller {
            Ok(credential) => credential,
            Err(waiter) => {
                return match waiter.await {
                    Ok(Ok(access)) => Ok(access),
                    Ok(Err(shared)) => Err(Error::RefreshFailed(shared)),
                    // The sender only disappears if the coordinator itself was
                    // dropped mid-cycle.
                    Err(_) => Err(Error::Config(
                        "refresh coordinator dropped while caller was queued".to_string(),
                    )),
                };
            }
        };

        let telemetry = RefreshTelemetry::new("coordinator.refresh");
        telemetry.emit_start(SystemTime::now());
        let outcome = match tokio::time::timeout(
            self.refresh_timeout,
            refresh_call(refresh_credential),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.refresh_timeout)),
        };

        // Settling must happen on every path so the coordinator can never
        // wedge in Refreshing with waiters still queued.
        match outcome {
            Ok(pair) => {
                self.store.set(&self.access_key, &pair.access);
                self.store.set(&self.refresh_key, &pair.refresh);
                telemetry.emit_success(SystemTime::now());
                self.settle(Ok(pair.access.clone()));
                Ok(pair.access)
            }
            Err(err) => {
                telemetry.emit_failure(&err, SystemTime::now());
                // Teardown runs exactly once per failed cycle, from the
                // driver, before the rejections fan out. It is synchronous
                // and not awaited.
                self.teardown.run();
                let shared = Arc::new(err);
                self.settle(Err(shared.clone()));
                Err(Error::RefreshFailed(shared))
            }
        }
    }

    /// `Refreshing → Idle`, draining the queue in the same critical section
    /// so no waiter survives into the next cycle.
    fn settle(&self, result: QueueResult) {
        let mut state = self.lock_state();
        state.refreshing = false;
        state.queue.drain(&result);
    }

    pub fn is_idle(&self) -> bool {
        !self.lock_state().refreshing
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use crate::store::{CredentialStore, MemoryCredentialStore};

    struct Harness {
        store: Arc<MemoryCredentialStore>,
        navigations: Arc<AtomicUsize>,
        coordinator: Arc<RefreshCoordinator>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryCredentialStore::new());
        let navigations = Arc::new(AtomicUsize::new(0));
        let navigate = {
            let navigations = navigations.clone();
            Box::new(move || {
                navigations.fetch_add(1, Ordering::SeqCst);
            })
        };
        let teardown = Arc::new(SessionTeardown::new(
            store.clone() as Arc<dyn CredentialStore>,
            "access_token",
            "refresh_token",
            navigate,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone() as Arc<dyn CredentialStore>,
            teardown,
            "access_token",
            "refresh_token",
            Duration::from_secs(5),
        ));
        Harness {
            store,
            navigations,
            coordinator,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn driver_refreshes_and_persists_the_new_pair() {
        let h = harness();
        h.store.set("access_token", "a1");
        h.store.set("refresh_token", "r1");

        let seen_refresh = Arc::new(std::sync::Mutex::new(None));
        let seen = seen_refresh.clone();
        let access = h
            .coordinator
            .refresh_or_wait(move |refresh| async move {
                *seen.lock().unwrap() = Some(refresh);
                Ok(CredentialPair::new("a2", "r2"))
            })
            .await
            .expect("refresh succeeds");

        assert_eq!(access, "a2");
        assert_eq!(seen_refresh.lock().unwrap().as_deref(), Some("r1"));
        assert_eq!(h.store.get("access_token"), Some("a2".to_string()));
        assert_eq!(h.store.get("refresh_token"), Some("r2".to_string()));
        assert!(h.coordinator.is_idle());
        assert_eq!(h.navigations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_refresh_credential_tears_down_without_dispatching() {
        let h = harness();
        h.store.set("access_token", "a1");

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let err = h
            .coordinator
            .refresh_or_wait(move |_| async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(CredentialPair::new("a2", "r2"))
            })
            .await
            .expect_err("nothing to refresh with");

        assert!(matches!(err, Error::MissingRefreshCredential));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.navigations.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.get("access_token"), None);
        assert!(h.coordinator.is_idle());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_callers_share_one_refresh_call() {
        let h = harness();
        h.store.set("refresh_token", "r1");

        let release = Arc::new(Notify::new());
        let refresh_calls = Arc::new(AtomicUsize::new(0));

        let driver = {
            let coordinator = h.coordinator.clone();
            let release = release.clone();
            let refresh_calls = refresh_calls.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(move |_| async move {
                        refresh_calls.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Ok(CredentialPair::new("a2", "r2"))
                    })
                    .await
            })
        };

        // Let the driver reach the in-flight suspension point.
        while h.coordinator.is_idle() {
            tokio::task::yield_now().await;
        }

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let coordinator = h.coordinator.clone();
            let refresh_calls = refresh_calls.clone();
            waiters.push(tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(move |_| async move {
                        refresh_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(CredentialPair::new("never", "never"))
                    })
                    .await
            }));
        }
        tokio::task::yield_now().await;

        release.notify_one();
        let driver_access = driver.await.expect("driver task").expect("driver refresh");
        assert_eq!(driver_access, "a2");
        for waiter in waiters {
            let access = waiter.await.expect("waiter task").expect("waiter shares outcome");
            assert_eq!(access, "a2");
        }
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert!(h.coordinator.is_idle());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_refresh_rejects_every_caller_and_navigates_once() {
        let h = harness();
        h.store.set("access_token", "a1");
        h.store.set("refresh_token", "r1");

        let release = Arc::new(Notify::new());
        let driver = {
            let coordinator = h.coordinator.clone();
            let release = release.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(move |_| async move {
                        release.notified().await;
                        Err(Error::Status(
                            reqwest::StatusCode::UNAUTHORIZED,
                            "refresh credential rejected".to_string(),
                        ))
                    })
                    .await
            })
        };
        while h.coordinator.is_idle() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(|_| async { Ok(CredentialPair::new("x", "y")) })
                    .await
            })
        };
        tokio::task::yield_now().await;

        release.notify_one();
        let driver_err = driver.await.expect("driver task").expect_err("refresh failed");
        let waiter_err = waiter.await.expect("waiter task").expect_err("waiter rejected");
        assert!(matches!(driver_err, Error::RefreshFailed(_)));
        assert!(matches!(waiter_err, Error::RefreshFailed(_)));

        // Teardown ran exactly once: both credentials cleared, one navigation.
        assert_eq!(h.store.get("access_token"), None);
        assert_eq!(h.store.get("refresh_token"), None);
        assert_eq!(h.navigations.load(Ordering::SeqCst), 1);
        assert!(h.coordinator.is_idle());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn synchronous_refresh_failure_still_returns_to_idle() {
        let h = harness();
        h.store.set("refresh_token", "r1");

        let err = h
            .coordinator
            .refresh_or_wait(|_| async {
                Err(Error::Config("refresh setup failed".to_string()))
            })
            .await
            .expect_err("synchronous failure");
        assert!(matches!(err, Error::RefreshFailed(_)));
        assert!(h.coordinator.is_idle());

        // The next cycle starts cleanly even though the previous one never
        // reached the wire.
        h.store.set("refresh_token", "r1");
        let access = h
            .coordinator
            .refresh_or_wait(|_| async { Ok(CredentialPair::new("a2", "r2")) })
            .await
            .expect("fresh cycle succeeds");
        assert_eq!(access, "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_refresh_times_out_and_rejects_the_queue() {
        let h = harness();
        h.store.set("refresh_token", "r1");

        let driver = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(|_| async {
                        // Never settles on its own.
                        std::future::pending::<Result<CredentialPair, Error>>().await
                    })
                    .await
            })
        };
        while h.coordinator.is_idle() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh_or_wait(|_| async { Ok(CredentialPair::new("x", "y")) })
                    .await
            })
        };
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(6)).await;
        let driver_err = driver.await.expect("driver task").expect_err("timed out");
        let waiter_err = waiter.await.expect("waiter task").expect_err("rejected");
        match driver_err {
            Error::RefreshFailed(shared) => assert!(matches!(*shared, Error::Timeout(_))),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(waiter_err, Error::RefreshFailed(_)));
        assert!(h.coordinator.is_idle());
    }
}
