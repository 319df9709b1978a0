#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

use bearer_pipeline::{AuthClient, Config, CredentialStore, MemoryCredentialStore};

pub const ACCESS_KEY: &str = "access_token";
pub const REFRESH_KEY: &str = "refresh_token";

#[derive(Serialize)]
struct Claims {
    exp: u64,
    sub: &'static str,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

pub fn jwt_with_exp(exp: u64) -> String {
    encode(
        &Header::default(),
        &Claims { exp, sub: "user-1" },
        &EncodingKey::from_secret(b"test-fixture"),
    )
    .expect("encode fixture token")
}

pub fn expired_jwt() -> String {
    jwt_with_exp(unix_now() - 600)
}

pub fn valid_jwt() -> String {
    jwt_with_exp(unix_now() + 600)
}

pub struct TestPipeline {
    pub client: AuthClient,
    pub store: Arc<MemoryCredentialStore>,
    pub navigations: Arc<AtomicUsize>,
}

impl TestPipeline {
    pub fn navigation_count(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

pub fn pipeline(server_uri: &str) -> TestPipeline {
    let store = Arc::new(MemoryCredentialStore::new());
    let navigations = Arc::new(AtomicUsize::new(0));
    let counter = navigations.clone();
    let client = AuthClient::new(
        Config::new(server_uri).expect("valid base url"),
        store.clone() as Arc<dyn CredentialStore>,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("build client");
    TestPipeline {
        client,
        store,
        navigations,
    }
}

struct VecWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl std::io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.lines.lock().unwrap();
        guard.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let writer_lines = lines.clone();
    let subscriber = Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    );
    let guard = set_default(subscriber);
    (lines, guard)
}

pub fn drain_logs(lines: Arc<Mutex<Vec<String>>>) -> Vec<String> {
    Arc::try_unwrap(lines).unwrap().into_inner().unwrap()
}
