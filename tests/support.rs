#![allow(dead_code)]

use chezflora_client::state::{CredentialStore, MemoryStore, SessionEvent};
use chezflora_client::{ApiClient, ClientConfig};
use std::io::Write;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const EXPIRED_BODY: &str =
    r#"{"detail":"Given token not valid for any token type","code":"token_not_valid"}"#;

pub fn client_for(server: &mockito::ServerGuard) -> (ApiClient, Arc<MemoryStore>) {
    client_with(server, ClientConfig::default())
}

pub fn client_with(
    server: &mockito::ServerGuard,
    config: ClientConfig,
) -> (ApiClient, Arc<MemoryStore>) {
    let config = config
        .with_base_url(&format!("{}/api", server.url()))
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let client = ApiClient::new(config, store.clone()).unwrap();
    (client, store)
}

pub fn seed(store: &MemoryStore, access: Option<&str>, refresh: Option<&str>) {
    if let Some(access) = access {
        store.set("access_token", access).unwrap();
    }
    if let Some(refresh) = refresh {
        store.set("refresh_token", refresh).unwrap();
    }
}

pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Response body that is only written once the returned sender fires (or a
/// 10s safety timeout passes). Headers go out immediately, so the client sits
/// in the middle of reading the response until released.
pub fn held_body(
    body: &'static str,
) -> (
    mpsc::Sender<()>,
    impl Fn(&mut dyn Write) -> std::io::Result<()> + Send + Sync + 'static,
) {
    let (release, held) = mpsc::channel::<()>();
    let held = Mutex::new(held);
    let write = move |out: &mut dyn Write| {
        let _ = held.lock().unwrap().recv_timeout(Duration::from_secs(10));
        out.write_all(body.as_bytes())
    };
    (release, write)
}

/// Polls `condition` until it holds; panics after 10s.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
