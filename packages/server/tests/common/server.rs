//! In-process server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use server_core::kernel::{MemoryNewsStore, ServerDeps, StreamHub};
use server_core::server::build_app;

pub struct TestServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(deps: &ServerDeps) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_app(deps);

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, handle })
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Dependencies wired to an in-memory store with a fast relay
pub fn memory_deps() -> (Arc<MemoryNewsStore>, ServerDeps) {
    let store = Arc::new(MemoryNewsStore::new());
    let deps = ServerDeps::new(
        None,
        store.clone(),
        store.clone(),
        StreamHub::new(),
        Duration::from_millis(10),
    );
    (store, deps)
}
