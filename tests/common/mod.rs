//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates temp upload/output directories, a
//! store and worker pool wired to a (usually stubbed) encoder binary, and a
//! full [`AppContext`]. The [`serve`] method starts Axum on a random port
//! for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediamill::config::Config;
use mediamill::conversion::{EncoderSettings, WorkerPool};
use mediamill::server::{create_router, AppContext};
use mediamill::state::ConversionStore;
use tempfile::TempDir;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by temp
/// directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub store: Arc<ConversionStore>,
    pub pool: Arc<WorkerPool>,
    tmp: TempDir,
}

impl TestHarness {
    /// Create a harness whose encoder is the given binary, with the pool
    /// already started.
    pub fn with_encoder(encoder: impl Into<PathBuf>, workers: usize) -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        Self::build(tmp, encoder.into(), workers)
    }

    /// Create a harness whose encoder is a freshly written stub script.
    #[cfg(unix)]
    pub fn with_stub_encoder(script: &str, workers: usize) -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let stub = write_executable(tmp.path().join("encoder-stub.sh"), script);
        Self::build(tmp, stub, workers)
    }

    /// Create a harness with a nonexistent encoder binary. Good enough for
    /// tests that never reach a successful spawn.
    pub fn new() -> Self {
        Self::with_encoder("/nonexistent/encoder-binary", 1)
    }

    fn build(tmp: TempDir, encoder: PathBuf, workers: usize) -> Self {
        let uploads = tmp.path().join("uploads");
        let output = tmp.path().join("converted");
        std::fs::create_dir_all(&uploads).expect("create uploads dir");
        std::fs::create_dir_all(&output).expect("create output dir");

        let mut config = Config::default();
        config.conversion.workers = workers;
        config.conversion.uploads_dir = uploads;
        config.conversion.output_dir = output;
        config.conversion.ffmpeg_path = encoder;
        config.conversion.copy_metadata = false;

        let settings = EncoderSettings {
            ffmpeg_path: config.conversion.ffmpeg_path.clone(),
            exiftool_path: config.conversion.exiftool_path.clone(),
            copy_metadata: false,
        };

        let store = ConversionStore::new();
        let pool = Arc::new(WorkerPool::new(workers, Arc::clone(&store), settings));
        pool.start();

        let ctx = AppContext {
            store: Arc::clone(&store),
            pool: Arc::clone(&pool),
            config: Arc::new(config),
        };

        Self {
            ctx,
            store,
            pool,
            tmp,
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.ctx.config.conversion.uploads_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.ctx.config.conversion.output_dir
    }

    /// Place a source file into the uploads directory.
    pub fn upload(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.uploads_dir().join(name);
        std::fs::write(&path, contents).expect("write upload");
        path
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }
}

#[cfg(unix)]
fn write_executable(path: PathBuf, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(&path, script).expect("write stub");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod stub");
    path
}

/// Submit a conversion over HTTP and return the response.
pub async fn submit(
    client: &reqwest::Client,
    addr: SocketAddr,
    body: serde_json::Value,
) -> reqwest::Response {
    client
        .post(format!("http://{addr}/api/conversions"))
        .json(&body)
        .send()
        .await
        .expect("submit request")
}

/// Poll the status endpoint until the conversion completes or the timeout
/// elapses, returning the final JSON body.
pub async fn wait_for_completion(
    client: &reqwest::Client,
    addr: SocketAddr,
    id: &str,
    timeout: std::time::Duration,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let body: serde_json::Value = client
            .get(format!("http://{addr}/api/conversions/{id}"))
            .send()
            .await
            .expect("status request")
            .json()
            .await
            .expect("status body");

        if body["complete"].as_bool() == Some(true) {
            return body;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("conversion {id} did not complete in time: {body}");
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}
