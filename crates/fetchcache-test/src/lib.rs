//! Helpers for testing the cache against a real HTTP endpoint.
//!
//! Functions in this crate panic on failure; they are supposed to only be
//! used from tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use url::Url;

pub use tempfile::{tempdir, TempDir};

/// Setup function for tests, initializing a tracing subscriber.
pub fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter("fetchcache=trace")
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

struct Route {
    status: u16,
    body: Vec<u8>,
    hits: AtomicUsize,
}

type Routes = Arc<HashMap<String, Route>>;

/// A local HTTP server serving a fixed set of routes, counting requests.
///
/// The server binds an ephemeral localhost port and is torn down on drop.
/// Paths not registered respond with `404`.
pub struct ContentServer {
    socket: SocketAddr,
    routes: Routes,
    handle: JoinHandle<()>,
}

impl ContentServer {
    /// Spawns a server from `(path, status, body)` route definitions.
    pub async fn spawn<I>(routes: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, u16, Vec<u8>)>,
    {
        let routes: Routes = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| {
                    let route = Route {
                        status,
                        body,
                        hits: AtomicUsize::new(0),
                    };
                    (path.trim_start_matches('/').to_string(), route)
                })
                .collect(),
        );

        let app = Router::new()
            .route("/*path", get(serve))
            .with_state(routes.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let socket = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            socket,
            routes,
            handle,
        }
    }

    /// The absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        Url::parse(&format!("http://{}/{}", self.socket, path)).unwrap()
    }

    /// How many requests `path` has served so far.
    pub fn hits(&self, path: &str) -> usize {
        self.routes
            .get(path.trim_start_matches('/'))
            .map(|route| route.hits.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(Path(path): Path<String>, State(routes): State<Routes>) -> (StatusCode, Vec<u8>) {
    match routes.get(&path) {
        Some(route) => {
            route.hits.fetch_add(1, Ordering::SeqCst);
            let status =
                StatusCode::from_u16(route.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, route.body.clone())
        }
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}
