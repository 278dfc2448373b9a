//! WASI HTTP server entry point for the long-polling signaling relay
//!
//! This module provides the main entry point when running as a WASI HTTP component
//! using `wasmtime serve`.

use glimpse_server_wasm::{ServerConfig, ServerState, StateFile, handle_request};
use std::cell::RefCell;
use tracing_subscriber::EnvFilter;
use wstd::http::{Body, Request, Response};

/// Per-instance setup, done once
struct Runtime {
    state: ServerState,
    state_file: Option<StateFile>,
}

impl Runtime {
    fn init() -> Self {
        let config = load_config();
        tracing::info!(
            max_payload_bytes = config.max_payload_bytes,
            idle_timeout_secs = config.idle_timeout_secs,
            persist_state = config.persist_state,
            "signaling runtime initialized"
        );
        let state_file = config
            .persist_state
            .then(|| StateFile::new(&config.state_file));
        Self {
            state: ServerState::new(config),
            state_file,
        }
    }

    /// State to serve one request with
    fn request_state(&self) -> ServerState {
        match &self.state_file {
            Some(file) => ServerState::restore(self.state.config().clone(), file.load_or_default()),
            None => self.state.clone(),
        }
    }
}

// Thread-local state for the server (WASI is single-threaded)
thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

fn load_config() -> ServerConfig {
    match ServerConfig::load() {
        Ok(config) => {
            init_tracing(&config);
            config
        }
        Err(error) => {
            let config = ServerConfig::default();
            init_tracing(&config);
            tracing::warn!(%error, "invalid configuration, using defaults");
            config
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn prepare() -> (ServerState, Option<StateFile>) {
    RUNTIME.with(|runtime| {
        let mut runtime = runtime.borrow_mut();
        let runtime = runtime.get_or_insert_with(Runtime::init);
        (runtime.request_state(), runtime.state_file.clone())
    })
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let (state, state_file) = prepare();
    let response = handle_request(request, &state).await;
    if let Some(file) = state_file {
        if let Err(error) = file.save(&state.snapshot()) {
            tracing::warn!(path = %file.path().display(), %error, "failed to save state");
        }
    }
    response
}
