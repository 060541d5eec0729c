//! Skips wiremock-backed tests where localhost sockets cannot be bound.
//!
//! Set `STOCKPILE_REQUIRE_SOCKET_TESTS=1` to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "STOCKPILE_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
fn localhost_unavailable() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }
    let caller = Location::caller();
    let message = format!(
        "[socket-bound-test] {}:{} cannot bind a localhost socket",
        caller.file(),
        caller.line()
    );
    assert!(!sockets_required(), "{message}; {REQUIRE_ENV} is set");
    eprintln!("{message}; skipping");
    true
}

/// Starts a mock server, or returns `None` when the sandbox forbids sockets.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let skip = localhost_unavailable();
    async move {
        if skip {
            None
        } else {
            Some(MockServer::start().await)
        }
    }
}
