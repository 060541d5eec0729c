//! Shared helpers for integration tests: a mock npm registry and config files.

#![allow(dead_code)]

#[path = "../../src/test_support/socket_guard.rs"]
pub mod socket_guard;

use std::path::{Path, PathBuf};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tarball body served for `name@version`.
pub fn tarball_body(name: &str, version: &str) -> Vec<u8> {
    format!("tarball:{name}@{version}").into_bytes()
}

/// Mounts a packument for `name` whose versions each depend on `deps`.
pub async fn mount_package(server: &MockServer, name: &str, versions: &[&str], deps: &[&str]) {
    packument_mock(server, name, versions, deps).mount(server).await;
}

/// Like [`mount_package`], but the packument must be fetched exactly `expected` times.
pub async fn mount_package_expecting(
    server: &MockServer,
    name: &str,
    versions: &[&str],
    deps: &[&str],
    expected: u64,
) {
    packument_mock(server, name, versions, deps)
        .expect(expected)
        .mount(server)
        .await;
}

fn packument_mock(server: &MockServer, name: &str, versions: &[&str], deps: &[&str]) -> Mock {
    let mut entries = serde_json::Map::new();
    let mut time = serde_json::Map::new();
    let dependencies: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|dep| ((*dep).to_string(), serde_json::json!("^1.0.0")))
        .collect();
    for version in versions {
        entries.insert(
            (*version).to_string(),
            serde_json::json!({
                "name": name,
                "version": version,
                "dependencies": dependencies.clone(),
                "dist": {
                    "tarball": format!("{}/{name}/-/{name}-{version}.tgz", server.uri())
                }
            }),
        );
        time.insert(
            (*version).to_string(),
            serde_json::json!("2020-01-15T10:00:00.000Z"),
        );
    }

    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": name,
            "versions": entries,
            "time": time,
        })))
}

/// Mounts the tarball for `name@version`, expecting exactly `expected` fetches.
pub async fn mount_tarball(server: &MockServer, name: &str, version: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}/-/{name}-{version}.tgz")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball_body(name, version)))
        .expect(expected)
        .mount(server)
        .await;
}

/// Makes `name` unknown to the registry.
pub async fn mount_missing(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

/// Writes `npm.txt` and `config.json` for one npm channel into `root`.
///
/// `filters` is the JSON body of the top-level `filters` object.
pub fn write_npm_config(root: &Path, registry: &str, seeds: &[&str], filters: &str) -> PathBuf {
    std::fs::write(root.join("npm.txt"), seeds.join("\n")).unwrap();
    let groups = if filters.is_empty() {
        "[]".to_string()
    } else {
        r#"["policy"]"#.to_string()
    };
    let filters = if filters.is_empty() {
        "{}".to_string()
    } else {
        format!(r#"{{ "policy": {filters} }}"#)
    };
    let config = format!(
        r#"{{
            "db_path": "db",
            "filters": {filters},
            "channels": [{{
                "id": "npm",
                "type": "npm",
                "input": "npm.txt",
                "filters": {groups},
                "max_concurrency": 2,
                "output": {{ "full": "mirror", "delta": "delta" }},
                "options": {{ "registry": "{registry}/" }}
            }}]
        }}"#
    );
    let path = root.join("config.json");
    std::fs::write(&path, config).unwrap();
    path
}

/// Lists the per-run directories under a delta root.
pub fn delta_runs(delta_root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(delta_root) else {
        return Vec::new();
    };
    let mut runs: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    runs.sort();
    runs
}
