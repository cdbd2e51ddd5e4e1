//! Container runtime discovery for integration tests.
//!
//! testcontainers talks to the Docker API; when no Docker socket is up we
//! look for a Podman socket and point `DOCKER_HOST` at it. Tests that need a
//! container call `ensure_container_runtime` first and skip when it errors,
//! so a machine without any runtime still gets a green unit-test run.

use anyhow::{bail, Result};
use std::{
    env, fs,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a container runtime socket is available for testcontainers.
///
/// # Errors
/// Returns an error if no Docker/Podman socket can be found or configured.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return validate_docker_host(&docker_host);
    }

    let docker_socket = Path::new("/var/run/docker.sock");
    if wait_for_socket(docker_socket, SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. \
             Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    Err(
        "No container runtime socket found. Start the Docker daemon, start \
         `podman.socket`, or set `DOCKER_HOST`."
            .to_string(),
    )
}

fn validate_docker_host(docker_host: &str) -> Result<(), String> {
    let path = docker_host
        .strip_prefix("unix://")
        .or_else(|| docker_host.starts_with('/').then_some(docker_host));

    match path {
        Some(path) if wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) => Ok(()),
        // TCP endpoints are taken on faith; testcontainers will surface
        // connection errors itself.
        None => Ok(()),
        Some(_) => Err(format!(
            "`DOCKER_HOST` points to `{docker_host}`, but the socket is not \
             accepting connections. Start `podman.socket` or the Docker daemon."
        )),
    }
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    if let Some(uid) = read_uid() {
        candidates.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}

fn read_uid() -> Option<u32> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            let uid = rest.split_whitespace().next()?;
            return uid.parse::<u32>().ok();
        }
    }
    None
}
