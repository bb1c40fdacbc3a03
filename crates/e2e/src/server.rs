//! Fixture server management - spawning and health checking the static
//! server that hosts the demo pages

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::wait::{wait_for, WaitOptions};

const HEALTH_POLL_INTERVAL_MS: u64 = 100;

/// Result of one health check against a starting server
enum Health {
    Starting,
    Ready,
    Exited(ExitStatus),
}

/// Handle to a running fixture server process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the vizcheck-fixtures server
    pub async fn spawn(config: &ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning fixture server on port {}", port);

        let mut cmd = Command::new(&config.binary_path);
        cmd.env("VIZCHECK_FIXTURES_ADDR", format!("127.0.0.1:{}", port))
            .env("VIZCHECK_FIXTURES_ROOT", &config.root_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let mut handle = ServerHandle {
            child,
            base_url: base_url.clone(),
            port,
        };

        if let Err(e) = handle.wait_for_healthy(config.startup_timeout_ms).await {
            let _ = handle.stop();
            return Err(e);
        }

        info!("Fixture server is healthy at {}", base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&mut self, timeout_ms: u64) -> E2eResult<()> {
        let health_url = format!("{}/health", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        let child = &mut self.child;

        info!("Waiting for fixture server to start...");
        let outcome = wait_for(
            &WaitOptions::new(timeout_ms, HEALTH_POLL_INTERVAL_MS),
            || {
                let exited = child.try_wait().ok().flatten();
                let request = client.get(&health_url).send();
                async move {
                    if let Some(status) = exited {
                        return Ok(Health::Exited(status));
                    }
                    match request.await {
                        Ok(resp) if resp.status().is_success() => Ok(Health::Ready),
                        Ok(resp) => {
                            warn!("Health check returned {}", resp.status());
                            Ok(Health::Starting)
                        }
                        Err(e) => {
                            // Connection refused is expected while the server binds
                            if !e.is_connect() {
                                warn!("Health check error: {}", e);
                            }
                            Ok(Health::Starting)
                        }
                    }
                }
            },
            |health| !matches!(health, Health::Starting),
        )
        .await;

        match outcome.last_observed {
            Some(Health::Ready) => Ok(()),
            Some(Health::Exited(status)) => Err(E2eError::ServerStartup(format!(
                "fixture server exited early: {}",
                status
            ))),
            _ => Err(E2eError::ServerHealthCheck(outcome.polls as usize)),
        }
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        info!("Stopping fixture server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the fixture server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Spawn the server before running specs. When false the runner uses
    /// `RunnerConfig::base_url` as-is.
    pub enabled: bool,

    /// Path to the vizcheck-fixtures binary
    pub binary_path: PathBuf,

    /// Directory containing the demo pages
    pub root_dir: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    pub startup_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary_path: PathBuf::from("target/debug/vizcheck-fixtures"),
            root_dir: PathBuf::from("demos"),
            port: None,
            startup_timeout_ms: 30_000,
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_startup() {
        let config = ServerConfig {
            binary_path: PathBuf::from("/nonexistent/vizcheck-fixtures"),
            startup_timeout_ms: 500,
            ..Default::default()
        };
        assert!(matches!(
            ServerHandle::spawn(&config).await,
            Err(E2eError::ServerStartup(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_exiting_during_startup_is_reported() {
        let config = ServerConfig {
            binary_path: PathBuf::from("true"),
            startup_timeout_ms: 10_000,
            ..Default::default()
        };
        match ServerHandle::spawn(&config).await {
            Err(E2eError::ServerStartup(message)) => assert!(message.contains("exited early")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("server should not have started"),
        }
    }
}
