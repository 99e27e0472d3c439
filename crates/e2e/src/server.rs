//! Server management - booting or reusing the local application server

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::WebServerConfig;
use crate::error::{E2eError, E2eResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Handle to the application server for the duration of a run
pub struct WebServer {
    /// Spawned process, `None` when an already running server was reused
    child: Option<Child>,
    pub port: u16,
}

impl WebServer {
    /// Reuse a server already listening on the port, or spawn the command
    /// and wait until it is ready
    pub async fn start(config: &WebServerConfig) -> E2eResult<Self> {
        if port_accepts(config.port).await {
            if config.reuse_existing_server {
                info!("Reusing existing server on port {}", config.port);
                return Ok(Self {
                    child: None,
                    port: config.port,
                });
            }
            return Err(E2eError::PortInUse(config.port));
        }

        info!("Starting web server: {}", config.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&config.command);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {:?}: {}", config.command, e))
        })?;

        let mut server = Self {
            child: Some(child),
            port: config.port,
        };

        // Dropping `server` on error tears the process group down
        server.wait_until_ready(config).await?;

        info!("Server is ready on port {}", config.port);
        Ok(server)
    }

    /// Whether this handle owns a spawned process
    pub fn is_spawned(&self) -> bool {
        self.child.is_some()
    }

    async fn wait_until_ready(&mut self, config: &WebServerConfig) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < config.timeout {
            attempts += 1;

            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    self.child = None;
                    return Err(E2eError::ServerStartup(format!(
                        "{:?} exited early with {}",
                        config.command, status
                    )));
                }
            }

            let ready = match &config.url {
                Some(url) => match client.get(url.clone()).send().await {
                    Ok(resp) if resp.status().as_u16() < 404 => true,
                    Ok(resp) => {
                        debug!("Readiness check returned {}", resp.status());
                        false
                    }
                    Err(e) => {
                        // Connection refused is expected while the server boots
                        if !e.is_connect() {
                            warn!("Readiness check error: {}", e);
                        }
                        false
                    }
                },
                None => port_accepts(config.port).await,
            };
            if ready {
                return Ok(());
            }
            if attempts == 1 {
                info!("Waiting for server to start...");
            }

            sleep(POLL_INTERVAL).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Stop the spawned process group; a reused server is left alone
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        info!("Stopping server (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(child.id() as i32);
            if killpg(pgid, Signal::SIGTERM).is_ok() {
                let deadline = Instant::now() + Duration::from_millis(500);
                while Instant::now() < deadline {
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                // Children of the shell may still linger
                let _ = killpg(pgid, Signal::SIGKILL);
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Something accepts TCP connections on the port (IPv4 or IPv6 loopback)
pub async fn port_accepts(port: u16) -> bool {
    for addr in [
        SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
    ] {
        if let Ok(Ok(_)) = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            return true;
        }
    }
    false
}
