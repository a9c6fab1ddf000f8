//! Tor daemon bootstrap
//!
//! Launches Tor with a throwaway config, waits for it to write its control
//! port to a marker file, authenticates and discovers the SOCKS listener.
//!
//! The marker file is polled, never watched: Tor offers no notification for
//! it. There is no deadline, and a daemon that exits before writing the
//! marker is not detected; the wait simply continues.

use super::control::ControlClient;
use super::password::{hashed_password, random_password};
use crate::config::{ControlKind, TorConfig};
use crate::error::{BotError, Result};
use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Config file handed to Tor as both defaults and main torrc
pub const TORRC_FILE: &str = "empty-torrc";

/// Marker file Tor writes its control address to
pub const CONTROL_PORT_FILE: &str = "control-port";

const TORRC_CONTENTS: &str = "Log notice stdout";
const CONTROL_PORT_PREFIX: &str = "PORT=";

/// Everything later connection attempts need to reach the daemon
#[derive(Clone, PartialEq, Eq)]
pub struct TransportBootstrapState {
    pub control_address: String,
    pub control_kind: ControlKind,
    pub control_password: Zeroizing<String>,
    pub proxy_address: String,
}

impl fmt::Debug for TransportBootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBootstrapState")
            .field("control_address", &self.control_address)
            .field("control_kind", &self.control_kind)
            .field("control_password", &"<redacted>")
            .field("proxy_address", &self.proxy_address)
            .finish()
    }
}

/// A reachable Tor daemon, owned by us or not
pub struct ManagedDaemon {
    state: TransportBootstrapState,
    child: Option<Child>,
}

impl ManagedDaemon {
    pub fn state(&self) -> &TransportBootstrapState {
        &self.state
    }

    /// Whether this process launched the daemon
    pub fn is_managed(&self) -> bool {
        self.child.is_some()
    }

    /// Stop a daemon we launched. External daemons are left alone.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            info!("Stopping Tor (pid {:?})", child.id());
            child.start_kill()?;
            child.wait().await?;
        }
        Ok(())
    }
}

/// Make Tor reachable according to `config`: attach to the configured
/// external daemon, or launch one.
pub async fn prepare(config: &TorConfig) -> Result<ManagedDaemon> {
    config.validate()?;
    match &config.control {
        Some(control) => {
            info!("Using external Tor at {} ({})", control.address, control.kind);
            let proxy_address = match &config.proxy_address {
                Some(proxy) => proxy.clone(),
                None => {
                    let mut client = ControlClient::connect(control.kind, &control.address).await?;
                    client.authenticate(&control.password).await?;
                    client.socks_listener().await?
                }
            };
            Ok(ManagedDaemon {
                state: TransportBootstrapState {
                    control_address: control.address.clone(),
                    control_kind: control.kind,
                    control_password: Zeroizing::new(control.password.clone()),
                    proxy_address,
                },
                child: None,
            })
        }
        None => bootstrap(config).await,
    }
}

/// Launch a private Tor daemon in `config.data_dir`
pub async fn bootstrap(config: &TorConfig) -> Result<ManagedDaemon> {
    config.validate()?;
    let data_dir = config.data_dir.as_path();
    tokio::fs::create_dir_all(data_dir).await?;

    let torrc = data_dir.join(TORRC_FILE);
    tokio::fs::write(&torrc, TORRC_CONTENTS).await?;

    let password = random_password();
    let hashed = hashed_password(&password);

    let marker = data_dir.join(CONTROL_PORT_FILE);
    remove_stale_marker(&marker).await?;

    let args = daemon_args(data_dir, &torrc, &marker, &hashed, std::process::id());
    info!("Starting {}", config.tor_binary.display());
    let mut child = Command::new(&config.tor_binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            BotError::Bootstrap(format!(
                "could not launch {}: {}",
                config.tor_binary.display(),
                e
            ))
        })?;

    if let Some(stdout) = child.stdout.take() {
        forward_output(stdout, "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(stderr, "stderr");
    }

    let contents = wait_for_marker(&marker, config).await?;
    let control_address = parse_control_port(&contents)?;
    info!("Tor control port at {}", control_address);

    let mut client = ControlClient::connect(ControlKind::Tcp4, &control_address)
        .await
        .map_err(|e| BotError::Bootstrap(e.to_string()))?;
    client
        .authenticate(&password)
        .await
        .map_err(|e| BotError::Bootstrap(format!("control authentication failed: {}", e)))?;

    let proxy_address = match &config.proxy_address {
        Some(proxy) => proxy.clone(),
        None => client
            .socks_listener()
            .await
            .map_err(|e| BotError::Bootstrap(format!("SOCKS discovery failed: {}", e)))?,
    };
    info!("Tor SOCKS proxy at {}", proxy_address);

    Ok(ManagedDaemon {
        state: TransportBootstrapState {
            control_address,
            control_kind: ControlKind::Tcp4,
            control_password: password,
            proxy_address,
        },
        child: Some(child),
    })
}

/// Command-line arguments for the managed daemon
pub fn daemon_args(
    data_dir: &Path,
    torrc: &Path,
    marker: &Path,
    hashed_password: &str,
    owner_pid: u32,
) -> Vec<OsString> {
    vec![
        "--defaults-torrc".into(),
        torrc.into(),
        "-f".into(),
        torrc.into(),
        "DataDirectory".into(),
        data_dir.into(),
        "SocksPort".into(),
        "auto".into(),
        "ControlPort".into(),
        "auto".into(),
        "ControlPortWriteToFile".into(),
        marker.into(),
        "HashedControlPassword".into(),
        hashed_password.into(),
        // Tor exits when the owning process goes away.
        "__OwningControllerProcess".into(),
        owner_pid.to_string().into(),
        "AvoidDiskWrites".into(),
        "1".into(),
        "Log".into(),
        "notice stdout".into(),
    ]
}

/// Parse the marker file written through `ControlPortWriteToFile`
pub fn parse_control_port(contents: &str) -> Result<String> {
    let line = contents.trim_end_matches(&['\r', '\n'][..]);
    match line.strip_prefix(CONTROL_PORT_PREFIX) {
        Some(address) if !address.is_empty() => Ok(address.to_string()),
        _ => Err(BotError::Bootstrap(format!(
            "can't understand tor control port: {:?}",
            line
        ))),
    }
}

async fn remove_stale_marker(marker: &Path) -> Result<()> {
    match tokio::fs::remove_file(marker).await {
        Ok(()) => {
            debug!("Removed stale {}", marker.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn wait_for_marker(marker: &Path, config: &TorConfig) -> Result<String> {
    let interval = config.poll_interval();
    loop {
        match tokio::fs::read_to_string(marker).await {
            // An empty file means Tor has not finished writing it.
            Ok(contents) if !contents.trim().is_empty() => return Ok(contents),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Waiting for {}", marker.display());
        tokio::time::sleep(interval).await;
    }
}

fn forward_output<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "tor", stream = name, "{}", line);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_control_port() {
        assert_eq!(
            parse_control_port("PORT=127.0.0.1:39051\n").unwrap(),
            "127.0.0.1:39051"
        );
        assert_eq!(parse_control_port("PORT=127.0.0.1:1").unwrap(), "127.0.0.1:1");
    }

    #[test]
    fn test_parse_control_port_rejects_garbage() {
        assert!(parse_control_port("UNIX_PORT=/run/tor/control\n").is_err());
        assert!(parse_control_port("PORT=\n").is_err());
        assert!(parse_control_port("").is_err());
    }

    #[test]
    fn test_daemon_args_contain_required_options() {
        let dir = Path::new("/tmp/bot");
        let args = daemon_args(
            dir,
            &dir.join(TORRC_FILE),
            &dir.join(CONTROL_PORT_FILE),
            "16:ABC",
            4242,
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let value_of = |key: &str| {
            args.iter()
                .position(|a| a == key)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        assert_eq!(value_of("DataDirectory").as_deref(), Some("/tmp/bot"));
        assert_eq!(value_of("SocksPort").as_deref(), Some("auto"));
        assert_eq!(value_of("ControlPort").as_deref(), Some("auto"));
        assert_eq!(
            value_of("ControlPortWriteToFile").as_deref(),
            Some("/tmp/bot/control-port")
        );
        assert_eq!(value_of("HashedControlPassword").as_deref(), Some("16:ABC"));
        assert_eq!(value_of("__OwningControllerProcess").as_deref(), Some("4242"));
        assert_eq!(value_of("AvoidDiskWrites").as_deref(), Some("1"));
        assert_eq!(value_of("Log").as_deref(), Some("notice stdout"));
    }

    #[tokio::test]
    async fn test_remove_stale_marker_missing_is_ok() {
        let dir = tempdir().unwrap();
        remove_stale_marker(&dir.path().join(CONTROL_PORT_FILE))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_stale_marker_deletes_file() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join(CONTROL_PORT_FILE);
        std::fs::write(&marker, "PORT=127.0.0.1:1\n").unwrap();

        remove_stale_marker(&marker).await.unwrap();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_remove_stale_marker_propagates_other_errors() {
        let dir = tempdir().unwrap();
        // A directory in the marker's place cannot be removed with remove_file.
        let marker = dir.path().join(CONTROL_PORT_FILE);
        std::fs::create_dir(&marker).unwrap();

        assert!(remove_stale_marker(&marker).await.is_err());
    }

    #[tokio::test]
    async fn test_launch_failure_is_bootstrap_error() {
        let dir = tempdir().unwrap();
        let config = TorConfig {
            data_dir: dir.path().to_path_buf(),
            tor_binary: dir.path().join("no-such-tor"),
            ..TorConfig::default()
        };

        let result = bootstrap(&config).await;
        assert!(matches!(result, Err(BotError::Bootstrap(_))));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(TORRC_FILE)).unwrap(),
            "Log notice stdout"
        );
    }

    #[tokio::test]
    async fn test_prepare_external_with_proxy_override_skips_control() {
        let config = TorConfig {
            control: Some(crate::config::ControlConfig {
                address: "127.0.0.1:1".to_string(),
                kind: ControlKind::Tcp4,
                password: "pw".to_string(),
            }),
            proxy_address: Some("127.0.0.1:9050".to_string()),
            ..TorConfig::default()
        };

        let daemon = prepare(&config).await.unwrap();
        assert!(!daemon.is_managed());
        assert_eq!(daemon.state().proxy_address, "127.0.0.1:9050");
        assert_eq!(*daemon.state().control_password, "pw");
        daemon.shutdown().await.unwrap();
    }
}
