//! Tor control-port client
//!
//! Just enough of the control protocol to authenticate and read runtime
//! information: `AUTHENTICATE` and `GETINFO`. Replies are line based; each
//! line carries a three-digit status and a separator (`-` for a mid-reply
//! line, `+` for a data block, space for the final line).

use crate::config::ControlKind;
use crate::error::{BotError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// `GETINFO` key listing the active SOCKS listeners
pub const SOCKS_LISTENERS_KEY: &str = "net/listeners/socks";

const STATUS_OK: u16 = 250;

/// Byte stream a control connection can run over
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ControlStream for T {}

/// A parsed control-port reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    fn describe(&self) -> String {
        format!("{} {}", self.status, self.lines.join(" | "))
    }
}

pub struct ControlClient<S> {
    stream: BufReader<S>,
}

impl ControlClient<Box<dyn ControlStream>> {
    /// Open a control connection to `address` over `kind`
    pub async fn connect(kind: ControlKind, address: &str) -> Result<Self> {
        debug!("Connecting to control port {} ({})", address, kind);
        let stream: Box<dyn ControlStream> = match kind {
            ControlKind::Tcp4 => Box::new(TcpStream::connect(address).await.map_err(|e| {
                BotError::Control(format!("could not reach control port {}: {}", address, e))
            })?),
            #[cfg(unix)]
            ControlKind::Unix => Box::new(tokio::net::UnixStream::connect(address).await.map_err(
                |e| BotError::Control(format!("could not reach control socket {}: {}", address, e)),
            )?),
            #[cfg(not(unix))]
            ControlKind::Unix => {
                return Err(BotError::Config(
                    "unix control sockets are not supported on this platform".to_string(),
                ))
            }
        };
        Ok(Self::new(stream))
    }
}

impl<S: ControlStream> ControlClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Authenticate with the plaintext control password
    pub async fn authenticate(&mut self, password: &str) -> Result<()> {
        let reply = self
            .command(&format!("AUTHENTICATE {}", quote(password)))
            .await?;
        if !reply.is_ok() {
            return Err(BotError::Control(format!(
                "authentication rejected: {}",
                reply.describe()
            )));
        }
        debug!("Authenticated to control port");
        Ok(())
    }

    /// Fetch a single `GETINFO` value
    pub async fn get_info(&mut self, key: &str) -> Result<String> {
        let reply = self.command(&format!("GETINFO {}", key)).await?;
        if !reply.is_ok() {
            return Err(BotError::Control(format!(
                "GETINFO {} failed: {}",
                key,
                reply.describe()
            )));
        }

        // Every line but the final "OK" is data.
        let data = &reply.lines[..reply.lines.len().saturating_sub(1)];
        let [line] = data else {
            return Err(BotError::Control(format!(
                "expected one value for {}, got {}",
                key,
                data.len()
            )));
        };

        let (found, value) = line.split_once('=').ok_or_else(|| {
            BotError::Control(format!("malformed GETINFO reply: {}", line))
        })?;
        if found != key {
            return Err(BotError::Control(format!(
                "GETINFO asked for {} but got {}",
                key, found
            )));
        }
        Ok(value.to_string())
    }

    /// Address of the daemon's single SOCKS listener
    pub async fn socks_listener(&mut self) -> Result<String> {
        let value = self.get_info(SOCKS_LISTENERS_KEY).await?;
        let listeners: Vec<&str> = value
            .split_whitespace()
            .map(|l| l.trim_matches('"'))
            .filter(|l| !l.is_empty())
            .collect();

        match listeners.as_slice() {
            [only] => Ok(only.to_string()),
            _ => Err(BotError::Control(format!(
                "expected exactly one SOCKS listener, got {:?}",
                value
            ))),
        }
    }

    /// Send one command and read its full reply
    pub async fn command(&mut self, command: &str) -> Result<Reply> {
        let stream = self.stream.get_mut();
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.len() < 4 || !line.is_char_boundary(3) {
                return Err(BotError::Control(format!("malformed reply line: {:?}", line)));
            }
            let status: u16 = line[..3]
                .parse()
                .map_err(|_| BotError::Control(format!("malformed status in {:?}", line)))?;
            let text = line.get(4..).unwrap_or("").to_string();

            match line.as_bytes()[3] {
                b'-' => lines.push(text),
                b' ' => {
                    lines.push(text);
                    return Ok(Reply { status, lines });
                }
                b'+' => {
                    // Data block runs until a lone ".".
                    let mut block = text;
                    loop {
                        let data = self.read_line().await?;
                        if data == "." {
                            break;
                        }
                        block.push('\n');
                        block.push_str(data.strip_prefix('.').unwrap_or(&data));
                    }
                    lines.push(block);
                }
                _ => {
                    return Err(BotError::Control(format!("malformed reply line: {:?}", line)));
                }
            }
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(BotError::Control("control connection closed".to_string()));
        }
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }
}

/// Quote a string for use as a control-protocol argument
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
