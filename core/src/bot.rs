// OnionBot: the embedding surface
//
// Ties the Tor daemon, the transport library and the session layer
// together. The transport library is attached after Tor is reachable since
// it needs the SOCKS proxy address to dial out; it reports back through
// `events()`.

use crate::config::TorConfig;
use crate::error::{BotError, Result};
use crate::peer::{Peer, SessionState};
use crate::session::{BotHandler, CallbackDispatcher, SessionOrchestrator};
use crate::tor::{self, ManagedDaemon, TransportBootstrapState};
use crate::transport::{Transport, TransportEvents};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub struct OnionBot {
    config: TorConfig,
    sessions: Arc<SessionOrchestrator>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    bootstrap: RwLock<Option<TransportBootstrapState>>,
}

impl OnionBot {
    /// Create a bot whose callbacks run on the current tokio runtime
    pub fn new(config: TorConfig, handler: Arc<dyn BotHandler>) -> Result<Self> {
        Ok(Self::with_dispatcher(
            config,
            handler,
            CallbackDispatcher::current()?,
        ))
    }

    pub fn with_dispatcher(
        config: TorConfig,
        handler: Arc<dyn BotHandler>,
        dispatcher: CallbackDispatcher,
    ) -> Self {
        Self {
            config,
            sessions: Arc::new(SessionOrchestrator::new(handler, dispatcher)),
            transport: RwLock::new(None),
            bootstrap: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &TorConfig {
        &self.config
    }

    /// Make Tor reachable, launching a private daemon unless an external
    /// one is configured. Keep the returned handle alive for as long as the
    /// bot runs.
    pub async fn prepare_tor(&self) -> Result<ManagedDaemon> {
        let daemon = tor::prepare(&self.config).await?;
        info!(
            "Tor ready: control {}, SOCKS {}",
            daemon.state().control_address,
            daemon.state().proxy_address
        );
        *self.bootstrap.write() = Some(daemon.state().clone());
        Ok(daemon)
    }

    /// Endpoints recorded by the last `prepare_tor`
    pub fn bootstrap_state(&self) -> Option<TransportBootstrapState> {
        self.bootstrap.read().clone()
    }

    /// Install the transport used for outbound connections
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    /// Event sink to hand to the transport library
    pub fn events(&self) -> Arc<dyn TransportEvents> {
        Arc::clone(&self.sessions) as Arc<dyn TransportEvents>
    }

    pub fn sessions(&self) -> &Arc<SessionOrchestrator> {
        &self.sessions
    }

    pub async fn connect(&self, identity: &str) -> Result<Arc<Peer>> {
        let transport = self
            .transport
            .read()
            .clone()
            .ok_or_else(|| BotError::Config("no transport attached".to_string()))?;
        self.sessions.connect(transport.as_ref(), identity).await
    }

    pub fn send_message(&self, identity: &str, text: &str) -> Result<()> {
        self.sessions.send_message(identity, text)
    }

    pub fn disconnect(&self, identity: &str) -> usize {
        self.sessions.disconnect(identity)
    }

    pub fn state_of(&self, identity: &str) -> SessionState {
        self.sessions.state_of(identity)
    }

    /// Identities with at least one live session
    pub fn peers(&self) -> BTreeSet<String> {
        self.sessions.registry().identities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::session::NoopHandler;
    use crate::transport::{testing, MockTransport};

    fn bot() -> OnionBot {
        OnionBot::with_dispatcher(
            TorConfig::default(),
            Arc::new(NoopHandler),
            CallbackDispatcher::inline(),
        )
    }

    #[tokio::test]
    async fn test_connect_without_transport() {
        let bot = bot();
        let result = bot.connect("abcdefghijklmnop").await;
        assert!(matches!(result, Err(BotError::Config(_))));
        assert!(bot.peers().is_empty());
    }

    #[tokio::test]
    async fn test_connect_send_disconnect() {
        let bot = bot();
        let (recording, conn) = testing::connection(7);

        let mut transport = MockTransport::new();
        transport
            .expect_open_connection()
            .times(1)
            .returning(move |_, _| Ok(conn.clone()));
        bot.attach_transport(Arc::new(transport));

        let peer = bot.connect("abcdefghijklmnop").await.unwrap();
        assert_eq!(peer.connection_id(), 7);
        assert_eq!(recording.open_requests(), 1);
        assert!(bot.peers().contains("abcdefghijklmnop"));

        bot.send_message("abcdefghijklmnop", "hello").unwrap();
        assert_eq!(recording.sent(), vec!["hello".to_string()]);

        assert_eq!(bot.disconnect("abcdefghijklmnop"), 1);
        assert_eq!(recording.close_requests(), 1);
        assert_eq!(bot.state_of("abcdefghijklmnop"), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_events_drive_registry() {
        let bot = bot();
        let (_recording, conn) = testing::connection(3);

        bot.events().connection_authenticated(conn, "qrstuvwxyz234567", false);
        assert_eq!(bot.state_of("qrstuvwxyz234567"), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_prepare_tor_records_external_state() {
        let config = TorConfig {
            control: Some(ControlConfig {
                password: "pw".to_string(),
                ..ControlConfig::default()
            }),
            proxy_address: Some("127.0.0.1:9050".to_string()),
            ..TorConfig::default()
        };
        let bot = OnionBot::new(config, Arc::new(NoopHandler)).unwrap();
        assert!(bot.bootstrap_state().is_none());

        let daemon = bot.prepare_tor().await.unwrap();
        let state = bot.bootstrap_state().unwrap();
        assert_eq!(state.control_address, "127.0.0.1:9051");
        assert_eq!(state.proxy_address, "127.0.0.1:9050");
        daemon.shutdown().await.unwrap();
    }
}
