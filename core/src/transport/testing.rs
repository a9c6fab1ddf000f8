// In-memory connection used by unit tests

use super::abstraction::{ChannelControl, Connection, ConnectionId, Direction, TransportError, CHAT_CHANNEL};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ChannelState {
    pub open: HashSet<(String, Direction)>,
    pub open_requests: Vec<String>,
    pub sent: Vec<String>,
    pub close_requests: usize,
}

impl ChannelControl for ChannelState {
    fn has_channel(&self, kind: &str, direction: Direction) -> bool {
        self.open.contains(&(kind.to_string(), direction))
    }

    fn request_open_channel(&mut self, kind: &str) -> Result<(), TransportError> {
        self.open_requests.push(kind.to_string());
        self.open.insert((kind.to_string(), Direction::Outbound));
        Ok(())
    }

    fn send_chat_message(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.has_channel(CHAT_CHANNEL, Direction::Outbound) {
            return Err(TransportError::ChannelUnavailable(CHAT_CHANNEL.to_string()));
        }
        self.sent.push(text.to_string());
        Ok(())
    }
}

/// Connection that records every request made through it
#[derive(Debug)]
pub struct RecordingConnection {
    id: ConnectionId,
    state: Mutex<ChannelState>,
}

impl RecordingConnection {
    pub fn new(id: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(ChannelState::default()),
        })
    }

    pub fn open_requests(&self) -> usize {
        self.state.lock().open_requests.len()
    }

    pub fn close_requests(&self) -> usize {
        self.state.lock().close_requests
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn execute(
        &self,
        task: &mut dyn FnMut(&mut dyn ChannelControl) -> Result<(), TransportError>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        task(&mut *state)
    }

    fn close(&self) {
        self.state.lock().close_requests += 1;
    }
}

pub fn connection(id: ConnectionId) -> (Arc<RecordingConnection>, Arc<dyn Connection>) {
    let recording = RecordingConnection::new(id);
    let handle: Arc<dyn Connection> = recording.clone();
    (recording, handle)
}
