// Session layer: peer lifecycle events and contact decisions

pub mod contact;
pub mod dispatch;
pub mod handler;
pub mod orchestrator;

pub use contact::ContactDecisionGate;
pub use dispatch::CallbackDispatcher;
pub use handler::{BotHandler, ChatMessage, NoopHandler};
pub use orchestrator::SessionOrchestrator;
