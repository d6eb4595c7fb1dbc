//! Turn execution: the agent loop, per-user cancellation, and the
//! orchestrator facade that glues routing, policy, and persistence
//! together for one inbound message.

pub mod agent_loop;
pub mod cancel;
pub mod orchestrator;

pub use agent_loop::{AgentLoop, AgentLoopConfig, AgentRunResult, TranscriptEntry, TranscriptRole};
pub use cancel::CancelMap;
pub use orchestrator::{handle_message, Attachment, InboundMessage, OutboundReply};
