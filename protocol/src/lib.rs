// Agentkit Protocol
// Types exchanged between clients, the router and tools

pub mod feedback;
pub mod message;
pub mod streaming;
pub mod tool_input;

pub use feedback::{ExecutionResult, Feedback, SqlExecutionResponse};
pub use message::{ChatMessage, ChatQuery, ChatRole, UserSettings};
pub use streaming::{Metadata, StreamingData, StreamingDataType, StreamingSignal};
pub use tool_input::{IntermediateSteps, ToolInput, render_value};
