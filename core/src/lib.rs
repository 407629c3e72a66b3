// Agentkit Core Library
// Action-plan router, tools, streaming bus and run orchestration

pub mod agent;
pub mod bus;
pub mod error;
pub mod memory;
pub mod ports;
pub mod router;
pub mod tokens;
pub mod tools;

pub use agent::{Agent, AgentRun};
pub use bus::{EventSink, EventStream};
pub use error::{AgentError, Result};
pub use router::{ActionPlanRouter, PlanCursor, RouterInput, RouterState};
pub use tools::{RunContext, Tool, ToolError, ToolOutput, ToolRegistry, ToolServices, Toolset};
