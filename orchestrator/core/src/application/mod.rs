// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_orchestrator;
pub mod dispatcher;
mod in_flight;
pub mod processor_orchestrator;

// Re-export use cases for convenience
pub use agent_orchestrator::{AgentOrchestrator, AlertAnalyzer, OrchestratorStats};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherStats};
pub use processor_orchestrator::ProcessorOrchestrator;
