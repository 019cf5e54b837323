pub mod hooks;
pub mod orchestrator;
