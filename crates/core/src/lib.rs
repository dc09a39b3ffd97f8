pub mod config;
pub mod domain;
pub mod errors;
pub mod guardrails;

pub use domain::conversation::{ConversationTurn, Part, Role};
pub use domain::tool::{error_payload, Artifact, ToolCallRequest, ToolDeclaration, ToolOutput};
pub use errors::{ApplicationError, InterfaceError};
pub use guardrails::{GuardrailViolation, Guardrails, SecretSet, ToolAllowlist};
