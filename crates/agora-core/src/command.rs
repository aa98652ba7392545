//! Command abstractions.

use uuid::Uuid;

/// Trait implemented by every engine entry point's input.
///
/// Each invocation is independent and reconstructs its state from the
/// store; the correlation ID is what ties its log lines together.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;
}
