//! Operator prompts

use crate::errors::ReplicaResult;

/// Questions asked of the operator during preflight
///
/// Implementations return `ReplicaError::Interrupted` when the operator
/// interrupts input.
pub trait Prompter {
    /// Read a secret without echo; `None` when nothing was entered.
    fn read_password(&self, label: &str) -> ReplicaResult<Option<String>>;

    /// Yes/no question.
    fn confirm(&self, question: &str, default: bool) -> ReplicaResult<bool>;
}

/// Prompter for unattended runs: no secret, default answer to everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl Prompter for Unattended {
    fn read_password(&self, _label: &str) -> ReplicaResult<Option<String>> {
        Ok(None)
    }

    fn confirm(&self, _question: &str, default: bool) -> ReplicaResult<bool> {
        Ok(default)
    }
}
