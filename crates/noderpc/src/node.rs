//! Node status collaborator consulted by the dispatch table.

/// Read-only view of node conditions that restrict command execution.
pub trait NodeStatus: Send + Sync {
    /// Returns true while the node runs in safe mode.
    ///
    /// Commands whose descriptor disallows safe mode are refused while this
    /// reports true.
    fn in_safe_mode(&self) -> bool;
}

/// Status for a node that never enters safe mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalOperation;

impl NodeStatus for NormalOperation {
    fn in_safe_mode(&self) -> bool {
        false
    }
}
