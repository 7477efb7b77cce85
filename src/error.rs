use thiserror::Error;

/// Failure of a non-blocking scoped access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock is currently held in a mode that conflicts with the request.
    #[error("set lock is held in a conflicting mode")]
    WouldBlock,
}
