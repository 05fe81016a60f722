use std::time::Duration;

/// Durability applied to each committed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Durability {
    /// Commits reach the OS page cache but are not fsynced individually.
    /// A power loss can drop the most recent commits; the database itself
    /// stays consistent.
    Eventual,
    /// Every commit is fsynced before returning (safest, slowest).
    Immediate,
}

impl Default for Durability {
    fn default() -> Self {
        Self::Immediate
    }
}

/// Configuration for opening a durable engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bounded wait for the engine's exclusive file lock. Opening a path
    /// that another handle holds open fails with
    /// [`EngineError::Locked`](crate::EngineError::Locked) once this much
    /// time has elapsed, rather than hanging.
    pub lock_timeout: Duration,
    /// Durability applied to write transactions.
    pub durability: Durability,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(50),
            durability: Durability::default(),
        }
    }
}
