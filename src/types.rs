//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers prevent silent type confusion. Type aliases
//! for plain quantities (timestamps) provide self-documenting code without
//! the boilerplate of implementing arithmetic traits.

use std::fmt;

/// Client identifier, assigned by the embedding driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic time in nanoseconds.
pub type TimeNs = u64;

/// Outcome of an atom, as exchanged with the hardware layer.
///
/// The scheduler only distinguishes `SoftStopped` (resumable) from
/// everything else; the remaining variants are passed through to the
/// embedder unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// The atom ran to completion.
    Success,
    /// The atom was gracefully stopped and can resume from its tail
    /// address. Never a terminal outcome.
    SoftStopped,
    /// A semaphore wait exceeded its deadline.
    TimedOut,
    /// The atom was hard-stopped by hang recovery or teardown.
    Terminated,
    /// The hardware reported a fault while executing the atom.
    Fault,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}
