//! Platform semaphore and async-wait port plumbing.
//!
//! Soft atoms operate on [`PlatformSemaphore`]s. A blocked wait is
//! externalized: the semaphore id is registered on the [`PlatformPort`]
//! and the embedder, after servicing the OS-level wait, calls back into
//! `JobScheduler::platform_port_signaled`. Registrations are explicit
//! records rather than captured callbacks, so a single-threaded event
//! loop can drain and service them deterministically.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A one-bit platform semaphore shared between clients and soft atoms.
pub struct PlatformSemaphore {
    id: u64,
    signaled: Cell<bool>,
}

impl PlatformSemaphore {
    /// Create an unsignaled semaphore. The id must be unique per port.
    pub fn new(id: u64) -> Rc<PlatformSemaphore> {
        Rc::new(PlatformSemaphore {
            id,
            signaled: Cell::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn signal(&self) {
        self.signaled.set(true);
    }

    pub fn reset(&self) {
        self.signaled.set(false);
    }

    /// Poll without consuming the signal.
    pub fn wait_no_reset(&self) -> bool {
        self.signaled.get()
    }

    /// Poll, consuming the signal on success.
    pub fn wait(&self) -> bool {
        let was_signaled = self.signaled.get();
        if was_signaled {
            self.signaled.set(false);
        }
        was_signaled
    }

    /// Register an asynchronous wait for this semaphore on `port`.
    pub fn wait_async(&self, port: &PlatformPort) {
        port.register(self.id);
    }
}

/// Pending asynchronous semaphore waits, recorded for the embedder.
///
/// The embedder drains the registrations, arms its real OS waits, and
/// reports wakes back through `JobScheduler::platform_port_signaled`.
#[derive(Default)]
pub struct PlatformPort {
    pending: RefCell<Vec<u64>>,
}

impl PlatformPort {
    pub fn new() -> PlatformPort {
        PlatformPort::default()
    }

    fn register(&self, id: u64) {
        self.pending.borrow_mut().push(id);
    }

    /// Take all semaphore ids registered since the last drain.
    pub fn drain_pending(&self) -> Vec<u64> {
        self.pending.borrow_mut().drain(..).collect()
    }
}
