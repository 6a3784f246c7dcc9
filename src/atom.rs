//! Schedulable atoms and their dependency tracking.
//!
//! An atom is the unit of GPU work: a job-chain address, a fixed target
//! slot, a priority, and edges to the atoms that must complete first.
//! Atoms are handed around as `Rc<Atom>` handles shared between the
//! scheduler's queues; dependency edges and the connection back-reference
//! are weak, so dropping an atom from every queue tears it down without
//! cycles.
//!
//! Soft atoms are CPU-only semaphore operations. They share the `Atom`
//! type through the [`AtomKind`] tagged union rather than a subtype, so
//! the scheduler switches on the payload explicitly instead of
//! downcasting.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::connection::Connection;
use crate::semaphore::PlatformSemaphore;
use crate::types::{ResultCode, TimeNs};

/// CPU-side operation performed by a soft atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftOp {
    SemaphoreSet,
    SemaphoreReset,
    SemaphoreWait,
    SemaphoreWaitAndReset,
}

/// The payload of an atom.
pub enum AtomKind {
    /// Work dispatched to a hardware job slot. A zero address carries no
    /// work and resolves as soon as its dependencies do.
    Hardware,
    /// CPU-only semaphore operation; never dispatched to hardware.
    Soft {
        op: SoftOp,
        semaphore: Rc<PlatformSemaphore>,
    },
}

/// A dependency edge to a predecessor atom.
///
/// The edge is non-owning. The predecessor's terminal result is cached
/// here once observed, so it survives the predecessor being dropped from
/// the scheduler's bookkeeping.
pub struct AtomDependency {
    atom: Weak<Atom>,
    result: Cell<Option<ResultCode>>,
}

impl AtomDependency {
    pub fn new(atom: &Rc<Atom>) -> AtomDependency {
        AtomDependency {
            atom: Rc::downgrade(atom),
            result: Cell::new(None),
        }
    }
}

/// A schedulable unit of GPU work.
pub struct Atom {
    gpu_address: Cell<u64>,
    priority: i32,
    slot: u32,
    is_protected: bool,
    connection: Weak<Connection>,
    kind: AtomKind,
    dependencies: Vec<AtomDependency>,

    soft_stopped: Cell<bool>,
    hard_stopped: Cell<bool>,
    preempted: Cell<bool>,
    execution_start_time: Cell<TimeNs>,
    tick_start_time: Cell<TimeNs>,
    result: Cell<Option<ResultCode>>,
}

impl Atom {
    /// Create a hardware atom targeting `slot`.
    pub fn new(
        connection: &Rc<Connection>,
        gpu_address: u64,
        slot: u32,
        priority: i32,
        is_protected: bool,
        dependencies: Vec<AtomDependency>,
    ) -> Rc<Atom> {
        Rc::new(Atom {
            gpu_address: Cell::new(gpu_address),
            priority,
            slot,
            is_protected,
            connection: Rc::downgrade(connection),
            kind: AtomKind::Hardware,
            dependencies,
            soft_stopped: Cell::new(false),
            hard_stopped: Cell::new(false),
            preempted: Cell::new(false),
            execution_start_time: Cell::new(0),
            tick_start_time: Cell::new(0),
            result: Cell::new(None),
        })
    }

    /// Create a soft atom performing `op` on `semaphore`.
    pub fn new_soft(
        connection: &Rc<Connection>,
        op: SoftOp,
        semaphore: Rc<PlatformSemaphore>,
        priority: i32,
        dependencies: Vec<AtomDependency>,
    ) -> Rc<Atom> {
        Rc::new(Atom {
            gpu_address: Cell::new(0),
            priority,
            slot: 0,
            is_protected: false,
            connection: Rc::downgrade(connection),
            kind: AtomKind::Soft { op, semaphore },
            dependencies,
            soft_stopped: Cell::new(false),
            hard_stopped: Cell::new(false),
            preempted: Cell::new(false),
            execution_start_time: Cell::new(0),
            tick_start_time: Cell::new(0),
            result: Cell::new(None),
        })
    }

    pub fn gpu_address(&self) -> u64 {
        self.gpu_address.get()
    }

    /// Rewrite the job-chain address to a soft-stop tail for resumption.
    pub fn set_gpu_address(&self, address: u64) {
        self.gpu_address.set(address);
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn is_protected(&self) -> bool {
        self.is_protected
    }

    pub fn connection(&self) -> &Weak<Connection> {
        &self.connection
    }

    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    pub fn is_soft(&self) -> bool {
        matches!(self.kind, AtomKind::Soft { .. })
    }

    /// True when the atom carries no work, only synchronization edges.
    pub fn is_dependency_only(&self) -> bool {
        matches!(self.kind, AtomKind::Hardware) && self.gpu_address.get() == 0
    }

    pub fn soft_stopped(&self) -> bool {
        self.soft_stopped.get()
    }

    pub fn set_soft_stopped(&self, stopped: bool) {
        self.soft_stopped.set(stopped);
    }

    pub fn hard_stopped(&self) -> bool {
        self.hard_stopped.get()
    }

    /// Hard stops are terminal; the flag is never cleared.
    pub fn set_hard_stopped(&self) {
        self.hard_stopped.set(true);
    }

    pub fn preempted(&self) -> bool {
        self.preempted.get()
    }

    pub fn set_preempted(&self, preempted: bool) {
        self.preempted.set(preempted);
    }

    pub fn execution_start_time(&self) -> TimeNs {
        self.execution_start_time.get()
    }

    pub fn set_execution_started(&self, now: TimeNs) {
        self.execution_start_time.set(now);
    }

    pub fn tick_start_time(&self) -> TimeNs {
        self.tick_start_time.get()
    }

    pub fn set_tick_started(&self, now: TimeNs) {
        self.tick_start_time.set(now);
    }

    /// Terminal result, once the scheduler has reported the atom.
    pub fn result(&self) -> Option<ResultCode> {
        self.result.get()
    }

    pub(crate) fn set_result(&self, result: ResultCode) {
        debug_assert!(self.result.get().is_none(), "atom completed twice");
        self.result.set(Some(result));
    }

    /// Refresh the per-edge result caches. Returns true once every
    /// dependency has a cached terminal result.
    ///
    /// A predecessor that was dropped before completing can never resolve
    /// its edge; the atom stays pending until its connection is torn down.
    pub fn update_dependencies(&self) -> bool {
        let mut all_finished = true;
        for dep in &self.dependencies {
            if dep.result.get().is_some() {
                continue;
            }
            match dep.atom.upgrade() {
                Some(predecessor) => match predecessor.result() {
                    Some(code) => dep.result.set(Some(code)),
                    None => all_finished = false,
                },
                None => all_finished = false,
            }
        }
        all_finished
    }

    /// The first non-success dependency result in edge order, if any.
    pub fn final_dependency_result(&self) -> ResultCode {
        for dep in &self.dependencies {
            if let Some(code) = dep.result.get() {
                if !code.is_success() {
                    return code;
                }
            }
        }
        ResultCode::Success
    }
}
