//! gpu_jobsched - priority-preemptive GPU job scheduler.
//!
//! Accepts units of GPU work ("atoms") with dependency edges and
//! priorities, assigns them to a fixed number of hardware job slots, and
//! keeps the GPU busy while enforcing the scheduling invariants: an atom
//! never runs before its dependencies complete, higher-priority work
//! preempts lower-priority work from the same connection without starving
//! other connections, and switches between protected and normal execution
//! happen only once every slot has drained. Hung hardware is recovered
//! through tick- and timeout-driven soft-stop/hard-stop escalation.
//!
//! # Architecture
//!
//! - **Atoms**: schedulable units with a fixed slot, priority, and weak
//!   dependency edges; soft atoms perform CPU-side semaphore operations
//! - **Scheduler**: the pass-structured state machine moving atoms from
//!   pending through runnable to executing
//! - **Owner**: the injected seam to the hardware and surrounding driver;
//!   all run/stop requests go out through it and completions come back in
//! - **Watchdog**: a single re-armed deadline computed across every atom
//!   in flight
//!
//! The scheduler is single-threaded and never blocks: asynchronous waits
//! (hardware completion, semaphore signal, timer) are externalized to the
//! embedder, which marshals its callbacks onto one scheduling context.
//!
//! # Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use gpu_jobsched::{
//!     Atom, ClientId, Connection, JobScheduler, Owner, PlatformPort, ResultCode,
//! };
//!
//! struct NullOwner {
//!     port: PlatformPort,
//!     protected_mode: bool,
//! }
//!
//! impl Owner for NullOwner {
//!     fn run_atom(&mut self, _atom: &Rc<Atom>) {}
//!     fn soft_stop_atom(&mut self, _atom: &Rc<Atom>) {}
//!     fn hard_stop_atom(&mut self, _atom: &Rc<Atom>) {}
//!     fn atom_completed(&mut self, _atom: &Rc<Atom>, _result: ResultCode) {}
//!     fn release_mappings_for_atom(&mut self, _atom: &Rc<Atom>) {}
//!     fn enter_protected_mode(&mut self) {
//!         self.protected_mode = true;
//!     }
//!     fn exit_protected_mode(&mut self) -> bool {
//!         self.protected_mode = false;
//!         true
//!     }
//!     fn is_in_protected_mode(&self) -> bool {
//!         self.protected_mode
//!     }
//!     fn platform_port(&mut self) -> &PlatformPort {
//!         &self.port
//!     }
//!     fn output_hang_message(&mut self) {}
//!     fn update_gpu_active(&mut self, _active: bool) {}
//! }
//!
//! let owner = NullOwner {
//!     port: PlatformPort::new(),
//!     protected_mode: false,
//! };
//! let mut scheduler = JobScheduler::new(owner, 3);
//!
//! let connection = Connection::new(ClientId(1));
//! let atom = Atom::new(&connection, 0x1000, 0, 0, false, Vec::new());
//! scheduler.enqueue_atom(atom);
//! scheduler.try_to_schedule();
//! ```

pub mod atom;
pub mod clock;
pub mod config;
pub mod connection;
pub mod owner;
pub mod scheduler;
pub mod semaphore;
pub mod stats;
pub mod types;

// Re-export the main public types for convenience.
pub use atom::{Atom, AtomDependency, AtomKind, SoftOp};
pub use clock::{Clock, MonotonicClock};
pub use config::SchedulerConfig;
pub use connection::Connection;
pub use owner::Owner;
pub use scheduler::JobScheduler;
pub use semaphore::{PlatformPort, PlatformSemaphore};
pub use stats::SchedulerStats;
pub use types::{ClientId, ResultCode, TimeNs};
