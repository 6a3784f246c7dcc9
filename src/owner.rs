//! The injected driver/hardware seam.

use std::rc::Rc;

use crate::atom::Atom;
use crate::semaphore::PlatformPort;
use crate::types::ResultCode;

/// Hardware and driver operations the scheduler drives.
///
/// All run/stop requests are asynchronous fire-and-forget: the hardware
/// confirms them later through `JobScheduler::job_completed`, never by
/// re-entering the scheduler from inside an `Owner` call.
pub trait Owner {
    /// Dispatch `atom` for execution on its job slot.
    fn run_atom(&mut self, atom: &Rc<Atom>);

    /// Request a graceful, resumable stop of an executing atom.
    fn soft_stop_atom(&mut self, atom: &Rc<Atom>);

    /// Request a forced, terminal stop of an executing atom.
    fn hard_stop_atom(&mut self, atom: &Rc<Atom>);

    /// Report a terminal outcome, or a soft-stop the scheduler has
    /// already requeued for resumption.
    fn atom_completed(&mut self, atom: &Rc<Atom>, result: ResultCode);

    /// Release GPU memory mappings tied to a hard-stopped atom.
    fn release_mappings_for_atom(&mut self, atom: &Rc<Atom>);

    fn enter_protected_mode(&mut self);

    /// Leave protected mode. On failure the scheduling pass aborts and
    /// the switch is retried on the next pass.
    fn exit_protected_mode(&mut self) -> bool;

    fn is_in_protected_mode(&self) -> bool;

    /// Port where blocked semaphore waits are registered.
    fn platform_port(&mut self) -> &PlatformPort;

    /// Diagnostic hook for hung atoms; invoked at most once per watchdog
    /// pass even if several atoms hung simultaneously.
    fn output_hang_message(&mut self);

    /// Power-management hint: whether any slot has an executing atom.
    fn update_gpu_active(&mut self, active: bool);
}
