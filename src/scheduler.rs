//! The job scheduler state machine.
//!
//! Atoms move through five mutually exclusive stations: pending
//! (dependencies unresolved), runnable (queued on their slot), executing
//! (at most one per slot), waiting (soft atoms blocked on a semaphore),
//! and completed (reported to the [`Owner`] and forgotten).
//!
//! A scheduling pass is two stages run back to back: the readiness pass
//! promotes pending atoms whose dependencies resolved, then the runnable
//! pass preempts and dispatches per slot. The pass is re-entered whenever
//! state changes: a new atom, a hardware completion, a watchdog firing,
//! or a semaphore wake. All entry points run on one logical thread; the
//! embedder serializes callbacks before calling in, and `Owner` calls
//! never re-enter the scheduler.
//!
//! Exactly one execution mode (protected or normal) is active
//! hardware-wide. An atom of the other mode may sit runnable, but the
//! switch is only performed once every slot has drained.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};

use crate::atom::{Atom, AtomKind, SoftOp};
use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::connection::{same_connection, Connection};
use crate::owner::Owner;
use crate::stats::SchedulerStats;
use crate::types::{ResultCode, TimeNs};

/// Strict priority order, scoped to a single connection.
///
/// Atoms from different connections never reorder relative to each
/// other; the ratio of work executed between connections is preserved.
fn higher_priority_than(a: &Atom, b: &Atom) -> bool {
    same_connection(a.connection(), b.connection()) && a.priority() > b.priority()
}

fn min_deadline(current: Option<TimeNs>, candidate: TimeNs) -> Option<TimeNs> {
    Some(match current {
        Some(deadline) => deadline.min(candidate),
        None => candidate,
    })
}

fn duration_ns(duration: Duration) -> TimeNs {
    duration.as_nanos() as TimeNs
}

/// Multi-slot, priority-preemptive atom scheduler.
///
/// Owns the injected [`Owner`] and drives it; one instance per GPU
/// context, with no shared state between instances.
pub struct JobScheduler<O: Owner> {
    owner: O,
    clock: Box<dyn Clock>,
    config: SchedulerConfig,
    stats: SchedulerStats,

    /// Submitted atoms whose dependencies may be unresolved, in
    /// submission order.
    pending: VecDeque<Rc<Atom>>,
    /// Per-slot queues of dispatchable atoms.
    runnable: Vec<VecDeque<Rc<Atom>>>,
    /// At most one executing atom per slot.
    executing: Vec<Option<Rc<Atom>>>,
    /// Soft atoms blocked on a semaphore.
    waiting: Vec<Rc<Atom>>,

    want_to_switch_to_protected: bool,
    want_to_switch_to_nonprotected: bool,
}

impl<O: Owner> JobScheduler<O> {
    /// Create a scheduler with `job_slots` hardware slots and default
    /// timeouts.
    pub fn new(owner: O, job_slots: u32) -> JobScheduler<O> {
        Self::with_clock(
            owner,
            job_slots,
            SchedulerConfig::default(),
            Box::new(MonotonicClock),
        )
        .expect("default config is valid")
    }

    pub fn with_config(
        owner: O,
        job_slots: u32,
        config: SchedulerConfig,
    ) -> Result<JobScheduler<O>> {
        Self::with_clock(owner, job_slots, config, Box::new(MonotonicClock))
    }

    /// Full-control constructor; tests inject a manually advanced clock.
    pub fn with_clock(
        owner: O,
        job_slots: u32,
        config: SchedulerConfig,
        clock: Box<dyn Clock>,
    ) -> Result<JobScheduler<O>> {
        assert!(job_slots > 0, "scheduler needs at least one job slot");
        config.validate()?;
        Ok(JobScheduler {
            owner,
            clock,
            config,
            stats: SchedulerStats::default(),
            pending: VecDeque::new(),
            runnable: (0..job_slots).map(|_| VecDeque::new()).collect(),
            executing: (0..job_slots).map(|_| None).collect(),
            waiting: Vec::new(),
            want_to_switch_to_protected: false,
            want_to_switch_to_nonprotected: false,
        })
    }

    pub fn owner(&self) -> &O {
        &self.owner
    }

    pub fn owner_mut(&mut self) -> &mut O {
        &mut self.owner
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Number of submitted atoms still waiting on dependencies.
    pub fn atom_list_size(&self) -> usize {
        self.pending.len()
    }

    /// Accept a new atom. The caller follows up with
    /// [`try_to_schedule`](Self::try_to_schedule) once it has finished
    /// submitting.
    pub fn enqueue_atom(&mut self, atom: Rc<Atom>) {
        self.pending.push_back(atom);
    }

    /// Run one full scheduling pass.
    pub fn try_to_schedule(&mut self) {
        self.move_atoms_to_runnable();
        self.schedule_runnable_atoms();
        self.update_power_manager();
    }

    fn move_atoms_to_runnable(&mut self) {
        // Atoms can't depend on atoms submitted after them, so one pass
        // in submission order resolves everything resolvable this round.
        let mut pending = std::mem::take(&mut self.pending);
        while let Some(atom) = pending.pop_front() {
            if !atom.update_dependencies() {
                debug!(
                    "skipping atom {:#x}: waiting on dependencies",
                    atom.gpu_address()
                );
                self.pending.push_back(atom);
                continue;
            }
            let dep_status = atom.final_dependency_result();
            if !dep_status.is_success() {
                // Failures propagate without dispatch or retry.
                self.stats.dependency_failures += 1;
                self.complete_atom(&atom, dep_status);
            } else if atom.is_soft() {
                atom.set_execution_started(self.clock.now());
                self.process_soft_atom(&atom);
            } else if atom.is_dependency_only() {
                self.complete_atom(&atom, ResultCode::Success);
            } else {
                let slot = atom.slot() as usize;
                assert!(slot < self.runnable.len(), "atom targets unknown slot");
                self.runnable[slot].push_back(atom);
            }
        }
    }

    /// Drop a wanted mode switch that no longer has a runnable atom of
    /// that mode at any queue head; a stale flag would stall every other
    /// atom.
    fn validate_can_switch_protected(&mut self) {
        let mut have_protected = false;
        let mut have_nonprotected = false;
        for queue in &self.runnable {
            if let Some(front) = queue.front() {
                if front.is_protected() {
                    have_protected = true;
                } else {
                    have_nonprotected = true;
                }
            }
        }
        if !have_protected {
            self.want_to_switch_to_protected = false;
        }
        if !have_nonprotected {
            self.want_to_switch_to_nonprotected = false;
        }
    }

    fn schedule_runnable_atoms(&mut self) {
        // First try to preempt running atoms if necessary.
        for slot in 0..self.runnable.len() {
            let atom = match &self.executing[slot] {
                Some(atom) => atom.clone(),
                None => continue,
            };
            if atom.is_protected() {
                // Protected atoms can't write their progress out to be
                // restarted, so they are never soft-stopped.
                continue;
            }
            if atom.soft_stopped() {
                // Already stopping.
                continue;
            }
            let found_preempter = self.runnable[slot]
                .iter()
                .any(|preempting| higher_priority_than(preempting, &atom));
            if found_preempter {
                atom.set_soft_stopped(true);
                self.stats.preemption_soft_stops += 1;
                // The stopped atom saves its progress in the job chain and
                // is requeued when the hardware confirms the stop through
                // job_completed, to run again priority permitting.
                self.owner.soft_stop_atom(&atom);
            }
        }

        // Start executing on empty slots.
        for slot in 0..self.runnable.len() {
            if self.executing[slot].is_some() {
                continue;
            }
            if self.runnable[slot].is_empty() {
                continue;
            }

            // Swap the best same-connection candidate into the head
            // position. Keep scanning after a swap; an even higher
            // priority atom may sit further down the queue.
            for i in 1..self.runnable[slot].len() {
                if higher_priority_than(&self.runnable[slot][i], &self.runnable[slot][0]) {
                    self.runnable[slot].swap(0, i);
                    // The head may have changed between protected and
                    // non-protected.
                    self.validate_can_switch_protected();
                }
            }

            let atom = self.runnable[slot].front().expect("queue non-empty").clone();
            debug_assert!(!atom.is_soft());
            debug_assert!(atom.final_dependency_result().is_success());
            debug_assert!(!atom.is_dependency_only());
            debug_assert_eq!(atom.slot() as usize, slot);

            let new_atom_protected = atom.is_protected();
            let currently_protected = self.owner.is_in_protected_mode();
            let want_switch = new_atom_protected != currently_protected;
            if want_switch {
                if new_atom_protected {
                    debug_assert!(!self.want_to_switch_to_nonprotected);
                    self.want_to_switch_to_protected = true;
                } else {
                    debug_assert!(!self.want_to_switch_to_protected);
                    self.want_to_switch_to_nonprotected = true;
                }
            }

            // Don't start more atoms in the outgoing mode while a switch
            // is pending; they would push the switch further out.
            if (self.want_to_switch_to_protected && !new_atom_protected)
                || (self.want_to_switch_to_nonprotected && new_atom_protected)
            {
                continue;
            }

            if want_switch {
                if self.num_executing_atoms() > 0 {
                    // The switch has to wait until the slots drain.
                    continue;
                }
                if new_atom_protected {
                    self.owner.enter_protected_mode();
                    self.want_to_switch_to_protected = false;
                } else {
                    if !self.owner.exit_protected_mode() {
                        return;
                    }
                    self.want_to_switch_to_nonprotected = false;
                }
                self.stats.mode_switches += 1;
            }

            let now = self.clock.now();
            atom.set_execution_started(now);
            atom.set_tick_started(now);
            debug_assert!(!atom.preempted());
            debug_assert!(!atom.soft_stopped());
            self.runnable[slot].pop_front();
            self.executing[slot] = Some(atom.clone());
            self.stats.atoms_dispatched += 1;
            debug!("dispatching atom {:#x} on slot {}", atom.gpu_address(), slot);
            self.owner.run_atom(&atom);
        }
    }

    /// Hardware completion or soft-stop confirmation for `slot`.
    ///
    /// `tail` is the first unit of work that didn't complete; a
    /// soft-stopped atom resumes there. Resuming earlier would re-run
    /// finished work and fault.
    pub fn job_completed(&mut self, slot: u32, result: ResultCode, tail: u64) {
        let slot = slot as usize;
        let atom = self.executing[slot]
            .take()
            .expect("job completed on empty slot");
        if result == ResultCode::SoftStopped {
            atom.set_soft_stopped(false);
            atom.set_gpu_address(tail);
            if atom.preempted() {
                // Preempted work goes to the back so the preempter and
                // its peers get the slot first.
                atom.set_preempted(false);
                self.runnable[slot].push_back(atom.clone());
            } else {
                self.runnable[slot].push_front(atom.clone());
            }
            self.owner.atom_completed(&atom, result);
        } else {
            self.complete_atom(&atom, result);
        }
        self.try_to_schedule();
    }

    /// Report a finished CPU-side atom. Dependents are picked up by the
    /// next scheduling pass.
    pub fn soft_job_completed(&mut self, atom: &Rc<Atom>) {
        self.complete_atom(atom, ResultCode::Success);
    }

    fn process_soft_atom(&mut self, atom: &Rc<Atom>) {
        let (op, semaphore) = match atom.kind() {
            AtomKind::Soft { op, semaphore } => (*op, semaphore.clone()),
            AtomKind::Hardware => unreachable!("hardware atom in soft path"),
        };
        match op {
            SoftOp::SemaphoreSet => {
                semaphore.signal();
                self.soft_job_completed(atom);
            }
            SoftOp::SemaphoreReset => {
                semaphore.reset();
                self.soft_job_completed(atom);
            }
            SoftOp::SemaphoreWait | SoftOp::SemaphoreWaitAndReset => {
                let wait_succeeded = if op == SoftOp::SemaphoreWait {
                    semaphore.wait_no_reset()
                } else {
                    semaphore.wait()
                };
                if wait_succeeded {
                    self.soft_job_completed(atom);
                } else {
                    self.waiting.push(atom.clone());
                    semaphore.wait_async(self.owner.platform_port());
                }
            }
        }
    }

    /// A wait registered on the platform port fired for semaphore `key`.
    ///
    /// Every waiting atom is re-evaluated, not just the matching one;
    /// several may have become ready off one wake.
    pub fn platform_port_signaled(&mut self, key: u64) {
        let mut completed_any = false;
        let waiting = std::mem::take(&mut self.waiting);
        for atom in waiting {
            let (op, semaphore) = match atom.kind() {
                AtomKind::Soft { op, semaphore } => (*op, semaphore.clone()),
                AtomKind::Hardware => unreachable!("hardware atom in waiting set"),
            };
            let wait_succeeded = match op {
                SoftOp::SemaphoreWait => semaphore.wait_no_reset(),
                SoftOp::SemaphoreWaitAndReset => semaphore.wait(),
                _ => unreachable!("non-wait atom in waiting set"),
            };
            if wait_succeeded {
                completed_any = true;
                self.complete_atom(&atom, ResultCode::Success);
            } else {
                if semaphore.id() == key {
                    semaphore.wait_async(self.owner.platform_port());
                }
                self.waiting.push(atom);
            }
        }
        if completed_any {
            self.try_to_schedule();
        }
    }

    /// Purge every queued atom belonging to `connection` (or to a
    /// connection that has already been dropped). Atoms currently
    /// executing stay put; the hardware is still running them, see
    /// [`release_mappings_for_connection`](Self::release_mappings_for_connection).
    ///
    /// Idempotent: canceling twice, or canceling a connection with no
    /// atoms, is a no-op.
    pub fn cancel_atoms_for_connection(&mut self, connection: &Rc<Connection>) {
        let matches = |atom: &Rc<Atom>| match atom.connection().upgrade() {
            Some(owner) => Rc::ptr_eq(&owner, connection),
            None => true,
        };

        let mut canceled: u64 = 0;
        self.waiting.retain(|atom| {
            let remove = matches(atom);
            canceled += u64::from(remove);
            !remove
        });
        self.pending.retain(|atom| {
            let remove = matches(atom);
            canceled += u64::from(remove);
            !remove
        });
        for queue in &mut self.runnable {
            queue.retain(|atom| {
                let remove = matches(atom);
                canceled += u64::from(remove);
                !remove
            });
        }
        self.stats.atoms_canceled += canceled;

        self.validate_can_switch_protected();
    }

    /// Tear-down path for executing atoms of a dying connection: flag
    /// them hard-stopped and ask the owner to release their mappings.
    /// Their terminal `job_completed` still arrives from the hardware.
    pub fn release_mappings_for_connection(&mut self, connection: &Rc<Connection>) {
        for slot in 0..self.executing.len() {
            let atom = match &self.executing[slot] {
                Some(atom) => atom.clone(),
                None => continue,
            };
            let owned = match atom.connection().upgrade() {
                Some(owner) => Rc::ptr_eq(&owner, connection),
                None => false,
            };
            if owned {
                atom.set_hard_stopped();
                self.stats.hard_stops += 1;
                self.owner.release_mappings_for_atom(&atom);
            }
        }
    }

    /// Time until the next watchdog deadline, or `None` when nothing is
    /// in flight. The embedder re-arms its single timer with this after
    /// every pass.
    pub fn current_timeout_duration(&self) -> Option<Duration> {
        let hang_ns = duration_ns(self.config.hang_timeout);
        let tick_ns = duration_ns(self.config.tick);
        let semaphore_ns = duration_ns(self.config.semaphore_timeout);

        let mut deadline: Option<TimeNs> = None;
        for atom in self.executing.iter().flatten() {
            if atom.hard_stopped() {
                continue;
            }
            deadline = min_deadline(deadline, atom.execution_start_time() + hang_ns);

            let may_want_to_preempt = !atom.is_protected()
                && !atom.soft_stopped()
                && !self.runnable[atom.slot() as usize].is_empty();
            if may_want_to_preempt {
                deadline = min_deadline(deadline, atom.tick_start_time() + tick_ns);
            }
        }
        for atom in &self.waiting {
            deadline = min_deadline(deadline, atom.execution_start_time() + semaphore_ns);
        }

        let deadline = deadline?;
        Some(Duration::from_nanos(
            deadline.saturating_sub(self.clock.now()),
        ))
    }

    /// Escalate atoms past their deadlines: hung atoms are hard-stopped,
    /// expired ticks preempt when a worthy waiter exists, and expired
    /// semaphore waits fail with a timeout.
    pub fn handle_timed_out_atoms(&mut self) {
        let now = self.clock.now();
        let hang_ns = duration_ns(self.config.hang_timeout);
        let tick_ns = duration_ns(self.config.tick);
        let semaphore_ns = duration_ns(self.config.semaphore_timeout);

        let mut have_output_hang_message = false;
        for slot in 0..self.executing.len() {
            let atom = match &self.executing[slot] {
                Some(atom) => atom.clone(),
                None => continue,
            };
            if atom.hard_stopped() {
                continue;
            }
            if atom.execution_start_time() + hang_ns <= now {
                if !have_output_hang_message {
                    have_output_hang_message = true;
                    self.owner.output_hang_message();
                }
                atom.set_hard_stopped();
                self.stats.hard_stops += 1;
                self.owner.hard_stop_atom(&atom);
            } else if atom.tick_start_time() + tick_ns <= now {
                // Reset the tick first so a stop that takes a while
                // doesn't retrigger on every wakeup.
                atom.set_tick_started(now);

                if atom.soft_stopped() || atom.is_protected() {
                    continue;
                }
                debug_assert!(!atom.preempted());
                // Preempt only if some waiter could take the slot: any
                // atom not strictly lower priority, which includes every
                // atom from another connection.
                let want_to_preempt = self.runnable[slot]
                    .iter()
                    .any(|waiting| !higher_priority_than(&atom, waiting));
                if want_to_preempt {
                    debug!(
                        "tick-preempting atom {:#x} on slot {}",
                        atom.gpu_address(),
                        slot
                    );
                    atom.set_soft_stopped(true);
                    atom.set_preempted(true);
                    self.stats.tick_preemptions += 1;
                    self.owner.soft_stop_atom(&atom);
                }
            }
        }

        let mut removed_waiting_atoms = false;
        let waiting = std::mem::take(&mut self.waiting);
        for atom in waiting {
            if atom.execution_start_time() + semaphore_ns <= now {
                warn!("timing out hung semaphore wait");
                removed_waiting_atoms = true;
                self.stats.semaphore_timeouts += 1;
                self.complete_atom(&atom, ResultCode::TimedOut);
            } else {
                self.waiting.push(atom);
            }
        }
        if removed_waiting_atoms {
            self.try_to_schedule();
        }
    }

    /// Mark `atom` terminal and report it upward.
    fn complete_atom(&mut self, atom: &Rc<Atom>, result: ResultCode) {
        atom.set_result(result);
        self.stats.atoms_completed += 1;
        self.owner.atom_completed(atom, result);
    }

    fn num_executing_atoms(&self) -> usize {
        self.executing.iter().filter(|slot| slot.is_some()).count()
    }

    fn update_power_manager(&mut self) {
        let active = self.executing.iter().any(|slot| slot.is_some());
        self.owner.update_gpu_active(active);
    }
}
