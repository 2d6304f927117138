//! Cooperative periodic task scheduler
//!
//! Tasks are plain functions which take a mutable reference to an application context `C`, and
//! each runs with a fixed period measured in ticks of a [`TimeBase`]. The scheduler never preempts
//! a task: [`Scheduler::manage`] loops forever over the task table, running each task whose
//! deadline has passed, and calls a hook (usually a watchdog feed) once per pass.
//!
//! ```no_run
//! use dispatch_node::{Scheduler, TimeBase};
//!
//! static TIME: TimeBase = TimeBase::new();
//!
//! struct App {
//!     samples: u32,
//! }
//!
//! fn sample(app: &mut App) {
//!     app.samples += 1;
//! }
//!
//! let mut scheduler: Scheduler<App> = Scheduler::new(&TIME);
//! scheduler.add(sample, 10).unwrap();
//! // The timer interrupt calls TIME.tick()
//! scheduler.manage(&mut App { samples: 0 }, || { /* feed the watchdog */ });
//! ```
use defmt_or_log::{debug, info, warn};
use dispatch_common::constants::{MAX_TASKS, ROLLOVER_TICKS};
use snafu::Snafu;

use crate::time::TimeBase;

/// Signature of a scheduled task
pub type TaskFn<C> = fn(&mut C);

/// Errors returned by the [`Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum SchedulerError {
    /// All task slots are in use
    TaskTableFull,
}

struct Task<C> {
    callback: TaskFn<C>,
    period: u32,
    next: u32,
}

/// A fixed table of periodic tasks driven by a [`TimeBase`]
#[allow(missing_debug_implementations)]
pub struct Scheduler<'a, C, const N: usize = MAX_TASKS> {
    time: &'a TimeBase,
    tasks: [Option<Task<C>>; N],
    rebases: u32,
}

impl<'a, C, const N: usize> Scheduler<'a, C, N> {
    /// Create a scheduler with an empty task table
    pub const fn new(time: &'a TimeBase) -> Self {
        Self {
            time,
            tasks: [const { None }; N],
            rebases: 0,
        }
    }

    /// Schedule `task` to run every `period` ticks, first `period` ticks from now
    ///
    /// Adding a task which is already scheduled updates its period and reschedules it if the
    /// period changed, and does nothing otherwise. Returns the task's slot.
    pub fn add(&mut self, task: TaskFn<C>, period: u32) -> Result<usize, SchedulerError> {
        let now = self.time.now();

        if let Some((slot, existing)) = self
            .tasks
            .iter_mut()
            .enumerate()
            .find_map(|(i, t)| t.as_mut().filter(|t| same_task(t.callback, task)).map(|t| (i, t)))
        {
            if existing.period != period {
                existing.period = period;
                existing.next = now.saturating_add(period);
                debug!("Rescheduled task {} with period {}", slot, period);
            }
            return Ok(slot);
        }

        let Some((slot, entry)) = self
            .tasks
            .iter_mut()
            .enumerate()
            .find(|(_, t)| t.is_none())
        else {
            warn!("Task table full");
            return TaskTableFullSnafu.fail();
        };
        *entry = Some(Task {
            callback: task,
            period,
            next: now.saturating_add(period),
        });
        info!("Added task {} with period {}", slot, period);
        Ok(slot)
    }

    /// Stop running `task`
    ///
    /// Its slot is freed in place for reuse by a later [`add`](Self::add). Returns false if the
    /// task was not scheduled.
    pub fn remove(&mut self, task: TaskFn<C>) -> bool {
        let mut removed = false;
        for (slot, entry) in self.tasks.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|t| same_task(t.callback, task)) {
                *entry = None;
                removed = true;
                info!("Removed task {}", slot);
            }
        }
        removed
    }

    /// The current tick count
    pub fn get_time(&self) -> u32 {
        self.time.now()
    }

    /// The tick at which `task` will next run, if it is scheduled
    pub fn next_execution(&self, task: TaskFn<C>) -> Option<u32> {
        self.tasks
            .iter()
            .flatten()
            .find(|t| same_task(t.callback, task))
            .map(|t| t.next)
    }

    /// Number of occupied task slots
    pub fn task_count(&self) -> usize {
        self.tasks.iter().flatten().count()
    }

    /// Number of times the time base has been rebased because it approached rollover
    pub fn rebases(&self) -> u32 {
        self.rebases
    }

    /// Set the time base to `ticks` without changing how long each task has left to wait
    ///
    /// Each task's remaining time is measured against the current tick count, clamped to zero
    /// for overdue tasks, and its deadline becomes `ticks` plus that remaining time. The timer
    /// interrupt is masked while the time base and deadlines change. Does nothing if `ticks` is
    /// already the current time.
    pub fn reset_time(&mut self, ticks: u32) {
        critical_section::with(|cs| {
            let now = self.time.now_in_cs(cs);
            if now == ticks {
                return;
            }
            for task in self.tasks.iter_mut().flatten() {
                let remaining = task.next.saturating_sub(now);
                task.next = ticks.saturating_add(remaining);
            }
            self.time.set_in_cs(cs, ticks);
        });
    }

    /// Make one pass over the task table
    ///
    /// Each due task runs once, in slot order, and its deadline advances by one period from the
    /// time it was due. A task which has fallen several periods behind catches up over the
    /// following passes. Returns the number of tasks run.
    pub fn sweep(&mut self, ctx: &mut C) -> usize {
        if self.time.now() >= ROLLOVER_TICKS {
            info!("Rebasing time base ahead of rollover");
            self.reset_time(0);
            self.rebases = self.rebases.wrapping_add(1);
        }

        let mut ran = 0;
        for slot in self.tasks.iter_mut() {
            let now = self.time.now();
            let Some(task) = slot else {
                continue;
            };
            if now >= task.next {
                task.next = task.next.saturating_add(task.period);
                (task.callback)(ctx);
                ran += 1;
            }
        }
        ran
    }

    /// Run tasks forever
    ///
    /// `on_sweep` is called after every pass over the task table, and is the place to feed a
    /// watchdog.
    pub fn manage(&mut self, ctx: &mut C, mut on_sweep: impl FnMut()) -> ! {
        loop {
            self.sweep(ctx);
            on_sweep();
        }
    }
}

fn same_task<C>(a: TaskFn<C>, b: TaskFn<C>) -> bool {
    core::ptr::fn_addr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        runs: Vec<&'static str>,
    }

    fn task_a(log: &mut Log) {
        log.runs.push("a");
    }

    fn task_b(log: &mut Log) {
        log.runs.push("b");
    }

    fn advance(time: &TimeBase, ticks: u32) {
        for _ in 0..ticks {
            time.tick();
        }
    }

    #[test]
    fn test_periodic_execution() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        let mut log = Log::default();
        scheduler.add(task_a, 3).unwrap();

        let mut total = 0;
        for _ in 0..9 {
            time.tick();
            total += scheduler.sweep(&mut log);
        }
        assert_eq!(3, total);
        assert_eq!(Some(12), scheduler.next_execution(task_a));
    }

    #[test]
    fn test_slot_order() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        let mut log = Log::default();
        scheduler.add(task_b, 1).unwrap();
        scheduler.add(task_a, 1).unwrap();
        time.tick();
        assert_eq!(2, scheduler.sweep(&mut log));
        assert_eq!(vec!["b", "a"], log.runs);
    }

    #[test]
    fn test_add_is_idempotent() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        assert_eq!(Ok(0), scheduler.add(task_a, 5));
        advance(&time, 2);
        // Same period: deadline unchanged
        assert_eq!(Ok(0), scheduler.add(task_a, 5));
        assert_eq!(Some(5), scheduler.next_execution(task_a));
        // New period: rescheduled from now
        assert_eq!(Ok(0), scheduler.add(task_a, 7));
        assert_eq!(Some(9), scheduler.next_execution(task_a));
        assert_eq!(1, scheduler.task_count());
    }

    #[test]
    fn test_remove_frees_slot_in_place() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        let mut log = Log::default();
        scheduler.add(task_a, 1).unwrap();
        scheduler.add(task_b, 1).unwrap();
        assert!(scheduler.remove(task_a));
        assert!(!scheduler.remove(task_a));
        assert_eq!(None, scheduler.next_execution(task_a));

        time.tick();
        assert_eq!(1, scheduler.sweep(&mut log));
        assert_eq!(vec!["b"], log.runs);
        assert_eq!(Ok(0), scheduler.add(task_a, 1));
    }

    #[test]
    fn test_table_full() {
        fn task_c(log: &mut Log) {
            log.runs.push("c");
        }
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log, 2> = Scheduler::new(&time);
        scheduler.add(task_a, 1).unwrap();
        scheduler.add(task_b, 1).unwrap();
        assert_eq!(Err(SchedulerError::TaskTableFull), scheduler.add(task_c, 1));
        // Re-adding an existing task never needs a free slot
        assert_eq!(Ok(1), scheduler.add(task_b, 4));
    }

    #[test]
    fn test_catch_up_one_per_sweep() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        let mut log = Log::default();
        scheduler.add(task_a, 2).unwrap();
        advance(&time, 7);
        // Due at 2, 4 and 6
        assert_eq!(1, scheduler.sweep(&mut log));
        assert_eq!(1, scheduler.sweep(&mut log));
        assert_eq!(1, scheduler.sweep(&mut log));
        assert_eq!(0, scheduler.sweep(&mut log));
        assert_eq!(Some(8), scheduler.next_execution(task_a));
    }

    #[test]
    fn test_reset_time_preserves_remaining() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        scheduler.add(task_a, 10).unwrap();
        scheduler.add(task_b, 2).unwrap();
        advance(&time, 4);

        scheduler.reset_time(1000);
        assert_eq!(1000, scheduler.get_time());
        assert_eq!(Some(1006), scheduler.next_execution(task_a));
        // task_b was overdue and stays due immediately
        assert_eq!(Some(1000), scheduler.next_execution(task_b));

        scheduler.reset_time(1000);
        assert_eq!(Some(1006), scheduler.next_execution(task_a));
    }

    #[test]
    fn test_rollover_rebases_to_zero() {
        let time = TimeBase::new();
        let mut scheduler: Scheduler<Log> = Scheduler::new(&time);
        let mut log = Log::default();
        time.set(ROLLOVER_TICKS - 3);
        scheduler.add(task_a, 5).unwrap();

        advance(&time, 3);
        assert_eq!(0, scheduler.sweep(&mut log));
        assert_eq!(1, scheduler.rebases());
        assert_eq!(0, scheduler.get_time());
        assert_eq!(Some(2), scheduler.next_execution(task_a));

        advance(&time, 2);
        assert_eq!(1, scheduler.sweep(&mut log));
        assert_eq!(Some(7), scheduler.next_execution(task_a));
    }
}
