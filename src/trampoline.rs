//! Per-thread work list that keeps settlement iterative.
//!
//! Settling one promise fires callbacks that settle the next, and dropping an
//! abandoned promise's callbacks drops the producers of the next. Done
//! directly, a chain of N stages nests N frames deep. Every such step goes
//! through [`run`]: the outermost call on a thread executes its job and then
//! loops over whatever the job queued; nested calls only queue. All queued
//! work finishes before the outermost call returns.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

type Job = Box<dyn FnOnce()>;

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
    static JOBS: RefCell<VecDeque<Job>> = RefCell::new(VecDeque::new());
}

/// Clears the active flag, also when a job unwinds. Jobs still queued then
/// run on the next outermost call on this thread.
struct Active;

impl Drop for Active {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|active| active.set(false));
    }
}

pub(crate) fn run(job: impl FnOnce() + 'static) {
    match ACTIVE.try_with(|active| active.replace(true)) {
        Ok(true) => {
            let mut job = Some(Box::new(job) as Job);
            let _ = JOBS.try_with(|jobs| jobs.borrow_mut().extend(job.take()));
            if let Some(job) = job {
                job();
            }
        }
        Ok(false) => {
            let _active = Active;
            job();
            while let Some(job) = next() {
                job();
            }
        }
        // Thread-local storage is being torn down.
        Err(_) => job(),
    }
}

fn next() -> Option<Job> {
    JOBS.try_with(|jobs| jobs.borrow_mut().pop_front())
        .ok()
        .flatten()
}
