//! The scheduler handoff contract (spec §5: "Suspension hands the
//! continuation handle to the configured scheduler; absent a scheduler,
//! the task awaits inline").

use crate::task::{Poll, Task};

/// A unit of resumed work the scheduler is responsible for eventually
/// running exactly once. Takes the scheduler back as an argument so it
/// can re-post itself if the task it's driving is still pending.
pub type Continuation = Box<dyn FnOnce(&mut dyn Scheduler)>;

/// The handoff point a host embedding a cooperative event loop implements.
/// The only obligation a `Scheduler` has is to run every posted
/// continuation exactly once, in whatever order and interleaving with
/// other work it likes (spec §5, "Ordering": "the scheduler may interleave
/// arbitrary other tasks").
pub trait Scheduler {
    fn post(&mut self, continuation: Continuation);
}

/// Poll `task` to completion with no scheduler at all: a tight loop that
/// never yields control back to a caller between polls. Matches spec §5's
/// "otherwise drives the task inline (stack may grow with nested
/// continuations)" — this is the degenerate, always-blocking case.
pub fn drive_inline<T>(mut task: Task<T>) -> T {
    loop {
        if let Poll::Ready(value) = task.poll() {
            return value;
        }
    }
}

/// Drive `task` to completion, calling `on_ready` exactly once with its
/// result. With a scheduler present, a task that isn't immediately ready
/// reposts itself as a continuation instead of blocking — so this
/// function returns as soon as the first `Pending` is observed, and the
/// rest of the computation happens across however many times the
/// scheduler later invokes the posted continuation. Without a scheduler,
/// falls back to [`drive_inline`].
pub fn await_task<T: 'static>(
    task: Task<T>,
    scheduler: Option<&mut dyn Scheduler>,
    on_ready: impl FnOnce(T) + 'static,
) {
    match scheduler {
        None => on_ready(drive_inline(task)),
        Some(sched) => step(task, Box::new(on_ready), sched),
    }
}

fn step<T: 'static>(mut task: Task<T>, on_ready: Box<dyn FnOnce(T)>, sched: &mut dyn Scheduler) {
    match task.poll() {
        Poll::Ready(value) => on_ready(value),
        Poll::Pending => {
            log::trace!("async_runtime: task pending, posting continuation");
            sched.post(Box::new(move |sched| step(task, on_ready, sched)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[test]
    fn no_scheduler_drives_inline_to_completion() {
        let mut polls = 0;
        let task = Task::from_poll_fn(move || {
            polls += 1;
            if polls < 3 {
                Poll::Pending
            } else {
                Poll::Ready(7)
            }
        });
        let result = Rc::new(RefCell::new(None));
        let result2 = result.clone();
        await_task(task, None, move |v| *result2.borrow_mut() = Some(v));
        assert_eq!(*result.borrow(), Some(7));
    }

    /// A minimal FIFO event loop, standing in for a host-supplied scheduler.
    struct QueueScheduler {
        queue: VecDeque<Continuation>,
    }

    impl Scheduler for QueueScheduler {
        fn post(&mut self, continuation: Continuation) {
            self.queue.push_back(continuation);
        }
    }

    impl QueueScheduler {
        fn run_until_empty(&mut self) {
            while let Some(cont) = self.queue.pop_front() {
                cont(self);
            }
        }
    }

    #[test]
    fn scheduler_present_reposts_until_ready() {
        let mut polls = 0;
        let task = Task::from_poll_fn(move || {
            polls += 1;
            if polls < 3 {
                Poll::Pending
            } else {
                Poll::Ready("finished")
            }
        });
        let result = Rc::new(RefCell::new(None));
        let result2 = result.clone();
        let mut sched = QueueScheduler { queue: VecDeque::new() };
        await_task(task, Some(&mut sched), move |v| *result2.borrow_mut() = Some(v));
        assert_eq!(*result.borrow(), None, "must not resolve synchronously past the first Pending");
        sched.run_until_empty();
        assert_eq!(*result.borrow(), Some("finished"));
    }

    #[test]
    fn ready_immediately_never_touches_the_scheduler() {
        let task = Task::ready(1);
        let mut sched = QueueScheduler { queue: VecDeque::new() };
        let result = Rc::new(RefCell::new(None));
        let result2 = result.clone();
        await_task(task, Some(&mut sched), move |v| *result2.borrow_mut() = Some(v));
        assert_eq!(*result.borrow(), Some(1));
        assert!(sched.queue.is_empty());
    }
}
