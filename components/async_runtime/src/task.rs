//! The `Task` handle itself (spec §5, §9's "coroutine-driven async"
//! redesign note: "a task is a handle to a pending computation").
//!
//! A `Task<T>` is a poll-based computation, not an OS thread or a
//! `std::future::Future`: it carries no waker, because the interpreter has
//! exactly three opcodes that ever suspend on one (`CallAsyncFunc`,
//! `CallAsyncFuncSpread`, `CallAsyncConst`), so the driver that owns the
//! task is always the one deciding when to poll it again.

/// The result of polling a [`Task`]: either it produced its value, or the
/// caller should try again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

impl<T> Poll<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Poll<U> {
        match self {
            Poll::Ready(v) => Poll::Ready(f(v)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A handle to a pending computation. Host-supplied async library
/// functions return these; the VM's own `exec_async` surface is itself
/// implemented as one, so that a script awaiting a native async call is
/// just one `Task` polling another.
pub struct Task<T> {
    poll_fn: Box<dyn FnMut() -> Poll<T>>,
}

impl<T> Task<T> {
    /// A task that resolves immediately, the first time it's polled.
    pub fn ready(value: T) -> Self
    where
        T: 'static,
    {
        let mut slot = Some(value);
        Self::from_poll_fn(move || match slot.take() {
            Some(v) => Poll::Ready(v),
            None => panic!("Task polled again after it already completed"),
        })
    }

    /// Build a task from its poll step directly. `f` is called once per
    /// `poll()`; it must return `Poll::Ready` at most once.
    pub fn from_poll_fn(f: impl FnMut() -> Poll<T> + 'static) -> Self {
        Self { poll_fn: Box::new(f) }
    }

    /// Advance the computation by one step.
    pub fn poll(&mut self) -> Poll<T> {
        (self.poll_fn)()
    }

    /// Adapt a ready value through `f` without changing the suspension
    /// shape underneath.
    pub fn map<U: 'static>(mut self, mut f: impl FnMut(T) -> U + 'static) -> Task<U>
    where
        T: 'static,
    {
        Task::from_poll_fn(move || self.poll().map(&mut f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_task_resolves_on_first_poll() {
        let mut task = Task::ready(42);
        assert_eq!(task.poll(), Poll::Ready(42));
    }

    #[test]
    #[should_panic]
    fn ready_task_panics_if_polled_twice() {
        let mut task = Task::ready(42);
        let _ = task.poll();
        let _ = task.poll();
    }

    #[test]
    fn from_poll_fn_can_stay_pending_for_several_polls() {
        let mut remaining = 3;
        let mut task = Task::from_poll_fn(move || {
            if remaining == 0 {
                Poll::Ready("done")
            } else {
                remaining -= 1;
                Poll::Pending
            }
        });
        assert_eq!(task.poll(), Poll::Pending);
        assert_eq!(task.poll(), Poll::Pending);
        assert_eq!(task.poll(), Poll::Pending);
        assert_eq!(task.poll(), Poll::Ready("done"));
    }

    #[test]
    fn map_transforms_the_ready_value_only() {
        let mut count = 0;
        let task = Task::from_poll_fn(move || {
            count += 1;
            if count < 2 {
                Poll::Pending
            } else {
                Poll::Ready(10)
            }
        });
        let mut mapped = task.map(|v| v * 2);
        assert_eq!(mapped.poll(), Poll::Pending);
        assert_eq!(mapped.poll(), Poll::Ready(20));
    }
}
