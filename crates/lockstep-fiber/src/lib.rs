//! Cooperative execution contexts.
//!
//! A [`Fiber`] is a suspended computation that only gives up control at explicit yield points.
//! Fibers are `async` state machines driven by [`Fiber::resume`] with a no-op waker: nothing is
//! ever woken asynchronously, so whoever owns a fiber decides exactly when it runs again. Every
//! fiber of one emulated system lives on the thread that resumes it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::task::noop_waker_ref;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FiberError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FiberError {
    #[error("fiber has already run to completion")]
    Finished,
}

/// Outcome of a single [`Fiber::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume<T> {
    /// The fiber stopped at a yield point and continues from there on the next resume.
    Yielded,
    /// The entry point returned; the fiber cannot be resumed again.
    Finished(T),
}

pub struct Fiber<T> {
    entry: Option<LocalBoxFuture<'static, T>>,
    resumes: u64,
}

impl<T> Fiber<T> {
    /// Creates a fiber that has not started yet. The first [`Fiber::resume`] runs `entry` from
    /// the beginning.
    pub fn new<F>(entry: F) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        Self {
            entry: Some(entry.boxed_local()),
            resumes: 0,
        }
    }

    /// Runs the fiber until its next yield point or until its entry point returns.
    pub fn resume(&mut self) -> Result<Resume<T>> {
        let entry = self.entry.as_mut().ok_or(FiberError::Finished)?;
        self.resumes += 1;

        let mut cx = Context::from_waker(noop_waker_ref());
        match entry.as_mut().poll(&mut cx) {
            Poll::Pending => Ok(Resume::Yielded),
            Poll::Ready(value) => {
                self.entry = None;
                Ok(Resume::Finished(value))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.entry.is_none()
    }

    /// Number of times the fiber has been resumed since creation.
    pub fn resumes(&self) -> u64 {
        self.resumes
    }
}

impl<T> fmt::Debug for Fiber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("finished", &self.is_finished())
            .field("resumes", &self.resumes)
            .finish()
    }
}

/// Suspends the calling fiber once. The owner's next [`Fiber::resume`] continues right after
/// the `.await`.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn resume_continues_after_each_yield() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let log = trace.clone();
        let mut fiber = Fiber::new(async move {
            for i in 0..3u32 {
                log.borrow_mut().push(i);
                yield_now().await;
            }
            7u32
        });

        assert_eq!(fiber.resume(), Ok(Resume::Yielded));
        assert_eq!(*trace.borrow(), [0]);
        assert_eq!(fiber.resume(), Ok(Resume::Yielded));
        assert_eq!(fiber.resume(), Ok(Resume::Yielded));
        assert_eq!(*trace.borrow(), [0, 1, 2]);
        assert_eq!(fiber.resume(), Ok(Resume::Finished(7)));
        assert!(fiber.is_finished());
        assert_eq!(fiber.resumes(), 4);
    }

    #[test]
    fn resuming_finished_fiber_is_an_error() {
        let mut fiber = Fiber::new(async {});
        assert_eq!(fiber.resume(), Ok(Resume::Finished(())));
        assert_eq!(fiber.resume(), Err(FiberError::Finished));
    }

    #[test]
    fn fibers_interleave_only_at_yield_points() {
        let trace = Rc::new(RefCell::new(String::new()));

        let spawn = |tag: char| {
            let log = trace.clone();
            Fiber::new(async move {
                loop {
                    log.borrow_mut().push(tag);
                    log.borrow_mut().push(tag);
                    yield_now().await;
                }
            })
        };
        let mut a: Fiber<()> = spawn('a');
        let mut b: Fiber<()> = spawn('b');

        for _ in 0..2 {
            assert_eq!(a.resume(), Ok(Resume::Yielded));
            assert_eq!(b.resume(), Ok(Resume::Yielded));
        }
        assert_eq!(*trace.borrow(), "aabbaabb");
    }
}
