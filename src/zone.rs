//! Memory zones.
//!
//! A [`Zone`] is the accounting context every constructing or destroying
//! operation in this crate is charged against. The bytes themselves come
//! from the global allocator; the zone decides whether a request is allowed
//! and keeps the books, so a subsystem can bound and audit what its trees
//! hold. A tree built and destroyed against the same zone leaves it with
//! zero live bytes and zero live allocations.
//!
//! Counters are atomics, so independent trees can share a zone across
//! threads.

use crate::error::{Error, Result};
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

#[derive(Debug)]
pub struct Zone {
    name: String,
    limit: Option<usize>,
    fail_after: Option<usize>,
    live_bytes: AtomicUsize,
    live_allocations: AtomicUsize,
    total_allocations: AtomicUsize,
    refused: AtomicUsize,
    invalid_releases: AtomicUsize,
}

impl Default for Zone {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Zone {
    /// An unbounded zone.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            fail_after: None,
            live_bytes: AtomicUsize::new(0),
            live_allocations: AtomicUsize::new(0),
            total_allocations: AtomicUsize::new(0),
            refused: AtomicUsize::new(0),
            invalid_releases: AtomicUsize::new(0),
        }
    }

    /// A zone that refuses any request that would push live bytes over
    /// `limit`.
    pub fn with_limit(name: impl Into<String>, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(name)
        }
    }

    /// A zone that grants exactly `n` allocations (counting growth) and
    /// refuses everything after. Used to drive failure paths in tests.
    pub fn failing_after(name: impl Into<String>, n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allocate(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        tri!(self.admit(0, size));
        self.live_allocations.fetch_add(1, Relaxed);
        Ok(())
    }

    /// Grows or shrinks an existing charge. `old == 0` is an allocation and
    /// `new == 0` a release.
    pub fn reallocate(&self, old: usize, new: usize) -> Result<()> {
        match (old, new) {
            (0, n) => self.allocate(n),
            (o, 0) => {
                self.release(o);
                Ok(())
            }
            (o, n) if n <= o => {
                self.live_bytes.fetch_sub(o - n, Relaxed);
                Ok(())
            }
            (o, n) => self.admit(o, n),
        }
    }

    pub fn release(&self, size: usize) {
        if size == 0 {
            return;
        }
        let prev = self
            .live_bytes
            .fetch_update(Relaxed, Relaxed, |live| live.checked_sub(size));
        let counted = self
            .live_allocations
            .fetch_update(Relaxed, Relaxed, |n| n.checked_sub(1));
        if prev.is_err() || counted.is_err() {
            self.invalid_releases.fetch_add(1, Relaxed);
            tracing::error!(zone = %self.name, size, "release of memory the zone does not hold");
        }
    }

    // Charges `new - old` more bytes, counting the request against the
    // limit and the failure budget. Each check is done in the same atomic
    // update as its add.
    fn admit(&self, old: usize, new: usize) -> Result<()> {
        let grow = new - old;
        let fail_after = self.fail_after;
        let granted = self
            .total_allocations
            .fetch_update(Relaxed, Relaxed, |g| match fail_after {
                Some(n) if g >= n => None,
                _ => Some(g + 1),
            });
        if granted.is_err() {
            return Err(self.refuse(new));
        }
        let limit = self.limit;
        let charged = self.live_bytes.fetch_update(Relaxed, Relaxed, |live| {
            let next = live.checked_add(grow)?;
            match limit {
                Some(limit) if next > limit => None,
                _ => Some(next),
            }
        });
        if charged.is_err() {
            self.total_allocations.fetch_sub(1, Relaxed);
            return Err(self.refuse(new));
        }
        Ok(())
    }

    /// Counts a refused request of `requested` bytes and builds its error.
    pub(crate) fn refuse(&self, requested: usize) -> Error {
        self.refused.fetch_add(1, Relaxed);
        tracing::warn!(zone = %self.name, requested, "zone refused allocation");
        Error::AllocationFailure {
            zone: self.name.clone(),
            requested,
        }
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Relaxed)
    }
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Relaxed)
    }
    pub fn total_allocations(&self) -> usize {
        self.total_allocations.load(Relaxed)
    }
    pub fn refused(&self) -> usize {
        self.refused.load(Relaxed)
    }
    pub fn invalid_releases(&self) -> usize {
        self.invalid_releases.load(Relaxed)
    }

    /// True when nothing is live and nothing was released twice.
    pub fn is_balanced(&self) -> bool {
        self.live_bytes() == 0 && self.live_allocations() == 0 && self.invalid_releases() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_books_balance() {
        let z = Zone::new("t");
        z.allocate(10).unwrap();
        z.reallocate(10, 40).unwrap();
        z.allocate(0).unwrap();
        assert_eq!(z.live_bytes(), 40);
        assert_eq!(z.live_allocations(), 1);
        z.reallocate(40, 8).unwrap();
        z.release(8);
        assert!(z.is_balanced());
        assert_eq!(z.total_allocations(), 2);
    }

    #[test]
    fn test_limit() {
        let z = Zone::with_limit("small", 16);
        z.allocate(12).unwrap();
        let err = z.allocate(5).unwrap_err();
        assert!(err.is_allocation());
        assert!(err.to_string().contains("small"));
        assert_eq!(z.refused(), 1);
        assert!(z.reallocate(12, 17).is_err());
        assert_eq!(z.live_bytes(), 12);
        z.release(12);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_failing_after() {
        let z = Zone::failing_after("f", 2);
        z.allocate(1).unwrap();
        z.allocate(1).unwrap();
        assert!(z.allocate(1).is_err());
        // shrinking and releasing never fail
        z.reallocate(1, 0).unwrap();
        z.release(1);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_double_release_is_counted() {
        let z = Zone::new("d");
        z.allocate(4).unwrap();
        z.release(4);
        z.release(4);
        assert_eq!(z.invalid_releases(), 1);
        assert!(!z.is_balanced());
    }

    #[test]
    fn test_shared_limit_is_never_exceeded() {
        let z = Zone::with_limit("shared", 1000);
        let granted = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut held = 0;
                        for _ in 0..200 {
                            if z.allocate(7).is_ok() {
                                held += 1;
                            }
                            assert!(z.live_bytes() <= 1000);
                        }
                        held
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum::<usize>()
        });
        assert_eq!(granted, 1000 / 7);
        assert_eq!(z.live_bytes(), granted * 7);
        assert_eq!(z.total_allocations(), granted);
        for _ in 0..granted {
            z.release(7);
        }
        assert!(z.is_balanced());
    }

    #[test]
    fn test_shared_failure_budget_is_exact() {
        let z = Zone::failing_after("budget", 50);
        let granted = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..20).filter(|_| z.allocate(1).is_ok()).count()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum::<usize>()
        });
        assert_eq!(granted, 50);
        assert_eq!(z.total_allocations(), 50);
        assert_eq!(z.refused(), 8 * 20 - 50);
        for _ in 0..granted {
            z.release(1);
        }
        assert!(z.is_balanced());
    }
}
