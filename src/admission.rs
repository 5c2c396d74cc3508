// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Fleet-wide cap on attached clients.
//!
//! One counter covers clients sitting in the work queue and clients checked
//! out by workers; queue length alone says nothing about the latter. The
//! listener acquires a slot before enqueueing — a client refused here gets a
//! 503 and is never counted.

use std::sync::{Condvar, Mutex};

pub struct Admission {
    active: Mutex<usize>,
    space_available: Condvar,
    limit: usize,
}

impl Admission {
    pub fn new(limit: usize) -> Self {
        Self {
            active: Mutex::new(0),
            space_available: Condvar::new(),
            limit,
        }
    }

    /// Claims a slot for a newly accepted client. Returns `false` at the
    /// cap, leaving the counter untouched.
    pub fn try_acquire(&self) -> bool {
        let mut active = self.active.lock().unwrap();
        if *active >= self.limit {
            return false;
        }
        *active += 1;
        true
    }

    /// Releases a slot once the client socket is closed.
    pub fn release(&self) {
        let mut active = self.active.lock().unwrap();
        *active -= 1;
        self.space_available.notify_one();
    }

    pub fn active(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_the_limit() {
        let admission = Admission::new(2);
        assert!(admission.try_acquire());
        assert!(admission.try_acquire());
        assert!(!admission.try_acquire());
        assert_eq!(admission.active(), 2);
    }

    #[test]
    fn release_makes_room() {
        let admission = Admission::new(1);
        assert!(admission.try_acquire());
        assert!(!admission.try_acquire());
        admission.release();
        assert!(admission.try_acquire());
    }

    #[test]
    fn count_never_exceeds_limit_under_contention() {
        use std::sync::Arc;

        let admission = Arc::new(Admission::new(8));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let admission = admission.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    if admission.try_acquire() {
                        assert!(admission.active() <= 8);
                        admission.release();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("admission thread panicked");
        }
        assert_eq!(admission.active(), 0);
    }
}
