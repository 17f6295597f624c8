// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scoped in-flight counter.
//!
//! The counter is decremented when the guard drops, so a panic or a dropped
//! future cannot leave it raised.

use std::sync::atomic::{AtomicI64, Ordering};

pub(crate) struct InFlight<'a> {
    counter: &'a AtomicI64,
    gauge: Option<&'static str>,
    current: i64,
}

impl<'a> InFlight<'a> {
    /// Increment `counter` and mirror the new value to `gauge` when given.
    pub(crate) fn enter(counter: &'a AtomicI64, gauge: Option<&'static str>) -> Self {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(name) = gauge {
            metrics::gauge!(name).set(current as f64);
        }
        Self { counter, gauge, current }
    }

    /// Value of the counter right after this guard entered.
    pub(crate) fn current(&self) -> i64 {
        self.current
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(name) = self.gauge {
            metrics::gauge!(name).set(remaining as f64);
        }
    }
}
