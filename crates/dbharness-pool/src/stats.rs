//! Pool usage snapshots

use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time checkout figures for one pool.
///
/// `idle` connections are parked in the pool, `active` ones are borrowed
/// by callers, and `waiting` counts callers currently blocked in
/// `ConnectionPool::get`. The shutdown sweep logs one of these per pool,
/// so [`fmt::Display`] renders the log form directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    idle: usize,
    active: usize,
    waiting: usize,
}

impl PoolStats {
    pub(crate) fn new(idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            idle,
            active,
            waiting,
        }
    }

    /// Connections currently in existence, parked or borrowed
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    /// Connections parked in the pool
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Connections borrowed by callers
    pub fn active(&self) -> usize {
        self.active
    }

    /// Callers blocked waiting for a connection
    pub fn waiting(&self) -> usize {
        self.waiting
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={}, active={}, idle={}, waiting={}",
            self.total(),
            self.active,
            self.idle,
            self.waiting
        )
    }
}
