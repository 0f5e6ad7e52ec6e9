//! Scripted collaborators for engine tests.
//!
//! Each mock records the calls it receives so tests can assert on ordering
//! and counts, not just end states.

use std::cell::RefCell;
use std::collections::HashMap;

use upkeep_core::types::{ManagedService, Revision, ServiceName};

use crate::ops::{
    AssetPipeline, DependencyInstaller, MigrationRunner, OpError, ProcessManager, SourceError,
    SourceTree, UpdateFlagCache,
};

// ---------------------------------------------------------------------------
// Source tree
// ---------------------------------------------------------------------------

pub struct MockTree {
    pub local: &'static str,
    pub remote: &'static str,
    pub dirty: bool,
    pub fetch_network_error: Option<&'static str>,
    pub diverged: Option<&'static str>,
    pub snapshot_error: Option<&'static str>,
    pub fetches: RefCell<usize>,
    pub snapshots: RefCell<Vec<String>>,
    pub fast_forwards: RefCell<usize>,
}

impl MockTree {
    pub fn at(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            dirty: false,
            fetch_network_error: None,
            diverged: None,
            snapshot_error: None,
            fetches: RefCell::new(0),
            snapshots: RefCell::new(vec![]),
            fast_forwards: RefCell::new(0),
        }
    }

    pub fn behind() -> Self {
        Self::at("1111111", "2222222")
    }
}

impl SourceTree for MockTree {
    fn fetch_remote(&self) -> Result<(), SourceError> {
        *self.fetches.borrow_mut() += 1;
        match self.fetch_network_error {
            Some(msg) => Err(SourceError::Network(msg.to_string())),
            None => Ok(()),
        }
    }

    fn local_revision(&self) -> Result<Revision, SourceError> {
        Ok(Revision::from(self.local))
    }

    fn remote_revision(&self) -> Result<Revision, SourceError> {
        Ok(Revision::from(self.remote))
    }

    fn has_local_edits(&self) -> Result<bool, SourceError> {
        Ok(self.dirty)
    }

    fn snapshot_edits(&self, label: &str) -> Result<(), SourceError> {
        match self.snapshot_error {
            Some(msg) => Err(SourceError::Other(msg.to_string())),
            None => {
                self.snapshots.borrow_mut().push(label.to_string());
                Ok(())
            }
        }
    }

    fn fast_forward(&self) -> Result<(), SourceError> {
        *self.fast_forwards.borrow_mut() += 1;
        match self.diverged {
            Some(msg) => Err(SourceError::Diverged(msg.to_string())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Step commands
// ---------------------------------------------------------------------------

pub struct MockStep {
    pub detail: &'static str,
    pub fails: bool,
    pub calls: RefCell<usize>,
}

impl MockStep {
    pub fn passing(detail: &'static str) -> Self {
        Self {
            detail,
            fails: false,
            calls: RefCell::new(0),
        }
    }

    pub fn failing(detail: &'static str) -> Self {
        Self {
            detail,
            fails: true,
            calls: RefCell::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.borrow()
    }

    fn invoke(&self) -> Result<String, OpError> {
        *self.calls.borrow_mut() += 1;
        if self.fails {
            Err(OpError(self.detail.to_string()))
        } else {
            Ok(self.detail.to_string())
        }
    }
}

impl DependencyInstaller for MockStep {
    fn refresh(&self) -> Result<String, OpError> {
        self.invoke()
    }
}

impl MigrationRunner for MockStep {
    fn apply_pending(&self) -> Result<String, OpError> {
        self.invoke()
    }
}

impl AssetPipeline for MockStep {
    fn rebuild(&self) -> Result<String, OpError> {
        self.invoke()
    }
}

// ---------------------------------------------------------------------------
// Process manager
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockManager {
    /// Services whose start request errors outright.
    pub start_errors: Vec<&'static str>,
    /// Services that never report healthy, regardless of polling.
    pub never_healthy: Vec<&'static str>,
    /// Health polls a service needs before it reports running.
    pub healthy_after_polls: usize,
    pub stops: RefCell<Vec<String>>,
    pub straggler_kills: RefCell<Vec<String>>,
    pub starts: RefCell<Vec<String>>,
    pub polls: RefCell<HashMap<String, usize>>,
}

impl MockManager {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn poll_count(&self, service: &str) -> usize {
        self.polls.borrow().get(service).copied().unwrap_or(0)
    }
}

impl ProcessManager for MockManager {
    fn request_stop(&self, service: &ManagedService) -> Result<(), OpError> {
        self.stops.borrow_mut().push(service.name.0.clone());
        Ok(())
    }

    fn terminate_stragglers(&self, service: &ManagedService) -> Result<(), OpError> {
        self.straggler_kills.borrow_mut().push(service.name.0.clone());
        Ok(())
    }

    fn request_start(&self, service: &ManagedService) -> Result<(), OpError> {
        if self.start_errors.contains(&service.name.0.as_str()) {
            return Err(OpError(format!("unit {} not found", service.unit)));
        }
        self.starts.borrow_mut().push(service.name.0.clone());
        Ok(())
    }

    fn is_running(&self, service: &ManagedService) -> Result<bool, OpError> {
        let mut polls = self.polls.borrow_mut();
        let count = polls.entry(service.name.0.clone()).or_insert(0);
        *count += 1;
        if self.never_healthy.contains(&service.name.0.as_str()) {
            return Ok(false);
        }
        Ok(*count > self.healthy_after_polls)
    }
}

// ---------------------------------------------------------------------------
// Update flag cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockFlagCache {
    pub fails: bool,
    pub invalidations: RefCell<usize>,
}

impl UpdateFlagCache for MockFlagCache {
    fn invalidate(&self) -> Result<(), OpError> {
        *self.invalidations.borrow_mut() += 1;
        if self.fails {
            return Err(OpError("flag file is a directory".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn service(name: &str) -> ManagedService {
    ManagedService {
        name: ServiceName::from(name),
        unit: format!("{name}.service"),
        straggler_pattern: None,
        cache_dir: None,
    }
}
