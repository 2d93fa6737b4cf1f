// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tjob-registry`: the authenticated, multi-tenant map from a job's
//! short ID to its owning caller's certificate CN and the `Job` itself.
//! Every lookup is owner-scoped; a caller can only ever see jobs it
//! started.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tjob_core::{Job, JobId};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no job with id {0}")]
    NotFound(String),

    #[error("job {0} is not owned by this caller")]
    Unauthorized(String),

    #[error("short id {0} collides with an existing job")]
    DuplicateShortId(String),
}

struct Entry {
    owner_cn: String,
    job: Arc<Job>,
}

/// In-memory registry of running and recently finished jobs, keyed by
/// their externally visible short ID.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created job under `owner_cn`. Fails if the job's
    /// short ID collides with one already registered, which the caller
    /// should treat as transient (retry with a newly constructed job —
    /// short IDs are UUID prefixes, so collisions are rare but not
    /// impossible).
    pub fn insert(&self, owner_cn: String, job: Arc<Job>) -> Result<String, RegistryError> {
        let short_id = job.id().short_id().to_string();
        let mut entries = self.entries.write();
        if entries.contains_key(&short_id) {
            return Err(RegistryError::DuplicateShortId(short_id));
        }
        tracing::info!(short_id, owner = owner_cn, "job registered");
        entries.insert(short_id.clone(), Entry { owner_cn, job });
        Ok(short_id)
    }

    /// Look up a job by short ID, scoped to `caller_cn`. Returns
    /// [`RegistryError::Unauthorized`] (not `NotFound`) if the job exists
    /// but belongs to someone else, so a caller can't distinguish
    /// "doesn't exist" from "exists but isn't yours" by timing or error
    /// shape alone.
    pub fn get(&self, caller_cn: &str, short_id: &str) -> Result<Arc<Job>, RegistryError> {
        let entries = self.entries.read();
        let entry = entries
            .get(short_id)
            .ok_or_else(|| RegistryError::NotFound(short_id.to_string()))?;
        if entry.owner_cn != caller_cn {
            return Err(RegistryError::Unauthorized(short_id.to_string()));
        }
        Ok(Arc::clone(&entry.job))
    }

    /// Full ID of a registered job, for diagnostics/logging only — never
    /// returned to RPC callers, who only ever see the short form.
    pub fn full_id(&self, short_id: &str) -> Option<JobId> {
        self.entries
            .read()
            .get(short_id)
            .map(|entry| entry.job.id().clone())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;