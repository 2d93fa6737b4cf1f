// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Job` RPC service: authenticates the caller, allocates jailed
//! jobs with server-wide resource defaults, and routes Stop/Status/Logs
//! through the registry. Grounded on `internal/service/service.go` in
//! the original source.

use crate::auth::caller_cn;
use std::sync::Arc;
use std::time::Duration;
use tjob_core::{Doner, Job, JobConfig, JobError};
use tjob_follower::LogFollower;
use tjob_proto::job_server::Job as JobRpc;
use tjob_proto::{
    LogsRequest, LogsResponse, RunRequest, RunResponse, StatusRequest, StatusResponse,
    StopRequest, StopResponse,
};
use tjob_registry::{Registry, RegistryError};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

/// Server-wide resource defaults applied to every job, set once from CLI
/// flags at startup (`-cpu`, `-mem`, `-rbps`, `-wbps`, `-mnt` in the
/// original).
#[derive(Debug, Clone)]
pub struct ResourceDefaults {
    pub mnt: String,
    pub cpu_percent: u32,
    pub memory_mb: u32,
    pub read_bps: u64,
    pub write_bps: u64,
}

pub struct JobServer {
    defaults: ResourceDefaults,
    jail: Arc<dyn tjob_core::JailBuilder>,
    registry: Registry,
}

impl JobServer {
    pub fn new(defaults: ResourceDefaults, jail: Arc<dyn tjob_core::JailBuilder>) -> Self {
        Self {
            defaults,
            jail,
            registry: Registry::new(),
        }
    }

    fn lookup(&self, caller: &str, short_id: &str) -> Result<Arc<Job>, Status> {
        self.registry.get(caller, short_id).map_err(registry_status)
    }
}

fn registry_status(err: RegistryError) -> Status {
    match err {
        RegistryError::NotFound(id) => Status::not_found(format!("no job with id {id}")),
        RegistryError::Unauthorized(id) => {
            Status::permission_denied(format!("job {id} is not owned by this caller"))
        }
        RegistryError::DuplicateShortId(id) => {
            Status::already_exists(format!("short id {id} collides with an existing job"))
        }
    }
}

fn job_error_status(err: JobError) -> Status {
    match &err {
        JobError::NotStarted | JobError::AlreadyStarted => {
            Status::failed_precondition(err.to_string())
        }
        JobError::InvalidArgs(_) => Status::invalid_argument(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

fn system_time_to_timestamp(t: std::time::SystemTime) -> prost_types::Timestamp {
    let dur = t
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    prost_types::Timestamp {
        seconds: dur.as_secs() as i64,
        nanos: dur.subsec_nanos() as i32,
    }
}

fn duration_to_proto(d: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}

#[tonic::async_trait]
impl JobRpc for JobServer {
    #[tracing::instrument(skip(self, request))]
    async fn run(&self, request: Request<RunRequest>) -> Result<Response<RunResponse>, Status> {
        let caller = caller_cn(&request).map_err(Status::from)?;
        let req = request.into_inner();
        if req.path.is_empty() {
            return Err(Status::invalid_argument("path is required"));
        }

        let config = JobConfig {
            path: req.path,
            args: req.args,
            mnt: self.defaults.mnt.clone(),
            cpu_percent: self.defaults.cpu_percent,
            memory_mb: self.defaults.memory_mb,
            read_bps: self.defaults.read_bps,
            write_bps: self.defaults.write_bps,
        };
        let job = Job::new(config, Arc::clone(&self.jail));
        let short_id = self
            .registry
            .insert(caller, Arc::clone(&job))
            .map_err(registry_status)?;

        // On a start failure gRPC has no way to carry both a response
        // body and an error back to the caller in one unary call, unlike
        // the original's `(rr, err)` return; folding the short id into
        // the error message is the closest equivalent so the caller can
        // still query Status with it.
        if let Err(err) = job.start() {
            tracing::warn!(short_id, error = %err, "job start failed");
            return Err(Status::internal(format!(
                "job {short_id} start failed: {err}"
            )));
        }

        Ok(Response::new(RunResponse { id: short_id }))
    }

    #[tracing::instrument(skip(self, request))]
    async fn stop(&self, request: Request<StopRequest>) -> Result<Response<StopResponse>, Status> {
        let caller = caller_cn(&request).map_err(Status::from)?;
        let id = request.into_inner().id;
        let job = self.lookup(&caller, &id)?;
        job.stop().map_err(job_error_status)?;
        Ok(Response::new(StopResponse {}))
    }

    #[tracing::instrument(skip(self, request))]
    async fn status(
        &self,
        request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let caller = caller_cn(&request).map_err(Status::from)?;
        let id = request.into_inner().id;
        let job = self.lookup(&caller, &id)?;
        let status = job.status().map_err(job_error_status)?;

        Ok(Response::new(StatusResponse {
            pid: status.pid,
            cmd: status.cmd,
            started_at: status.started_at.map(system_time_to_timestamp),
            ran: Some(duration_to_proto(status.ran)),
            exit: status.stopped().then_some(status.exit),
            error: status.error.map(|e| e.to_string()).unwrap_or_default(),
        }))
    }

    type LogsStream = ReceiverStream<Result<LogsResponse, Status>>;

    #[tracing::instrument(skip(self, request))]
    async fn logs(
        &self,
        request: Request<LogsRequest>,
    ) -> Result<Response<Self::LogsStream>, Status> {
        let caller = caller_cn(&request).map_err(Status::from)?;
        let id = request.into_inner().id;
        let job = self.lookup(&caller, &id)?;
        let log_path = job
            .log_path()
            .ok_or_else(|| Status::failed_precondition("job has not started"))?;

        let doner: Arc<dyn Doner> = job;
        let mut follower =
            LogFollower::open(log_path, doner).map_err(|e| Status::internal(e.to_string()))?;
        let canceller = follower.canceller();

        let (tx, rx) = tokio::sync::mpsc::channel(4);

        // Watches for the client disconnecting (or the call's deadline
        // firing) independently of the blocking reader below, since that
        // reader may be parked inside a log-file-caught-up wait with
        // nothing forthcoming to wake it otherwise.
        let disconnect_watch = tx.clone();
        tokio::spawn(async move {
            disconnect_watch.closed().await;
            canceller.cancel();
        });

        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 1024];
            loop {
                match follower.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = buf[..n].to_vec();
                        if tx.blocking_send(Ok(LogsResponse { chunk })).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(Status::internal(e.to_string())));
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
