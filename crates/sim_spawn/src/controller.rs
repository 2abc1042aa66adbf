use std::fmt;

use sim_spawn_proto::FrameInfo;
use thiserror::Error;
use tracing::info;

use crate::client::{ConnectionError, DestroyOutcome, Session, SimWorld};
use crate::config::{ConfigError, ControllerConfig};
use crate::guard::{ActorGuard, CleanupError};
use crate::spawn::{resolve_blueprint, spawn_actor, ResolveError, SpawnError};
use crate::tick::{CancelToken, StopReason, TickReport, TickSynchronizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Config,
    Connect,
    Resolve,
    Spawn,
    Run,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Config => "config",
            Phase::Connect => "connect",
            Phase::Resolve => "resolve",
            Phase::Spawn => "spawn",
            Phase::Run => "run",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `actor_id` and `cleanup` are `None` when the run was cancelled before
/// anything was spawned.
#[derive(Debug)]
pub struct RunReport {
    pub blueprint_id: String,
    pub actor_id: Option<u32>,
    pub ticks: u64,
    pub last_frame: Option<FrameInfo>,
    pub stop: StopReason,
    pub cleanup: Option<Result<DestroyOutcome, CleanupError>>,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connect(#[from] ConnectionError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("connection lost after {ticks} ticks: {source}")]
    ConnectionLost {
        source: ConnectionError,
        actor_id: u32,
        ticks: u64,
        cleanup: Result<DestroyOutcome, CleanupError>,
    },
}

impl ControllerError {
    pub fn phase(&self) -> Phase {
        match self {
            ControllerError::Config(_) => Phase::Config,
            ControllerError::Connect(_) => Phase::Connect,
            ControllerError::Resolve(_) => Phase::Resolve,
            ControllerError::Spawn(_) => Phase::Spawn,
            ControllerError::ConnectionLost { .. } => Phase::Run,
        }
    }
}

/// Connects, spawns one actor, follows server ticks until cancelled (or the
/// tick budget is spent) and destroys the actor on the way out.
pub fn run_controller(
    config: &ControllerConfig,
    cancel: &CancelToken,
) -> Result<RunReport, ControllerError> {
    config.validate()?;
    let session = Session::new(config.host.as_str(), config.port, config.timeout()?)?
        .with_poll_interval(config.poll_interval());
    info!(endpoint = %session.endpoint(), timeout = ?session.timeout(), "connecting");
    let mut world = session.connect()?;
    run_with_world(&mut world, config, cancel)
}

/// Lifecycle after the session is up. Setup errors return before anything
/// is spawned; once a handle exists every exit path goes through the guard.
/// A cancel raised during setup ends the run before the spawn request.
pub fn run_with_world<W: SimWorld + ?Sized>(
    world: &mut W,
    config: &ControllerConfig,
    cancel: &CancelToken,
) -> Result<RunReport, ControllerError> {
    let blueprint = resolve_blueprint(world, &config.blueprint)?;
    if cancel.is_cancelled() {
        info!(blueprint = %blueprint.id, "cancelled before spawn");
        return Ok(RunReport {
            blueprint_id: blueprint.id,
            actor_id: None,
            ticks: 0,
            last_frame: None,
            stop: StopReason::Cancelled,
            cleanup: None,
        });
    }
    let actor = spawn_actor(world, &blueprint, config.spawn_point)?;
    let actor_id = actor.id();

    let mut guard = ActorGuard::new(world, actor);
    let TickReport {
        ticks,
        last_frame,
        stop,
    } = TickSynchronizer::new(config.max_ticks).run(guard.world(), cancel);
    let cleanup = guard.release();

    match stop {
        StopReason::ConnectionLost(source) => Err(ControllerError::ConnectionLost {
            source,
            actor_id,
            ticks,
            cleanup,
        }),
        stop => Ok(RunReport {
            blueprint_id: blueprint.id,
            actor_id: Some(actor_id),
            ticks,
            last_frame,
            stop,
            cleanup: Some(cleanup),
        }),
    }
}
