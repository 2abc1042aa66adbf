//! Client-side controller that spawns one actor on a remote simulation
//! server, follows the server's tick cadence and always removes the actor
//! again before the process exits.

pub mod client;
pub mod config;
pub mod controller;
pub mod guard;
pub mod logging;
pub mod server;
pub mod spawn;
pub mod tick;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{connect, ConnectionError, DestroyOutcome, Session, SimWorld, SpawnReply, World};
pub use config::{ConfigError, ControllerConfig};
pub use controller::{run_controller, run_with_world, ControllerError, Phase, RunReport};
pub use guard::{ActorGuard, CleanupError};
pub use server::{default_catalog, SimServer, SimServerConfig, SimServerError, SimServerStats};
pub use spawn::{
    glob_match, resolve_blueprint, spawn_actor, ActorHandle, Pose, PoseError, ResolveError,
    SpawnError,
};
pub use tick::{CancelToken, StopReason, TickError, TickReport, TickSynchronizer};

pub use sim_spawn_proto::{
    ActorInfo, BlueprintInfo, FrameInfo, Location, Rotation, Transform, SIM_PROTOCOL_VERSION,
};
