mod connection;
mod error;
mod session;

use sim_spawn_proto::{BlueprintInfo, FrameInfo, Transform};

use crate::spawn::ActorHandle;
use crate::tick::{CancelToken, TickError};

pub use error::ConnectionError;
pub use session::{connect, Session, World, DEFAULT_POLL_INTERVAL};

#[derive(Debug)]
pub enum SpawnReply {
    Spawned(ActorHandle),
    Refused { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed,
    /// The server no longer knew the actor. Treated as success.
    AlreadyGone,
}

/// Capabilities the controller needs from a simulation server.
///
/// Every call blocks until the server answers or the session timeout fires.
/// `wait_for_tick` additionally returns early once `cancel` is set.
pub trait SimWorld {
    fn query_catalog(&mut self, pattern: &str) -> Result<Vec<BlueprintInfo>, ConnectionError>;

    fn spawn(
        &mut self,
        blueprint: &BlueprintInfo,
        transform: &Transform,
    ) -> Result<SpawnReply, ConnectionError>;

    fn destroy(&mut self, actor: ActorHandle) -> Result<DestroyOutcome, ConnectionError>;

    fn wait_for_tick(&mut self, cancel: &CancelToken) -> Result<FrameInfo, TickError>;
}
