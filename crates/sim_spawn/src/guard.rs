use thiserror::Error;
use tracing::{error, info};

use crate::client::{ConnectionError, DestroyOutcome, SimWorld};
use crate::spawn::ActorHandle;

#[derive(Debug, Error)]
#[error("failed to destroy actor {actor_id}: {source}")]
pub struct CleanupError {
    pub actor_id: u32,
    #[source]
    pub source: ConnectionError,
}

/// Owns a spawned actor and destroys it exactly once when released or
/// dropped, whichever comes first. Panics unwinding through the guard still
/// trigger the destroy.
pub struct ActorGuard<'w, W: SimWorld + ?Sized> {
    world: &'w mut W,
    actor: Option<ActorHandle>,
}

impl<'w, W: SimWorld + ?Sized> ActorGuard<'w, W> {
    pub fn new(world: &'w mut W, actor: ActorHandle) -> Self {
        Self {
            world,
            actor: Some(actor),
        }
    }

    pub fn world(&mut self) -> &mut W {
        &mut *self.world
    }

    pub fn actor(&self) -> Option<&ActorHandle> {
        self.actor.as_ref()
    }

    /// Destroys the actor now. Never fails the caller: a destroy error comes
    /// back as a value and has already been logged.
    pub fn release(mut self) -> Result<DestroyOutcome, CleanupError> {
        self.destroy_once().unwrap_or(Ok(DestroyOutcome::AlreadyGone))
    }

    fn destroy_once(&mut self) -> Option<Result<DestroyOutcome, CleanupError>> {
        let actor = self.actor.take()?;
        let actor_id = actor.id();
        let result = self.world.destroy(actor);
        Some(match result {
            Ok(DestroyOutcome::Destroyed) => {
                info!(actor_id, "actor destroyed");
                Ok(DestroyOutcome::Destroyed)
            }
            Ok(DestroyOutcome::AlreadyGone) => {
                info!(actor_id, "actor already gone on server");
                Ok(DestroyOutcome::AlreadyGone)
            }
            Err(source) => {
                error!(actor_id, error = %source, "actor cleanup failed");
                Err(CleanupError { actor_id, source })
            }
        })
    }
}

impl<W: SimWorld + ?Sized> Drop for ActorGuard<'_, W> {
    fn drop(&mut self) {
        let _ = self.destroy_once();
    }
}
