use std::collections::BTreeSet;

use sim_spawn_proto::{ActorInfo, BlueprintInfo, FrameInfo, Location, Rotation, Transform};

use crate::client::{ConnectionError, DestroyOutcome, SimWorld, SpawnReply};
use crate::spawn::ActorHandle;
use crate::tick::{CancelToken, TickError};

pub(crate) fn sample_transform() -> Transform {
    Transform {
        location: Location {
            x: -2900.0,
            y: 5.3,
            z: 0.1,
        },
        rotation: Rotation {
            roll: 0.0,
            pitch: 0.0,
            yaw: 90.0,
        },
    }
}

/// In-memory world that records every call made against it.
#[derive(Debug, Default)]
pub(crate) struct ScriptedWorld {
    pub catalog: Vec<BlueprintInfo>,
    pub catalog_queries: Vec<String>,
    pub refuse_spawn: Option<String>,
    pub spawn_calls: usize,
    pub last_spawn_transform: Option<Transform>,
    pub live_actors: BTreeSet<u32>,
    pub destroy_calls: Vec<u32>,
    pub fail_destroy: bool,
    pub tick_calls: u64,
    pub drop_after_ticks: Option<u64>,
    pub cancel_wait_after: Option<u64>,
    next_actor_id: u32,
    frame: u64,
}

impl ScriptedWorld {
    pub fn with_catalog(ids: &[&str]) -> Self {
        Self {
            catalog: ids.iter().map(|id| BlueprintInfo::new(*id)).collect(),
            next_actor_id: 100,
            ..Self::default()
        }
    }

    pub fn destroy_count(&self, actor_id: u32) -> usize {
        self.destroy_calls
            .iter()
            .filter(|id| **id == actor_id)
            .count()
    }

    /// Mints a handle the server never issued.
    pub fn forged_handle(actor_id: u32) -> ActorHandle {
        ActorHandle::new(ActorInfo {
            id: actor_id,
            type_id: "vehicle.forged".to_string(),
        })
    }
}

impl SimWorld for ScriptedWorld {
    fn query_catalog(&mut self, pattern: &str) -> Result<Vec<BlueprintInfo>, ConnectionError> {
        self.catalog_queries.push(pattern.to_string());
        Ok(self.catalog.clone())
    }

    fn spawn(
        &mut self,
        blueprint: &BlueprintInfo,
        transform: &Transform,
    ) -> Result<SpawnReply, ConnectionError> {
        self.spawn_calls += 1;
        self.last_spawn_transform = Some(*transform);
        if let Some(reason) = &self.refuse_spawn {
            return Ok(SpawnReply::Refused {
                reason: reason.clone(),
            });
        }
        self.next_actor_id += 1;
        self.live_actors.insert(self.next_actor_id);
        Ok(SpawnReply::Spawned(ActorHandle::new(ActorInfo {
            id: self.next_actor_id,
            type_id: blueprint.id.clone(),
        })))
    }

    fn destroy(&mut self, actor: ActorHandle) -> Result<DestroyOutcome, ConnectionError> {
        self.destroy_calls.push(actor.id());
        if self.fail_destroy {
            return Err(ConnectionError::Closed);
        }
        if self.live_actors.remove(&actor.id()) {
            Ok(DestroyOutcome::Destroyed)
        } else {
            Ok(DestroyOutcome::AlreadyGone)
        }
    }

    fn wait_for_tick(&mut self, cancel: &CancelToken) -> Result<FrameInfo, TickError> {
        if cancel.is_cancelled() {
            return Err(TickError::Cancelled);
        }
        if self.drop_after_ticks.is_some_and(|limit| self.frame >= limit) {
            return Err(ConnectionError::Closed.into());
        }
        if self.cancel_wait_after.is_some_and(|limit| self.frame >= limit) {
            return Err(TickError::Cancelled);
        }
        self.tick_calls += 1;
        self.frame += 1;
        Ok(FrameInfo {
            frame: self.frame,
            elapsed_seconds: self.frame as f64 * 0.05,
            delta_seconds: 0.05,
            platform_timestamp: 0.0,
        })
    }
}
