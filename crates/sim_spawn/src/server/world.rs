use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sim_spawn_proto::{
    ActorInfo, BlueprintInfo, FrameInfo, SimRequest, SimResponse, Transform,
    SIM_PROTOCOL_VERSION,
};

use crate::spawn::{glob_match, Pose};

pub(crate) const SERVER_NAME: &str = "sim_dev_server";

#[derive(Debug, Clone)]
struct SpawnedActor {
    blueprint_id: String,
    transform: Transform,
}

/// Server-side actor registry plus the counters tests inspect.
#[derive(Debug)]
pub(crate) struct ServerWorld {
    world_id: String,
    catalog: Vec<BlueprintInfo>,
    collision_radius: f64,
    refuse_spawns: bool,
    next_actor_id: u32,
    actors: BTreeMap<u32, SpawnedActor>,
    pub(crate) catalog_queries: usize,
    pub(crate) spawn_requests: usize,
    pub(crate) destroy_requests: BTreeMap<u32, u32>,
}

impl ServerWorld {
    pub(crate) fn new(
        world_id: String,
        catalog: Vec<BlueprintInfo>,
        collision_radius: f64,
        refuse_spawns: bool,
    ) -> Self {
        Self {
            world_id,
            catalog,
            collision_radius,
            refuse_spawns,
            next_actor_id: 0,
            actors: BTreeMap::new(),
            catalog_queries: 0,
            spawn_requests: 0,
            destroy_requests: BTreeMap::new(),
        }
    }

    pub(crate) fn live_actor_ids(&self) -> Vec<u32> {
        self.actors.keys().copied().collect()
    }

    pub(crate) fn handle(&mut self, request: SimRequest) -> SimResponse {
        match request {
            SimRequest::Hello { .. } => SimResponse::HelloAck {
                server: SERVER_NAME.to_string(),
                version: SIM_PROTOCOL_VERSION,
                world_id: self.world_id.clone(),
            },
            SimRequest::ListBlueprints { pattern } => {
                self.catalog_queries += 1;
                let blueprints = self
                    .catalog
                    .iter()
                    .filter(|blueprint| glob_match(&pattern, &blueprint.id))
                    .cloned()
                    .collect();
                SimResponse::Blueprints { blueprints }
            }
            SimRequest::SpawnActor {
                blueprint_id,
                transform,
            } => self.spawn(blueprint_id, transform),
            SimRequest::DestroyActor { actor_id } => {
                *self.destroy_requests.entry(actor_id).or_insert(0) += 1;
                let existed = self.actors.remove(&actor_id).is_some();
                SimResponse::ActorDestroyed { actor_id, existed }
            }
            SimRequest::WaitForTick => SimResponse::error(
                "unsupported",
                "wait_for_tick is served by the connection clock",
            ),
        }
    }

    fn spawn(&mut self, blueprint_id: String, transform: Transform) -> SimResponse {
        self.spawn_requests += 1;
        if Pose::try_from(transform).is_err() {
            return SimResponse::error("invalid_transform", "transform must be finite");
        }
        if self.refuse_spawns {
            return SimResponse::SpawnRefused {
                reason: "spawning disabled on this server".to_string(),
            };
        }
        if !self.catalog.iter().any(|blueprint| blueprint.id == blueprint_id) {
            return SimResponse::SpawnRefused {
                reason: format!("unknown blueprint `{blueprint_id}`"),
            };
        }
        if let Some((id, actor)) = self.actors.iter().find(|(_, actor)| {
            actor.transform.location.distance(&transform.location) < self.collision_radius
        }) {
            return SimResponse::SpawnRefused {
                reason: format!(
                    "collision with actor {id} ({}) at spawn position",
                    actor.blueprint_id
                ),
            };
        }

        self.next_actor_id += 1;
        let id = self.next_actor_id;
        self.actors.insert(
            id,
            SpawnedActor {
                blueprint_id: blueprint_id.clone(),
                transform,
            },
        );
        SimResponse::ActorSpawned {
            actor: ActorInfo {
                id,
                type_id: blueprint_id,
            },
        }
    }
}

/// Wall-clock frame counter: frame `n` starts `n * interval` after start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimClock {
    started: Instant,
    interval: Duration,
}

impl SimClock {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Sleeps until the next frame boundary and describes that frame.
    pub(crate) fn wait_next_frame(&self) -> FrameInfo {
        let interval_nanos = self.interval.as_nanos();
        let elapsed = self.started.elapsed();
        let frame = (elapsed.as_nanos() / interval_nanos) as u64 + 1;
        let boundary = Duration::from_nanos((interval_nanos * u128::from(frame)) as u64);
        std::thread::sleep(boundary.saturating_sub(elapsed));

        let platform_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_secs_f64())
            .unwrap_or_default();
        FrameInfo {
            frame,
            elapsed_seconds: boundary.as_secs_f64(),
            delta_seconds: self.interval.as_secs_f64(),
            platform_timestamp,
        }
    }
}
