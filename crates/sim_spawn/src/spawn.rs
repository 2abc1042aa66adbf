use std::fmt;

use sim_spawn_proto::{ActorInfo, BlueprintInfo, Location, Rotation, Transform};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ConnectionError, SimWorld, SpawnReply};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pose field `{field}` is not finite")]
pub struct PoseError {
    pub field: &'static str,
}

/// Validated spawn transform: location in world units, rotation in degrees,
/// every component finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    location: Location,
    rotation: Rotation,
}

impl Pose {
    pub fn new(location: Location, rotation: Rotation) -> Result<Self, PoseError> {
        let fields = [
            ("x", location.x),
            ("y", location.y),
            ("z", location.z),
            ("roll", rotation.roll),
            ("pitch", rotation.pitch),
            ("yaw", rotation.yaw),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(PoseError { field });
        }
        Ok(Self { location, rotation })
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn transform(&self) -> Transform {
        Transform {
            location: self.location,
            rotation: self.rotation,
        }
    }
}

impl TryFrom<Transform> for Pose {
    type Error = PoseError;

    fn try_from(value: Transform) -> Result<Self, Self::Error> {
        Pose::new(value.location, value.rotation)
    }
}

/// Exclusive reference to a spawned server-side actor. Not `Clone`:
/// destroying consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct ActorHandle {
    info: ActorInfo,
}

impl ActorHandle {
    pub(crate) fn new(info: ActorInfo) -> Self {
        Self { info }
    }

    pub fn id(&self) -> u32 {
        self.info.id
    }

    pub fn type_id(&self) -> &str {
        &self.info.type_id
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id={})", self.info.type_id, self.info.id)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no blueprint matches `{pattern}` ({catalog_size} catalog entries returned)")]
    NotFound {
        pattern: String,
        catalog_size: usize,
    },
    #[error("catalog query failed: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("invalid spawn pose: {0}")]
    InvalidPose(#[from] PoseError),
    #[error("server refused to spawn `{blueprint}`: {reason}")]
    Refused { blueprint: String, reason: String },
    #[error("spawn request failed: {0}")]
    Connection(#[from] ConnectionError),
}

/// Case-sensitive wildcard match: `*` spans any run of characters, `?`
/// exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&ch) if ch == '?' || ch == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '*')
}

/// Returns the first catalog entry whose id matches `pattern`.
///
/// Catalog order is whatever the server returns, so "first" is not stable
/// across server versions and says nothing about which blueprint is best.
pub fn resolve_blueprint<W: SimWorld + ?Sized>(
    world: &mut W,
    pattern: &str,
) -> Result<BlueprintInfo, ResolveError> {
    if pattern.is_empty() {
        return Err(ResolveError::NotFound {
            pattern: String::new(),
            catalog_size: 0,
        });
    }
    let catalog = world.query_catalog(pattern)?;
    let catalog_size = catalog.len();
    debug!(pattern, catalog_size, "catalog queried");

    match catalog
        .into_iter()
        .find(|blueprint| glob_match(pattern, &blueprint.id))
    {
        Some(blueprint) => {
            info!(pattern, blueprint = %blueprint.id, "blueprint resolved");
            Ok(blueprint)
        }
        None => Err(ResolveError::NotFound {
            pattern: pattern.to_string(),
            catalog_size,
        }),
    }
}

/// Spawns `blueprint` at `transform`. Non-finite transforms never reach
/// the server.
pub fn spawn_actor<W: SimWorld + ?Sized>(
    world: &mut W,
    blueprint: &BlueprintInfo,
    transform: Transform,
) -> Result<ActorHandle, SpawnError> {
    let pose = Pose::try_from(transform)?;
    match world.spawn(blueprint, &pose.transform())? {
        SpawnReply::Spawned(actor) => {
            info!(actor = %actor, "actor spawned");
            Ok(actor)
        }
        SpawnReply::Refused { reason } => {
            warn!(blueprint = %blueprint.id, %reason, "spawn refused");
            Err(SpawnError::Refused {
                blueprint: blueprint.id.clone(),
                reason,
            })
        }
    }
}
