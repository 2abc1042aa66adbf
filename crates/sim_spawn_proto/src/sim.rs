use serde::{Deserialize, Serialize};

pub const SIM_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl BlueprintInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorInfo {
    pub id: u32,
    pub type_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame: u64,
    pub elapsed_seconds: f64,
    pub delta_seconds: f64,
    pub platform_timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimRequest {
    Hello {
        client: String,
        version: u32,
    },
    ListBlueprints {
        pattern: String,
    },
    SpawnActor {
        blueprint_id: String,
        transform: Transform,
    },
    DestroyActor {
        actor_id: u32,
    },
    WaitForTick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimResponse {
    HelloAck {
        server: String,
        version: u32,
        world_id: String,
    },
    Blueprints {
        blueprints: Vec<BlueprintInfo>,
    },
    ActorSpawned {
        actor: ActorInfo,
    },
    SpawnRefused {
        reason: String,
    },
    ActorDestroyed {
        actor_id: u32,
        existed: bool,
    },
    Tick {
        frame: FrameInfo,
    },
    Error {
        code: String,
        message: String,
    },
}

impl SimResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            SimResponse::HelloAck { .. } => "hello_ack",
            SimResponse::Blueprints { .. } => "blueprints",
            SimResponse::ActorSpawned { .. } => "actor_spawned",
            SimResponse::SpawnRefused { .. } => "spawn_refused",
            SimResponse::ActorDestroyed { .. } => "actor_destroyed",
            SimResponse::Tick { .. } => "tick",
            SimResponse::Error { .. } => "error",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        SimResponse::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

// Correlates a response with the request that produced it. A client that
// abandons a request (cancelled tick wait) drops stale frames by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub request: SimRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub response: SimResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_request_uses_snake_case_tag() {
        let frame = RequestFrame {
            id: 7,
            request: SimRequest::SpawnActor {
                blueprint_id: "vehicle.tesla.model3".to_string(),
                transform: Transform {
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
                },
            },
        };
        let value = serde_json::to_value(&frame).expect("serialize request");
        assert_eq!(value["id"], 7);
        assert_eq!(value["request"]["type"], "spawn_actor");
        assert_eq!(value["request"]["transform"]["rotation"]["yaw"], 90.0);

        let parsed: RequestFrame = serde_json::from_value(value).expect("deserialize request");
        assert_eq!(parsed.id, 7);
        assert!(matches!(
            parsed.request,
            SimRequest::SpawnActor { ref blueprint_id, .. } if blueprint_id == "vehicle.tesla.model3"
        ));
    }

    #[test]
    fn wait_for_tick_is_a_bare_tag() {
        let json = serde_json::to_string(&SimRequest::WaitForTick).expect("serialize");
        assert_eq!(json, r#"{"type":"wait_for_tick"}"#);
    }

    #[test]
    fn blueprint_tags_default_to_empty() {
        let parsed: BlueprintInfo =
            serde_json::from_str(r#"{"id":"vehicle.audi.a2"}"#).expect("deserialize blueprint");
        assert_eq!(parsed, BlueprintInfo::new("vehicle.audi.a2"));
        let json = serde_json::to_string(&parsed).expect("serialize blueprint");
        assert!(!json.contains("tags"));
    }

    #[test]
    fn destroyed_response_reports_existence() {
        let parsed: ResponseFrame = serde_json::from_str(
            r#"{"id":3,"response":{"type":"actor_destroyed","actor_id":12,"existed":false}}"#,
        )
        .expect("deserialize response");
        assert_eq!(
            parsed.response,
            SimResponse::ActorDestroyed {
                actor_id: 12,
                existed: false
            }
        );
        assert_eq!(parsed.response.kind(), "actor_destroyed");
    }

    #[test]
    fn location_distance_is_euclidean() {
        let a = Location {
            x: 0.0,
            y: 3.0,
            z: 0.0,
        };
        let b = Location {
            x: 4.0,
            y: 0.0,
            z: 0.0,
        };
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }
}
