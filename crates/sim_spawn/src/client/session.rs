use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use sim_spawn_proto::{
    BlueprintInfo, FrameInfo, SimRequest, SimResponse, Transform, SIM_PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::{ConnectionError, DestroyOutcome, SimWorld, SpawnReply};
use crate::spawn::ActorHandle;
use crate::tick::{CancelToken, TickError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const CLIENT_NAME: &str = "sim_spawn";
const ACTOR_NOT_FOUND: &str = "actor_not_found";

/// Where and how long to wait. `connect` makes exactly one attempt.
#[derive(Debug, Clone)]
pub struct Session {
    host: String,
    port: u16,
    timeout: Duration,
    poll_interval: Duration,
}

impl Session {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConnectionError::InvalidEndpoint(
                "host must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(ConnectionError::InvalidEndpoint(
                "port must be in 1..=65535".to_string(),
            ));
        }
        if timeout.is_zero() {
            return Err(ConnectionError::InvalidEndpoint(
                "timeout must be positive".to_string(),
            ));
        }
        Ok(Self {
            host,
            port,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        if !poll_interval.is_zero() {
            self.poll_interval = poll_interval;
        }
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect(&self) -> Result<World, ConnectionError> {
        let endpoint = self.endpoint();
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| ConnectionError::Resolve {
                endpoint: endpoint.clone(),
                reason: err.to_string(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectionError::Resolve {
                endpoint,
                reason: "no addresses".to_string(),
            });
        }

        let stream = self.open_stream(&endpoint, &addrs)?;
        let mut connection = Connection::new(stream, self.timeout, self.poll_interval)?;

        let response = connection.call(
            "handshake",
            SimRequest::Hello {
                client: CLIENT_NAME.to_string(),
                version: SIM_PROTOCOL_VERSION,
            },
        )?;
        let (server, server_version, world_id) = match response {
            SimResponse::HelloAck {
                server,
                version,
                world_id,
            } => (server, version, world_id),
            SimResponse::Error { code, message } => {
                return Err(ConnectionError::Server { code, message })
            }
            other => return Err(ConnectionError::unexpected("handshake", other.kind())),
        };
        if server_version != SIM_PROTOCOL_VERSION {
            warn!(
                client_version = SIM_PROTOCOL_VERSION,
                server_version, "protocol version mismatch, continuing"
            );
        }
        info!(%endpoint, %server, %world_id, "connected to simulation server");

        Ok(World {
            connection,
            endpoint,
            server,
            server_version,
            world_id,
        })
    }

    fn open_stream(
        &self,
        endpoint: &str,
        addrs: &[SocketAddr],
    ) -> Result<TcpStream, ConnectionError> {
        let deadline = Instant::now().checked_add(self.timeout);
        let mut last_err: Option<io::Error> = None;
        for addr in addrs {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => self.timeout,
            };
            if remaining.is_zero() {
                break;
            }
            debug!(%addr, "connecting");
            match TcpStream::connect_timeout(addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) if err.kind() == io::ErrorKind::TimedOut => Err(ConnectionError::Timeout {
                operation: "connect",
                timeout: self.timeout,
            }),
            Some(source) => Err(ConnectionError::Unreachable {
                endpoint: endpoint.to_string(),
                source,
            }),
            None => Err(ConnectionError::Timeout {
                operation: "connect",
                timeout: self.timeout,
            }),
        }
    }
}

pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<World, ConnectionError> {
    Session::new(host, port, timeout)?.connect()
}

/// Live handle to the server's world, produced by a successful handshake.
pub struct World {
    connection: Connection,
    endpoint: String,
    server: String,
    server_version: u32,
    world_id: String,
}

impl World {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        if !poll_interval.is_zero() {
            self.connection.set_poll_interval(poll_interval);
        }
    }
}

impl SimWorld for World {
    fn query_catalog(&mut self, pattern: &str) -> Result<Vec<BlueprintInfo>, ConnectionError> {
        let response = self.connection.call(
            "list_blueprints",
            SimRequest::ListBlueprints {
                pattern: pattern.to_string(),
            },
        )?;
        match response {
            SimResponse::Blueprints { blueprints } => Ok(blueprints),
            SimResponse::Error { code, message } => Err(ConnectionError::Server { code, message }),
            other => Err(ConnectionError::unexpected("list_blueprints", other.kind())),
        }
    }

    fn spawn(
        &mut self,
        blueprint: &BlueprintInfo,
        transform: &Transform,
    ) -> Result<SpawnReply, ConnectionError> {
        let response = self.connection.call(
            "spawn_actor",
            SimRequest::SpawnActor {
                blueprint_id: blueprint.id.clone(),
                transform: *transform,
            },
        )?;
        match response {
            SimResponse::ActorSpawned { actor } => Ok(SpawnReply::Spawned(ActorHandle::new(actor))),
            SimResponse::SpawnRefused { reason } => Ok(SpawnReply::Refused { reason }),
            SimResponse::Error { code, message } => Err(ConnectionError::Server { code, message }),
            other => Err(ConnectionError::unexpected("spawn_actor", other.kind())),
        }
    }

    fn destroy(&mut self, actor: ActorHandle) -> Result<DestroyOutcome, ConnectionError> {
        let actor_id = actor.id();
        let response = self
            .connection
            .call("destroy_actor", SimRequest::DestroyActor { actor_id })?;
        match response {
            SimResponse::ActorDestroyed { existed: true, .. } => Ok(DestroyOutcome::Destroyed),
            SimResponse::ActorDestroyed { existed: false, .. } => Ok(DestroyOutcome::AlreadyGone),
            SimResponse::Error { code, .. } if code == ACTOR_NOT_FOUND => {
                Ok(DestroyOutcome::AlreadyGone)
            }
            SimResponse::Error { code, message } => Err(ConnectionError::Server { code, message }),
            other => Err(ConnectionError::unexpected("destroy_actor", other.kind())),
        }
    }

    fn wait_for_tick(&mut self, cancel: &CancelToken) -> Result<FrameInfo, TickError> {
        let response =
            self.connection
                .call_cancellable("wait_for_tick", SimRequest::WaitForTick, cancel)?;
        match response {
            None => Err(TickError::Cancelled),
            Some(SimResponse::Tick { frame }) => Ok(frame),
            Some(SimResponse::Error { code, message }) => {
                Err(ConnectionError::Server { code, message }.into())
            }
            Some(other) => Err(ConnectionError::unexpected("wait_for_tick", other.kind()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{SimServer, SimServerConfig};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn session_rejects_invalid_endpoints() {
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            Session::new("", 2000, timeout),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Session::new("127.0.0.1", 0, timeout),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Session::new("127.0.0.1", 2000, Duration::ZERO),
            Err(ConnectionError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn connect_to_closed_port_fails_once() {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .expect("free port");

        let err = match connect("127.0.0.1", port, Duration::from_millis(500)) {
            Ok(_) => panic!("nothing listens on the port"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            ConnectionError::Unreachable { .. } | ConnectionError::Timeout { .. }
        ));
    }

    #[test]
    fn huge_timeout_connects_and_calls() {
        let server = SimServer::bind(SimServerConfig::default().with_bind_addr("127.0.0.1:0"))
            .expect("bind server");
        let port = server.local_addr().expect("server addr").port();
        thread::spawn(move || server.run());

        let mut world = connect("127.0.0.1", port, Duration::from_secs_f64(1e19))
            .expect("connect with huge timeout");
        let catalog = world.query_catalog("vehicle.*").expect("catalog");
        assert!(!catalog.is_empty());
    }

    #[test]
    fn handshake_is_bounded_by_session_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let holder = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(600));
            drop(stream);
        });

        let started = Instant::now();
        let err = match connect("127.0.0.1", port, Duration::from_millis(200)) {
            Ok(_) => panic!("silent server must not complete the handshake"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            ConnectionError::Timeout {
                operation: "handshake",
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_millis(550));
        holder.join().expect("holder exit");
    }
}
