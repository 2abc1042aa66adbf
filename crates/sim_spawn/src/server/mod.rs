//! Development server speaking the simulation wire protocol. It keeps an
//! actor registry and a wall-clock frame counter; there is no physics.

mod world;

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use sim_spawn_proto::{BlueprintInfo, RequestFrame, ResponseFrame, SimRequest, SimResponse};
use thiserror::Error;
use tracing::{debug, info, warn};

use world::{ServerWorld, SimClock};

#[derive(Debug, Clone)]
pub struct SimServerConfig {
    pub bind_addr: String,
    pub world_id: String,
    pub tick_interval: Duration,
    pub catalog: Vec<BlueprintInfo>,
    pub collision_radius: f64,
    pub refuse_spawns: bool,
    /// Close each connection instead of answering the tick wait after this
    /// many ticks.
    pub drop_after_ticks: Option<u64>,
}

impl Default for SimServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:2000".to_string(),
            world_id: "dev-world".to_string(),
            tick_interval: Duration::from_millis(50),
            catalog: default_catalog(),
            collision_radius: 2.0,
            refuse_spawns: false,
            drop_after_ticks: None,
        }
    }
}

impl SimServerConfig {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_world_id(mut self, world_id: impl Into<String>) -> Self {
        self.world_id = world_id.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_catalog(mut self, catalog: Vec<BlueprintInfo>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_refuse_spawns(mut self, refuse: bool) -> Self {
        self.refuse_spawns = refuse;
        self
    }

    pub fn with_drop_after_ticks(mut self, ticks: Option<u64>) -> Self {
        self.drop_after_ticks = ticks;
        self
    }
}

pub fn default_catalog() -> Vec<BlueprintInfo> {
    vec![
        BlueprintInfo::new("vehicle.audi.a2").with_tags(["vehicle", "car", "audi"]),
        BlueprintInfo::new("vehicle.tesla.model3").with_tags(["vehicle", "car", "tesla"]),
        BlueprintInfo::new("vehicle.lincoln.mkz_2017").with_tags(["vehicle", "car", "lincoln"]),
        BlueprintInfo::new("vehicle.carlamotors.firetruck").with_tags(["vehicle", "truck"]),
        BlueprintInfo::new("walker.pedestrian.0001").with_tags(["walker", "pedestrian"]),
        BlueprintInfo::new("static.prop.streetbarrier").with_tags(["static", "prop"]),
        BlueprintInfo::new("sensor.camera.rgb").with_tags(["sensor", "camera"]),
    ]
}

#[derive(Debug, Error)]
pub enum SimServerError {
    #[error("server i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode response: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("server state lock poisoned")]
    Poisoned,
}

/// Read-only view of the server's bookkeeping.
#[derive(Debug, Clone)]
pub struct SimServerStats {
    state: Arc<Mutex<ServerWorld>>,
}

impl SimServerStats {
    fn lock(&self) -> MutexGuard<'_, ServerWorld> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog_queries(&self) -> usize {
        self.lock().catalog_queries
    }

    pub fn spawn_requests(&self) -> usize {
        self.lock().spawn_requests
    }

    pub fn destroy_requests(&self, actor_id: u32) -> u32 {
        self.lock()
            .destroy_requests
            .get(&actor_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_destroy_requests(&self) -> u32 {
        self.lock().destroy_requests.values().sum()
    }

    pub fn live_actor_ids(&self) -> Vec<u32> {
        self.lock().live_actor_ids()
    }
}

pub struct SimServer {
    config: SimServerConfig,
    listener: TcpListener,
    state: Arc<Mutex<ServerWorld>>,
    clock: SimClock,
}

impl SimServer {
    pub fn bind(config: SimServerConfig) -> Result<Self, SimServerError> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        let state = ServerWorld::new(
            config.world_id.clone(),
            config.catalog.clone(),
            config.collision_radius,
            config.refuse_spawns,
        );
        let clock = SimClock::new(config.tick_interval);
        Ok(Self {
            config,
            listener,
            state: Arc::new(Mutex::new(state)),
            clock,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SimServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> SimServerStats {
        SimServerStats {
            state: Arc::clone(&self.state),
        }
    }

    /// Accepts connections forever, one thread per client.
    pub fn run(&self) -> Result<(), SimServerError> {
        info!(addr = ?self.listener.local_addr().ok(), "simulation server listening");
        for incoming in self.listener.incoming() {
            let stream = incoming?;
            let connection = ServerConnection {
                state: Arc::clone(&self.state),
                clock: self.clock,
                drop_after_ticks: self.config.drop_after_ticks,
            };
            thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(err) = connection.serve(stream) {
                    warn!(?peer, error = %err, "connection ended with error");
                }
            });
        }
        Ok(())
    }
}

struct ServerConnection {
    state: Arc<Mutex<ServerWorld>>,
    clock: SimClock,
    drop_after_ticks: Option<u64>,
}

impl ServerConnection {
    fn serve(&self, stream: TcpStream) -> Result<(), SimServerError> {
        stream.set_nodelay(true)?;
        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || read_requests(reader_stream, tx));

        let mut ticks_sent = 0u64;
        while let Ok(incoming) = rx.recv() {
            let frame = match incoming {
                Ok(frame) => frame,
                Err(message) => {
                    send_response(
                        &mut writer,
                        &ResponseFrame {
                            id: 0,
                            response: SimResponse::error("malformed_request", message),
                        },
                    )?;
                    continue;
                }
            };

            let response = match frame.request {
                SimRequest::WaitForTick => {
                    if self
                        .drop_after_ticks
                        .is_some_and(|limit| ticks_sent >= limit)
                    {
                        info!(ticks_sent, "dropping connection");
                        writer.get_ref().shutdown(Shutdown::Both)?;
                        return Ok(());
                    }
                    ticks_sent += 1;
                    SimResponse::Tick {
                        frame: self.clock.wait_next_frame(),
                    }
                }
                request => {
                    let mut state = self.state.lock().map_err(|_| SimServerError::Poisoned)?;
                    state.handle(request)
                }
            };
            debug!(id = frame.id, kind = response.kind(), "response");
            send_response(
                &mut writer,
                &ResponseFrame {
                    id: frame.id,
                    response,
                },
            )?;
        }
        Ok(())
    }
}

fn read_requests(stream: TcpStream, tx: mpsc::Sender<Result<RequestFrame, String>>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let parsed =
                    serde_json::from_str::<RequestFrame>(trimmed).map_err(|err| err.to_string());
                if tx.send(parsed).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn send_response(
    writer: &mut BufWriter<TcpStream>,
    response: &ResponseFrame,
) -> Result<(), SimServerError> {
    serde_json::to_writer(&mut *writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
