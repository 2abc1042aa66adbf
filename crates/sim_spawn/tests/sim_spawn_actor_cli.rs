use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sim_spawn::{SimServer, SimServerConfig, SimServerStats};

const SIM_ENV: [&str; 4] = ["SIM_HOST", "SIM_PORT", "SIM_TIMEOUT_SECS", "SIM_BLUEPRINT"];

fn start_server(config: SimServerConfig) -> (u16, SimServerStats) {
    let server = SimServer::bind(config.with_bind_addr("127.0.0.1:0")).expect("bind server");
    let port = server.local_addr().expect("local addr").port();
    let stats = server.stats();
    thread::spawn(move || server.run());
    (port, stats)
}

fn controller(port: u16) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sim_spawn_actor"));
    for key in SIM_ENV {
        command.env_remove(key);
    }
    command.args([
        "--host",
        "127.0.0.1",
        "--port",
        &port.to_string(),
        "--timeout-secs",
        "5",
    ]);
    command
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[cfg(unix)]
#[test]
fn sigterm_exits_zero_after_one_destroy() {
    let (port, stats) =
        start_server(SimServerConfig::default().with_tick_interval(Duration::from_millis(10)));
    let mut child = controller(port)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("start sim_spawn_actor");

    let spawned = wait_until(Duration::from_secs(5), || stats.live_actor_ids().len() == 1);
    if !spawned {
        let _ = child.kill();
        panic!("controller never spawned an actor");
    }
    let actor_id = stats.live_actor_ids()[0];

    let kill = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("send SIGTERM");
    assert!(kill.success());

    let status = child.wait().expect("wait for controller");
    assert_eq!(status.code(), Some(0));
    assert_eq!(stats.spawn_requests(), 1);
    assert_eq!(stats.destroy_requests(actor_id), 1);
    assert_eq!(stats.total_destroy_requests(), 1);
    assert!(stats.live_actor_ids().is_empty());
}

#[test]
fn tick_limit_exits_zero() {
    let (port, stats) =
        start_server(SimServerConfig::default().with_tick_interval(Duration::from_millis(5)));
    let output = controller(port)
        .args(["--max-ticks", "3"])
        .output()
        .expect("run sim_spawn_actor");

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stats.spawn_requests(), 1);
    assert_eq!(stats.total_destroy_requests(), 1);
    assert!(stats.live_actor_ids().is_empty());
}

#[test]
fn empty_catalog_exits_one_without_spawning() {
    let (port, stats) = start_server(SimServerConfig::default().with_catalog(Vec::new()));
    let output = controller(port).output().expect("run sim_spawn_actor");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("resolve failed"));
    assert_eq!(stats.spawn_requests(), 0);
    assert_eq!(stats.total_destroy_requests(), 0);
}

#[test]
fn lost_connection_exits_one_after_cleanup_attempt() {
    let (port, stats) = start_server(
        SimServerConfig::default()
            .with_tick_interval(Duration::from_millis(5))
            .with_drop_after_ticks(Some(2)),
    );
    let output = controller(port).output().expect("run sim_spawn_actor");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("run failed"));
    assert_eq!(stats.spawn_requests(), 1);
}

#[test]
fn invalid_port_exits_two() {
    let output = controller(0).output().expect("run sim_spawn_actor");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"));
}

#[test]
fn non_finite_pose_exits_two() {
    let output = controller(2000)
        .args(["--yaw", "NaN"])
        .output()
        .expect("run sim_spawn_actor");

    assert_eq!(output.status.code(), Some(2));
}
