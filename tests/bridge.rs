//! End-to-end tests: real HTTP/WebSocket server, in-memory controller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use conveyor_bridge::api::build_app;
use conveyor_bridge::app_state::AppState;
use conveyor_bridge::config::RelayTiming;
use conveyor_bridge::device::{DeviceHandle, DeviceLocator, LineTransport, SerialLink};
use conveyor_bridge::error::LocateError;
use conveyor_bridge::relay::ClientStatusMessage;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How each emulated controller behaves.
#[derive(Debug, Clone, Copy)]
enum Firmware {
    /// Answers `move` and `home` like the real conveyor.
    Conveyor,
    /// Reads commands and never answers.
    Silent,
    /// Hangs up before reading anything.
    Unplugged,
}

/// Hands out one emulated controller per `locate` call, following `plan`.
/// Once the plan is exhausted, no device is found.
#[derive(Debug)]
struct MemoryLocator {
    plan: Vec<Firmware>,
    calls: AtomicUsize,
}

impl MemoryLocator {
    fn new(plan: Vec<Firmware>) -> Arc<Self> {
        Arc::new(Self {
            plan,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceLocator for MemoryLocator {
    async fn locate(&self) -> Result<Box<dyn LineTransport>, LocateError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(firmware) = self.plan.get(n).copied() else {
            return Err(LocateError::DeviceNotFound { tried: 1 });
        };
        let (host, device) = tokio::io::duplex(1024);
        match firmware {
            Firmware::Conveyor => {
                tokio::spawn(conveyor_firmware(device));
            }
            Firmware::Silent => {
                tokio::spawn(silent_firmware(device));
            }
            Firmware::Unplugged => drop(device),
        }
        Ok(Box::new(SerialLink::new(
            host,
            format!("mem{n}"),
            Duration::from_millis(200),
        )))
    }
}

async fn conveyor_firmware(device: DuplexStream) {
    let mut device = BufReader::new(device);
    let mut line = String::new();
    loop {
        line.clear();
        match device.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let reply: &[&str] = match line.trim() {
            "move" => &["moving_1", "moving_2", "sequence_complete"],
            "home" => &["home_reached"],
            _ => &["error"],
        };
        for status in reply {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let framed = format!("{status}\r\n");
            if device.get_mut().write_all(framed.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

async fn silent_firmware(device: DuplexStream) {
    let mut device = BufReader::new(device);
    let mut line = String::new();
    while let Ok(n) = device.read_line(&mut line).await {
        if n == 0 {
            return;
        }
    }
}

fn fast_timing() -> RelayTiming {
    RelayTiming {
        response_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
        ..RelayTiming::default()
    }
}

async fn start(locator: Arc<MemoryLocator>) -> anyhow::Result<(SocketAddr, DeviceHandle)> {
    let device = DeviceHandle::new(locator as Arc<dyn DeviceLocator>);
    let app = build_app(AppState {
        device: device.clone(),
        timing: fast_timing(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok((addr, device))
}

async fn connect(addr: SocketAddr) -> anyhow::Result<Client> {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await?;
    Ok(ws)
}

async fn send_action(ws: &mut Client, action: &str) -> anyhow::Result<()> {
    let frame = format!(r#"{{"action":"{action}"}}"#);
    ws.send(Message::text(frame)).await?;
    Ok(())
}

async fn recv_status(ws: &mut Client) -> anyhow::Result<ClientStatusMessage> {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .context("no message within 5s")?
        .context("socket closed")??;
    Ok(serde_json::from_str(frame.to_text()?)?)
}

async fn expect_silence(ws: &mut Client) -> anyhow::Result<()> {
    if let Ok(frame) = tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
        bail!("unexpected frame: {frame:?}");
    }
    Ok(())
}

#[tokio::test]
async fn move_streams_progress_then_terminal() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Conveyor]);
    let (addr, _device) = start(Arc::clone(&locator)).await?;
    let mut ws = connect(addr).await?;

    send_action(&mut ws, "move_conveyor").await?;
    let first = recv_status(&mut ws).await?;
    let second = recv_status(&mut ws).await?;
    let last = recv_status(&mut ws).await?;

    ensure!(first.status == "moving_1" && first.position == Some(1));
    ensure!(second.status == "moving_2" && second.position == Some(2));
    ensure!(last.status == "sequence_complete");
    ensure!(last.position.is_none() && last.message.is_none());
    expect_silence(&mut ws).await?;

    send_action(&mut ws, "home").await?;
    ensure!(recv_status(&mut ws).await?.status == "home_reached");
    ensure!(locator.calls() == 1);
    Ok(())
}

#[tokio::test]
async fn missing_device_reports_not_connected() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(Vec::new());
    let (addr, _device) = start(Arc::clone(&locator)).await?;
    let mut ws = connect(addr).await?;

    send_action(&mut ws, "move_conveyor").await?;
    ensure!(recv_status(&mut ws).await? == ClientStatusMessage::not_connected());
    expect_silence(&mut ws).await?;

    // once at accept, once at command time
    ensure!(locator.calls() == 2);
    Ok(())
}

#[tokio::test]
async fn silent_device_times_out_once_and_stays_open() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Silent]);
    let (addr, device) = start(Arc::clone(&locator)).await?;
    let mut ws = connect(addr).await?;

    send_action(&mut ws, "move_conveyor").await?;
    ensure!(recv_status(&mut ws).await? == ClientStatusMessage::response_timeout());
    expect_silence(&mut ws).await?;

    ensure!(device.state() == conveyor_bridge::device::DeviceState::Open);
    ensure!(locator.calls() == 1);
    Ok(())
}

#[tokio::test]
async fn fault_triggers_rediscovery_on_next_command() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Unplugged, Firmware::Conveyor]);
    let (addr, _device) = start(Arc::clone(&locator)).await?;
    let mut ws = connect(addr).await?;

    send_action(&mut ws, "home").await?;
    ensure!(recv_status(&mut ws).await? == ClientStatusMessage::lost_connection());
    ensure!(locator.calls() == 1);

    send_action(&mut ws, "home").await?;
    ensure!(recv_status(&mut ws).await?.status == "home_reached");
    ensure!(locator.calls() == 2);
    Ok(())
}

#[tokio::test]
async fn bad_frames_are_ignored() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Conveyor]);
    let (addr, _device) = start(locator).await?;
    let mut ws = connect(addr).await?;

    ws.send(Message::text("not json")).await?;
    send_action(&mut ws, "spin").await?;
    expect_silence(&mut ws).await?;

    send_action(&mut ws, "home").await?;
    ensure!(recv_status(&mut ws).await?.status == "home_reached");
    Ok(())
}

#[tokio::test]
async fn concurrent_connections_do_not_interleave() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Conveyor]);
    let (addr, _device) = start(locator).await?;
    let mut a = connect(addr).await?;
    let mut b = connect(addr).await?;

    send_action(&mut a, "move_conveyor").await?;
    send_action(&mut b, "move_conveyor").await?;

    for ws in [&mut a, &mut b] {
        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(recv_status(ws).await?.status);
        }
        ensure!(
            statuses == ["moving_1", "moving_2", "sequence_complete"],
            "interleaved: {statuses:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn health_and_device_endpoints_report_state() -> anyhow::Result<()> {
    let locator = MemoryLocator::new(vec![Firmware::Conveyor]);
    let (addr, device) = start(locator).await?;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await?
        .json()
        .await?;
    ensure!(health["status"] == "healthy");
    ensure!(health["device"] == "absent");

    device.ensure_open().await?;
    let snapshot: serde_json::Value = reqwest::get(format!("http://{addr}/device"))
        .await?
        .json()
        .await?;
    ensure!(snapshot["state"] == "open");
    ensure!(snapshot["port"] == "mem0");

    let ports = reqwest::get(format!("http://{addr}/device/ports")).await?;
    ensure!(ports.status().is_success());
    let ports: serde_json::Value = ports.json().await?;
    ensure!(ports.as_array().is_some_and(Vec::is_empty));

    device.close().await;
    ensure!(device.state() == conveyor_bridge::device::DeviceState::Absent);
    Ok(())
}
