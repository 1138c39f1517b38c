//! The three ways to run the demo: both ends in one process, the native
//! host behind a WebSocket listener, or the UI connecting to such a host.

use crate::config::{DemoConfig, DeviceConfig};
use crate::device::SimulatedDevice;
use crate::native::NativeHost;
use crate::protocol::Channels;
use crate::screen::{LogToast, ScriptedLauncher};
use crate::ui::{battery_label, charging_label, UiClient};
use futures_util::StreamExt;
use platform_channel_core::{BinaryMessenger, LocalBridge};
use platform_channel_ws::WsMessenger;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// How long the UI waits for any single answer from the native end.
const UI_WAIT: Duration = Duration::from_secs(10);

/// A native host plus the simulated device behind it.
struct Native {
    host: NativeHost,
    device: Arc<SimulatedDevice>,
    script: tokio::task::JoinHandle<()>,
}

impl Native {
    fn start(messenger: Arc<dyn BinaryMessenger>, config: &DemoConfig) -> Self {
        let device = Arc::new(SimulatedDevice::new(
            config.device.battery_level,
            config.device.battery_scale,
            config.device.initial_status(),
        ));
        let launcher = Arc::new(ScriptedLauncher {
            dwell: config.screen.dwell(),
            rename_to: config.screen.rename_to.clone(),
            press_change: config.screen.press_change,
        });
        let host = NativeHost::create(
            messenger,
            &Channels::new(&config.bridge),
            device.clone(),
            device.clone(),
            launcher,
            Arc::new(LogToast),
        );
        let script = tokio::spawn(play_charging_script(device.clone(), config.device.clone()));
        Self {
            host,
            device,
            script,
        }
    }

    fn stop(self) {
        self.script.abort();
        tracing::debug!(
            "Stopping native host (status {:?}, charging listener: {})",
            self.device.status(),
            self.host.is_charging_subscribed()
        );
        self.host.destroy();
    }
}

/// Waits for a listener, then walks the device through the configured
/// statuses.
async fn play_charging_script(device: Arc<SimulatedDevice>, config: DeviceConfig) {
    let interval = config.event_interval();
    while device.subscriber_count() == 0 {
        tokio::time::sleep(interval).await;
    }
    for status in config.charging_script {
        tokio::time::sleep(interval).await;
        device.set_status(status);
    }
    tracing::debug!("Charging script finished");
}

/// Both ends over an in-process bridge.
pub async fn run_local(config: DemoConfig) -> anyhow::Result<()> {
    let bridge = LocalBridge::new(&config.bridge);
    let native = Native::start(Arc::new(bridge.native.clone()), &config);
    let outcome = drive_ui(Arc::new(bridge.ui.clone()), &config).await;
    native.stop();
    outcome
}

/// Native host: one host per accepted WebSocket connection.
pub async fn run_host(addr: SocketAddr, config: DemoConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let config = config.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, &config).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: &DemoConfig,
) -> anyhow::Result<()> {
    let (messenger, connection) = WsMessenger::accept(stream, &config.bridge).await?;
    tracing::debug!("New connection from {}", addr);

    let native = Native::start(Arc::new(messenger), config);
    let closed = connection.closed().await;
    native.stop();

    tracing::debug!("Connection closed: {}", addr);
    Ok(closed?)
}

/// UI end connecting to a host at `url`.
pub async fn run_ui(url: &str, config: DemoConfig) -> anyhow::Result<()> {
    let (messenger, connection) = WsMessenger::connect(url, &config.bridge).await?;
    tracing::info!("Connected to {}", url);
    let outcome = drive_ui(Arc::new(messenger), &config).await;
    connection.close().await;
    outcome
}

/// The scripted UI session: battery level, a few charging events, then the
/// second screen round trip.
async fn drive_ui(messenger: Arc<dyn BinaryMessenger>, config: &DemoConfig) -> anyhow::Result<()> {
    let (ui, mut results) = UiClient::new(messenger, &Channels::new(&config.bridge));

    tracing::info!("{}", battery_label(&ui.battery_level().await));

    let mut events = ui.charging_stream().await?;
    for _ in 0..config.ui.charging_events {
        match tokio::time::timeout(UI_WAIT, events.next()).await {
            Ok(Some(event)) => tracing::info!("{}", charging_label(&event)),
            Ok(None) => {
                tracing::info!("Charging stream ended");
                break;
            }
            Err(_) => {
                tracing::warn!("No charging event within {:?}", UI_WAIT);
                break;
            }
        }
    }
    events.cancel(None).await?;

    ui.open_page(Some(&config.ui.name)).await?;
    tracing::info!("Opened second screen with {:?}", config.ui.name);
    match tokio::time::timeout(UI_WAIT, results.recv()).await {
        Ok(Some(record)) => tracing::info!("Second screen returned {:?}", record.name),
        Ok(None) => tracing::warn!("Result channel closed"),
        Err(_) => tracing::warn!("No result within {:?}", UI_WAIT),
    }

    ui.close();
    Ok(())
}
