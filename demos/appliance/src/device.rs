//! Device state shared by the control channel and the ingest listener.

use castline_control::{CommandOutcome, StatusProvider};
use castline_core::{Command, StatusItem, StatusTopLeft, StatusTopRight};
use castline_ingest::IngestEvents;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

pub struct Device {
    started: Instant,
    publishers: AtomicUsize,
    bytes_received: AtomicU64,
    streaming: AtomicBool,
    recording: AtomicBool,
    muted: AtomicBool,
    torch: AtomicBool,
    zoom: AtomicU32,
    scene: Mutex<String>,
}

impl Device {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            publishers: AtomicUsize::new(0),
            bytes_received: AtomicU64::new(0),
            streaming: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            torch: AtomicBool::new(false),
            zoom: AtomicU32::new(1.0f32.to_bits()),
            scene: Mutex::new("Main".to_string()),
        }
    }

    fn zoom(&self) -> f32 {
        f32::from_bits(self.zoom.load(Ordering::Relaxed))
    }

    fn scene(&self) -> String {
        self.scene
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_off(flag: &AtomicBool) -> &'static str {
        if flag.load(Ordering::Relaxed) { "On" } else { "Off" }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusProvider for Device {
    async fn get_status(&self) -> (StatusTopLeft, StatusTopRight) {
        let streaming = self.streaming.load(Ordering::Relaxed);
        let top_left = StatusTopLeft {
            stream: Some(if streaming {
                StatusItem::ok(format!("Live ({})", self.scene()))
            } else {
                StatusItem::ok("Offline")
            }),
            camera: Some(StatusItem::ok(format!(
                "Back, torch {}",
                Self::on_off(&self.torch)
            ))),
            mic: Some(if self.muted.load(Ordering::Relaxed) {
                StatusItem::failing("Muted")
            } else {
                StatusItem::ok("Built-in")
            }),
            zoom: Some(StatusItem::ok(format!("{:.1}x", self.zoom()))),
            ..Default::default()
        };

        let publishers = self.publishers.load(Ordering::Relaxed);
        let kilobytes = self.bytes_received.load(Ordering::Relaxed) / 1024;
        let top_right = StatusTopRight {
            rtmp_server: Some(StatusItem::ok(format!(
                "{publishers} publisher(s), {kilobytes} KB"
            ))),
            uptime: Some(StatusItem::ok(format!(
                "{}s",
                self.started.elapsed().as_secs()
            ))),
            recording: Some(StatusItem::ok(Self::on_off(&self.recording))),
            ..Default::default()
        };
        (top_left, top_right)
    }

    async fn execute(&self, command: Command) -> CommandOutcome {
        tracing::info!("device: {:?}", command);
        match command {
            Command::SetRecord(on) => self.recording.store(on, Ordering::Relaxed),
            Command::SetStream(on) => self.streaming.store(on, Ordering::Relaxed),
            Command::SetMute(on) => self.muted.store(on, Ordering::Relaxed),
            Command::SetTorch(on) => self.torch.store(on, Ordering::Relaxed),
            Command::SetZoom(x) => self.zoom.store(x.to_bits(), Ordering::Relaxed),
            Command::SetScene(name) => {
                *self.scene.lock().unwrap_or_else(PoisonError::into_inner) = name;
            }
        }
        CommandOutcome::Handled
    }
}

impl IngestEvents<Vec<u8>> for Device {
    fn on_listening(&self, port: u16) {
        tracing::info!("device: accepting publishers on port {}", port);
    }

    fn on_publish_start(&self) {
        self.publishers.fetch_add(1, Ordering::Relaxed);
    }

    fn on_publish_stop(&self) {
        // Starts and stops are paired per connection.
        self.publishers.fetch_sub(1, Ordering::Relaxed);
    }

    fn on_frame(&self, frame: Vec<u8>) {
        self.bytes_received
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_tracks_publishers_and_bytes() {
        let device = Device::new();
        device.on_publish_start();
        device.on_publish_start();
        device.on_frame(vec![0; 4096]);
        device.on_publish_stop();

        let (_, top_right) = device.get_status().await;
        assert_eq!(
            top_right.rtmp_server,
            Some(StatusItem::ok("1 publisher(s), 4 KB"))
        );
    }

    #[tokio::test]
    async fn commands_change_status() {
        let device = Device::new();
        assert_eq!(
            device.execute(Command::SetScene("Outro".into())).await,
            CommandOutcome::Handled
        );
        device.execute(Command::SetStream(true)).await;
        device.execute(Command::SetMute(true)).await;
        device.execute(Command::SetZoom(2.0)).await;

        let (top_left, _) = device.get_status().await;
        assert_eq!(top_left.stream, Some(StatusItem::ok("Live (Outro)")));
        assert_eq!(top_left.mic, Some(StatusItem::failing("Muted")));
        assert_eq!(top_left.zoom, Some(StatusItem::ok("2.0x")));
    }
}
