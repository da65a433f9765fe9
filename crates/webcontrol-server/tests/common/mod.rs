#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use webcontrol_proto::config::DownloadConfig;
use webcontrol_server::headless::{HeadlessImporter, HeadlessPermissions};
use webcontrol_server::logging::log_feed;
use webcontrol_server::{
    ConnectionServer, ContentRoots, DownloadManager, Host, Playback, TaskQueue,
};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Playback double that behaves like a clip `duration` seconds long,
/// currently at `position`.
pub struct ScriptedPlayer {
    pub state: Arc<Mutex<PlayerState>>,
}

#[derive(Debug, Default, Clone)]
pub struct PlayerState {
    pub playing: Option<String>,
    pub position: f64,
    pub duration: Option<f64>,
    pub immersive: bool,
}

impl Playback for ScriptedPlayer {
    fn play(&mut self, path: &str) -> anyhow::Result<()> {
        let mut s = self.state.lock();
        s.playing = Some(path.to_string());
        s.position = 0.0;
        Ok(())
    }
    fn pause(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    fn resume(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    fn seek(&mut self, seconds: f64) -> anyhow::Result<()> {
        self.state.lock().position = seconds;
        Ok(())
    }
    fn set_mode(&mut self, immersive: bool) -> anyhow::Result<()> {
        self.state.lock().immersive = immersive;
        Ok(())
    }
    fn mode(&self) -> bool {
        self.state.lock().immersive
    }
    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }
    fn is_seekable(&self) -> bool {
        self.state.lock().playing.is_some()
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub roots: Arc<ContentRoots>,
    pub queue: Arc<TaskQueue<Host>>,
    pub host: Host,
    pub player: Arc<Mutex<PlayerState>>,
    pub server: ConnectionServer,
    pub addr: SocketAddr,
}

impl Harness {
    pub async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let roots = Arc::new(ContentRoots {
            videos: tmp.path().join("videos"),
            models: tmp.path().join("models"),
            browse_root: tmp.path().to_path_buf(),
            extra_folders: Vec::new(),
            stream_urls: Vec::new(),
            scan_depth: 3,
        });
        std::fs::create_dir_all(&roots.videos).unwrap();
        std::fs::create_dir_all(&roots.models).unwrap();

        let queue: Arc<TaskQueue<Host>> = Arc::new(TaskQueue::new());
        let downloads =
            Arc::new(DownloadManager::new(&DownloadConfig::default(), roots.clone()).unwrap());

        let player = Arc::new(Mutex::new(PlayerState::default()));
        let host = Host::new(
            Box::new(ScriptedPlayer {
                state: player.clone(),
            }),
            Box::new(HeadlessImporter::default()),
            Box::new(HeadlessPermissions),
        );

        let mut server = ConnectionServer::new(queue.clone(), roots.clone(), downloads, log_feed());
        let addr = server.start("127.0.0.1:0").await.unwrap();

        Self {
            tmp,
            roots,
            queue,
            host,
            player,
            server,
            addr,
        }
    }

    pub async fn connect(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        // Wait until the server side has registered the socket
        for _ in 0..100 {
            if self.server.open_connections() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ws
    }

    /// One frame tick.
    pub fn tick(&mut self) -> usize {
        self.queue.drain_and_run_once(&mut self.host)
    }

    /// Tick frames until the client receives a non-log response, or `wait`
    /// elapses.  `None` on timeout or close.
    pub async fn next_response(&mut self, ws: &mut Client, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            self.tick();
            match tokio::time::timeout(Duration::from_millis(20), ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == "debugLog" {
                        continue;
                    }
                    return Some(value);
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return None,
                Ok(Some(Ok(_))) | Err(_) => continue,
            }
        }
        None
    }
}

pub async fn send(ws: &mut Client, frame: &str) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(300);
