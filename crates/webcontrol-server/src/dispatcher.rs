//! Command dispatcher
//!
//! Turns decoded commands into frame tasks.  Every collaborator call happens
//! inside a task on the frame thread; the dispatcher itself only touches the
//! queue, the content roots and the download manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use webcontrol_proto::protocol::{
    decode_command, Command, DecodeError, DownloadState, ModeRequest, Response, MODEL_EXTENSIONS,
    VIDEO_EXTENSIONS,
};

use crate::connection::{ConnectionRegistry, Reply};
use crate::download::{DownloadEvent, DownloadManager, DownloadRequest};
use crate::filesystem::{browse_folder, list_with_extras, scan_tree, ContentKind, ContentRoots};
use crate::host::{clamp_seek, Host};
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<TaskQueue<Host>>,
    roots: Arc<ContentRoots>,
    downloads: Arc<DownloadManager>,
    registry: Arc<ConnectionRegistry>,
}

fn report(action: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        error!("{} failed: {:#}", action, e);
    }
}

impl Dispatcher {
    pub fn new(
        queue: Arc<TaskQueue<Host>>,
        roots: Arc<ContentRoots>,
        downloads: Arc<DownloadManager>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            queue,
            roots,
            downloads,
            registry,
        }
    }

    /// Decode one inbound frame and dispatch it.  Undecodable or invalid
    /// frames are logged and dropped; nothing is sent back.
    pub fn handle_frame(&self, data: &[u8], reply: &Reply) {
        match decode_command(data) {
            Ok(command) => {
                debug!("Connection {} sent {}", reply.connection(), command.action());
                self.handle(command, reply);
            }
            Err(DecodeError::UnknownAction(action)) => {
                info!(
                    "Connection {} sent unknown action {:?}, ignored",
                    reply.connection(),
                    action
                );
            }
            Err(e) => {
                warn!("Connection {}: dropping frame: {}", reply.connection(), e);
            }
        }
    }

    pub fn handle(&self, command: Command, reply: &Reply) {
        match command {
            Command::Play { path } => self.queue.push("play", move |host: &mut Host| {
                info!("Playing {}", path);
                report("play", host.playback.play(&path));
            }),

            Command::Pause => self.queue.push("pause", |host: &mut Host| {
                report("pause", host.playback.pause());
            }),

            Command::Resume => self.queue.push("resume", |host: &mut Host| {
                report("resume", host.playback.resume());
            }),

            Command::ToggleMode { mode } => self.queue.push("toggleMode", move |host: &mut Host| {
                let immersive = match mode {
                    ModeRequest::Set(flag) => flag,
                    ModeRequest::Toggle => !host.playback.mode(),
                };
                debug!("Switching immersive mode to {}", immersive);
                report("toggleMode", host.playback.set_mode(immersive));
            }),

            Command::Seek { seconds } => self.queue.push("seek", move |host: &mut Host| {
                if !host.playback.is_seekable() {
                    debug!("seek to {} ignored: source is not seekable", seconds);
                    return;
                }
                let target = clamp_seek(seconds, host.playback.duration());
                report("seek", host.playback.seek(target));
            }),

            Command::ListVideos => {
                let roots = self.roots.clone();
                let reply = reply.clone();
                self.queue.push("listVideos", move |_: &mut Host| {
                    let files = list_with_extras(&roots.videos, VIDEO_EXTENSIONS, &roots.stream_urls);
                    reply.send(Response::VideoList { files });
                });
            }

            Command::ListGlbs => {
                let roots = self.roots.clone();
                let reply = reply.clone();
                self.queue.push("listGLBs", move |_: &mut Host| {
                    let files = list_with_extras(&roots.models, MODEL_EXTENSIONS, &[]);
                    reply.send(Response::GlbList { files });
                });
            }

            Command::ImportGlb { name } => self.queue.push("importGLB", move |host: &mut Host| {
                info!("Importing model {}", name);
                report("importGLB", host.importer.import(&name));
            }),

            Command::DownloadFile {
                url,
                filename,
                folder,
            } => self.start_download(DownloadRequest { url, filename, folder }, reply),

            Command::GetFolderStructure { path } => {
                let roots = self.roots.clone();
                let reply = reply.clone();
                self.queue.push("getFolderStructure", move |_: &mut Host| {
                    let root = path
                        .filter(|p| !p.trim().is_empty())
                        .map(PathBuf::from)
                        .unwrap_or_else(|| roots.browse_root.clone());
                    let structure = scan_tree(&root, roots.scan_depth);
                    reply.send(Response::FolderStructure {
                        root_path: root.to_string_lossy().into_owned(),
                        structure,
                    });
                });
            }

            Command::BrowseFolder { path } => {
                let reply = reply.clone();
                self.queue.push("browseFolder", move |_: &mut Host| {
                    let listing = browse_folder(Path::new(&path));
                    reply.send(Response::FolderContents {
                        path,
                        exists: listing.exists,
                        contents: listing.entries,
                    });
                });
            }

            Command::GetAccessibleFolders => {
                let roots = self.roots.clone();
                let reply = reply.clone();
                self.queue.push("getAccessibleFolders", move |_: &mut Host| {
                    reply.send(Response::AccessibleFolders {
                        folders: roots.accessible_folders(),
                    });
                });
            }

            Command::RequestPermissions => {
                let roots = self.roots.clone();
                let reply = reply.clone();
                self.queue.push("requestPermissions", move |host: &mut Host| {
                    report("requestPermissions", host.permissions.request());
                    reply.send(Response::AccessibleFolders {
                        folders: roots.accessible_folders(),
                    });
                });
            }
        }
    }

    /// Run the job off the frame loop.  Status goes to the requesting
    /// connection, the refreshed listing to everyone.
    fn start_download(&self, request: DownloadRequest, reply: &Reply) {
        let mut job = self.downloads.start(request);
        let filename = job.filename.clone();
        let folder = job.folder.clone();
        let reply = reply.clone();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            while let Some(event) = job.next_event().await {
                let (state, progress, message) = match event {
                    DownloadEvent::Started => (DownloadState::Started, 0, "Download started".to_string()),
                    DownloadEvent::Progress(p) => (DownloadState::Progress, p, format!("Downloading... {}%", p)),
                    DownloadEvent::Completed { path } => (
                        DownloadState::Completed,
                        100,
                        format!("Saved to {}", path.display()),
                    ),
                    DownloadEvent::Failed { message, progress } => {
                        (DownloadState::Failed, progress, message)
                    }
                    DownloadEvent::Refreshed { kind, files } => {
                        let listing = match kind {
                            ContentKind::Video => Response::VideoList { files },
                            ContentKind::Model => Response::GlbList { files },
                        };
                        let reached = registry.broadcast(&listing);
                        debug!("Download {}: listing refresh sent to {} clients", job.id, reached);
                        continue;
                    }
                };

                reply.send(Response::DownloadStatus {
                    state,
                    filename: filename.clone(),
                    folder: folder.clone(),
                    progress,
                    message,
                });
            }
        });
    }
}
