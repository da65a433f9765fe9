//! Collaborators for running the daemon without a rendering engine.  They
//! keep just enough state to answer `mode`/`duration` and log every call.

use std::path::Path;

use tracing::info;

use crate::host::{ModelImporter, Permissions, Playback};

#[derive(Debug, Default)]
pub struct HeadlessPlayer {
    current: Option<String>,
    playing: bool,
    position: f64,
    immersive: bool,
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        self.position
    }
}

impl Playback for HeadlessPlayer {
    fn play(&mut self, path: &str) -> anyhow::Result<()> {
        info!("[player] play {}", path);
        self.current = Some(path.to_string());
        self.playing = true;
        self.position = 0.0;
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        info!("[player] pause");
        self.playing = false;
        Ok(())
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        if self.current.is_none() {
            anyhow::bail!("nothing loaded");
        }
        info!("[player] resume");
        self.playing = true;
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> anyhow::Result<()> {
        info!("[player] seek {:.2}s", seconds);
        self.position = seconds;
        Ok(())
    }

    fn set_mode(&mut self, immersive: bool) -> anyhow::Result<()> {
        info!("[player] immersive={}", immersive);
        self.immersive = immersive;
        Ok(())
    }

    fn mode(&self) -> bool {
        self.immersive
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn is_seekable(&self) -> bool {
        self.current.is_some()
    }

    fn update(&mut self, dt: f64) {
        if self.playing {
            self.position += dt;
        }
    }
}

#[derive(Debug, Default)]
pub struct HeadlessImporter {
    pub imported: Vec<String>,
}

impl ModelImporter for HeadlessImporter {
    fn import(&mut self, name: &str) -> anyhow::Result<()> {
        let file = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        info!("[importer] import {}", file);
        self.imported.push(name.to_string());
        Ok(())
    }
}

/// Desktop platforms have no runtime storage prompt.
#[derive(Debug, Default)]
pub struct HeadlessPermissions;

impl Permissions for HeadlessPermissions {
    fn request(&mut self) -> anyhow::Result<()> {
        info!("[permissions] nothing to request on this platform");
        Ok(())
    }
}
