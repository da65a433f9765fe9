//! Collaborator interfaces the command server drives.
//!
//! The host application hands concrete implementations to [`Host`] at
//! construction time and keeps the `Host` on its frame thread.  Frame tasks
//! receive `&mut Host`; nothing on the network side can reach it.

/// Video playback subsystem.
pub trait Playback {
    fn play(&mut self, path: &str) -> anyhow::Result<()>;
    fn pause(&mut self) -> anyhow::Result<()>;
    fn resume(&mut self) -> anyhow::Result<()>;
    fn seek(&mut self, seconds: f64) -> anyhow::Result<()>;
    /// `true` selects the immersive (360/VR) presentation.
    fn set_mode(&mut self, immersive: bool) -> anyhow::Result<()>;
    fn mode(&self) -> bool;
    /// Clip length in seconds, when the source reports one.
    fn duration(&self) -> Option<f64>;
    fn is_seekable(&self) -> bool;
    /// Per-frame engine work; `dt` is the frame time in seconds.
    fn update(&mut self, _dt: f64) {}
}

/// 3D-model import pipeline.
pub trait ModelImporter {
    fn import(&mut self, name: &str) -> anyhow::Result<()>;
}

/// Platform storage-permission prompt.
pub trait Permissions {
    fn request(&mut self) -> anyhow::Result<()>;
}

/// Frame-thread context: every collaborator a task may touch.
pub struct Host {
    pub playback: Box<dyn Playback>,
    pub importer: Box<dyn ModelImporter>,
    pub permissions: Box<dyn Permissions>,
}

impl Host {
    pub fn new(
        playback: Box<dyn Playback>,
        importer: Box<dyn ModelImporter>,
        permissions: Box<dyn Permissions>,
    ) -> Self {
        Self {
            playback,
            importer,
            permissions,
        }
    }

    pub fn update(&mut self, dt: f64) {
        self.playback.update(dt);
    }
}

/// Clamp a requested seek target into `[0, duration]`.  Unknown or
/// non-finite durations only clamp the lower bound.
pub fn clamp_seek(seconds: f64, duration: Option<f64>) -> f64 {
    let lower = seconds.max(0.0);
    match duration {
        Some(d) if d.is_finite() && d >= 0.0 => lower.min(d),
        _ => lower,
    }
}
