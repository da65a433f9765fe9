use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/webcontrol/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("webcontrol")
    }
    #[cfg(windows)]
    {
        // Portable installs keep a data/ directory beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let portable_data = exe_dir.join("data");
                if portable_data.exists() {
                    return portable_data;
                }
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webcontrol")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("webcontrol")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webcontrol")
    }
}

/// Where downloaded and listed videos live unless configured otherwise.
pub fn default_videos_dir() -> PathBuf {
    dirs::video_dir()
        .map(|p| p.join("WebControl"))
        .unwrap_or_else(|| data_dir().join("videos"))
}

pub fn default_models_dir() -> PathBuf {
    data_dir().join("models")
}

pub fn default_browse_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}
