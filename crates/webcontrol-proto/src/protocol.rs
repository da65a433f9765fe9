use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Current protocol version.  Reported by `/api/status` so companion tools can
/// tell which command set the endpoint understands.
pub const PROTOCOL_VERSION: u32 = 1;

/// Extensions listed by `listVideos`.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi"];

/// Extensions listed by `listGLBs`.
pub const MODEL_EXTENSIONS: &[&str] = &["glb", "gltf"];

/// Annotation placed on tree nodes the scanner was not allowed to read.
pub const ACCESS_DENIED: &str = "Access Denied";

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Inbound frame exactly as the client sent it.  Every field except `action`
/// is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommand {
    pub action: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub mode: Option<Value>,
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

/// What `toggleMode` should do with the playback mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeRequest {
    /// No `mode` payload: flip whatever is active.
    Toggle,
    Set(bool),
}

/// Validated command.  One variant per action, carrying only what that action
/// needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { path: String },
    Pause,
    Resume,
    ToggleMode { mode: ModeRequest },
    Seek { seconds: f64 },
    ListVideos,
    ListGlbs,
    ImportGlb { name: String },
    DownloadFile { url: String, filename: String, folder: String },
    GetFolderStructure { path: Option<String> },
    BrowseFolder { path: String },
    GetAccessibleFolders,
    RequestPermissions,
}

impl Command {
    /// Wire name of the action, as the client spells it.
    pub fn action(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::ToggleMode { .. } => "toggleMode",
            Command::Seek { .. } => "seek",
            Command::ListVideos => "listVideos",
            Command::ListGlbs => "listGLBs",
            Command::ImportGlb { .. } => "importGLB",
            Command::DownloadFile { .. } => "downloadFile",
            Command::GetFolderStructure { .. } => "getFolderStructure",
            Command::BrowseFolder { .. } => "browseFolder",
            Command::GetAccessibleFolders => "getAccessibleFolders",
            Command::RequestPermissions => "requestPermissions",
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("{action}: missing required field `{field}`")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
    #[error("{action}: field `{field}` has an unusable value")]
    InvalidField {
        action: &'static str,
        field: &'static str,
    },
}

impl TryFrom<RawCommand> for Command {
    type Error = DecodeError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        let command = match raw.action.as_str() {
            "play" => Command::Play {
                path: required("play", "path", raw.path)?,
            },
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "toggleMode" => Command::ToggleMode {
                mode: match raw.mode {
                    None | Some(Value::Null) => ModeRequest::Toggle,
                    Some(v) => ModeRequest::Set(coerce_flag(&v)),
                },
            },
            "seek" => Command::Seek {
                seconds: match raw.time {
                    None | Some(Value::Null) => 0.0,
                    Some(v) => coerce_seconds(&v).ok_or(DecodeError::InvalidField {
                        action: "seek",
                        field: "time",
                    })?,
                },
            },
            "listVideos" => Command::ListVideos,
            "listGLBs" => Command::ListGlbs,
            "importGLB" => Command::ImportGlb {
                name: required("importGLB", "name", raw.name)?,
            },
            "downloadFile" => Command::DownloadFile {
                url: required("downloadFile", "url", raw.url)?,
                filename: required("downloadFile", "filename", raw.filename)?,
                folder: raw.folder.unwrap_or_default(),
            },
            "getFolderStructure" => Command::GetFolderStructure {
                path: raw.path.filter(|p| !p.trim().is_empty()),
            },
            "browseFolder" => Command::BrowseFolder {
                path: required("browseFolder", "path", raw.path)?,
            },
            "getAccessibleFolders" => Command::GetAccessibleFolders,
            "requestPermissions" => Command::RequestPermissions,
            other => return Err(DecodeError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }
}

fn required(
    action: &'static str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, DecodeError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DecodeError::MissingField { action, field }),
    }
}

/// Loose boolean coercion for the `mode` payload.
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes" | "vr" | "360" | "immersive"
        ),
        _ => false,
    }
}

/// Numbers pass through, numeric strings are parsed.  Non-finite results are
/// rejected.
pub fn coerce_seconds(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}

/// Parse one inbound frame into the tolerant raw form.
pub fn decode(data: &[u8]) -> Result<RawCommand, DecodeError> {
    Ok(serde_json::from_slice(data)?)
}

/// Parse and validate one inbound frame.
pub fn decode_command(data: &[u8]) -> Result<Command, DecodeError> {
    Command::try_from(decode(data)?)
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// One node of a directory listing or tree scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(default)]
    pub children: Vec<FolderEntry>,
    /// Files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Set on placeholder nodes, e.g. [`ACCESS_DENIED`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FolderEntry {
    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: true,
            children: Vec::new(),
            size_bytes: None,
            note: None,
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: false,
            children: Vec::new(),
            size_bytes: Some(size_bytes),
            note: None,
        }
    }

    /// This node plus every descendant.
    pub fn count_entries(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(FolderEntry::count_entries)
            .sum::<usize>()
    }

    /// Deepest level reached below this node (0 for a childless node).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Started,
    Progress,
    Completed,
    Failed,
}

/// Messages sent from the endpoint to clients, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    VideoList {
        files: Vec<String>,
    },
    GlbList {
        files: Vec<String>,
    },
    FolderStructure {
        #[serde(rename = "rootPath")]
        root_path: String,
        structure: FolderEntry,
    },
    FolderContents {
        path: String,
        exists: bool,
        contents: Vec<FolderEntry>,
    },
    AccessibleFolders {
        folders: Vec<FolderEntry>,
    },
    DownloadStatus {
        state: DownloadState,
        filename: String,
        folder: String,
        progress: u8,
        message: String,
    },
    DebugLog {
        message: String,
        timestamp: String,
    },
}

impl Response {
    /// Serialise into a single text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
