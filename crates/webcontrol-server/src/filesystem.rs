/// Filesystem inspector.
///
/// Stateless helpers for listing content folders, scanning bounded directory
/// trees and single-level browsing.  Nothing here returns an error to the
/// caller: a missing folder is an empty listing, an unreadable subtree is an
/// "Access Denied" placeholder, and any other per-entry failure is logged and
/// skipped.
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use reqwest::Url;
use tracing::{debug, warn};
use webcontrol_proto::config::ContentConfig;
use webcontrol_proto::protocol::{FolderEntry, ACCESS_DENIED, MODEL_EXTENSIONS};

// ── Content roots ─────────────────────────────────────────────────────────────

/// What a download or listing is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Video,
    Model,
}

const MODEL_FOLDER_ALIASES: &[&str] = &["models", "model", "glb", "glbs", "3d"];
const VIDEO_FOLDER_ALIASES: &[&str] = &["videos", "video", "movies"];

/// Directories the endpoint reads from and downloads into.
#[derive(Debug, Clone)]
pub struct ContentRoots {
    pub videos: PathBuf,
    pub models: PathBuf,
    pub browse_root: PathBuf,
    pub extra_folders: Vec<PathBuf>,
    pub stream_urls: Vec<String>,
    pub scan_depth: usize,
}

impl ContentRoots {
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            videos: config.videos_dir.clone(),
            models: config.models_dir.clone(),
            browse_root: config.browse_root.clone(),
            extra_folders: config.extra_folders.clone(),
            stream_urls: config.stream_urls.clone(),
            scan_depth: config.scan_depth,
        }
    }

    pub fn root_for(&self, kind: ContentKind) -> &Path {
        match kind {
            ContentKind::Video => &self.videos,
            ContentKind::Model => &self.models,
        }
    }

    /// Decide whether a download lands with the models or the videos.
    pub fn classify(folder: &str, filename: &str) -> ContentKind {
        let folder = folder.trim().to_ascii_lowercase();
        if MODEL_FOLDER_ALIASES.contains(&folder.as_str()) || has_extension(filename, MODEL_EXTENSIONS)
        {
            ContentKind::Model
        } else {
            ContentKind::Video
        }
    }

    /// Resolve the client's `folder` field to a directory on disk.
    ///
    /// Empty folders and root aliases ("Videos", "Models", ...) map to the
    /// kind's root, absolute paths are taken as-is, and anything else is
    /// joined under the root keeping only its plain components.
    pub fn download_dir(&self, folder: &str, kind: ContentKind) -> PathBuf {
        let trimmed = folder.trim();
        let lower = trimmed.to_ascii_lowercase();
        let root = self.root_for(kind);

        if trimmed.is_empty()
            || MODEL_FOLDER_ALIASES.contains(&lower.as_str())
            || VIDEO_FOLDER_ALIASES.contains(&lower.as_str())
        {
            return root.to_path_buf();
        }

        let requested = Path::new(trimmed);
        if requested.is_absolute() {
            return requested.to_path_buf();
        }

        let mut dir = root.to_path_buf();
        for component in requested.components() {
            if let Component::Normal(part) = component {
                dir.push(part);
            }
        }
        dir
    }

    /// Every configured root that currently exists, without duplicates.
    pub fn accessible_folders(&self) -> Vec<FolderEntry> {
        let mut seen: Vec<&Path> = Vec::new();
        let mut folders = Vec::new();

        let candidates = [&self.videos, &self.models, &self.browse_root]
            .into_iter()
            .chain(self.extra_folders.iter());

        for path in candidates {
            if seen.contains(&path.as_path()) {
                continue;
            }
            seen.push(path.as_path());
            if path.is_dir() {
                folders.push(FolderEntry::directory(entry_name(path), path_string(path)));
            } else {
                debug!("accessible folders: {} not present", path.display());
            }
        }
        folders
    }
}

/// Reduce a client-supplied filename to its final component.  Returns `None`
/// when nothing usable is left (`""`, `"."`, `".."`, `"dir/"`).
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

// ── Listing ───────────────────────────────────────────────────────────────────

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Express a listing entry as something a player can open.  HTTP(S) URLs are
/// returned untouched; local paths become percent-encoded `file:///` URIs.
pub fn to_uri(entry: &str) -> String {
    let lower = entry.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("file://")
    {
        return entry.to_string();
    }

    let normalized = entry.replace('\\', "/");
    let path = format!("/{}", normalized.trim_start_matches('/'));
    match Url::parse("file:///") {
        Ok(mut url) => {
            url.set_path(&path);
            url.into()
        }
        Err(_) => format!("file://{}", path),
    }
}

/// Immediate files in `folder` whose extension is in `extensions`, as URIs,
/// in the order the filesystem yields them.  A missing folder is empty.
pub fn list_files(folder: &Path, extensions: &[&str]) -> Vec<String> {
    let folder = std::path::absolute(folder).unwrap_or_else(|_| folder.to_path_buf());

    let entries = match fs::read_dir(&folder) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("list: {} does not exist", folder.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to list {}: {}", folder.display(), e);
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", folder.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if has_extension(&name.to_string_lossy(), extensions) {
            files.push(to_uri(&path.to_string_lossy()));
        }
    }
    files
}

/// Local files in `folder` followed by `extra` entries (stream URLs or
/// additional local paths), everything in URI form.
pub fn list_with_extras(folder: &Path, extensions: &[&str], extra: &[String]) -> Vec<String> {
    let mut files = list_files(folder, extensions);
    files.extend(extra.iter().map(|e| to_uri(e)));
    files
}

// ── Tree scan ─────────────────────────────────────────────────────────────────

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_string(path))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One readable child of a directory.
struct Child {
    name: String,
    path: PathBuf,
    is_dir: bool,
    size: u64,
}

/// Read one directory level: subdirectories first, then files, each group
/// sorted by name.  Entries that cannot be inspected are logged and skipped.
fn read_level(dir: &Path) -> std::io::Result<Vec<Child>> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        // Follows symlinks; link cycles are cut off by the depth bound.
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let child = Child {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        };
        if child.is_dir {
            dirs.push(child);
        } else {
            files.push(child);
        }
    }

    let by_name = |a: &Child, b: &Child| a.name.to_lowercase().cmp(&b.name.to_lowercase());
    dirs.sort_by(by_name);
    files.sort_by(by_name);
    dirs.extend(files);
    Ok(dirs)
}

fn access_denied(mut entry: FolderEntry) -> FolderEntry {
    entry.children.clear();
    entry.note = Some(ACCESS_DENIED.to_string());
    entry
}

/// Recursive scan of `root`.  A directory at depth `d` (root = 0) has its
/// contents listed only while `d < max_depth`.
pub fn scan_tree(root: &Path, max_depth: usize) -> FolderEntry {
    let entry = FolderEntry::directory(entry_name(root), path_string(root));
    scan_dir(entry, root, 0, max_depth)
}

fn scan_dir(mut entry: FolderEntry, dir: &Path, depth: usize, max_depth: usize) -> FolderEntry {
    if depth >= max_depth {
        return entry;
    }

    let children = match read_level(dir) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            debug!("scan: access denied for {}", dir.display());
            return access_denied(entry);
        }
        Err(e) => {
            warn!("Failed to scan {}: {}", dir.display(), e);
            return entry;
        }
    };

    for child in children {
        let path = path_string(&child.path);
        if child.is_dir {
            let node = FolderEntry::directory(child.name, path);
            entry
                .children
                .push(scan_dir(node, &child.path, depth + 1, max_depth));
        } else {
            entry
                .children
                .push(FolderEntry::file(child.name, path, child.size));
        }
    }
    entry
}

// ── Browse ────────────────────────────────────────────────────────────────────

/// Single-level listing used for interactive navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderListing {
    pub exists: bool,
    pub entries: Vec<FolderEntry>,
}

pub fn browse_folder(path: &Path) -> FolderListing {
    if !path.is_dir() {
        return FolderListing {
            exists: false,
            entries: Vec::new(),
        };
    }

    let entries = match read_level(path) {
        Ok(children) => children
            .into_iter()
            .map(|c| {
                let path = path_string(&c.path);
                if c.is_dir {
                    FolderEntry::directory(c.name, path)
                } else {
                    FolderEntry::file(c.name, path, c.size)
                }
            })
            .collect(),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!("browse: access denied for {}", path.display());
            Vec::new()
        }
        Err(e) => {
            warn!("Failed to browse {}: {}", path.display(), e);
            Vec::new()
        }
    };

    FolderListing {
        exists: true,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use webcontrol_proto::protocol::VIDEO_EXTENSIONS;

    fn touch(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_to_uri() {
        assert_eq!(to_uri("http://cdn/a.mp4"), "http://cdn/a.mp4");
        assert_eq!(to_uri("HTTPS://cdn/a.mp4"), "HTTPS://cdn/a.mp4");
        assert_eq!(to_uri("/sdcard/Movies/a.mp4"), "file:///sdcard/Movies/a.mp4");
        assert_eq!(to_uri(r"C:\Videos\a.mp4"), "file:///C:/Videos/a.mp4");
        assert_eq!(
            to_uri("/v/clip #1?.mp4"),
            "file:///v/clip%20%231%3F.mp4"
        );
    }

    #[test]
    fn test_list_files_filters_extensions() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a.mp4"), 1);
        touch(&tmp.path().join("B.MKV"), 1);
        touch(&tmp.path().join("notes.txt"), 1);
        touch(&tmp.path().join("model.glb"), 1);
        fs::create_dir(tmp.path().join("sub.mp4")).unwrap();

        let mut files = list_files(tmp.path(), VIDEO_EXTENSIONS);
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.starts_with("file:///")));
        assert!(files[0].ends_with("B.MKV"));
        assert!(files[1].ends_with("a.mp4"));

        let models = list_files(tmp.path(), MODEL_EXTENSIONS);
        assert_eq!(models.len(), 1);
    }

    #[test]
    fn test_list_missing_folder_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(list_files(&tmp.path().join("nope"), VIDEO_EXTENSIONS).is_empty());
    }

    #[test]
    fn test_list_with_extras_keeps_http_untouched() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("local.mp4"), 1);
        let extras = vec![
            "https://cdn.example.com/intro.mp4".to_string(),
            "/mnt/share/clip.mp4".to_string(),
        ];
        let files = list_with_extras(tmp.path(), VIDEO_EXTENSIONS, &extras);
        assert_eq!(files.len(), 3);
        assert!(files[0].starts_with("file:///") && files[0].ends_with("local.mp4"));
        assert_eq!(files[1], "https://cdn.example.com/intro.mp4");
        assert_eq!(files[2], "file:///mnt/share/clip.mp4");
    }

    #[test]
    fn test_scan_tree_orders_dirs_before_files() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a.mp4"), 10);
        touch(&tmp.path().join("zeta/inner.glb"), 4);
        touch(&tmp.path().join("alpha/x.txt"), 2);

        let tree = scan_tree(tmp.path(), 3);
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta", "a.mp4"]);
        assert!(tree.children[0].is_directory);
        assert_eq!(tree.children[2].size_bytes, Some(10));
        assert_eq!(tree.children[1].children[0].size_bytes, Some(4));
        assert!(tree.children[0].size_bytes.is_none());
    }

    #[test]
    fn test_scan_tree_respects_depth_and_counts() {
        let tmp = TempDir::new().unwrap();
        // a/b/c/d/deep.mp4: c sits at depth 3 and must not be expanded
        touch(&tmp.path().join("a/b/c/d/deep.mp4"), 1);
        touch(&tmp.path().join("a/one.mp4"), 1);
        touch(&tmp.path().join("top.mp4"), 1);

        let tree = scan_tree(tmp.path(), 3);
        assert_eq!(tree.depth(), 3);
        // reachable: a, b, c, one.mp4, top.mp4
        assert_eq!(tree.count_entries(), 5 + 1);

        let c = &tree.children[0].children[0].children[0];
        assert_eq!(c.name, "c");
        assert!(c.children.is_empty());

        let shallow = scan_tree(tmp.path(), 0);
        assert_eq!(shallow.count_entries(), 1);
    }

    #[test]
    fn test_scan_root_without_basename() {
        let tree = scan_tree(Path::new("/"), 0);
        assert_eq!(tree.name, "/");
        assert_eq!(tree.path, "/");
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_substitutes_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("open/a.mp4"), 1);
        touch(&tmp.path().join("locked/secret.mp4"), 1);
        let locked = tmp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Running as root ignores directory permissions; nothing to observe.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let tree = scan_tree(tmp.path(), 3);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let node = tree.children.iter().find(|c| c.name == "locked").unwrap();
        assert_eq!(node.note.as_deref(), Some(ACCESS_DENIED));
        assert!(node.children.is_empty());
        let open = tree.children.iter().find(|c| c.name == "open").unwrap();
        assert_eq!(open.children.len(), 1);
    }

    #[test]
    fn test_browse_folder() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("sub/deep/x.mp4"), 1);
        touch(&tmp.path().join("clip.mp4"), 7);

        let listing = browse_folder(tmp.path());
        assert!(listing.exists);
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].name, "sub");
        assert!(listing.entries[0].children.is_empty());
        assert_eq!(listing.entries[1].size_bytes, Some(7));

        let missing = browse_folder(&tmp.path().join("gone"));
        assert!(!missing.exists);
        assert!(missing.entries.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_browse_unreadable_folder_is_empty() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("locked/secret.mp4"), 1);
        let locked = tmp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let listing = browse_folder(&locked);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(listing.exists);
        assert!(listing.entries.is_empty());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a.mp4").as_deref(), Some("a.mp4"));
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename(r"..\..\evil.glb").as_deref(),
            Some("evil.glb")
        );
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    #[test]
    fn test_classify_and_download_dir() {
        let roots = ContentRoots {
            videos: PathBuf::from("/data/videos"),
            models: PathBuf::from("/data/models"),
            browse_root: PathBuf::from("/data"),
            extra_folders: Vec::new(),
            stream_urls: Vec::new(),
            scan_depth: 3,
        };

        assert_eq!(ContentRoots::classify("Videos", "a.mp4"), ContentKind::Video);
        assert_eq!(ContentRoots::classify("Models", "a.bin"), ContentKind::Model);
        assert_eq!(ContentRoots::classify("", "ship.GLB"), ContentKind::Model);

        assert_eq!(
            roots.download_dir("Videos", ContentKind::Video),
            PathBuf::from("/data/videos")
        );
        assert_eq!(
            roots.download_dir("GLB", ContentKind::Model),
            PathBuf::from("/data/models")
        );
        assert_eq!(
            roots.download_dir("trips/../2024", ContentKind::Video),
            PathBuf::from("/data/videos/trips/2024")
        );
        assert_eq!(
            roots.download_dir("/mnt/usb", ContentKind::Video),
            PathBuf::from("/mnt/usb")
        );
    }

    #[test]
    fn test_accessible_folders_dedups_and_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let videos = tmp.path().join("videos");
        fs::create_dir_all(&videos).unwrap();
        let roots = ContentRoots {
            videos: videos.clone(),
            models: tmp.path().join("models"),
            browse_root: tmp.path().to_path_buf(),
            extra_folders: vec![videos.clone()],
            stream_urls: Vec::new(),
            scan_depth: 3,
        };
        let folders = roots.accessible_folders();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "videos");
        assert!(folders.iter().all(|f| f.is_directory));
    }
}
