//! Loaded files, their local persistence, and the plain-text bundle export

use crate::util::write_atomic;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Key the loaded set is stored under
pub const STORAGE_KEY: &str = "codeshift_project_files";

pub const BUNDLE_FILE: &str = "project-bundle.txt";

const STORE_LOCK_TIMEOUT_SECS: u64 = 5;
const STORE_LOCK_RETRY_MS: u64 = 50;

/// Extensions treated as text, compared case-insensitively
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "js", "ts", "jsx", "tsx", "json", "html", "css", "py", "java", "c", "cpp", "rs",
    "go", "rb", "sh", "yml", "yaml", "toml", "ini", "xml",
];

/// Directories never descended into
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// A source file as read from disk or local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedFile {
    /// Path relative to the working directory, `/`-separated
    pub name: String,
    pub content: String,
}

impl LoadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

pub fn is_text_like(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TEXT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// `/`-separated name of `path` relative to `base`.
///
/// Names double as repository paths, so anything that is not a plain
/// relative path under `base` (absolute, or climbing out with `..`) has none.
fn display_name(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn read_text(path: &Path, base: &Path, out: &mut Vec<LoadedFile>) {
    let Some(name) = display_name(path, base) else {
        warn!(
            path = %path.display(),
            base = %base.display(),
            "skipping file outside the working directory"
        );
        return;
    };
    match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => out.push(LoadedFile::new(name, content)),
            Err(_) => warn!(path = %path.display(), "skipping file that is not UTF-8"),
        },
        Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable file"),
    }
}

/// Read every text-like file under `paths`, walking directories recursively.
///
/// Names are made relative to `base` when possible. Files listed explicitly
/// are read whatever their extension; files found by walking a directory must
/// pass [`is_text_like`]. Problems with individual files are logged and the
/// file skipped.
pub fn load_paths<P: AsRef<Path>>(paths: &[P], base: &Path) -> Vec<LoadedFile> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let walker = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || !(entry.file_type().is_dir()
                            && entry
                                .file_name()
                                .to_str()
                                .is_some_and(|name| SKIP_DIRS.contains(&name)))
                });
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && is_text_like(entry.path()) => {
                        read_text(entry.path(), base, &mut files);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "skipping unreadable entry"),
                }
            }
        } else if path.is_file() {
            read_text(path, base, &mut files);
        } else {
            warn!(path = %path.display(), "path does not exist");
        }
    }
    info!(files = files.len(), "loaded files");
    files
}

/// The loaded set persisted as JSON under [`STORAGE_KEY`].
pub struct LocalStore {
    dir: PathBuf,
}

struct StoreLock {
    file: fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_dir>/codeshift`
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join("codeshift")))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{STORAGE_KEY}.json"))
    }

    fn lock(&self) -> anyhow::Result<StoreLock> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(".lock"))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(StoreLock { file }),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if start.elapsed() >= Duration::from_secs(STORE_LOCK_TIMEOUT_SECS) {
                        anyhow::bail!(
                            "Timed out waiting for storage lock ({}s)",
                            STORE_LOCK_TIMEOUT_SECS
                        );
                    }
                    std::thread::sleep(Duration::from_millis(STORE_LOCK_RETRY_MS));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn save(&self, files: &[LoadedFile]) -> anyhow::Result<()> {
        let _lock = self.lock()?;
        let content = serde_json::to_string(files)?;
        write_atomic(&self.path(), &content)?;
        debug!(files = files.len(), path = %self.path().display(), "saved file set");
        Ok(())
    }

    /// Stored set, empty when nothing was saved or the entry is unreadable.
    pub fn load(&self) -> Vec<LoadedFile> {
        let path = self.path();
        if !path.exists() {
            return Vec::new();
        }
        let Ok(_lock) = self.lock() else {
            warn!("could not lock local storage");
            return Vec::new();
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "could not read saved files");
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            warn!(error = %err, "ignoring corrupt saved files");
            Vec::new()
        })
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        let path = self.path();
        if path.exists() {
            let _lock = self.lock()?;
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// `"--- {name} ---\n{content}"` blocks separated by a blank line.
pub fn bundle_text(files: &[LoadedFile]) -> String {
    files
        .iter()
        .map(|f| format!("--- {} ---\n{}", f.name, f.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Write [`bundle_text`] to `dir/project-bundle.txt`.
///
/// Archive formats are not produced; this text bundle is the only export.
pub fn export_bundle(files: &[LoadedFile], dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(BUNDLE_FILE);
    fs::write(&path, bundle_text(files))?;
    info!(files = files.len(), path = %path.display(), "exported bundle");
    Ok(path)
}
