//! File operation tool - open, create, search and inspect files

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{str_param, Tool, ToolResult};
use crate::adapters::desktop::Desktop;
use crate::Result;

const MAX_SEARCH_DEPTH: usize = 3;
const MAX_SEARCH_RESULTS: usize = 20;

/// Directories the tool refuses to write into or delete from.
const FORBIDDEN_PREFIXES: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    "/bin",
    "/boot",
    "/etc",
    "/sbin",
    "/usr",
    "/System",
    "/Library",
];

/// Files and folders on the desktop
pub struct FileOperationTool {
    desktop: Arc<dyn Desktop>,
    base_dir: PathBuf,
}

impl FileOperationTool {
    /// Relative paths resolve against `base_dir`.
    pub fn new(desktop: Arc<dyn Desktop>, base_dir: PathBuf) -> Self {
        Self { desktop, base_dir }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            normalize(&path)
        } else {
            normalize(&self.base_dir.join(path))
        }
    }

    fn is_safe_path(path: &Path) -> bool {
        let shown = normalize(path).to_string_lossy().to_lowercase();
        !FORBIDDEN_PREFIXES
            .iter()
            .any(|prefix| shown.starts_with(&prefix.to_lowercase()))
    }

    async fn open(&self, path: PathBuf) -> ToolResult {
        if !path.exists() {
            return ToolResult::failure(format!("File not found: {}", path.display()), "File not found");
        }

        if self.desktop.open_file(&path).await {
            ToolResult::success_with(
                format!("Opened {}", path.display()),
                json!({"path": path.display().to_string()}),
            )
        } else {
            ToolResult::failure(format!("Failed to open {}", path.display()), "Failed to open")
        }
    }

    fn create(path: &Path, content: Option<&str>) -> ToolResult {
        if !Self::is_safe_path(path) {
            return ToolResult::failure("Creating files in system directories is not allowed", "Forbidden path");
        }

        let shown = path.display().to_string();
        let looks_like_dir = shown.ends_with('/')
            || shown.ends_with('\\')
            || path.extension().is_none();

        let created = if looks_like_dir {
            std::fs::create_dir_all(path).map(|_| "directory")
        } else {
            path.parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| std::fs::write(path, content.unwrap_or_default()))
                .map(|_| "file")
        };

        match created {
            Ok(kind) => ToolResult::success_with(
                format!("Created {kind}: {shown}"),
                json!({"path": shown, "type": kind}),
            ),
            Err(e) => ToolResult::failure(format!("Failed to create {shown}: {e}"), e.to_string()),
        }
    }

    fn search(root: &Path, query: &str) -> ToolResult {
        if !root.is_dir() {
            return ToolResult::failure(
                format!("Search path does not exist: {}", root.display()),
                "Path not found",
            );
        }

        let mut found = Vec::new();
        find_recursive(root, &query.to_lowercase(), 0, &mut found);

        ToolResult::success_with(
            format!("Found {} file(s) matching '{query}'", found.len()),
            json!({"files": found, "query": query}),
        )
    }

    fn exists(path: &Path) -> ToolResult {
        let exists = path.exists();
        let state = if exists { "Exists" } else { "Does not exist" };
        ToolResult::success_with(
            format!("{state}: {}", path.display()),
            json!({
                "exists": exists,
                "is_file": path.is_file(),
                "is_directory": path.is_dir(),
                "path": path.display().to_string(),
            }),
        )
    }
}

/// Collapse `.` and `..` without touching the filesystem; `..` never climbs above the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Case-insensitive file name search, depth and result limited.
fn find_recursive(dir: &Path, query: &str, depth: usize, found: &mut Vec<String>) {
    if depth > MAX_SEARCH_DEPTH || found.len() >= MAX_SEARCH_RESULTS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        if found.len() >= MAX_SEARCH_RESULTS {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            find_recursive(&path, query, depth + 1, found);
        } else if entry.file_name().to_string_lossy().to_lowercase().contains(query) {
            found.push(path.display().to_string());
        }
    }
}

#[async_trait]
impl Tool for FileOperationTool {
    fn name(&self) -> &str { "file_operation" }
    fn description(&self) -> &str { "File and folder operations: open, create, search, delete, or check existence" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["open", "create", "search", "delete", "exists"],
                    "description": "Operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "File or folder path; relative paths are under the desktop folder"
                },
                "content": {
                    "type": "string",
                    "description": "File content (for create)"
                },
                "query": {
                    "type": "string",
                    "description": "File name keyword (for search)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let action = str_param(&params, "action").unwrap_or_default();
        let path = str_param(&params, "path").map(|p| self.resolve(p));

        let result = match (action, path) {
            ("search", path) => match str_param(&params, "query") {
                Some(query) => {
                    let root = path.unwrap_or_else(|| self.base_dir.clone());
                    let query = query.to_string();
                    tokio::task::spawn_blocking(move || Self::search(&root, &query))
                        .await
                        .map_err(|e| crate::Error::Tool(format!("Search task failed: {e}")))?
                }
                None => ToolResult::failure("No search keyword specified", "No query"),
            },
            ("open" | "create" | "delete" | "exists", None) => {
                ToolResult::failure("No path specified", "No path")
            }
            ("open", Some(path)) => self.open(path).await,
            ("create", Some(path)) => Self::create(&path, str_param(&params, "content")),
            ("delete", Some(path)) if !Self::is_safe_path(&path) => {
                ToolResult::failure("Deleting files in system directories is not allowed", "Forbidden path")
            }
            ("delete", Some(_)) => ToolResult::failure(
                "Deleting files requires user confirmation and is not done automatically",
                "Delete not allowed",
            ),
            ("exists", Some(path)) => Self::exists(&path),
            (other, _) => ToolResult::failure(format!("Unsupported action: {other}"), "Invalid action"),
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::desktop::FakeDesktop;
    use tempfile::TempDir;

    fn tool(dir: &TempDir) -> (FileOperationTool, Arc<FakeDesktop>) {
        let desktop = Arc::new(FakeDesktop::new());
        (FileOperationTool::new(desktop.clone(), dir.path().to_path_buf()), desktop)
    }

    #[tokio::test]
    async fn test_create_file_and_directory() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);

        let file = tool.execute(json!({"action": "create", "path": "notes/todo.txt", "content": "milk"}))
            .await.unwrap();
        assert!(file.success);
        assert_eq!(file.data.unwrap()["type"], "file");
        assert_eq!(std::fs::read_to_string(tmp.path().join("notes/todo.txt")).unwrap(), "milk");

        let dir = tool.execute(json!({"action": "create", "path": "新文件"})).await.unwrap();
        assert!(dir.success);
        assert!(tmp.path().join("新文件").is_dir());
    }

    #[tokio::test]
    async fn test_create_in_system_dir_forbidden() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);
        let result = tool.execute(json!({"action": "create", "path": "/etc/voicepc.conf"})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Forbidden path"));
    }

    #[test]
    fn test_dotted_paths_cannot_escape_into_system_dirs() {
        assert!(!FileOperationTool::is_safe_path(Path::new("/etc/voicepc.conf")));
        assert!(!FileOperationTool::is_safe_path(Path::new("/tmp/../etc/voicepc.conf")));
        assert!(!FileOperationTool::is_safe_path(Path::new("/tmp/./../../../etc/voicepc.conf")));
        assert!(FileOperationTool::is_safe_path(Path::new("/tmp/etc/../voicepc.conf")));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[tokio::test]
    async fn test_relative_dotted_create_forbidden() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);
        let depth = tmp.path().components().count();
        let escape = format!("{}etc/voicepc.conf", "../".repeat(depth + 2));

        let result = tool.execute(json!({"action": "create", "path": escape})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Forbidden path"));

        let absolute = tool.execute(json!({"action": "create", "path": "/tmp/../etc/voicepc.conf"})).await.unwrap();
        assert_eq!(absolute.error.as_deref(), Some("Forbidden path"));
    }

    #[tokio::test]
    async fn test_search_limits_depth() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Report.txt"), "").unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::write(tmp.path().join("a/b/report-2.md"), "").unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b/c/d/e")).unwrap();
        std::fs::write(tmp.path().join("a/b/c/d/e/report-deep.md"), "").unwrap();
        let (tool, _) = tool(&tmp);

        let result = tool.execute(json!({"action": "search", "query": "report"})).await.unwrap();
        assert!(result.success);
        let files = result.data.unwrap()["files"].as_array().unwrap().len();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn test_open_missing_and_existing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        let (tool, desktop) = tool(&tmp);

        let missing = tool.execute(json!({"action": "open", "path": "nope.txt"})).await.unwrap();
        assert!(!missing.success);

        let opened = tool.execute(json!({"action": "open", "path": "a.txt"})).await.unwrap();
        assert!(opened.success);
        assert_eq!(desktop.opened().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_always_refused() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        let (tool, _) = tool(&tmp);

        let result = tool.execute(json!({"action": "delete", "path": "a.txt"})).await.unwrap();
        assert!(!result.success);
        assert!(tmp.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_path_and_unsupported_action() {
        let tmp = TempDir::new().unwrap();
        let (tool, _) = tool(&tmp);

        let no_path = tool.execute(json!({"action": "exists"})).await.unwrap();
        assert_eq!(no_path.error.as_deref(), Some("No path"));

        let moved = tool.execute(json!({"action": "move", "path": "a"})).await.unwrap();
        assert_eq!(moved.error.as_deref(), Some("Invalid action"));
    }
}
