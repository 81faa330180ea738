//! Desktop adapter — the operating-system boundary.
//!
//! Every operation reports failure as a sentinel value (`None` / `false`)
//! and never panics; tools turn those sentinels into [`ToolResult`]s.
//!
//! [`ToolResult`]: crate::tools::ToolResult

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Operating-system capabilities used by the tools.
#[async_trait]
pub trait Desktop: Send + Sync {
    /// Resolve an application name (alias or command) to a launchable path.
    async fn find_app_path(&self, name: &str) -> Option<PathBuf>;

    /// Start a process detached from the assistant; returns its pid.
    async fn start_process(&self, path: &Path, args: &[String]) -> Option<u32>;

    /// Kill every process whose name matches; true if at least one was killed.
    async fn kill_by_name(&self, process_name: &str) -> bool;

    /// Whether a process with this name is running.
    async fn is_running(&self, process_name: &str) -> bool;

    /// Open a file with its default handler.
    async fn open_file(&self, path: &Path) -> bool;

    /// Open a URL in the default browser.
    async fn open_url(&self, url: &str) -> bool;

    /// Set the master output volume (0-100).
    async fn set_volume(&self, level: u8) -> bool;

    /// Pause whatever media player is active.
    async fn pause_media(&self) -> bool;

    /// Capture the screen to `path`.
    async fn take_screenshot(&self, path: &Path) -> bool;
}

/// Process name for an application path, as the process table reports it.
pub fn process_name(path: &Path) -> String {
    let is_bundle = path.extension().is_some_and(|ext| ext == "app");
    let name = if is_bundle { path.file_stem() } else { path.file_name() };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Case-insensitive comparison that ignores a trailing `.exe`.
pub fn same_process(a: &str, b: &str) -> bool {
    fn normalize(s: &str) -> String {
        let lower = s.trim().to_lowercase();
        lower.strip_suffix(".exe").map(str::to_string).unwrap_or(lower)
    }
    normalize(a) == normalize(b)
}

struct KnownApp {
    aliases: &'static [&'static str],
    windows: &'static [&'static str],
    macos: &'static [&'static str],
    linux: &'static [&'static str],
}

const KNOWN_APPS: &[KnownApp] = &[
    KnownApp {
        aliases: &["微信", "wechat"],
        windows: &[
            r"%ProgramFiles%\Tencent\WeChat\WeChat.exe",
            r"%ProgramFiles(x86)%\Tencent\WeChat\WeChat.exe",
        ],
        macos: &["/Applications/WeChat.app"],
        linux: &["wechat"],
    },
    KnownApp {
        aliases: &["qq"],
        windows: &[r"%ProgramFiles%\Tencent\QQ\Bin\QQScLauncher.exe"],
        macos: &["/Applications/QQ.app"],
        linux: &["qq"],
    },
    KnownApp {
        aliases: &["chrome", "浏览器", "谷歌浏览器"],
        windows: &[
            r"%ProgramFiles%\Google\Chrome\Application\chrome.exe",
            r"%ProgramFiles(x86)%\Google\Chrome\Application\chrome.exe",
        ],
        macos: &["/Applications/Google Chrome.app"],
        linux: &["google-chrome", "chromium", "chromium-browser"],
    },
    KnownApp {
        aliases: &["edge"],
        windows: &[r"%ProgramFiles(x86)%\Microsoft\Edge\Application\msedge.exe"],
        macos: &["/Applications/Microsoft Edge.app"],
        linux: &["microsoft-edge"],
    },
    KnownApp {
        aliases: &["vscode", "vs code", "code"],
        windows: &[r"%LOCALAPPDATA%\Programs\Microsoft VS Code\Code.exe"],
        macos: &["/Applications/Visual Studio Code.app"],
        linux: &["code"],
    },
    KnownApp {
        aliases: &["记事本", "notepad", "笔记本"],
        windows: &["notepad.exe"],
        macos: &["/System/Applications/TextEdit.app"],
        linux: &["gedit", "gnome-text-editor", "kate", "mousepad"],
    },
    KnownApp {
        aliases: &["计算器", "calc", "calculator"],
        windows: &["calc.exe"],
        macos: &["/System/Applications/Calculator.app"],
        linux: &["gnome-calculator", "kcalc"],
    },
    KnownApp {
        aliases: &["网易云音乐", "网易云", "cloudmusic"],
        windows: &[r"%ProgramFiles(x86)%\Netease\CloudMusic\cloudmusic.exe"],
        macos: &["/Applications/NeteaseMusic.app"],
        linux: &["netease-cloud-music"],
    },
];

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%([^%]+)%").expect("valid regex"));

/// Expand `%VAR%` references; unknown variables expand to nothing.
fn expand_env(template: &str) -> String {
    ENV_VAR
        .replace_all(template, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn platform_candidates(app: &KnownApp) -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        app.windows
    } else if cfg!(target_os = "macos") {
        app.macos
    } else {
        app.linux
    }
}

/// Search `PATH` for an executable.
fn which(command: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    let mut names = vec![command.to_string()];
    if cfg!(target_os = "windows") && !command.to_lowercase().ends_with(".exe") {
        names.push(format!("{command}.exe"));
    }

    std::env::split_paths(&paths)
        .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
        .find(|candidate| candidate.is_file())
}

fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
    let expanded = expand_env(candidate);
    let path = PathBuf::from(&expanded);
    if path.components().count() > 1 {
        path.exists().then_some(path)
    } else {
        which(&expanded)
    }
}

/// Desktop adapter backed by the real operating system.
#[derive(Debug, Default, Clone)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }

    async fn run_command(program: &str, args: &[&str]) -> bool {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(program, error = %e, "Command unavailable");
                false
            }
        }
    }

    /// Try each command in order until one succeeds.
    async fn run_first(commands: &[(&str, Vec<String>)]) -> bool {
        for (program, args) in commands {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if Self::run_command(program, &args).await {
                return true;
            }
        }
        false
    }

    async fn scan_processes<F, T>(f: F) -> Option<T>
    where
        F: FnOnce(&System) -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&System::new_all())).await.ok()
    }
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn find_app_path(&self, name: &str) -> Option<PathBuf> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        if let Some(app) = KNOWN_APPS.iter().find(|app| app.aliases.contains(&key.as_str())) {
            if let Some(path) = platform_candidates(app).iter().find_map(|c| resolve_candidate(c)) {
                return Some(path);
            }
        }

        resolve_candidate(name.trim())
    }

    async fn start_process(&self, path: &Path, args: &[String]) -> Option<u32> {
        let mut command = if path.extension().is_some_and(|ext| ext == "app") {
            let mut open = Command::new("open");
            open.arg("-a").arg(path);
            if !args.is_empty() {
                open.arg("--args");
            }
            open
        } else {
            Command::new(path)
        };

        let spawned = command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                let pid = child.id();
                info!(path = %path.display(), ?pid, "Started process");
                pid
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to start process");
                None
            }
        }
    }

    async fn kill_by_name(&self, process_name: &str) -> bool {
        let wanted = process_name.to_string();
        let killed = Self::scan_processes(move |sys| {
            sys.processes()
                .values()
                .filter(|p| same_process(&OsStr::new(p.name()).to_string_lossy(), &wanted))
                .filter(|p| p.kill())
                .count()
        })
        .await
        .unwrap_or(0);

        info!(process = process_name, killed, "Kill by name");
        killed > 0
    }

    async fn is_running(&self, process_name: &str) -> bool {
        let wanted = process_name.to_string();
        Self::scan_processes(move |sys| {
            sys.processes()
                .values()
                .any(|p| same_process(&OsStr::new(p.name()).to_string_lossy(), &wanted))
        })
        .await
        .unwrap_or(false)
    }

    async fn open_file(&self, path: &Path) -> bool {
        match open::that_detached(path) {
            Ok(()) => {
                info!(path = %path.display(), "Opened file");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open file");
                false
            }
        }
    }

    async fn open_url(&self, url: &str) -> bool {
        match open::that_detached(url) {
            Ok(()) => {
                info!(url, "Opened URL");
                true
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to open URL");
                false
            }
        }
    }

    async fn set_volume(&self, level: u8) -> bool {
        let level = level.min(100);
        let commands: Vec<(&str, Vec<String>)> = if cfg!(target_os = "windows") {
            let raw = u32::from(level) * 65535 / 100;
            vec![("nircmd.exe", vec!["setsysvolume".into(), raw.to_string()])]
        } else if cfg!(target_os = "macos") {
            vec![("osascript", vec!["-e".into(), format!("set volume output volume {level}")])]
        } else {
            vec![
                ("pactl", vec!["set-sink-volume".into(), "@DEFAULT_SINK@".into(), format!("{level}%")]),
                ("amixer", vec!["-q".into(), "sset".into(), "Master".into(), format!("{level}%")]),
            ]
        };

        let ok = Self::run_first(&commands).await;
        if ok {
            info!(level, "Set volume");
        } else {
            warn!(level, "No volume control available");
        }
        ok
    }

    async fn pause_media(&self) -> bool {
        let commands: Vec<(&str, Vec<String>)> = if cfg!(target_os = "windows") {
            vec![("nircmd.exe", vec!["sendkeypress".into(), "0xB3".into()])]
        } else if cfg!(target_os = "macos") {
            vec![("osascript", vec!["-e".into(), r#"tell application "Music" to pause"#.into()])]
        } else {
            vec![("playerctl", vec!["pause".into()])]
        };
        Self::run_first(&commands).await
    }

    async fn take_screenshot(&self, path: &Path) -> bool {
        let target = path.to_string_lossy().into_owned();
        let commands: Vec<(&str, Vec<String>)> = if cfg!(target_os = "windows") {
            vec![("nircmd.exe", vec!["savescreenshot".into(), target])]
        } else if cfg!(target_os = "macos") {
            vec![("screencapture", vec!["-x".into(), target])]
        } else {
            vec![
                ("gnome-screenshot", vec!["-f".into(), target.clone()]),
                ("grim", vec![target.clone()]),
                ("scrot", vec![target]),
            ]
        };
        Self::run_first(&commands).await
    }
}

/// Scriptable desktop for tests.
#[cfg(test)]
pub struct FakeDesktop {
    apps: std::collections::HashMap<String, PathBuf>,
    running: std::sync::Mutex<std::collections::HashSet<String>>,
    opened: std::sync::Mutex<Vec<String>>,
    volume: std::sync::Mutex<Option<u8>>,
    launch_succeeds: bool,
    kill_succeeds: bool,
    opens_succeed: bool,
}

#[cfg(test)]
impl FakeDesktop {
    /// Knows 微信 and 记事本; every operation succeeds.
    pub fn new() -> Self {
        let mut apps = std::collections::HashMap::new();
        apps.insert("微信".to_string(), PathBuf::from("/opt/tencent/WeChat.exe"));
        apps.insert("wechat".to_string(), PathBuf::from("/opt/tencent/WeChat.exe"));
        apps.insert("记事本".to_string(), PathBuf::from("notepad.exe"));
        apps.insert("notepad".to_string(), PathBuf::from("notepad.exe"));
        Self {
            apps,
            running: Default::default(),
            opened: Default::default(),
            volume: Default::default(),
            launch_succeeds: true,
            kill_succeeds: true,
            opens_succeed: true,
        }
    }

    pub fn with_running(self, process: &str) -> Self {
        self.running.lock().unwrap().insert(process.to_lowercase());
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.launch_succeeds = false;
        self
    }

    pub fn failing_kill(mut self) -> Self {
        self.kill_succeeds = false;
        self
    }

    pub fn failing_opens(mut self) -> Self {
        self.opens_succeed = false;
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn volume(&self) -> Option<u8> {
        *self.volume.lock().unwrap()
    }

    pub fn running(&self, process: &str) -> bool {
        self.running.lock().unwrap().iter().any(|p| same_process(p, process))
    }
}

#[cfg(test)]
#[async_trait]
impl Desktop for FakeDesktop {
    async fn find_app_path(&self, name: &str) -> Option<PathBuf> {
        self.apps.get(&name.trim().to_lowercase()).cloned()
    }

    async fn start_process(&self, path: &Path, _args: &[String]) -> Option<u32> {
        if !self.launch_succeeds {
            return None;
        }
        self.running.lock().unwrap().insert(process_name(path).to_lowercase());
        Some(4242)
    }

    async fn kill_by_name(&self, process_name: &str) -> bool {
        if !self.kill_succeeds {
            return false;
        }
        let mut running = self.running.lock().unwrap();
        let before = running.len();
        running.retain(|p| !same_process(p, process_name));
        running.len() < before
    }

    async fn is_running(&self, process_name: &str) -> bool {
        self.running(process_name)
    }

    async fn open_file(&self, path: &Path) -> bool {
        self.opened.lock().unwrap().push(path.display().to_string());
        self.opens_succeed
    }

    async fn open_url(&self, url: &str) -> bool {
        self.opened.lock().unwrap().push(url.to_string());
        self.opens_succeed
    }

    async fn set_volume(&self, level: u8) -> bool {
        *self.volume.lock().unwrap() = Some(level);
        true
    }

    async fn pause_media(&self) -> bool {
        true
    }

    async fn take_screenshot(&self, path: &Path) -> bool {
        self.opened.lock().unwrap().push(path.display().to_string());
        self.opens_succeed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name() {
        assert_eq!(process_name(Path::new("/opt/tencent/WeChat.exe")), "WeChat.exe");
        assert_eq!(process_name(Path::new("/Applications/WeChat.app")), "WeChat");
        assert_eq!(process_name(Path::new("gedit")), "gedit");
    }

    #[test]
    fn test_same_process() {
        assert!(same_process("WeChat.exe", "wechat"));
        assert!(same_process("notepad", "NOTEPAD.EXE"));
        assert!(!same_process("notepad", "notepad++"));
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("VOICEPC_TEST_DIR", "/data");
        assert_eq!(expand_env(r"%VOICEPC_TEST_DIR%\app.exe"), r"/data\app.exe");
        assert_eq!(expand_env("plain"), "plain");
    }

    #[tokio::test]
    async fn test_system_desktop_unknown_app() {
        let desktop = SystemDesktop::new();
        assert!(desktop.find_app_path("definitely-not-an-installed-app-42").await.is_none());
        assert!(desktop.find_app_path("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_fake_desktop_lifecycle() {
        let desktop = FakeDesktop::new();
        let path = desktop.find_app_path("微信").await.unwrap();
        let name = process_name(&path);

        assert!(!desktop.is_running(&name).await);
        assert_eq!(desktop.start_process(&path, &[]).await, Some(4242));
        assert!(desktop.is_running(&name).await);
        assert!(desktop.kill_by_name(&name).await);
        assert!(!desktop.is_running(&name).await);
    }
}
