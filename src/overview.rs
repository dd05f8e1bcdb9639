//! Root locations for a disk-usage overview and helpers that hand a path to
//! the desktop's file manager.

use crate::collectors::error::CollectError;
use crate::environment::Environment;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn file_manager_name(self) -> &'static str {
        match self {
            Platform::Linux => "File Manager",
            Platform::MacOs => "Finder",
            Platform::Windows => "Explorer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewEntry {
    pub name: String,
    pub path: PathBuf,
    /// Nested path already listed as its own entry; skip it when sizing this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<PathBuf>,
}

pub fn overview_entries(env: &dyn Environment, platform: Platform) -> Vec<OverviewEntry> {
    let roots = match platform {
        Platform::Linux => linux_roots(env),
        Platform::MacOs => macos_roots(env),
        Platform::Windows => windows_roots(env),
    };
    roots
        .into_iter()
        .map(|(name, path)| OverviewEntry {
            exclude: exclude_path(env, platform, &path),
            name,
            path,
        })
        .collect()
}

fn linux_roots(env: &dyn Environment) -> Vec<(String, PathBuf)> {
    let mut roots = Vec::new();
    if let Some(home) = env.home_dir() {
        roots.push(("Home".to_string(), home));
    }
    roots.push(("Root".to_string(), PathBuf::from("/")));
    roots
}

fn macos_roots(env: &dyn Environment) -> Vec<(String, PathBuf)> {
    let mut roots = Vec::new();
    if let Some(home) = env.home_dir() {
        let library = home.join("Library");
        roots.push(("Home".to_string(), home));
        if env.is_dir(&library) {
            roots.push(("App Library".to_string(), library));
        }
    }
    roots.push(("Applications".to_string(), PathBuf::from("/Applications")));
    roots.push(("System Library".to_string(), PathBuf::from("/Library")));

    let volumes = Path::new("/Volumes");
    if has_real_mounts(env, volumes) {
        roots.push(("Volumes".to_string(), volumes.to_path_buf()));
    }
    roots
}

/// Hidden entries and the boot-volume symlink do not count as mounts.
fn has_real_mounts(env: &dyn Environment, volumes: &Path) -> bool {
    env.list_dir(volumes)
        .iter()
        .any(|e| !e.name.starts_with('.') && !e.is_symlink && e.is_dir)
}

fn windows_roots(env: &dyn Environment) -> Vec<(String, PathBuf)> {
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    if let Some(home) = env.home_dir() {
        for sub in ["Desktop", "Documents", "Downloads"] {
            candidates.push((sub.to_string(), home.join(sub)));
        }
        candidates.insert(0, ("User Profile".to_string(), home));
    }

    let from_var = [
        ("AppData Local", "LOCALAPPDATA"),
        ("AppData Roaming", "APPDATA"),
        ("Program Files", "ProgramFiles"),
        ("Program Files (x86)", "ProgramFiles(x86)"),
        ("Windows", "WINDIR"),
        ("Temp", "TEMP"),
    ];
    for (name, key) in from_var {
        if let Some(value) = env.var(key) {
            candidates.push((name.to_string(), PathBuf::from(value)));
        }
    }

    for letter in 'C'..='Z' {
        let drive = format!("{letter}:\\");
        candidates.push((format!("Drive {letter}:"), PathBuf::from(drive)));
    }

    candidates
        .into_iter()
        .filter(|(_, path)| env.is_dir(path))
        .collect()
}

/// Returns the nested root that `path` must not count twice, if any.
pub fn exclude_path(env: &dyn Environment, platform: Platform, path: &Path) -> Option<PathBuf> {
    let nested = match platform {
        Platform::MacOs => "Library",
        Platform::Windows => "AppData",
        Platform::Linux => return None,
    };
    let home = env.home_dir()?;
    if path != home {
        return None;
    }
    let excluded = home.join(nested);
    env.is_dir(&excluded).then_some(excluded)
}

pub fn open_command(platform: Platform, path: &Path) -> (&'static str, Vec<String>) {
    let path = path.display().to_string();
    match platform {
        Platform::Linux => ("xdg-open", vec![path]),
        Platform::MacOs => ("open", vec![path]),
        Platform::Windows => (
            "cmd",
            vec!["/c".to_string(), "start".to_string(), String::new(), path],
        ),
    }
}

pub fn reveal_command(platform: Platform, path: &Path) -> (&'static str, Vec<String>) {
    let path = path.display().to_string();
    match platform {
        Platform::Linux => ("xdg-open", vec![path]),
        Platform::MacOs => ("open", vec!["-R".to_string(), path]),
        Platform::Windows => ("explorer.exe", vec!["/select,".to_string(), path]),
    }
}

pub async fn open_path(path: &Path) -> Result<(), CollectError> {
    let (program, args) = open_command(Platform::current(), path);
    launch(program, &args).await
}

pub async fn reveal_path(path: &Path) -> Result<(), CollectError> {
    let (program, args) = reveal_command(Platform::current(), path);
    launch(program, &args).await
}

async fn launch(program: &str, args: &[String]) -> Result<(), CollectError> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|err| CollectError::Spawn {
            tool: program.to_string(),
            reason: err.to_string(),
        })?;
    info!(program, status = ?status.code(), "launched file handler");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::testing::FakeEnvironment;
    use crate::environment::DirEntryInfo;

    fn names(entries: &[OverviewEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn linux_home_and_root() {
        let env = FakeEnvironment::with_home("/home/ana");
        let entries = overview_entries(&env, Platform::Linux);
        assert_eq!(names(&entries), ["Home", "Root"]);
        assert!(entries.iter().all(|e| e.exclude.is_none()));
    }

    #[test]
    fn linux_without_home_still_has_root() {
        let entries = overview_entries(&FakeEnvironment::default(), Platform::Linux);
        assert_eq!(names(&entries), ["Root"]);
    }

    #[test]
    fn macos_separates_library_from_home() {
        let home = PathBuf::from("/Users/ana");
        let mut env = FakeEnvironment::with_home("/Users/ana").dir(home.join("Library"));
        env.entries.insert(
            PathBuf::from("/Volumes"),
            vec![
                DirEntryInfo {
                    name: "Macintosh HD".to_string(),
                    is_dir: true,
                    is_symlink: true,
                },
                DirEntryInfo {
                    name: "Backup".to_string(),
                    is_dir: true,
                    is_symlink: false,
                },
            ],
        );

        let entries = overview_entries(&env, Platform::MacOs);
        assert_eq!(
            names(&entries),
            ["Home", "App Library", "Applications", "System Library", "Volumes"]
        );
        assert_eq!(entries[0].exclude, Some(home.join("Library")));
        assert_eq!(entries[1].exclude, None);
    }

    #[test]
    fn macos_volumes_need_a_real_mount() {
        let mut env = FakeEnvironment::with_home("/Users/ana");
        env.entries.insert(
            PathBuf::from("/Volumes"),
            vec![DirEntryInfo {
                name: ".timemachine".to_string(),
                is_dir: true,
                is_symlink: false,
            }],
        );
        let entries = overview_entries(&env, Platform::MacOs);
        assert!(!names(&entries).contains(&"Volumes"));
        assert!(!names(&entries).contains(&"App Library"));
        assert_eq!(entries[0].exclude, None);
    }

    #[test]
    fn windows_keeps_only_existing_directories() {
        let home = PathBuf::from("C:\\Users\\ana");
        let env = FakeEnvironment::with_home("C:\\Users\\ana")
            .dir(home.join("Documents"))
            .dir(home.join("AppData"))
            .dir("C:\\Users\\ana\\AppData\\Local")
            .dir("C:\\Windows")
            .dir("C:\\")
            .dir("D:\\")
            .set_var("LOCALAPPDATA", "C:\\Users\\ana\\AppData\\Local")
            .set_var("WINDIR", "C:\\Windows")
            .set_var("TEMP", "C:\\missing\\Temp");

        let entries = overview_entries(&env, Platform::Windows);
        assert_eq!(
            names(&entries),
            [
                "User Profile",
                "Documents",
                "AppData Local",
                "Windows",
                "Drive C:",
                "Drive D:"
            ]
        );
        assert_eq!(entries[0].exclude, Some(home.join("AppData")));
    }

    #[test]
    fn exclusion_only_applies_to_home() {
        let env = FakeEnvironment::with_home("/Users/ana").dir("/Users/ana/Library");
        assert_eq!(
            exclude_path(&env, Platform::MacOs, Path::new("/Applications")),
            None
        );
        assert_eq!(
            exclude_path(&env, Platform::Linux, Path::new("/Users/ana")),
            None
        );
    }

    #[test]
    fn launch_commands_per_platform() {
        let p = Path::new("/tmp/report");
        assert_eq!(open_command(Platform::Linux, p).0, "xdg-open");
        assert_eq!(
            reveal_command(Platform::MacOs, p),
            ("open", vec!["-R".to_string(), "/tmp/report".to_string()])
        );
        let (program, args) = open_command(Platform::Windows, p);
        assert_eq!(program, "cmd");
        assert_eq!(args[..3], ["/c", "start", ""]);
        assert_eq!(reveal_command(Platform::Windows, p).1[0], "/select,");
        assert_eq!(Platform::MacOs.file_manager_name(), "Finder");
    }
}
