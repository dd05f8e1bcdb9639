//! Host environment lookups behind a trait so path and PATH resolution can be
//! exercised without touching the real machine.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

pub trait Environment: Send + Sync {
    fn home_dir(&self) -> Option<PathBuf>;
    fn var(&self, key: &str) -> Option<String>;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn list_dir(&self, path: &Path) -> Vec<DirEntryInfo>;

    fn find_executable(&self, tool: &str) -> Option<PathBuf> {
        let candidate = Path::new(tool);
        if candidate.components().count() > 1 {
            return self.is_file(candidate).then(|| candidate.to_path_buf());
        }

        let path_var = self.var("PATH")?;
        let extensions: Vec<String> = if cfg!(windows) && candidate.extension().is_none() {
            self.var("PATHEXT")
                .unwrap_or_else(|| ".EXE;.CMD;.BAT;.COM".to_string())
                .split(';')
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            vec![String::new()]
        };

        std::env::split_paths(&path_var)
            .flat_map(|dir| {
                extensions
                    .iter()
                    .map(move |ext| dir.join(format!("{tool}{ext}")))
            })
            .find(|path| self.is_file(path))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir().filter(|p| !p.as_os_str().is_empty())
    }

    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list_dir(&self, path: &Path) -> Vec<DirEntryInfo> {
        let Ok(entries) = std::fs::read_dir(path) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| {
                let file_type = entry.file_type().ok()?;
                Some(DirEntryInfo {
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir: file_type.is_dir(),
                    is_symlink: file_type.is_symlink(),
                })
            })
            .collect()
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::testing::FakeEnvironment;
    use super::*;

    #[test]
    fn finds_tool_on_path() {
        let env = FakeEnvironment::default()
            .set_var("PATH", "/usr/local/bin:/usr/bin")
            .file("/usr/bin/pwsh");
        assert_eq!(
            env.find_executable("pwsh"),
            Some(PathBuf::from("/usr/bin/pwsh"))
        );
        assert_eq!(env.find_executable("powershell"), None);
    }

    #[test]
    fn missing_path_means_nothing_found() {
        let env = FakeEnvironment::default().file("/usr/bin/pwsh");
        assert_eq!(env.find_executable("pwsh"), None);
    }

    #[test]
    fn explicit_paths_skip_search() {
        let env = FakeEnvironment::default().file("/opt/tools/probe");
        assert!(env.find_executable("/opt/tools/probe").is_some());
        assert!(env.find_executable("/opt/tools/other").is_none());
    }
}
