//! Represents the directories the worker may write diagnostic files to.
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum FsAccess {
    Cache,
    Current,
}

impl FsAccess {
    /// Directory for diagnostic dumps, e.g. `~/.cache/ort_port/diag`, falling
    /// back to `./ort_port/diag` where there is no cache directory.
    pub fn diag_dir() -> anyhow::Result<PathBuf> {
        Self::Cache
            .path_with_subs(&["diag"])
            .or_else(|_| Self::Current.path_with_subs(&["diag"]))
    }

    /// Retrieves the `ort_port` directory below the base path of this directory type.
    fn get_path(&self) -> anyhow::Result<PathBuf> {
        let base_path = match self {
            FsAccess::Cache => dirs::cache_dir(),
            FsAccess::Current => std::env::current_dir().ok(),
        };

        let mut path = base_path.ok_or_else(|| {
            anyhow::anyhow!("Unsupported operating system. Supported OS: Linux, MacOS, Windows.")
        })?;

        path.push("ort_port");
        Ok(path)
    }

    /// Constructs a path below the `ort_port` directory, creating it automatically.
    ///
    /// Examples:
    /// `~/.cache/ort_port/sub1/sub2`, `./ort_port/sub1`.
    pub fn path_with_subs(&self, subs: &[&str]) -> anyhow::Result<PathBuf> {
        let mut d = self.get_path()?;
        for sub in subs {
            d.push(sub);
        }
        Self::create_directory(&d)?;
        Ok(d)
    }

    fn create_directory(path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        Ok(())
    }
}
