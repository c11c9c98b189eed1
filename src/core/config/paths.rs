//! On-disk layout of a deployment.
//!
//! `config.yml` lives in the project root (`INTEGRIBOT_ROOT`, else the
//! working directory). Everything the service writes goes under the data
//! directory (`INTEGRIBOT_DATA_DIR`, else `<root>/data`).

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

const ROOT_ENV: &str = "INTEGRIBOT_ROOT";
const DATA_DIR_ENV: &str = "INTEGRIBOT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Vectors (sqlite backend) and the document registry.
    pub db_path: PathBuf,
    pub secrets_path: PathBuf,
    pub upload_dir: PathBuf,
}

impl AppPaths {
    /// Layout from the environment. Directories are not created here; see
    /// [`AppPaths::ensure_dirs`].
    pub fn from_env() -> Self {
        let project_root = env::var_os(ROOT_ENV)
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root.join("data"));
        Self::layout(project_root, data_dir)
    }

    /// Everything, config included, rooted at one directory.
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self::layout(data_dir.clone(), data_dir)
    }

    fn layout(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        Self {
            log_dir: user_data_dir.join("logs"),
            db_path: user_data_dir.join("integribot.db"),
            secrets_path: user_data_dir.join("secrets.yaml"),
            upload_dir: user_data_dir.join("uploads"),
            project_root,
            user_data_dir,
        }
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.user_data_dir, &self.log_dir, &self.upload_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
