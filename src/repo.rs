use std::path::{Path, PathBuf};

use crate::backend::{Backend, FsBackend};
use crate::config::{Config, Limits};
use crate::error::{Error, IoResultExt, Result};

/// a got repository: one bare repo root shared by both transports
pub struct Repo {
    path: PathBuf,
    config: Config,
    backend: Box<dyn Backend>,
}

impl Repo {
    /// initialize a new repository at the given path
    pub fn init(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        // create directory structure
        std::fs::create_dir_all(path.join("objects")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs")).with_path(path)?;
        std::fs::create_dir_all(path.join("maps")).with_path(path)?;
        std::fs::create_dir_all(path.join("tmp")).with_path(path)?;

        let config = Config::default();
        config.save(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            backend: Box::new(FsBackend::new(path)),
        })
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            backend: Box::new(FsBackend::new(path)),
        })
    }

    /// open with an injected byte-storage backend
    pub fn open_with_backend(path: &Path, backend: Box<dyn Backend>) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            backend,
        })
    }

    /// repository root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// request quotas in force for this repository
    pub fn limits(&self) -> &Limits {
        &self.config.limits
    }

    /// byte storage for objects
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// path to config.toml
    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    /// path to refs directory
    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    /// path to the address mapping directory
    pub fn maps_path(&self) -> PathBuf {
        self.path.join("maps")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }
}
