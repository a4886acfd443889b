//! Local staging directory for generated specifications.
//!
//! Each API has a specification document `<name>.json` and an optional free
//! text description `<name>.txt` that guides sample-data generation.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SynthError;
use crate::openapi::ApiSpec;

/// The generated-spec directory.
#[derive(Debug, Clone)]
pub struct SpecWorkspace {
    dir: PathBuf,
}

impl SpecWorkspace {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn spec_path(&self, api_name: &str) -> PathBuf {
        self.dir.join(format!("{api_name}.json"))
    }

    pub fn raw_path(&self, api_name: &str) -> PathBuf {
        self.dir.join(format!("{api_name}.txt"))
    }

    pub fn has_spec(&self, api_name: &str) -> bool {
        self.spec_path(api_name).is_file()
    }

    /// Writes the specification for `api_name`, replacing any previous one.
    ///
    /// ## Errors
    ///
    /// Returns [`SynthError::Workspace`] if the file cannot be written.
    pub fn save_spec(&self, api_name: &str, spec: &ApiSpec) -> Result<PathBuf, SynthError> {
        let path = self.spec_path(api_name);
        let json = serde_json::to_string_pretty(spec).map_err(|source| SynthError::InvalidSpec {
            path: path.display().to_string(),
            source,
        })?;
        self.write(&path, &json)?;
        Ok(path)
    }

    /// Loads the specification for `api_name`, or `None` if there is none.
    ///
    /// ## Errors
    ///
    /// Returns [`SynthError::InvalidSpec`] if the file is not a valid
    /// specification document.
    pub fn load_spec(&self, api_name: &str) -> Result<Option<ApiSpec>, SynthError> {
        let path = self.spec_path(api_name);
        let Some(contents) = self.read(&path)? else {
            return Ok(None);
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SynthError::InvalidSpec {
                path: path.display().to_string(),
                source,
            })
    }

    /// Writes the free-text description for `api_name`.
    pub fn save_raw(&self, api_name: &str, text: &str) -> Result<PathBuf, SynthError> {
        let path = self.raw_path(api_name);
        self.write(&path, text)?;
        Ok(path)
    }

    /// Loads the free-text description for `api_name`, if any.
    pub fn load_raw(&self, api_name: &str) -> Result<Option<String>, SynthError> {
        self.read(&self.raw_path(api_name))
    }

    /// Deletes every `*.json` and `*.txt` file in the directory.
    ///
    /// Returns the number of files removed. A missing directory removes
    /// nothing.
    pub fn clear(&self) -> io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let generated = path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "txt");
            if generated && path.is_file() {
                std::fs::remove_file(&path)?;
                debug!("Removed {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), SynthError> {
        let wrap = |source| SynthError::Workspace {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(wrap)?;
        std::fs::write(path, contents).map_err(wrap)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<String>, SynthError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SynthError::Workspace {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
