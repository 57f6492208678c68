/*!
 * Log routing, rotation and append
 *
 * Components map to `<base>/<category>/<component>.log`. Every append rotates
 * first when the active file has reached the size threshold, then writes the
 * whole entry with a single append-mode write so concurrent writers from other
 * processes never interleave inside an entry.
 *
 * Nothing here returns an error to the logging caller. Failures are reported
 * through `tracing` and the [`Delivery`] sentinel.
 */

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{RailConfig, RotationConfig, RoutingConfig};

/// Log subdirectory a component is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Commands,
    Libraries,
    Scripts,
    /// Fallback for every unlisted component
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Commands => "commands",
            Category::Libraries => "libraries",
            Category::Scripts => "scripts",
            Category::System => "system",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a write that is never allowed to fail loudly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Written,
    /// The entry was lost; the reason went to `tracing`
    Dropped,
}

impl Delivery {
    pub fn is_written(&self) -> bool {
        *self == Delivery::Written
    }
}

/// Resolves component paths and appends entries
#[derive(Debug, Clone)]
pub struct Router {
    base_dir: PathBuf,
    routing: RoutingConfig,
    rotation: RotationConfig,
}

impl Router {
    pub fn new(config: &RailConfig) -> Self {
        Self {
            base_dir: config.paths.base_dir.clone(),
            routing: config.routing.clone(),
            rotation: config.rotation.clone(),
        }
    }

    pub fn category(&self, component: &str) -> Category {
        let listed = |names: &[String]| names.iter().any(|name| name == component);

        if listed(&self.routing.commands) {
            Category::Commands
        } else if listed(&self.routing.libraries) {
            Category::Libraries
        } else if listed(&self.routing.scripts) {
            Category::Scripts
        } else {
            Category::System
        }
    }

    /// `<base>/<category>/<component>.log`
    pub fn resolve_path(&self, component: &str) -> PathBuf {
        self.base_dir
            .join(self.category(component).as_str())
            .join(format!("{component}.log"))
    }

    /// Rotate if needed, then append `text` in one write
    pub fn append(&self, path: &Path, text: &str) -> Delivery {
        if let Err(e) = self.rotate_if_needed(path) {
            warn!("Log rotation failed for {}: {}", path.display(), e);
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Cannot create log directory {}: {}", parent.display(), e);
                return Delivery::Dropped;
            }
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(text.as_bytes()));

        match result {
            Ok(()) => Delivery::Written,
            Err(e) => {
                warn!("Dropped log entry for {}: {}", path.display(), e);
                Delivery::Dropped
            }
        }
    }

    /// Shift `.log` -> `.log.1` -> ... -> `.log.N` once the file is full
    ///
    /// Returns whether a rotation happened.
    pub fn rotate_if_needed(&self, path: &Path) -> io::Result<bool> {
        if !self.rotation.enabled {
            return Ok(false);
        }

        let size = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if size < self.rotation.max_bytes {
            return Ok(false);
        }

        let retention = self.rotation.retention;
        if retention == 0 {
            fs::remove_file(path)?;
            debug!("Discarded full log {}", path.display());
            return Ok(true);
        }

        let oldest = rotated_path(path, retention);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..retention).rev() {
            let from = rotated_path(path, index);
            if from.exists() {
                fs::rename(&from, rotated_path(path, index + 1))?;
            }
        }
        fs::rename(path, rotated_path(path, 1))?;

        debug!("Rotated {} ({} bytes)", path.display(), size);
        Ok(true)
    }
}

/// `component.log` -> `component.log.<index>`
pub fn rotated_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    path.with_file_name(name)
}
