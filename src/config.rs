//! Where the native client library comes from.
//!
//! ## Environment variables
//!
//! - `MSSQL_BCP_LIBRARY` *(optional)*: load exactly this library file instead of probing the
//!   platform defaults.
//! - `MSSQL_BCP_SEARCH_DIRS` *(optional)*: extra directories, in platform path-list syntax,
//!   scanned for `libmsodbcsql*` files after the default names.
//!
//! The platform default is picked at runtime from [`std::env::consts::OS`]: Windows loads a
//! single fixed DLL name, Linux and macOS probe a list of versioned names and install
//! directories because no single canonical file name exists there.
use std::{env, path::PathBuf, sync::Arc};

use crate::{
    error::ErrorSink,
    runtime::{
        resolve, FixedPathProvider, NativeBulkCopyProvider, NativeFunctionTable, ProbingProvider,
    },
};

pub const LIBRARY_ENV: &str = "MSSQL_BCP_LIBRARY";
pub const SEARCH_DIRS_ENV: &str = "MSSQL_BCP_SEARCH_DIRS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySelection {
    Fixed(PathBuf),
    Probe {
        names: Vec<PathBuf>,
        search_dirs: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcpConfig {
    library: LibrarySelection,
}

impl Default for BcpConfig {
    fn default() -> Self {
        Self::for_os(env::consts::OS)
    }
}

impl BcpConfig {
    /// Platform defaults for the OS named like [`std::env::consts::OS`].
    pub fn for_os(os: &str) -> Self {
        let library = match os {
            "windows" => LibrarySelection::Fixed(PathBuf::from("msodbcsql17.dll")),
            "macos" => LibrarySelection::Probe {
                names: ["libmsodbcsql.18.dylib", "libmsodbcsql.17.dylib"]
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
                search_dirs: vec!["/usr/local/lib".into(), "/opt/homebrew/lib".into()],
            },
            _ => LibrarySelection::Probe {
                names: ["libmsodbcsql-18.so", "libmsodbcsql-17.so"]
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
                search_dirs: vec![
                    "/opt/microsoft/msodbcsql18/lib64".into(),
                    "/opt/microsoft/msodbcsql17/lib64".into(),
                ],
            },
        };
        Self { library }
    }

    /// Platform defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Platform defaults overridden by `lookup`, which plays the role of the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dirs) = lookup(SEARCH_DIRS_ENV) {
            for dir in env::split_paths(&dirs).filter(|d| !d.as_os_str().is_empty()) {
                config = config.with_search_dir(dir);
            }
        }
        if let Some(path) = lookup(LIBRARY_ENV).filter(|p| !p.is_empty()) {
            config = config.with_library(path);
        }
        config
    }

    /// Load exactly `path`.
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = LibrarySelection::Fixed(path.into());
        self
    }

    /// Probe `names` in order, keeping any configured search directories.
    pub fn with_candidates<I, P>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let names = names.into_iter().map(Into::into).collect();
        let search_dirs = match self.library {
            LibrarySelection::Probe { search_dirs, .. } => search_dirs,
            LibrarySelection::Fixed(_) => Vec::new(),
        };
        self.library = LibrarySelection::Probe { names, search_dirs };
        self
    }

    /// Also scan `dir` for `libmsodbcsql*`. A fixed library becomes the first probe name.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.library = match self.library {
            LibrarySelection::Fixed(path) => LibrarySelection::Probe {
                names: vec![path],
                search_dirs: vec![dir],
            },
            LibrarySelection::Probe {
                names,
                mut search_dirs,
            } => {
                search_dirs.push(dir);
                LibrarySelection::Probe { names, search_dirs }
            }
        };
        self
    }

    pub fn library(&self) -> &LibrarySelection {
        &self.library
    }

    pub fn provider(&self) -> Box<dyn NativeBulkCopyProvider> {
        match &self.library {
            LibrarySelection::Fixed(path) => Box::new(FixedPathProvider::new(path.clone())),
            LibrarySelection::Probe { names, search_dirs } => {
                let provider = search_dirs
                    .iter()
                    .fold(ProbingProvider::new(names.clone()), |p, dir| {
                        p.with_search_dir(dir.clone())
                    });
                Box::new(provider)
            }
        }
    }

    /// Resolve the function table this configuration points at.
    pub fn resolve(&self, errors: &mut ErrorSink) -> Option<Arc<NativeFunctionTable>> {
        resolve(self.provider().as_ref(), errors)
    }
}
