//! Native client loader and the process-wide function table cache.
//!
//! This module is responsible for:
//! - Describing where the native client library may live ([`NativeBulkCopyProvider`]).
//! - Dynamically loading that library and resolving the four BCP entry points into a
//!   [`NativeFunctionTable`].
//! - Sharing one loaded table per library path across every session in the process.
//!
//! ## Resolution semantics
//!
//! A table is all-or-nothing: if any of `bcp_initW`, `bcp_bind`, `bcp_sendrow`, `bcp_done` is
//! missing, the library is unloaded again and no table is produced.
//!
//! Loaded tables are cached by path behind a single lock, so the first resolution for a path
//! happens once even with concurrent callers. The cache holds weak references; the library is
//! unloaded when the last [`Arc<NativeFunctionTable>`] is dropped.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, Weak},
};

use libloading::Library;

use crate::{
    api::{Api, SymbolSource},
    error::ErrorSink,
    sys::*,
    Error, Result,
};

/// Process-wide cache of loaded tables keyed by library path.
static TABLES: OnceLock<Mutex<HashMap<PathBuf, Weak<NativeFunctionTable>>>> = OnceLock::new();

/// The four bulk copy operations a session drives.
///
/// [`NativeFunctionTable`] forwards to the resolved native entry points. Any other
/// implementation must honour the same status conventions (`SUCCEED`/`FAIL`, `-1` from `done`).
pub trait BcpFunctions {
    /// # Safety
    ///
    /// `conn` must be a live ODBC connection handle and `table` a NUL-terminated UTF-16 string.
    unsafe fn init(&self, conn: HDBC, table: LPCWSTR, direction: INT) -> RETCODE;

    /// # Safety
    ///
    /// `data` must stay valid and at the same address until `done` has been called.
    #[allow(clippy::too_many_arguments)]
    unsafe fn bind(
        &self,
        conn: HDBC,
        data: LPCBYTE,
        indicator_len: INT,
        data_len: DBINT,
        terminator: LPCBYTE,
        terminator_len: INT,
        data_type: INT,
        server_column: INT,
    ) -> RETCODE;

    /// # Safety
    ///
    /// `conn` must have been initialized and bound for bulk copy.
    unsafe fn send_row(&self, conn: HDBC) -> RETCODE;

    /// # Safety
    ///
    /// `conn` must have been initialized for bulk copy.
    unsafe fn done(&self, conn: HDBC) -> DBINT;
}

/// Resolved bulk copy entry points and the library that owns them.
///
/// The library, when present, is kept alive as long as the table and released exactly once on
/// drop. A table built from a bare [`SymbolSource`] owns no library.
pub struct NativeFunctionTable {
    api: Api,
    path: PathBuf,
    /// Keep the library alive for as long as the function pointers are reachable.
    lib: Option<Library>,
}

impl NativeFunctionTable {
    /// Load the library at `path` and resolve all four entry points.
    ///
    /// # Errors
    ///
    /// - [`Error::LibraryLoad`] if the library cannot be opened; no symbol is attempted.
    /// - [`Error::MissingSymbol`] if any entry point is absent; the library is released before
    ///   returning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lib = unsafe { Library::new(&path) }.map_err(|e| Error::LibraryLoad {
            path: path.clone(),
            detail: e.to_string(),
        })?;

        // `lib` is dropped on the error path, which unloads it again.
        let api = unsafe { Api::load(&lib) }.map_err(|e| Error::MissingSymbol {
            path: path.clone(),
            symbol: e.symbol,
            detail: e.detail,
        })?;

        tracing::debug!(path = %path.display(), "resolved bulk copy entry points");
        Ok(Self {
            api,
            path,
            lib: Some(lib),
        })
    }

    /// Build a table from an arbitrary symbol source, labelled with `origin`.
    ///
    /// # Safety
    ///
    /// Every address `src` returns must be a function with the matching BCP signature and must
    /// outlive the table.
    pub unsafe fn from_symbols<S: SymbolSource + ?Sized>(
        src: &S,
        origin: impl Into<PathBuf>,
    ) -> Result<Self> {
        let path = origin.into();
        let api = Api::load(src).map_err(|e| Error::MissingSymbol {
            path: path.clone(),
            symbol: e.symbol,
            detail: e.detail,
        })?;
        Ok(Self {
            api,
            path,
            lib: None,
        })
    }

    /// Return the cached table for `path`, loading it if no live table exists.
    pub fn shared(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::shared_with(path.as_ref(), |p| Self::load(p))
    }

    /// Cache lookup for `path`; `load` runs only when no live table is cached.
    fn shared_with(path: &Path, load: impl FnOnce(&Path) -> Result<Self>) -> Result<Arc<Self>> {
        let cache = TABLES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut tables = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(table) = tables.get(path).and_then(Weak::upgrade) {
            return Ok(table);
        }

        let table = Arc::new(load(path)?);
        tables.retain(|_, weak| weak.strong_count() > 0);
        tables.insert(path.to_path_buf(), Arc::downgrade(&table));
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owns_library(&self) -> bool {
        self.lib.is_some()
    }
}

impl BcpFunctions for NativeFunctionTable {
    unsafe fn init(&self, conn: HDBC, table: LPCWSTR, direction: INT) -> RETCODE {
        (self.api.bcp_initW)(conn, table, std::ptr::null(), std::ptr::null(), direction)
    }

    unsafe fn bind(
        &self,
        conn: HDBC,
        data: LPCBYTE,
        indicator_len: INT,
        data_len: DBINT,
        terminator: LPCBYTE,
        terminator_len: INT,
        data_type: INT,
        server_column: INT,
    ) -> RETCODE {
        (self.api.bcp_bind)(
            conn,
            data,
            indicator_len,
            data_len,
            terminator,
            terminator_len,
            data_type,
            server_column,
        )
    }

    unsafe fn send_row(&self, conn: HDBC) -> RETCODE {
        (self.api.bcp_sendrow)(conn)
    }

    unsafe fn done(&self, conn: HDBC) -> DBINT {
        (self.api.bcp_done)(conn)
    }
}

impl Drop for NativeFunctionTable {
    fn drop(&mut self) {
        if self.lib.is_some() {
            tracing::debug!(path = %self.path.display(), "releasing bulk copy library");
        }
    }
}

// -------------------------- Providers --------------------------

/// Where to look for the native client library.
pub trait NativeBulkCopyProvider: Send + Sync {
    /// Human readable summary used in logs.
    fn describe(&self) -> String;

    /// Paths or bare library names to try, in order.
    fn candidates(&self) -> Vec<PathBuf>;
}

/// Exactly one library location.
#[derive(Debug, Clone)]
pub struct FixedPathProvider {
    path: PathBuf,
}

impl FixedPathProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NativeBulkCopyProvider for FixedPathProvider {
    fn describe(&self) -> String {
        format!("fixed path {}", self.path.display())
    }

    fn candidates(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

/// Ordered versioned names, followed by `libmsodbcsql*` files found in search directories.
///
/// No single canonical file name exists across driver releases, so directories are scanned at
/// resolution time. Within one directory, names sort by their numeric version parts, newest
/// first.
#[derive(Debug, Clone, Default)]
pub struct ProbingProvider {
    names: Vec<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ProbingProvider {
    pub fn new<I, P>(names: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            search_dirs: Vec::new(),
        }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    fn scan(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("libmsodbcsql"))
            })
            .collect();
        found.sort_by(|a, b| version_key(b).cmp(&version_key(a)).then_with(|| b.cmp(a)));
        found
    }
}

/// Numeric version parts of a `libmsodbcsql` file name, so `17.10` orders above `17.9`.
fn version_key(path: &Path) -> Vec<u64> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("libmsodbcsql"))
        .map(|rest| {
            rest.trim_start_matches(['-', '.'])
                .split('.')
                .filter_map(|part| part.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

impl NativeBulkCopyProvider for ProbingProvider {
    fn describe(&self) -> String {
        format!(
            "{} names, {} search dirs",
            self.names.len(),
            self.search_dirs.len()
        )
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut out = self.names.clone();
        for dir in &self.search_dirs {
            for p in Self::scan(dir) {
                if !out.contains(&p) {
                    out.push(p);
                }
            }
        }
        out
    }
}

/// Resolve a function table from the first candidate that opens.
///
/// Each candidate that cannot be opened appends an [`Error::LibraryLoad`] and probing continues.
/// The first candidate that opens ends the search: a missing symbol there appends
/// [`Error::MissingSymbol`] and no table is returned.
pub fn resolve(
    provider: &dyn NativeBulkCopyProvider,
    errors: &mut ErrorSink,
) -> Option<Arc<NativeFunctionTable>> {
    let candidates = provider.candidates();
    tracing::debug!(provider = %provider.describe(), count = candidates.len(), "resolving bulk copy library");

    if candidates.is_empty() {
        errors.push(Error::LibraryLoad {
            path: PathBuf::new(),
            detail: format!("no candidates from {}", provider.describe()),
        });
        return None;
    }

    for path in candidates {
        match NativeFunctionTable::shared(&path) {
            Ok(table) => return Some(table),
            Err(e @ Error::LibraryLoad { .. }) => {
                tracing::debug!(path = %path.display(), error = %e, "candidate did not load");
                errors.push(e);
            }
            Err(e) => {
                errors.push(e);
                return None;
            }
        }
    }
    None
}
