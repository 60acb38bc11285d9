//! Library search path handed to the compiler backend.
//!
//! The base path is discovered once from the component's own deployment,
//! either an exploded directory or an archive mounted through an overlay, and
//! later supplemented with the libraries backing the imports of each script.

use crate::config::ClasspathConfig;
use crate::script::introspect;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

pub const PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Ordered, duplicate free list of search path entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    entries: Vec<String>,
}

impl Classpath {
    pub fn push(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        if entry.is_empty() || self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.iter().any(|existing| existing == entry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn to_arg(&self) -> String {
        self.entries.join(&PATH_SEPARATOR.to_string())
    }
}

/// Finds the library that provides an imported symbol.
pub trait ImportLocator: Send + Sync {
    /// Returns the location of the library holding `symbol`, searching
    /// `libraries` (the current search path) first.
    fn locate(&self, symbol: &str, libraries: &[PathBuf]) -> Result<Option<String>, String>;
}

/// Locator that indexes the class entries of library archives.
#[derive(Default)]
pub struct LibraryIndexLocator {
    extra_libraries: Vec<PathBuf>,
    index: Mutex<HashMap<PathBuf, Arc<HashSet<String>>>>,
}

impl LibraryIndexLocator {
    pub fn new(extra_libraries: Vec<PathBuf>) -> Self {
        Self {
            extra_libraries,
            index: Mutex::new(HashMap::new()),
        }
    }

    fn entries_of(&self, library: &Path) -> Result<Arc<HashSet<String>>, String> {
        let mut index = self
            .index
            .lock()
            .map_err(|_| "library index lock poisoned".to_string())?;
        if let Some(entries) = index.get(library) {
            return Ok(entries.clone());
        }

        let file = File::open(library).map_err(|e| format!("{}: {e}", library.display()))?;
        let archive =
            zip::ZipArchive::new(file).map_err(|e| format!("{}: {e}", library.display()))?;
        let entries: HashSet<String> = archive.file_names().map(str::to_string).collect();
        let entries = Arc::new(entries);
        index.insert(library.to_path_buf(), entries.clone());
        Ok(entries)
    }

    fn candidates(symbol: &str) -> Vec<String> {
        let symbol = symbol.trim_start_matches("static ").trim();
        if let Some(package) = symbol.strip_suffix(".*") {
            return vec![format!("{}/", package.replace('.', "/"))];
        }
        let mut candidates = vec![format!("{}.class", symbol.replace('.', "/"))];
        // static member imports name the member after the owning type
        if let Some((owner, _member)) = symbol.rsplit_once('.') {
            candidates.push(format!("{}.class", owner.replace('.', "/")));
        }
        candidates
    }
}

impl ImportLocator for LibraryIndexLocator {
    fn locate(&self, symbol: &str, libraries: &[PathBuf]) -> Result<Option<String>, String> {
        let candidates = Self::candidates(symbol);
        for library in libraries.iter().chain(self.extra_libraries.iter()) {
            if !library.is_file() {
                continue;
            }
            let entries = match self.entries_of(library) {
                Ok(entries) => entries,
                Err(e) => {
                    trace!("Skipping unreadable library {}: {}", library.display(), e);
                    continue;
                }
            };
            let found = candidates.iter().any(|candidate| {
                if candidate.ends_with('/') {
                    entries.iter().any(|entry| entry.starts_with(candidate))
                } else {
                    entries.contains(candidate)
                }
            });
            if found {
                return Ok(Some(library.display().to_string()));
            }
        }
        Ok(None)
    }
}

/// Builds and caches the compiler search path for the process lifetime.
pub struct ClasspathResolver {
    config: ClasspathConfig,
    classpath: RwLock<Classpath>,
    locator: Arc<dyn ImportLocator>,
}

impl ClasspathResolver {
    pub fn new(config: ClasspathConfig) -> Self {
        let locator = Arc::new(LibraryIndexLocator::new(config.extra_entries.clone()));
        Self::with_locator(config, locator)
    }

    pub fn with_locator(config: ClasspathConfig, locator: Arc<dyn ImportLocator>) -> Self {
        Self {
            config,
            classpath: RwLock::new(Classpath::default()),
            locator,
        }
    }

    /// Discover the deployment's libraries. Later calls are no-ops once the
    /// path is non-empty.
    pub async fn construct(&self) -> std::io::Result<()> {
        if !self.classpath.read().await.is_empty() {
            return Ok(());
        }

        let libraries = discover_libraries(&self.config)?;

        let mut classpath = self.classpath.write().await;
        if classpath.is_empty() {
            for library in libraries {
                classpath.push(library.display().to_string());
            }
            for extra in &self.config.extra_entries {
                classpath.push(extra.display().to_string());
            }
            info!("Constructed classpath with {} entries", classpath.len());
            debug!("classpath={}", classpath.to_arg());
        }
        Ok(())
    }

    /// Append the libraries that back the imports of `source`.
    /// Unresolvable imports are logged and skipped.
    pub async fn supplement(&self, source: &str) {
        for symbol in introspect::imports(source) {
            if !self.needs_location(&symbol) {
                continue;
            }

            let libraries: Vec<PathBuf> = self
                .classpath
                .read()
                .await
                .entries()
                .iter()
                .map(PathBuf::from)
                .collect();

            match self.locator.locate(&symbol, &libraries) {
                Ok(Some(location)) => {
                    let location = normalize_location(&location);
                    if self.classpath.write().await.push(location.clone()) {
                        debug!("Added {} to classpath for import {}", location, symbol);
                    }
                }
                Ok(None) => warn!("Failed to find location for class {}", symbol),
                Err(e) => warn!("Failed to find location for class {}: {}", symbol, e),
            }
        }
    }

    pub async fn classpath(&self) -> Classpath {
        self.classpath.read().await.clone()
    }

    fn needs_location(&self, symbol: &str) -> bool {
        let symbol = symbol.trim_start_matches("static ").trim();
        let starts_with_any =
            |prefixes: &[String]| prefixes.iter().any(|prefix| symbol.starts_with(prefix.as_str()));

        let core = starts_with_any(&self.config.core_prefixes)
            && !starts_with_any(&self.config.passthrough_prefixes);
        !core && !starts_with_any(&self.config.internal_prefixes)
    }
}

/// Strip URL decorations some locators report (`file:` scheme, archive `!/`).
pub fn normalize_location(location: &str) -> String {
    let location = location.strip_prefix("file:").unwrap_or(location);
    let location = location.strip_suffix("!/").unwrap_or(location);
    location.to_string()
}

fn component_location(config: &ClasspathConfig) -> std::io::Result<PathBuf> {
    match &config.component_location {
        Some(location) => Ok(location.clone()),
        None => std::env::current_exe(),
    }
}

fn discover_libraries(config: &ClasspathConfig) -> std::io::Result<Vec<PathBuf>> {
    let location = component_location(config)?;
    let extension = config.library_extension.as_str();

    if location.exists() {
        // exploded deployment: libraries sit next to the component
        let deployment_dir = if location.is_dir() {
            location.clone()
        } else {
            location
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        debug!("Exploded deployment at {}", deployment_dir.display());
        return list_libraries(&deployment_dir, extension, 1);
    }

    let physical = resolve_physical(config, &location).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "component location {} is neither present nor mapped by an overlay root",
                location.display()
            ),
        )
    })?;
    debug!(
        "Archive deployment {} backed by {}",
        location.display(),
        physical.display()
    );

    let deployment_dir = physical
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut libraries = Vec::new();
    for entry in std::fs::read_dir(&deployment_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            libraries.extend(list_libraries(&path, extension, usize::MAX)?);
        }
    }
    Ok(libraries)
}

fn resolve_physical(config: &ClasspathConfig, location: &Path) -> Option<PathBuf> {
    config.overlay_roots.iter().find_map(|root| {
        location
            .strip_prefix(&root.virtual_prefix)
            .ok()
            .map(|rest| root.physical_prefix.join(rest))
    })
}

fn list_libraries(dir: &Path, extension: &str, max_depth: usize) -> std::io::Result<Vec<PathBuf>> {
    let mut libraries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == extension) {
            libraries.push(path.canonicalize()?);
        }
    }
    Ok(libraries)
}
