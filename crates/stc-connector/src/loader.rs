//! Module artifact discovery and loading.
//!
//! An artifact is any file under the module root carrying the platform's
//! dynamic-library extension (`.so`, `.dylib`, `.dll`). Each artifact is bound
//! to the factory registered under its file stem. Every discovered artifact
//! yields exactly one module: artifacts that cannot be opened, have no factory,
//! or fail `setup()` are replaced by a fatal [`DummyModule`] carrying the
//! reason as its first error.

use crate::registry::{ModuleHandle, ModuleRegistry};
use async_trait::async_trait;
use stc_common::{Error, ModuleID, Result, GENERATED_ID_LENGTH};
use stc_module_api::{ErrorMessage, FactoryRegistry, MessageBus, Module, ModuleBase, ModuleData};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A module that went through loading, successfully or not.
pub struct LoadedModule {
    pub module: Box<dyn Module>,
    pub data: Arc<ModuleData>,
}

/// Stand-in for an artifact that failed to load. Always fatal.
pub struct DummyModule {
    base: ModuleBase,
}

impl DummyModule {
    /// Creates the dummy and marks `data` fatal with `reason` as its first error.
    pub fn new(data: Arc<ModuleData>, reason: &Error) -> Self {
        let message = Error::load(data.file_name(), reason.to_string());
        data.with_status(|status| {
            status.add_error(message.to_string());
            status.mark_fatal();
        });

        let mut base = ModuleBase::default();
        base.set_module_data(data);
        Self { base }
    }
}

#[async_trait]
impl Module for DummyModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start(&mut self, _is_startup: bool) -> Result<()> {
        Err(Error::module_fatal(self.base.id().clone()))
    }

    async fn stop(&mut self) {}
}

/// Returns the directory to search. A file path searches its parent directory.
fn search_root(root: &Path) -> PathBuf {
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    if root.is_file() {
        root.parent().map(Path::to_path_buf).unwrap_or(root)
    } else {
        root
    }
}

/// Recursively collects artifacts under `root`, keyed by file name.
///
/// A later artifact with the same file name replaces the earlier one.
/// Unreadable directories are logged and skipped. Symlinked directories are
/// not descended into.
pub fn discover_artifacts(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    let mut pending = vec![search_root(root)];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[Loader] Cannot read directory {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if file_type.is_symlink() && path.is_dir() {
                debug!("[Loader] Not following directory link {}", path.display());
                continue;
            }

            let is_artifact = path
                .extension()
                .map(|ext| ext == std::env::consts::DLL_EXTENSION)
                .unwrap_or(false);
            if !is_artifact {
                continue;
            }

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                debug!("[Loader] Found module artifact {}", path.display());
                found.insert(name.to_string(), path);
            }
        }
    }

    found
}

/// Loads artifacts into modules using a set of factories.
pub struct ModuleLoader<'a> {
    factories: &'a FactoryRegistry,
    bus: MessageBus,
    connector_version: String,
    max_errors: usize,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(
        factories: &'a FactoryRegistry,
        bus: MessageBus,
        connector_version: impl Into<String>,
        max_errors: usize,
    ) -> Self {
        Self {
            factories,
            bus,
            connector_version: connector_version.into(),
            max_errors,
        }
    }

    /// Loads every artifact found under `root`.
    pub async fn load_all(&self, root: &Path) -> Vec<LoadedModule> {
        let artifacts = discover_artifacts(root);
        info!(
            "[Loader] Found {} module artifact(s) under {}",
            artifacts.len(),
            root.display()
        );

        let mut loaded = Vec::with_capacity(artifacts.len());
        for (file_name, path) in artifacts {
            loaded.push(self.load(&file_name, &path).await);
        }
        loaded
    }

    /// Loads a single artifact. Never fails; problems produce a fatal dummy.
    pub async fn load(&self, file_name: &str, path: &Path) -> LoadedModule {
        let data = Arc::new(ModuleData::new(
            self.connector_version.clone(),
            file_name,
            path,
            self.bus.clone(),
            self.max_errors,
        ));

        let mut module = match self.open(path) {
            Ok(module) => module,
            Err(e) => return dummy(data, &e),
        };

        module.set_module_data(Arc::clone(&data));
        if let Err(e) = module.setup().await {
            return dummy(data, &e);
        }

        LoadedModule { module, data }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Module>> {
        std::fs::File::open(path).map_err(|e| Error::module(format!("error opening file - {}", e)))?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        match self.factories.create(stem) {
            None => Err(Error::module(format!(
                "not exported properly - no module factory registered for '{}'",
                stem
            ))),
            Some(Err(e)) => Err(Error::module(format!(
                "module does not implement the module contract properly - {}",
                e
            ))),
            Some(Ok(module)) => Ok(module),
        }
    }
}

fn dummy(data: Arc<ModuleData>, reason: &Error) -> LoadedModule {
    LoadedModule {
        module: Box::new(DummyModule::new(Arc::clone(&data), reason)),
        data,
    }
}

/// Registers loaded modules, generating IDs for modules that did not set one.
///
/// A generated ID is reported through the error queue as a non-fatal error.
/// Returns the registered IDs in load order.
pub fn register_modules(loaded: Vec<LoadedModule>, registry: &ModuleRegistry) -> Vec<ModuleID> {
    let mut ids = Vec::with_capacity(loaded.len());

    for LoadedModule { mut module, data } in loaded {
        if data.is_fatal() {
            let reason = data.status().last_errors().next().map(str::to_string);
            error!(
                "[Loader] Error loading module {}: {}",
                data.file_name(),
                reason.unwrap_or_default()
            );
        } else {
            info!(
                "[Loader] ✅ Module {} loaded: {} - {}",
                data.file_name(),
                module.name(),
                module.description()
            );
        }

        let generated = module.id().is_empty();
        if generated {
            module.set_id(ModuleID::random(GENERATED_ID_LENGTH));
        }

        let id = module.id();
        registry.insert(ModuleHandle::new(module, Arc::clone(&data)));

        if generated {
            let message = format!(
                "No ID set for module {}, generated ID = {}",
                data.file_name(),
                id
            );
            data.bus()
                .send_error(ErrorMessage::new(id.clone(), Error::module(message), false));
        }

        ids.push(id);
    }

    ids
}
