//! Plugin boundary: dynamically loaded modules and frameworks.
//!
//! Each module ships as an independently loadable library named with a fixed
//! stem plus the module's own name, carrying one parameterless constructor
//! that returns a newly allocated instance, plus an ABI-version symbol. A
//! framework library follows the same convention with its own stem. The
//! loader validates both symbols at load time and rejects incompatible
//! plugins before any invocation begins.
//!
//! For a module named `magic` on Linux the library is
//! `libtreebridge_module_magic.so` and its entry points are
//! `treebridge_module_magic_constructor` and `treebridge_abi_version`.
//! Dashes in component names map to underscores in symbol names.

use crate::error::BridgeError;
use crate::module::{Framework, Module};
use libloading::Library;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entry-point contract version. Bumped on any breaking change to the
/// constructor signatures or the core traits.
pub const ABI_VERSION: u32 = 1;

/// Symbol every plugin must export, returning its [`ABI_VERSION`].
pub const ABI_VERSION_SYMBOL: &str = "treebridge_abi_version";

/// Signature of the ABI-version entry point.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Signature of a module constructor entry point.
pub type ModuleConstructor = unsafe extern "C" fn() -> *mut Box<dyn Module>;

/// Signature of a framework constructor entry point.
pub type FrameworkConstructor = unsafe extern "C" fn() -> *mut Box<dyn Framework>;

/// Library file name for a module, e.g. `libtreebridge_module_magic.so`.
pub fn module_library_name(name: &str) -> String {
    format!(
        "{}treebridge_module_{}{}",
        env::consts::DLL_PREFIX,
        name,
        env::consts::DLL_SUFFIX
    )
}

/// Library file name for a framework, e.g. `libtreebridge_framework_mattock.so`.
pub fn framework_library_name(name: &str) -> String {
    format!(
        "{}treebridge_framework_{}{}",
        env::consts::DLL_PREFIX,
        name,
        env::consts::DLL_SUFFIX
    )
}

/// Constructor symbol for a module, a valid C identifier.
pub fn module_constructor_symbol(name: &str) -> String {
    format!("treebridge_module_{}_constructor", sanitize(name))
}

/// Constructor symbol for a framework.
pub fn framework_constructor_symbol(name: &str) -> String {
    format!("treebridge_framework_{}_constructor", sanitize(name))
}

fn sanitize(name: &str) -> String {
    name.replace('-', "_")
}

/// A module instance together with the library that owns its code. The
/// library must stay loaded for as long as the instance is alive, which the
/// field order here guarantees (instance drops first).
pub struct LoadedModule {
    module: Box<dyn Module>,
    _library: Library,
}

impl LoadedModule {
    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    /// Give up the library handle along with the module. The caller keeps
    /// both alive together.
    pub fn into_parts(self) -> (Box<dyn Module>, Library) {
        (self.module, self._library)
    }
}

/// A framework instance together with the library that owns its code.
pub struct LoadedFramework {
    framework: Box<dyn Framework>,
    _library: Library,
}

impl LoadedFramework {
    pub fn framework_mut(&mut self) -> &mut dyn Framework {
        self.framework.as_mut()
    }
}

/// Resolves component names to plugin libraries and constructs instances.
pub struct PluginLoader {
    search_dirs: Vec<PathBuf>,
}

impl PluginLoader {
    /// Search the given directories, in order.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, BridgeError> {
        for dir in &self.search_dirs {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(BridgeError::PluginLoad {
            path: PathBuf::from(file_name),
            reason: format!(
                "not found in search path ({} dirs)",
                self.search_dirs.len()
            ),
        })
    }

    /// Load a module plugin by name and construct its instance.
    pub fn load_module(&self, name: &str) -> Result<LoadedModule, BridgeError> {
        let path = self.resolve(&module_library_name(name))?;
        let symbol = module_constructor_symbol(name);
        let (library, raw) = unsafe { construct::<Box<dyn Module>>(&path, &symbol)? };
        info!(module = name, path = %path.display(), "loaded module plugin");
        Ok(LoadedModule {
            module: *unsafe { Box::from_raw(raw) },
            _library: library,
        })
    }

    /// Load a framework plugin by name and construct its instance.
    pub fn load_framework(&self, name: &str) -> Result<LoadedFramework, BridgeError> {
        let path = self.resolve(&framework_library_name(name))?;
        let symbol = framework_constructor_symbol(name);
        let (library, raw) = unsafe { construct::<Box<dyn Framework>>(&path, &symbol)? };
        info!(framework = name, path = %path.display(), "loaded framework plugin");
        Ok(LoadedFramework {
            framework: *unsafe { Box::from_raw(raw) },
            _library: library,
        })
    }
}

/// Open `path`, validate its ABI version, and run the named constructor.
///
/// # Safety
/// The library must export the named symbol with the documented constructor
/// signature; the returned pointer must come from `Box::into_raw`.
unsafe fn construct<T>(path: &Path, symbol: &str) -> Result<(Library, *mut T), BridgeError> {
    let library = Library::new(path).map_err(|e| BridgeError::PluginLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let abi: libloading::Symbol<AbiVersionFn> = library
        .get(ABI_VERSION_SYMBOL.as_bytes())
        .map_err(|e| BridgeError::PluginEntryPoint {
            path: path.to_path_buf(),
            reason: format!("missing {}: {}", ABI_VERSION_SYMBOL, e),
        })?;
    let version = abi();
    if version != ABI_VERSION {
        return Err(BridgeError::PluginEntryPoint {
            path: path.to_path_buf(),
            reason: format!("ABI version {} does not match ours ({})", version, ABI_VERSION),
        });
    }

    let constructor: libloading::Symbol<unsafe extern "C" fn() -> *mut T> = library
        .get(symbol.as_bytes())
        .map_err(|e| BridgeError::PluginEntryPoint {
            path: path.to_path_buf(),
            reason: format!("missing constructor {}: {}", symbol, e),
        })?;
    debug!(symbol, "constructing plugin instance");
    let raw = constructor();
    if raw.is_null() {
        return Err(BridgeError::PluginEntryPoint {
            path: path.to_path_buf(),
            reason: format!("constructor {} returned null", symbol),
        });
    }
    // Drop the Symbol borrows before moving the library out.
    drop(constructor);
    drop(abi);
    Ok((library, raw))
}

/// Declare the entry points of a module plugin crate.
///
/// `$constructor` must be the symbol name produced by
/// [`module_constructor_symbol`] for the module's name.
///
/// ```ignore
/// treebridge::export_module!(treebridge_module_demo_constructor, || {
///     Box::new(DemoModule::new())
/// });
/// ```
#[macro_export]
macro_rules! export_module {
    ($constructor:ident, $make:expr) => {
        #[no_mangle]
        pub extern "C" fn treebridge_abi_version() -> u32 {
            $crate::plugin::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn $constructor() -> *mut Box<dyn $crate::module::Module> {
            let make: fn() -> Box<dyn $crate::module::Module> = $make;
            Box::into_raw(Box::new(make()))
        }
    };
}

/// Declare the entry points of a framework plugin crate. See
/// [`export_module!`].
#[macro_export]
macro_rules! export_framework {
    ($constructor:ident, $make:expr) => {
        #[no_mangle]
        pub extern "C" fn treebridge_abi_version() -> u32 {
            $crate::plugin::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn $constructor() -> *mut Box<dyn $crate::module::Framework> {
            let make: fn() -> Box<dyn $crate::module::Framework> = $make;
            Box::into_raw(Box::new(make()))
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_names_follow_the_platform_convention() {
        assert_eq!(
            module_library_name("magic"),
            format!(
                "{}treebridge_module_magic{}",
                env::consts::DLL_PREFIX,
                env::consts::DLL_SUFFIX
            )
        );
        assert_eq!(
            framework_library_name("mattock"),
            format!(
                "{}treebridge_framework_mattock{}",
                env::consts::DLL_PREFIX,
                env::consts::DLL_SUFFIX
            )
        );
    }

    #[test]
    fn constructor_symbols_are_c_identifiers() {
        assert_eq!(
            module_constructor_symbol("sleuthkit-filesystem"),
            "treebridge_module_sleuthkit_filesystem_constructor"
        );
        assert_eq!(
            framework_constructor_symbol("mattock"),
            "treebridge_framework_mattock_constructor"
        );
    }

    #[test]
    fn missing_plugin_is_fatal_at_bind_time() {
        let loader = PluginLoader::new(vec![PathBuf::from("/nonexistent")]);
        let err = loader.load_module("absent").err().unwrap();
        assert!(matches!(err, BridgeError::PluginLoad { .. }));
        assert!(!err.is_subtree_local());
    }
}
