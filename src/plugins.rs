use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, OnceLock};

use libloading::Library;

use crate::{Api, Error, Value, Version, invoke_pjrt_api_error_fn};

/// Name of the environment variable that [`load_plugin_from_env`] reads the plugin library path from.
pub const PLUGIN_PATH_ENV_VAR: &str = "PJRT_PLUGIN_PATH";

/// Name of the symbol that every PJRT plugin library exports.
const GET_PJRT_API_SYMBOL: &[u8] = b"GetPjrtApi";

/// Initialized PJRT plugin. [`Plugin`]s are cheap to clone and are the entry point for creating
/// [`Client`](crate::Client)s and [`Topology`](crate::Topology) descriptions.
#[derive(Copy, Clone)]
pub struct Plugin {
    api: Api,
}

impl Plugin {
    /// Wraps a `PJRT_Api` function table, checking that its ABI version is compatible with this crate and then
    /// running the plugin's one-time initialization routine.
    pub(crate) unsafe fn from_c_api(handle: *const crate::ffi::PJRT_Api) -> Result<Self, Error> {
        use ffi::PJRT_Plugin_Initialize_Args;
        let api = unsafe { Api::from_c_api(handle) }?;
        let version = api.version();
        version.check_compatibility()?;
        invoke_pjrt_api_error_fn!(api, PJRT_Plugin_Initialize)?;
        tracing::debug!(%version, "initialized PJRT plugin");
        Ok(Self { api })
    }

    pub(crate) fn api(&self) -> Api {
        self.api
    }

    /// PJRT ABI [`Version`] implemented by this [`Plugin`].
    pub fn version(&self) -> Version {
        self.api.version()
    }

    /// Returns the plugin attribute named `name`, or [`Error::NotFound`] if the plugin does not report one.
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<Value, Error> {
        self.api.attribute(name)
    }

    /// Returns all attributes reported by this [`Plugin`] (e.g., the version of the compiler it embeds). Note that
    /// the map is rebuilt on every call; [`Client::attributes`](crate::Client::attributes) is cached.
    pub fn attributes(&self) -> Result<HashMap<String, Value>, Error> {
        self.api.attributes()
    }
}

/// Shared library from which a [`Plugin`] was loaded. The [`Library`] is never unloaded while the process runs
/// because the function table it returned may still be in use.
struct PluginLibrary {
    library: Library,
    path: PathBuf,
    plugin: OnceLock<Result<Plugin, Error>>,
}

impl PluginLibrary {
    /// Resolves `GetPjrtApi` and initializes the resulting [`Plugin`] the first time it is called, returning the same
    /// outcome on every subsequent call.
    fn load(&self) -> Result<Plugin, Error> {
        self.plugin
            .get_or_init(|| {
                let get_pjrt_api = unsafe {
                    self.library
                        .get::<unsafe extern "C" fn() -> *const crate::ffi::PJRT_Api>(GET_PJRT_API_SYMBOL)
                        .map_err(|error| {
                            Error::plugin_loading_error(self.path.display().to_string(), error.to_string())
                        })?
                };
                let plugin = unsafe { Plugin::from_c_api(get_pjrt_api()) }?;
                tracing::debug!(path = %self.path.display(), version = %plugin.version(), "loaded PJRT plugin");
                Ok(plugin)
            })
            .clone()
    }
}

/// Process-wide cache of [`PluginLibrary`]s keyed by canonical library path.
static PLUGIN_LIBRARIES: LazyLock<Mutex<HashMap<PathBuf, PluginLibrary>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Loads the PJRT plugin stored in the shared library at `library_path`. Loading the same library more than once
/// returns the cached [`Plugin`] (or the cached loading [`Error`]).
pub fn load_plugin<P: AsRef<Path>>(library_path: P) -> Result<Plugin, Error> {
    let library_path = library_path.as_ref();
    let library_path = std::fs::canonicalize(library_path).unwrap_or_else(|_| library_path.to_path_buf());
    let mut libraries = PLUGIN_LIBRARIES
        .lock()
        .map_err(|_| Error::internal("the PJRT plugin cache lock has been poisoned"))?;
    match libraries.entry(library_path.clone()) {
        Entry::Occupied(entry) => entry.get().load(),
        Entry::Vacant(entry) => {
            let library = unsafe { Library::new(&library_path) }
                .map_err(|error| Error::plugin_loading_error(library_path.display().to_string(), error.to_string()))?;
            entry.insert(PluginLibrary { library, path: library_path, plugin: OnceLock::new() }).load()
        }
    }
}

/// Loads the PJRT plugin whose shared library path is stored in the `PJRT_PLUGIN_PATH` environment variable.
pub fn load_plugin_from_env() -> Result<Plugin, Error> {
    match std::env::var_os(PLUGIN_PATH_ENV_VAR) {
        Some(path) if !path.is_empty() => load_plugin(PathBuf::from(path)),
        _ => Err(Error::plugin_loading_error(
            format!("${PLUGIN_PATH_ENV_VAR}"),
            "the environment variable is not set",
        )),
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use crate::errors::ffi::PJRT_Error;
    use crate::ffi::PJRT_Extension_Base;
    use crate::values::ffi::PJRT_NamedValue;

    #[repr(C)]
    pub struct PJRT_Plugin_Initialize_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
    }

    impl PJRT_Plugin_Initialize_Args {
        pub fn new() -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut() }
        }
    }

    pub type PJRT_Plugin_Initialize = unsafe extern "C" fn(args: *mut PJRT_Plugin_Initialize_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Plugin_Attributes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub attributes: *const PJRT_NamedValue,
        pub num_attributes: usize,
    }

    impl PJRT_Plugin_Attributes_Args {
        pub fn new() -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                attributes: std::ptr::null(),
                num_attributes: 0,
            }
        }
    }

    pub type PJRT_Plugin_Attributes = unsafe extern "C" fn(args: *mut PJRT_Plugin_Attributes_Args) -> *mut PJRT_Error;
}
