use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::{
    Api, Client, CompilationOptions, DeviceDescription, Error, Executable, NamedValue, Plugin, Program, Value,
    hash_map_from_c_api, invoke_pjrt_api_error_fn, slice_from_c_api, str_from_c_api,
};

/// Description of a set of devices and how they are connected, independent of whether those devices are attached
/// to the current process. A [`Topology`] is either borrowed from a [`Client`] (see [`Client::topology`]) or owned,
/// when it was created from a [`Plugin`] for hardware that may not be present (see [`Plugin::topology`]). Owned
/// topologies are the target of ahead-of-time compilation through [`Topology::compile`].
///
/// The `'o` lifetime ties a borrowed [`Topology`] to the [`Client`] that owns it. Owned topologies are `'static`.
pub struct Topology<'o> {
    handle: *mut ffi::PJRT_TopologyDescription,
    api: Api,

    /// Cached [`Topology::attributes`].
    attributes: OnceLock<Result<HashMap<String, Value>, Error>>,

    /// Only owned topologies are destroyed when dropped.
    owned: bool,

    owner: PhantomData<&'o ()>,
}

impl Topology<'_> {
    pub(crate) unsafe fn from_c_api(
        handle: *mut ffi::PJRT_TopologyDescription,
        api: Api,
        owned: bool,
    ) -> Result<Self, Error> {
        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT topology handle is a null pointer"));
        }
        Ok(Self { handle, api, attributes: OnceLock::new(), owned, owner: PhantomData })
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_TopologyDescription {
        self.handle
    }

    /// Returns `true` if dropping this [`Topology`] releases it.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Name of the platform that the devices of this [`Topology`] belong to (e.g., `"cpu"`).
    pub fn platform_name(&self) -> Result<Cow<'_, str>, Error> {
        use ffi::PJRT_TopologyDescription_PlatformName_Args;
        invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_TopologyDescription_PlatformName,
            { topology = self.to_c_api() },
            { platform_name, platform_name_size },
        )
        .map(|(name, name_size)| str_from_c_api(name, name_size))
    }

    /// Vendor-specific version of the platform that the devices of this [`Topology`] belong to.
    pub fn platform_version(&self) -> Result<Cow<'_, str>, Error> {
        use ffi::PJRT_TopologyDescription_PlatformVersion_Args;
        invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_TopologyDescription_PlatformVersion,
            { topology = self.to_c_api() },
            { platform_version, platform_version_size },
        )
        .map(|(version, version_size)| str_from_c_api(version, version_size))
    }

    /// [`DeviceDescription`]s of all devices in this [`Topology`], including the ones that are not addressable
    /// from the current process.
    pub fn device_descriptions(&self) -> Result<Vec<DeviceDescription<'_>>, Error> {
        use ffi::PJRT_TopologyDescription_GetDeviceDescriptions_Args;
        let (descriptions, description_count) = invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_TopologyDescription_GetDeviceDescriptions,
            { topology = self.to_c_api() },
            { descriptions, num_descriptions },
        )?;
        unsafe { slice_from_c_api(descriptions, description_count) }
            .iter()
            .map(|handle| unsafe { DeviceDescription::from_c_api(*handle, self.api) })
            .collect()
    }

    /// Attribute named `name`, or [`Error::NotFound`] if this [`Topology`] reports no such attribute.
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<&Value, Error> {
        let name = name.as_ref();
        self.attributes()?
            .get(name)
            .ok_or_else(|| Error::not_found(format!("no attribute named '{name}' in this PJRT topology")))
    }

    /// Platform-specific attributes of this [`Topology`]. They are fetched on the first call and cached.
    pub fn attributes(&self) -> Result<&HashMap<String, Value>, Error> {
        self.attributes
            .get_or_init(|| {
                use ffi::PJRT_TopologyDescription_Attributes_Args;
                let (attributes, attribute_count) = invoke_pjrt_api_error_fn!(
                    self.api,
                    PJRT_TopologyDescription_Attributes,
                    { topology = self.to_c_api() },
                    { attributes, num_attributes },
                )?;
                Ok(hash_map_from_c_api(attributes, attribute_count))
            })
            .as_ref()
            .map_err(|error| error.clone())
    }

    /// Serializes this [`Topology`] into a platform-specific byte string.
    pub fn serialize(&self) -> Result<SerializedTopology, Error> {
        use ffi::PJRT_TopologyDescription_Serialize_Args;
        let (data, data_size, handle, deleter) = invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_TopologyDescription_Serialize,
            { topology = self.to_c_api() },
            { serialized_bytes, serialized_bytes_size, serialized_topology, serialized_topology_deleter },
        )?;
        Ok(SerializedTopology { handle, deleter, data, data_size })
    }

    /// Compiles `program` for the devices of this [`Topology`] without a [`Client`]. The resulting [`Executable`]
    /// can be inspected and serialized, but it cannot be executed until it is loaded by a client of the same
    /// platform (see [`Client::deserialize_executable`]).
    pub fn compile(&self, program: &Program, options: &CompilationOptions) -> Result<Executable, Error> {
        use crate::programs::ffi::PJRT_Compile_Args;
        let c_program = unsafe { program.to_c_api() };
        let options = options.to_bytes();
        tracing::debug!(format = program.format(), size = program.code().len(), "compiling PJRT program for topology");
        let handle = invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_Compile,
            {
                topology = self.to_c_api() as *const _,
                program = &c_program as *const _,
                compile_options = options.as_ptr() as *const _,
                compile_options_size = options.len(),
                client = std::ptr::null_mut(),
            },
            { executable },
        )?;
        unsafe { Executable::from_c_api(handle, self.api) }
    }
}

impl Debug for Topology<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.platform_name() {
            Ok(name) => write!(formatter, "Topology[{name}]"),
            Err(_) => write!(formatter, "Topology[?]"),
        }
    }
}

unsafe impl Send for Topology<'_> {}
unsafe impl Sync for Topology<'_> {}

impl Drop for Topology<'_> {
    fn drop(&mut self) {
        if self.owned {
            use ffi::PJRT_TopologyDescription_Destroy_Args;
            invoke_pjrt_api_error_fn!(self.api, PJRT_TopologyDescription_Destroy, { topology = self.to_c_api() })
                .expect("failed to destroy PJRT topology");
        }
    }
}

impl Client {
    /// [`Topology`] of the devices managed by this [`Client`]. The topology is owned by the client.
    pub fn topology(&self) -> Result<Topology<'_>, Error> {
        use ffi::PJRT_Client_TopologyDescription_Args;
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Client_TopologyDescription,
            { client = self.to_c_api() },
            { topology },
        )?;
        unsafe { Topology::from_c_api(handle, self.api(), false) }
    }
}

impl Plugin {
    /// Creates a [`Topology`] named `name` from platform-specific `options`, which lets callers compile for
    /// hardware that is not attached to the current process.
    pub fn topology<N: AsRef<str>>(
        &self,
        name: N,
        options: HashMap<String, Value>,
    ) -> Result<Topology<'static>, Error> {
        use ffi::PJRT_TopologyDescription_Create_Args;
        let name = name.as_ref();
        let options = options.into_iter().map(|(name, value)| NamedValue::new(name, value)).collect::<Vec<_>>();
        let c_options = options.iter().map(|option| unsafe { option.to_c_api() }).collect::<Vec<_>>();
        tracing::debug!(name, option_count = c_options.len(), "creating PJRT topology");
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_TopologyDescription_Create,
            {
                topology_name = name.as_ptr() as *const _,
                topology_name_size = name.len(),
                create_options = c_options.as_ptr(),
                num_options = c_options.len(),
            },
            { topology },
        )?;
        unsafe { Topology::from_c_api(handle, self.api(), true) }
    }
}

/// Serialized [`Topology`], backed by memory that belongs to the plugin.
pub struct SerializedTopology {
    handle: *mut ffi::PJRT_SerializedTopology,
    deleter: Option<unsafe extern "C" fn(topology: *mut ffi::PJRT_SerializedTopology)>,
    data: *const std::ffi::c_char,
    data_size: usize,
}

impl SerializedTopology {
    pub fn data(&self) -> &[u8] {
        unsafe { slice_from_c_api(self.data as *const u8, self.data_size) }
    }
}

impl Debug for SerializedTopology {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "SerializedTopology[{} bytes]", self.data_size)
    }
}

impl PartialEq for SerializedTopology {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for SerializedTopology {}

impl Hash for SerializedTopology {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data().hash(state);
    }
}

unsafe impl Send for SerializedTopology {}
unsafe impl Sync for SerializedTopology {}

impl Drop for SerializedTopology {
    fn drop(&mut self) {
        if let Some(deleter) = self.deleter {
            unsafe { deleter(self.handle) };
        }
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::clients::ffi::PJRT_Client;
    use crate::devices::ffi::PJRT_DeviceDescription;
    use crate::errors::ffi::PJRT_Error;
    use crate::ffi::PJRT_Extension_Base;
    use crate::values::ffi::PJRT_NamedValue;

    #[repr(C)]
    pub struct PJRT_Client_TopologyDescription_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub topology: *mut PJRT_TopologyDescription,
    }

    impl PJRT_Client_TopologyDescription_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                topology: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Client_TopologyDescription =
        unsafe extern "C" fn(args: *mut PJRT_Client_TopologyDescription_Args) -> *mut PJRT_Error;

    // We represent opaque C types as structs with a particular structure that is following the convention
    // suggested in [the Rustonomicon](https://doc.rust-lang.org/nomicon/ffi.html#representing-opaque-structs).
    #[repr(C)]
    pub struct PJRT_TopologyDescription {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_TopologyDescription_Create_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology_name: *const std::ffi::c_char,
        pub topology_name_size: usize,
        pub create_options: *const PJRT_NamedValue,
        pub num_options: usize,
        pub topology: *mut PJRT_TopologyDescription,
    }

    impl PJRT_TopologyDescription_Create_Args {
        pub fn new(
            topology_name: *const std::ffi::c_char,
            topology_name_size: usize,
            create_options: *const PJRT_NamedValue,
            num_options: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology_name,
                topology_name_size,
                create_options,
                num_options,
                topology: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_TopologyDescription_Create =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_Create_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_TopologyDescription_PlatformName_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *const PJRT_TopologyDescription,
        pub platform_name: *const std::ffi::c_char,
        pub platform_name_size: usize,
    }

    impl PJRT_TopologyDescription_PlatformName_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                platform_name: std::ptr::null(),
                platform_name_size: 0,
            }
        }
    }

    pub type PJRT_TopologyDescription_PlatformName =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_PlatformName_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_TopologyDescription_PlatformVersion_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *mut PJRT_TopologyDescription,
        pub platform_version: *const std::ffi::c_char,
        pub platform_version_size: usize,
    }

    impl PJRT_TopologyDescription_PlatformVersion_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                platform_version: std::ptr::null(),
                platform_version_size: 0,
            }
        }
    }

    pub type PJRT_TopologyDescription_PlatformVersion =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_PlatformVersion_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_TopologyDescription_GetDeviceDescriptions_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *const PJRT_TopologyDescription,
        pub descriptions: *const *mut PJRT_DeviceDescription,
        pub num_descriptions: usize,
    }

    impl PJRT_TopologyDescription_GetDeviceDescriptions_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                descriptions: std::ptr::null(),
                num_descriptions: 0,
            }
        }
    }

    pub type PJRT_TopologyDescription_GetDeviceDescriptions =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_GetDeviceDescriptions_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_TopologyDescription_Attributes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *mut PJRT_TopologyDescription,
        pub attributes: *const PJRT_NamedValue,
        pub num_attributes: usize,
    }

    impl PJRT_TopologyDescription_Attributes_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                attributes: std::ptr::null(),
                num_attributes: 0,
            }
        }
    }

    pub type PJRT_TopologyDescription_Attributes =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_Attributes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_TopologyDescription_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *mut PJRT_TopologyDescription,
    }

    impl PJRT_TopologyDescription_Destroy_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), topology }
        }
    }

    pub type PJRT_TopologyDescription_Destroy =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_Destroy_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_SerializedTopology {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_TopologyDescription_Serialize_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *mut PJRT_TopologyDescription,
        pub serialized_bytes: *const std::ffi::c_char,
        pub serialized_bytes_size: usize,
        pub serialized_topology: *mut PJRT_SerializedTopology,
        pub serialized_topology_deleter:
            Option<unsafe extern "C" fn(serialized_topology: *mut PJRT_SerializedTopology)>,
    }

    impl PJRT_TopologyDescription_Serialize_Args {
        pub fn new(topology: *mut PJRT_TopologyDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                serialized_bytes: std::ptr::null(),
                serialized_bytes_size: 0,
                serialized_topology: std::ptr::null_mut(),
                serialized_topology_deleter: None,
            }
        }
    }

    pub type PJRT_TopologyDescription_Serialize =
        unsafe extern "C" fn(args: *mut PJRT_TopologyDescription_Serialize_Args) -> *mut PJRT_Error;
}
