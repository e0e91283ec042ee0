use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use crate::devices::DeviceState;
use crate::memories::MemoryState;
use crate::{
    Api, Device, DeviceAssignment, DeviceId, Error, LocalHardwareId, Memory, NamedValue, Plugin, Value,
    invoke_pjrt_api_error_fn, slice_from_c_api, str_from_c_api,
};

/// Prefix of every [`Client::platform_version`].
const PLATFORM_VERSION_PREFIX: &str = "PJRT C API\n";

/// Serializes client creation and destruction across threads. Some plugins fail fatally when these race during
/// backend registration or teardown.
static PJRT_CLIENT_LIFECYCLE_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Type alias used to represent process indices (i.e., in a multi-process or multi-host platform).
pub type ProcessIndex = usize;

/// Key-value store that [`Client`]s of multi-process platforms use to exchange information with each other during
/// initialization (e.g., the addresses of their peers). The store must be shared by all participating processes.
pub trait KeyValueStore: Send + Sync {
    /// Stores the provided `value` under the provided `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Retrieves the value for the provided `key`, potentially blocking until the value is available or the provided
    /// `timeout` expires. Returns [`Error::NotFound`] if the provided `key` does not exist in this [`KeyValueStore`].
    fn get(&self, key: &[u8], timeout: Duration) -> Result<Vec<u8>, Error>;

    /// Attempts to retrieve the value for the provided `key` without blocking. Returns [`Error::NotFound`] if the
    /// provided `key` does not exist in this [`KeyValueStore`].
    fn try_get(&self, key: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Connection to an accelerator platform through a PJRT [`Plugin`].
///
/// A [`Client`] owns the backend client handle as well as the state of every [`Device`] and [`Memory`] that the
/// backend exposes. That state is built exactly once, when the [`Client`] is created: devices and memories are stored
/// in tables indexed by position and two maps translate the raw handles that the plugin returns into positions in
/// those tables. [`Device`]s and [`Memory`]s are views into these tables and borrow the [`Client`].
///
/// [`Buffer`](crate::Buffer)s and [`LoadedExecutable`](crate::LoadedExecutable)s also borrow the [`Client`] that
/// created them, which guarantees that the backend client outlives all of them.
pub struct Client {
    handle: *mut ffi::PJRT_Client,
    api: Api,
    platform_name: String,
    platform_version: String,

    /// Cached plugin attributes so that they will only be constructed once.
    attributes: OnceLock<Result<HashMap<String, Value>, Error>>,

    devices: Vec<DeviceState>,
    device_indices: HashMap<*mut crate::devices::ffi::PJRT_Device, usize>,
    addressable_devices: Vec<usize>,
    memories: Vec<MemoryState>,
    memory_indices: HashMap<*mut crate::memories::ffi::PJRT_Memory, usize>,

    /// Store that the plugin may call into for as long as the backend client is alive.
    key_value_store: Option<Arc<dyn KeyValueStore>>,
}

impl Client {
    /// Wraps a newly created backend client and discovers its devices and memories. If discovery fails, the backend
    /// client is destroyed before the error is returned. This must be called while holding the lifecycle guard.
    pub(crate) unsafe fn from_c_api(
        handle: *mut ffi::PJRT_Client,
        api: Api,
        key_value_store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, Error> {
        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT client handle is a null pointer"));
        }
        unsafe { Self::initialize(handle, api, key_value_store) }.inspect_err(|error| {
            use ffi::PJRT_Client_Destroy_Args;
            tracing::debug!(%error, "failed to initialize PJRT client");
            if let Err(error) = invoke_pjrt_api_error_fn!(api, PJRT_Client_Destroy, { client = handle }) {
                tracing::warn!(%error, "failed to destroy partially initialized PJRT client");
            }
        })
    }

    unsafe fn initialize(
        handle: *mut ffi::PJRT_Client,
        api: Api,
        key_value_store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, Error> {
        use crate::devices::ffi::PJRT_Device_AddressableMemories_Args;
        use crate::memories::ffi::PJRT_Memory_AddressableByDevices_Args;
        use ffi::{
            PJRT_Client_AddressableDevices_Args, PJRT_Client_AddressableMemories_Args, PJRT_Client_Devices_Args,
            PJRT_Client_PlatformName_Args, PJRT_Client_PlatformVersion_Args,
        };

        let (platform_name, platform_name_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_Client_PlatformName,
            { client = handle },
            { platform_name, platform_name_size },
        )?;
        let platform_name = str_from_c_api(platform_name, platform_name_size).into_owned();
        let (platform_version, platform_version_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_Client_PlatformVersion,
            { client = handle },
            { platform_version, platform_version_size },
        )?;
        let platform_version =
            format!("{PLATFORM_VERSION_PREFIX}{}", str_from_c_api(platform_version, platform_version_size));

        let (device_handles, device_count) =
            invoke_pjrt_api_error_fn!(api, PJRT_Client_Devices, { client = handle }, { devices, num_devices })?;
        let device_handles = unsafe { slice_from_c_api(device_handles, device_count) }.to_vec();
        let (addressable_device_handles, addressable_device_count) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_Client_AddressableDevices,
            { client = handle },
            { addressable_devices, num_addressable_devices },
        )?;
        let addressable_device_handles =
            unsafe { slice_from_c_api(addressable_device_handles, addressable_device_count) }.to_vec();
        let memory_handles = match invoke_pjrt_api_error_fn!(
            api,
            PJRT_Client_AddressableMemories,
            { client = handle },
            { addressable_memories, num_addressable_memories },
        ) {
            Ok((memories, memory_count)) => unsafe { slice_from_c_api(memories, memory_count) }.to_vec(),
            Err(error) if error.is_unimplemented() => {
                tracing::warn!(%error, "PJRT plugin does not report addressable memories");
                Vec::new()
            }
            Err(error) => return Err(error),
        };

        let mut devices = device_handles
            .iter()
            .map(|handle| unsafe { DeviceState::from_c_api(*handle, api) })
            .collect::<Result<Vec<_>, _>>()?;
        let device_indices = index_handles(&device_handles);
        let addressable_devices = addressable_device_handles
            .iter()
            .map(|handle| lookup_index(&device_indices, *handle, "device"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut memories = memory_handles
            .iter()
            .map(|handle| unsafe { MemoryState::from_c_api(*handle, api) })
            .collect::<Result<Vec<_>, _>>()?;
        let memory_indices = index_handles(&memory_handles);

        // The device/memory relation is many-to-many, and so it can only be attached once both tables exist.
        if !memories.is_empty() {
            for &index in &addressable_devices {
                let device = &mut devices[index];
                let (handles, count) = invoke_pjrt_api_error_fn!(
                    api,
                    PJRT_Device_AddressableMemories,
                    { device = device.handle },
                    { memories, num_memories },
                )?;
                device.memories = unsafe { slice_from_c_api(handles, count) }
                    .iter()
                    .map(|handle| lookup_index(&memory_indices, *handle, "memory"))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            for memory in &mut memories {
                let (handles, count) = invoke_pjrt_api_error_fn!(
                    api,
                    PJRT_Memory_AddressableByDevices,
                    { memory = memory.handle },
                    { devices, num_devices },
                )?;
                memory.devices = unsafe { slice_from_c_api(handles, count) }
                    .iter()
                    .map(|handle| lookup_index(&device_indices, *handle, "device"))
                    .collect::<Result<Vec<_>, _>>()?;
            }
        }

        tracing::debug!(
            platform = %platform_name,
            device_count = devices.len(),
            addressable_device_count = addressable_devices.len(),
            memory_count = memories.len(),
            "created PJRT client",
        );

        Ok(Self {
            handle,
            api,
            platform_name,
            platform_version,
            attributes: OnceLock::new(),
            devices,
            device_indices,
            addressable_devices,
            memories,
            memory_indices,
            key_value_store,
        })
    }

    /// Returns the [`PJRT_Client`](ffi::PJRT_Client) that corresponds to this [`Client`] and which can be passed to
    /// functions in the PJRT C API.
    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Client {
        self.handle
    }

    /// Returns the underlying PJRT [`Api`].
    pub(crate) fn api(&self) -> Api {
        self.api
    }

    pub(crate) fn device_state(&self, index: usize) -> &DeviceState {
        &self.devices[index]
    }

    pub(crate) fn memory_state(&self, index: usize) -> &MemoryState {
        &self.memories[index]
    }

    /// Translates a device handle returned by the plugin into the corresponding [`Device`]. Every such handle was
    /// discovered during initialization, and so an unknown handle is reported as [`Error::Internal`].
    pub(crate) fn device_from_c_api(
        &'_ self,
        handle: *mut crate::devices::ffi::PJRT_Device,
    ) -> Result<Device<'_>, Error> {
        lookup_index(&self.device_indices, handle, "device").map(|index| Device::new(self, index))
    }

    /// Translates a memory handle returned by the plugin into the corresponding [`Memory`]. Every such handle was
    /// discovered during initialization, and so an unknown handle is reported as [`Error::Internal`].
    pub(crate) fn memory_from_c_api(
        &'_ self,
        handle: *mut crate::memories::ffi::PJRT_Memory,
    ) -> Result<Memory<'_>, Error> {
        lookup_index(&self.memory_indices, handle, "memory").map(|index| Memory::new(self, index))
    }

    /// [`Value`] of the attribute with the provided `name` attached to this [`Client`], or [`Error::NotFound`] if no
    /// such attribute is attached to this [`Client`].
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<Value, Error> {
        let name = name.as_ref();
        self.attributes()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no attribute named '{name}' found in this PJRT client")))
    }

    /// Returns the attributes of the plugin that backs this [`Client`] (e.g., the version of the compiler that it
    /// embeds). They are fetched on the first call and cached.
    pub fn attributes(&self) -> Result<&HashMap<String, Value>, Error> {
        self.attributes.get_or_init(|| self.api.attributes()).as_ref().map_err(|error| error.clone())
    }

    /// Returns the [`KeyValueStore`] that this [`Client`] was created with, if any.
    pub fn key_value_store(&self) -> Option<&dyn KeyValueStore> {
        self.key_value_store.as_deref()
    }

    /// Returns a string that identifies the platform of this [`Client`] (e.g., `"cpu"`, `"cuda"`, `"tpu"`, etc.).
    pub fn platform_name(&self) -> &str {
        self.platform_name.as_str()
    }

    /// Returns human-readable, platform-specific version information for this [`Client`] (e.g., the CUDA version for
    /// GPU clients), prefixed with `"PJRT C API\n"`.
    pub fn platform_version(&self) -> &str {
        self.platform_version.as_str()
    }

    /// Process index of this [`Client`]. This is always `0` in single-process settings.
    pub fn process_index(&self) -> Result<ProcessIndex, Error> {
        use ffi::PJRT_Client_ProcessIndex_Args;
        invoke_pjrt_api_error_fn!(self.api, PJRT_Client_ProcessIndex, { client = self.to_c_api() }, { process_index })
            .map(|index| index as usize)
    }

    /// All [`Device`]s that are visible to this [`Client`], including both _addressable_ and _non-addressable_
    /// devices, in the order in which the plugin reported them.
    pub fn devices(&'_ self) -> Vec<Device<'_>> {
        (0..self.devices.len()).map(|index| Device::new(self, index)).collect()
    }

    /// [`Device`]s that are _addressable_ from this [`Client`] (i.e., devices that this client can issue commands to).
    /// All visible devices are addressable in single-process environments.
    pub fn addressable_devices(&'_ self) -> Vec<Device<'_>> {
        self.addressable_devices.iter().map(|index| Device::new(self, *index)).collect()
    }

    /// [`Memory`]s that are _addressable_ from this [`Client`]. This is empty for plugins that do not report memories.
    pub fn addressable_memories(&'_ self) -> Vec<Memory<'_>> {
        (0..self.memories.len()).map(|index| Memory::new(self, index)).collect()
    }

    /// Returns the [`Device`] with the provided [`DeviceId`], as reported by the plugin.
    pub fn lookup_device(&'_ self, id: DeviceId) -> Result<Device<'_>, Error> {
        use ffi::PJRT_Client_LookupDevice_Args;
        let handle = invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_Client_LookupDevice,
            { client = self.to_c_api(), id = id as std::ffi::c_int },
            { device },
        )?;
        if handle.is_null() {
            return Err(Error::not_found(format!("device with ID '{id}' not found")));
        }
        self.device_from_c_api(handle)
    }

    /// Returns the addressable [`Device`] with the provided [`LocalHardwareId`], as reported by the plugin.
    pub fn lookup_addressable_device(&'_ self, local_hardware_id: LocalHardwareId) -> Result<Device<'_>, Error> {
        use ffi::PJRT_Client_LookupAddressableDevice_Args;
        let handle = invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_Client_LookupAddressableDevice,
            { client = self.to_c_api(), local_hardware_id = local_hardware_id as std::ffi::c_int },
            { addressable_device },
        )?;
        if handle.is_null() {
            return Err(Error::not_found(format!(
                "addressable device with local hardware ID '{local_hardware_id}' not found",
            )));
        }
        self.device_from_c_api(handle)
    }

    /// Returns the default [`DeviceAssignment`] for running `replica_count` replicas of a program that is partitioned
    /// into `partition_count` computations on this [`Client`]. Returns [`Error::InvalidArgument`] if either count, or
    /// their product, does not fit in a C `int`.
    pub fn default_device_assignment(
        &self,
        replica_count: usize,
        partition_count: usize,
    ) -> Result<DeviceAssignment, Error> {
        use ffi::PJRT_Client_DefaultDeviceAssignment_Args;
        let too_large = || {
            Error::invalid_argument(format!(
                "cannot compute a default device assignment for {replica_count} replica(s) \
                    and {partition_count} partition(s)",
            ))
        };
        let num_replicas = std::ffi::c_int::try_from(replica_count).map_err(|_| too_large())?;
        let num_partitions = std::ffi::c_int::try_from(partition_count).map_err(|_| too_large())?;
        let size = replica_count
            .checked_mul(partition_count)
            .filter(|size| std::ffi::c_int::try_from(*size).is_ok())
            .ok_or_else(too_large)?;
        let mut assignment = vec![0 as std::ffi::c_int; size];
        invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_Client_DefaultDeviceAssignment,
            {
                client = self.to_c_api(),
                num_replicas = num_replicas,
                num_partitions = num_partitions,
                default_assignment_size = assignment.len(),
                default_assignment = assignment.as_mut_ptr(),
            },
        )?;
        DeviceAssignment::new(
            replica_count,
            partition_count,
            assignment.into_iter().map(|device_id| device_id as DeviceId).collect(),
        )
    }
}

unsafe impl Send for Client {}
unsafe impl Sync for Client {}

impl Drop for Client {
    fn drop(&mut self) {
        use ffi::PJRT_Client_Destroy_Args;
        let _guard = PJRT_CLIENT_LIFECYCLE_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
        invoke_pjrt_api_error_fn!(self.api, PJRT_Client_Destroy, { client = self.to_c_api() })
            .expect("failed to destroy PJRT client");
        tracing::debug!(platform = %self.platform_name, "destroyed PJRT client");
    }
}

fn index_handles<H: Copy + Eq + std::hash::Hash>(handles: &[H]) -> HashMap<H, usize> {
    handles.iter().enumerate().map(|(index, handle)| (*handle, index)).collect()
}

fn lookup_index<H: Eq + std::hash::Hash>(indices: &HashMap<H, usize>, handle: H, kind: &str) -> Result<usize, Error> {
    indices.get(&handle).copied().ok_or_else(|| {
        Error::internal(format!("the PJRT plugin returned a {kind} that was not discovered when creating the client"))
    })
}

/// Options that can be passed to [`Plugin::client`] and [`Plugin::client_with_key_value_store`] to configure a
/// [`Client`].
#[derive(Clone, Debug, PartialEq)]
pub enum ClientOptions {
    /// Options for configuring a CPU [`Client`] backed by [XLA](https://openxla.org/xla).
    Cpu(CpuClientOptions),

    /// Options for configuring a GPU [`Client`] backed by [XLA](https://openxla.org/xla).
    Gpu(GpuClientOptions),

    /// Unstructured options that are passed to the plugin as they are. This supports arbitrary plugins.
    Custom(HashMap<String, Value>),
}

impl ClientOptions {
    /// Returns the [`NamedValue`]s that are passed to the plugin for this [`ClientOptions`] instance.
    pub(crate) fn to_named_values(&self) -> Vec<NamedValue> {
        match self {
            Self::Cpu(options) => options.to_named_values(),
            Self::Gpu(options) => options.to_named_values(),
            Self::Custom(options) => options.iter().map(|(name, value)| NamedValue::new(name, value.clone())).collect(),
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::Custom(HashMap::new())
    }
}

/// Options for CPU [`Client`]s backed by [XLA](https://openxla.org/xla).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuClientOptions {
    /// Number of CPU devices to use, defaulting to the number of logical CPUs on the host. This is mostly useful for
    /// testing multi-device functionality.
    pub device_count: Option<usize>,
}

impl CpuClientOptions {
    pub(crate) fn to_named_values(&self) -> Vec<NamedValue> {
        let mut values = Vec::new();
        if let Some(device_count) = self.device_count {
            values.push(NamedValue::new("cpu_device_count", device_count as i64));
        }
        values
    }
}

/// Options for GPU [`Client`]s backed by [XLA](https://openxla.org/xla).
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct GpuClientOptions {
    /// GPU platform to use. Defaults to the default platform of the [`Plugin`].
    pub platform: Option<GpuPlatform>,

    /// IDs of the GPUs that are visible to the [`Client`], similar to what `CUDA_VISIBLE_DEVICES` controls in CUDA
    /// environments. All GPUs are visible if this is [`None`].
    pub visible_devices: Option<Vec<usize>>,

    /// ID of the current node in a distributed program.
    pub node_id: Option<usize>,

    /// Total number of nodes participating in a distributed program.
    pub node_count: Option<usize>,

    /// If `true`, host-to-device transfers are staged through pinned host memory.
    pub should_stage_host_to_device_transfers: bool,

    /// Memory allocator to use for GPU memory management.
    pub allocator: GpuMemoryAllocator,
}

impl GpuClientOptions {
    pub(crate) fn to_named_values(&self) -> Vec<NamedValue> {
        let mut values = Vec::new();
        match self.platform {
            Some(GpuPlatform::Cuda) => values.push(NamedValue::new("platform_name", "cuda")),
            Some(GpuPlatform::Rocm) => values.push(NamedValue::new("platform_name", "ROCM")),
            None => {}
        }
        if let Some(visible_devices) = &self.visible_devices {
            values.push(NamedValue::new(
                "visible_devices",
                visible_devices.iter().map(|id| *id as i64).collect::<Vec<_>>(),
            ));
        }
        if let Some(node_id) = self.node_id {
            values.push(NamedValue::new("node_id", node_id as i64));
        }
        if let Some(node_count) = self.node_count {
            values.push(NamedValue::new("node_count", node_count as i64));
        }
        values
            .push(NamedValue::new("should_stage_host_to_device_transfers", self.should_stage_host_to_device_transfers));
        match self.allocator {
            GpuMemoryAllocator::Platform => {
                values.push(NamedValue::new("preallocate", false));
                values.push(NamedValue::new("allocator", "platform"));
            }
            GpuMemoryAllocator::Bfc { memory_fraction_to_preallocate } => {
                values.push(NamedValue::new("preallocate", true));
                values.push(NamedValue::new("memory_fraction", memory_fraction_to_preallocate));
                values.push(NamedValue::new("allocator", "bfc"));
            }
            GpuMemoryAllocator::CudaAsync { memory_fraction_to_preallocate: None } => {
                values.push(NamedValue::new("preallocate", false));
                values.push(NamedValue::new("allocator", "cuda_async"));
            }
            GpuMemoryAllocator::CudaAsync { memory_fraction_to_preallocate: Some(memory_fraction_to_preallocate) } => {
                values.push(NamedValue::new("preallocate", true));
                values.push(NamedValue::new("memory_fraction", memory_fraction_to_preallocate));
                values.push(NamedValue::new("allocator", "cuda_async"));
            }
        }
        values
    }
}

impl Default for GpuClientOptions {
    fn default() -> Self {
        Self {
            platform: None,
            visible_devices: None,
            node_id: None,
            node_count: None,
            should_stage_host_to_device_transfers: true,
            allocator: GpuMemoryAllocator::default(),
        }
    }
}

/// GPU platform of a GPU [`Client`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuPlatform {
    /// [NVIDIA CUDA](https://developer.nvidia.com/cuda/toolkit) platform.
    Cuda,

    /// [AMD ROCm](https://rocmdocs.amd.com/en/latest/index.html) platform.
    Rocm,
}

/// Memory allocator of a GPU [`Client`]. Each allocator offers different trade-offs between memory efficiency,
/// allocation speed, and fragmentation behavior.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub enum GpuMemoryAllocator {
    /// Allocates exactly what is needed on demand and deallocates memory that is no longer needed. This minimizes the
    /// memory footprint but is slow. It can be useful for debugging out-of-memory failures.
    Platform,

    /// Best-fit with coalescing allocator.
    Bfc {
        /// Fraction of total GPU memory to preallocate when the first operation is run.
        memory_fraction_to_preallocate: f32,
    },

    /// Allocator backed by `cudaMallocAsync`, which uses a memory pool that grows dynamically. This is only available
    /// on the [`GpuPlatform::Cuda`] platform.
    CudaAsync {
        /// Optional fraction of total GPU memory to preallocate when the first operation is run.
        memory_fraction_to_preallocate: Option<f32>,
    },
}

impl Default for GpuMemoryAllocator {
    fn default() -> Self {
        Self::Bfc { memory_fraction_to_preallocate: 0.75 }
    }
}

impl Plugin {
    /// Creates a new [`Client`] configured with the provided [`ClientOptions`].
    ///
    /// The resulting [`Client`] has no [`KeyValueStore`] and therefore no direct way to coordinate with [`Client`]s in
    /// other processes. Refer to [`Plugin::client_with_key_value_store`] for multi-process platforms.
    pub fn client(&self, options: ClientOptions) -> Result<Client, Error> {
        unsafe { self.create_client(options, None, None) }
    }

    /// Creates a new [`Client`] configured with the provided [`ClientOptions`] that coordinates with the [`Client`]s
    /// of other processes through the provided [`KeyValueStore`]. The store stays alive for as long as the [`Client`].
    pub fn client_with_key_value_store<Store: KeyValueStore + 'static>(
        &self,
        options: ClientOptions,
        key_value_store: Arc<Store>,
    ) -> Result<Client, Error> {
        let callbacks = KeyValueStoreCallbacks {
            get: get_callback::<Store>,
            put: put_callback::<Store>,
            try_get: try_get_callback::<Store>,
            user_arg: Arc::as_ptr(&key_value_store) as *mut std::ffi::c_void,
        };
        unsafe { self.create_client(options, Some(callbacks), Some(key_value_store as Arc<dyn KeyValueStore>)) }
    }

    unsafe fn create_client(
        &self,
        options: ClientOptions,
        callbacks: Option<KeyValueStoreCallbacks>,
        key_value_store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Client, Error> {
        use ffi::PJRT_Client_Create_Args;
        let options = options.to_named_values();
        let options = options.iter().map(|option| unsafe { option.to_c_api() }).collect::<Vec<_>>();
        let user_arg = callbacks.as_ref().map_or(std::ptr::null_mut(), |callbacks| callbacks.user_arg);
        let _guard = PJRT_CLIENT_LIFECYCLE_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Client_Create,
            {
                create_options = options.as_ptr(),
                num_options = options.len(),
                kv_get_callback = callbacks.as_ref().map(|callbacks| callbacks.get),
                kv_get_user_arg = user_arg,
                kv_put_callback = callbacks.as_ref().map(|callbacks| callbacks.put),
                kv_put_user_arg = user_arg,
                kv_try_get_callback = callbacks.as_ref().map(|callbacks| callbacks.try_get),
                kv_try_get_user_arg = user_arg,
            },
            { client },
        )?;
        unsafe { Client::from_c_api(handle, self.api(), key_value_store) }
    }
}

/// Key-value store callbacks passed to `PJRT_Client_Create`. Get, put, and try-get are always installed together.
struct KeyValueStoreCallbacks {
    get: ffi::PJRT_KeyValueGetCallback,
    put: ffi::PJRT_KeyValuePutCallback,
    try_get: ffi::PJRT_KeyValueTryGetCallback,
    user_arg: *mut std::ffi::c_void,
}

/// Value handed to the plugin by the get callbacks. The plugin releases it through a deleter that only receives the
/// value pointer, and so the allocation is laid out as `[value_size (native-endian usize)][value bytes...]` with the
/// pointer referring to the payload region.
struct KeyValueStoreValue {
    value: *mut std::ffi::c_char,
    value_size: usize,
}

impl KeyValueStoreValue {
    fn new(value: Vec<u8>) -> Self {
        let header_size = size_of::<usize>();
        let value_size = value.len();
        let mut allocation = vec![0u8; header_size + value_size].into_boxed_slice();
        allocation[..header_size].copy_from_slice(&value_size.to_ne_bytes());
        allocation[header_size..].copy_from_slice(&value);
        let allocation = Box::into_raw(allocation) as *mut u8;
        Self { value: unsafe { allocation.add(header_size) as *mut std::ffi::c_char }, value_size }
    }
}

unsafe extern "C" fn delete_key_value_store_value(value: *mut std::ffi::c_char) {
    unsafe {
        let header_size = size_of::<usize>();
        let allocation = (value as *mut u8).sub(header_size);
        let mut value_size = [0u8; size_of::<usize>()];
        std::ptr::copy_nonoverlapping(allocation as *const u8, value_size.as_mut_ptr(), header_size);
        let value_size = usize::from_ne_bytes(value_size);
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(allocation, header_size + value_size)));
    }
}

fn key_value_store_from_user_arg<'s, Store: KeyValueStore>(
    user_arg: *mut std::ffi::c_void,
) -> Result<&'s Store, Error> {
    unsafe { (user_arg as *const Store).as_ref() }
        .ok_or_else(|| Error::internal("the PJRT plugin invoked a key-value store callback without its store"))
}

unsafe extern "C" fn put_callback<Store: KeyValueStore>(
    args: *mut ffi::PJRT_KeyValuePutCallback_Args,
) -> *mut crate::errors::ffi::PJRT_Error {
    unsafe {
        let args = &mut *args;
        let key = slice_from_c_api(args.key as *const u8, args.key_size);
        let value = slice_from_c_api(args.value as *const u8, args.value_size);
        match key_value_store_from_user_arg::<Store>(args.user_arg).and_then(|store| store.put(key, value)) {
            Ok(()) => std::ptr::null_mut(),
            Err(error) => error.to_c_api(args.callback_error),
        }
    }
}

unsafe extern "C" fn get_callback<Store: KeyValueStore>(
    args: *mut ffi::PJRT_KeyValueGetCallback_Args,
) -> *mut crate::errors::ffi::PJRT_Error {
    unsafe {
        let args = &mut *args;
        let key = slice_from_c_api(args.key as *const u8, args.key_size);
        let timeout = Duration::from_millis(args.timeout_in_ms.max(0) as u64);
        match key_value_store_from_user_arg::<Store>(args.user_arg).and_then(|store| store.get(key, timeout)) {
            Ok(value) => {
                let value = KeyValueStoreValue::new(value);
                args.value = value.value;
                args.value_size = value.value_size;
                args.value_deleter_callback = delete_key_value_store_value;
                std::ptr::null_mut()
            }
            Err(error) => error.to_c_api(args.callback_error),
        }
    }
}

unsafe extern "C" fn try_get_callback<Store: KeyValueStore>(
    args: *mut ffi::PJRT_KeyValueTryGetCallback_Args,
) -> *mut crate::errors::ffi::PJRT_Error {
    unsafe {
        let args = &mut *args;
        let key = slice_from_c_api(args.key as *const u8, args.key_size);
        match key_value_store_from_user_arg::<Store>(args.user_arg).and_then(|store| store.try_get(key)) {
            Ok(value) => {
                let value = KeyValueStoreValue::new(value);
                args.value = value.value;
                args.value_size = value.value_size;
                args.value_deleter_callback = delete_key_value_store_value;
                std::ptr::null_mut()
            }
            Err(error) => error.to_c_api(args.callback_error),
        }
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::devices::ffi::PJRT_Device;
    use crate::errors::ffi::{PJRT_CallbackError, PJRT_Error};
    use crate::ffi::PJRT_Extension_Base;
    use crate::memories::ffi::PJRT_Memory;
    use crate::values::ffi::PJRT_NamedValue;

    #[repr(C)]
    pub struct PJRT_Client {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    pub type PJRT_KeyValueGetCallback_ValueDeleter = unsafe extern "C" fn(value: *mut std::ffi::c_char);

    #[repr(C)]
    pub struct PJRT_KeyValueGetCallback_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub key: *const std::ffi::c_char,
        pub key_size: usize,
        pub timeout_in_ms: std::ffi::c_int,
        pub callback_error: *mut PJRT_CallbackError,
        pub user_arg: *mut std::ffi::c_void,
        pub value: *mut std::ffi::c_char,
        pub value_size: usize,
        pub value_deleter_callback: PJRT_KeyValueGetCallback_ValueDeleter,
    }

    impl PJRT_KeyValueGetCallback_Args {
        pub fn new(
            key: *const std::ffi::c_char,
            key_size: usize,
            timeout_in_ms: std::ffi::c_int,
            callback_error: *mut PJRT_CallbackError,
            user_arg: *mut std::ffi::c_void,
            value_deleter_callback: PJRT_KeyValueGetCallback_ValueDeleter,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                key,
                key_size,
                timeout_in_ms,
                callback_error,
                user_arg,
                value: std::ptr::null_mut(),
                value_size: 0,
                value_deleter_callback,
            }
        }
    }

    pub type PJRT_KeyValueGetCallback =
        unsafe extern "C" fn(args: *mut PJRT_KeyValueGetCallback_Args) -> *mut PJRT_Error;

    pub type PJRT_KeyValueTryGetCallback_ValueDeleter = unsafe extern "C" fn(value: *mut std::ffi::c_char);

    #[repr(C)]
    pub struct PJRT_KeyValueTryGetCallback_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub key: *const std::ffi::c_char,
        pub key_size: usize,
        pub callback_error: *mut PJRT_CallbackError,
        pub user_arg: *mut std::ffi::c_void,
        pub value: *mut std::ffi::c_char,
        pub value_size: usize,
        pub value_deleter_callback: PJRT_KeyValueTryGetCallback_ValueDeleter,
    }

    impl PJRT_KeyValueTryGetCallback_Args {
        pub fn new(
            key: *const std::ffi::c_char,
            key_size: usize,
            callback_error: *mut PJRT_CallbackError,
            user_arg: *mut std::ffi::c_void,
            value_deleter_callback: PJRT_KeyValueTryGetCallback_ValueDeleter,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                key,
                key_size,
                callback_error,
                user_arg,
                value: std::ptr::null_mut(),
                value_size: 0,
                value_deleter_callback,
            }
        }
    }

    pub type PJRT_KeyValueTryGetCallback =
        unsafe extern "C" fn(args: *mut PJRT_KeyValueTryGetCallback_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_KeyValuePutCallback_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub key: *const std::ffi::c_char,
        pub key_size: usize,
        pub value: *const std::ffi::c_char,
        pub value_size: usize,
        pub callback_error: *mut PJRT_CallbackError,
        pub user_arg: *mut std::ffi::c_void,
    }

    impl PJRT_KeyValuePutCallback_Args {
        pub fn new(
            key: *const std::ffi::c_char,
            key_size: usize,
            value: *const std::ffi::c_char,
            value_size: usize,
            callback_error: *mut PJRT_CallbackError,
            user_arg: *mut std::ffi::c_void,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                key,
                key_size,
                value,
                value_size,
                callback_error,
                user_arg,
            }
        }
    }

    pub type PJRT_KeyValuePutCallback =
        unsafe extern "C" fn(args: *mut PJRT_KeyValuePutCallback_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_Create_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub create_options: *const PJRT_NamedValue,
        pub num_options: usize,
        pub kv_get_callback: Option<PJRT_KeyValueGetCallback>,
        pub kv_get_user_arg: *mut std::ffi::c_void,
        pub kv_put_callback: Option<PJRT_KeyValuePutCallback>,
        pub kv_put_user_arg: *mut std::ffi::c_void,
        pub client: *mut PJRT_Client,
        pub kv_try_get_callback: Option<PJRT_KeyValueTryGetCallback>,
        pub kv_try_get_user_arg: *mut std::ffi::c_void,
    }

    impl PJRT_Client_Create_Args {
        pub fn new(
            create_options: *const PJRT_NamedValue,
            num_options: usize,
            kv_get_callback: Option<PJRT_KeyValueGetCallback>,
            kv_get_user_arg: *mut std::ffi::c_void,
            kv_put_callback: Option<PJRT_KeyValuePutCallback>,
            kv_put_user_arg: *mut std::ffi::c_void,
            kv_try_get_callback: Option<PJRT_KeyValueTryGetCallback>,
            kv_try_get_user_arg: *mut std::ffi::c_void,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                create_options,
                num_options,
                kv_get_callback,
                kv_get_user_arg,
                kv_put_callback,
                kv_put_user_arg,
                client: std::ptr::null_mut(),
                kv_try_get_callback,
                kv_try_get_user_arg,
            }
        }
    }

    pub type PJRT_Client_Create = unsafe extern "C" fn(args: *mut PJRT_Client_Create_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_PlatformName_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub platform_name: *const std::ffi::c_char,
        pub platform_name_size: usize,
    }

    impl PJRT_Client_PlatformName_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                platform_name: std::ptr::null_mut(),
                platform_name_size: 0,
            }
        }
    }

    pub type PJRT_Client_PlatformName =
        unsafe extern "C" fn(args: *mut PJRT_Client_PlatformName_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_PlatformVersion_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub platform_version: *const std::ffi::c_char,
        pub platform_version_size: usize,
    }

    impl PJRT_Client_PlatformVersion_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                platform_version: std::ptr::null_mut(),
                platform_version_size: 0,
            }
        }
    }

    pub type PJRT_Client_PlatformVersion =
        unsafe extern "C" fn(args: *mut PJRT_Client_PlatformVersion_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_ProcessIndex_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub process_index: std::ffi::c_int,
    }

    impl PJRT_Client_ProcessIndex_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), client, process_index: 0 }
        }
    }

    pub type PJRT_Client_ProcessIndex =
        unsafe extern "C" fn(args: *mut PJRT_Client_ProcessIndex_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
    }

    impl PJRT_Client_Destroy_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), client }
        }
    }

    pub type PJRT_Client_Destroy = unsafe extern "C" fn(args: *mut PJRT_Client_Destroy_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_Devices_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub devices: *const *mut PJRT_Device,
        pub num_devices: usize,
    }

    impl PJRT_Client_Devices_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                devices: std::ptr::null_mut(),
                num_devices: 0,
            }
        }
    }

    pub type PJRT_Client_Devices = unsafe extern "C" fn(args: *mut PJRT_Client_Devices_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_LookupDevice_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub id: std::ffi::c_int,
        pub device: *mut PJRT_Device,
    }

    impl PJRT_Client_LookupDevice_Args {
        pub fn new(client: *mut PJRT_Client, id: std::ffi::c_int) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                id,
                device: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Client_LookupDevice =
        unsafe extern "C" fn(args: *mut PJRT_Client_LookupDevice_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_AddressableDevices_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub addressable_devices: *const *mut PJRT_Device,
        pub num_addressable_devices: usize,
    }

    impl PJRT_Client_AddressableDevices_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                addressable_devices: std::ptr::null_mut(),
                num_addressable_devices: 0,
            }
        }
    }

    pub type PJRT_Client_AddressableDevices =
        unsafe extern "C" fn(args: *mut PJRT_Client_AddressableDevices_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_LookupAddressableDevice_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub local_hardware_id: std::ffi::c_int,
        pub addressable_device: *mut PJRT_Device,
    }

    impl PJRT_Client_LookupAddressableDevice_Args {
        pub fn new(client: *mut PJRT_Client, local_hardware_id: std::ffi::c_int) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                local_hardware_id,
                addressable_device: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Client_LookupAddressableDevice =
        unsafe extern "C" fn(args: *mut PJRT_Client_LookupAddressableDevice_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_AddressableMemories_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub addressable_memories: *const *mut PJRT_Memory,
        pub num_addressable_memories: usize,
    }

    impl PJRT_Client_AddressableMemories_Args {
        pub fn new(client: *mut PJRT_Client) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                addressable_memories: std::ptr::null(),
                num_addressable_memories: 0,
            }
        }
    }

    pub type PJRT_Client_AddressableMemories =
        unsafe extern "C" fn(args: *mut PJRT_Client_AddressableMemories_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_DefaultDeviceAssignment_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub num_replicas: std::ffi::c_int,
        pub num_partitions: std::ffi::c_int,
        pub default_assignment_size: usize,
        pub default_assignment: *mut std::ffi::c_int,
    }

    impl PJRT_Client_DefaultDeviceAssignment_Args {
        pub fn new(
            client: *mut PJRT_Client,
            num_replicas: std::ffi::c_int,
            num_partitions: std::ffi::c_int,
            default_assignment_size: usize,
            default_assignment: *mut std::ffi::c_int,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                num_replicas,
                num_partitions,
                default_assignment_size,
                default_assignment,
            }
        }
    }

    pub type PJRT_Client_DefaultDeviceAssignment =
        unsafe extern "C" fn(args: *mut PJRT_Client_DefaultDeviceAssignment_Args) -> *mut PJRT_Error;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::{
        ClientOptions, CpuClientOptions, Error, GpuClientOptions, GpuMemoryAllocator, GpuPlatform, KeyValueStore,
        NamedValue, Value, mock,
    };

    #[derive(Default)]
    struct TestKeyValueStore {
        values: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    }

    impl KeyValueStore for TestKeyValueStore {
        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
            self.values.lock().unwrap().insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        fn get(&self, key: &[u8], _timeout: Duration) -> Result<Vec<u8>, Error> {
            self.try_get(key)
        }

        fn try_get(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
            self.values
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("key '{}' not found", String::from_utf8_lossy(key))))
        }
    }

    #[test]
    fn test_client() {
        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::default()).unwrap();
        mock::reset_calls();
        assert_eq!(client.attribute("xla_version"), Ok(Value::i64(2)));
        assert_eq!(client.attribute("stablehlo_current_version"), Ok(Value::i64_list([1, 9, 5])));
        assert!(matches!(
            client.attribute("__missing__"),
            Err(Error::NotFound { message, .. }) if message.contains("__missing__"),
        ));
        assert_eq!(client.attributes().map(|attributes| attributes.len()), Ok(2));
        assert_eq!(mock::call_count("PJRT_Plugin_Attributes"), 1);
        assert!(client.key_value_store().is_none());
        assert_eq!(client.platform_name(), "cpu");
        assert_eq!(client.platform_version(), "PJRT C API\nmock 0.1");
        assert_eq!(client.process_index(), Ok(0));
        assert_eq!(client.devices().len(), 2);
        assert_eq!(client.addressable_devices(), client.devices());
        assert_eq!(client.addressable_memories().len(), 3);
    }

    #[test]
    fn test_client_initialization_order() {
        let plugin = mock::plugin();
        mock::reset_calls();
        let _client = plugin.client(ClientOptions::default()).unwrap();
        let calls = mock::calls();
        let position = |name: &str| calls.iter().position(|call| call == name).unwrap();
        assert_eq!(calls[0], "PJRT_Client_Create");
        assert!(position("PJRT_Client_Create") < position("PJRT_Client_PlatformName"));
        assert!(position("PJRT_Client_PlatformName") < position("PJRT_Client_PlatformVersion"));
        assert!(position("PJRT_Client_PlatformVersion") < position("PJRT_Client_Devices"));
        assert!(position("PJRT_Client_Devices") < position("PJRT_Client_AddressableDevices"));
        assert!(position("PJRT_Client_AddressableDevices") < position("PJRT_Client_AddressableMemories"));
        assert!(position("PJRT_Device_AddressableMemories") < position("PJRT_Memory_AddressableByDevices"));
    }

    #[test]
    fn test_client_device_memory_attachment_is_symmetric() {
        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::Cpu(CpuClientOptions { device_count: Some(3) })).unwrap();
        assert_eq!(client.devices().len(), 3);
        for device in client.devices() {
            for memory in device.addressable_memories() {
                assert!(memory.addressable_by_devices().contains(&device));
            }
        }
        for memory in client.addressable_memories() {
            for device in memory.addressable_by_devices() {
                assert!(device.addressable_memories().contains(&memory));
            }
        }
    }

    #[test]
    fn test_client_without_memories() {
        let plugin = mock::plugin();
        mock::reset_calls();
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let client = tracing::subscriber::with_default(subscriber, || {
            plugin.client(ClientOptions::Custom(mock::options([("memories_unimplemented", true)])))
        })
        .unwrap();
        assert!(client.addressable_memories().is_empty());
        assert!(client.devices().iter().all(|device| device.addressable_memories().is_empty()));
        assert_eq!(mock::call_count("PJRT_Device_AddressableMemories"), 0);
        assert!(logs.contents().contains("does not report addressable memories"));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_client_initialization_failure() {
        let plugin = mock::plugin();
        mock::reset_calls();
        let result = plugin.client(ClientOptions::Custom(mock::options([("fail_devices", true)])));
        assert!(matches!(result, Err(Error::Internal { message, .. }) if message.contains("devices")));
        assert_eq!(mock::call_count("PJRT_Client_Create"), 1);
        assert_eq!(mock::call_count("PJRT_Client_Destroy"), 1);
    }

    #[test]
    fn test_client_destroyed_once() {
        let plugin = mock::plugin();
        mock::reset_calls();
        let client = plugin.client(ClientOptions::default()).unwrap();
        assert_eq!(mock::call_count("PJRT_Client_Destroy"), 0);
        drop(client);
        assert_eq!(mock::call_count("PJRT_Client_Destroy"), 1);
    }

    #[test]
    fn test_client_lookups() {
        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::Custom(mock::options([("remote_device_count", 1_i64)]))).unwrap();
        let devices = client.devices();
        assert_eq!(client.lookup_device(0), Ok(devices[0]));
        assert_eq!(client.lookup_device(2), Ok(devices[2]));
        assert!(matches!(client.lookup_device(3), Err(Error::InvalidArgument { .. })));
        assert_eq!(client.lookup_addressable_device(1), Ok(devices[1]));
        assert!(matches!(client.lookup_addressable_device(2), Err(Error::InvalidArgument { .. })));
        assert!(matches!(
            client.device_from_c_api(std::ptr::null_mut()),
            Err(Error::Internal { message, .. }) if message.contains("device"),
        ));
        assert!(matches!(client.memory_from_c_api(std::ptr::null_mut()), Err(Error::Internal { .. })));
    }

    #[test]
    fn test_client_default_device_assignment() {
        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::default()).unwrap();
        let assignment = client.default_device_assignment(1, 2).unwrap();
        assert_eq!(assignment.replica_count(), 1);
        assert_eq!(assignment.computation_count(), 2);
        assert_eq!(assignment.device_id(0, 0), Ok(0));
        assert_eq!(assignment.device_id(0, 1), Ok(1));
        let assignment = client.default_device_assignment(2, 2).unwrap();
        assert_eq!(assignment.device_id(1, 0), Ok(0));
        assert_eq!(assignment.device_id(1, 1), Ok(1));
    }

    #[test]
    fn test_client_default_device_assignment_too_large() {
        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::default()).unwrap();
        mock::reset_calls();
        let oversized = std::ffi::c_int::MAX as usize + 1;
        for (replica_count, partition_count) in [(oversized, 1), (1, oversized), (65_536, 65_536), (usize::MAX, 2)] {
            assert!(matches!(
                client.default_device_assignment(replica_count, partition_count),
                Err(Error::InvalidArgument { message, .. }) if message.contains("default device assignment"),
            ));
        }
        assert_eq!(mock::call_count("PJRT_Client_DefaultDeviceAssignment"), 0);
    }

    #[test]
    fn test_client_with_key_value_store() {
        let plugin = mock::plugin();
        let store = Arc::new(TestKeyValueStore::default());
        let client = plugin.client_with_key_value_store(ClientOptions::default(), store.clone()).unwrap();
        assert!(client.key_value_store().is_some());
        assert_eq!(mock::key_value_put(&client, b"address", b"10.0.0.1:1234"), Ok(()));
        assert_eq!(store.try_get(b"address"), Ok(b"10.0.0.1:1234".to_vec()));
        assert_eq!(mock::key_value_get(&client, b"address", 100), Ok(b"10.0.0.1:1234".to_vec()));
        assert_eq!(mock::key_value_try_get(&client, b"address"), Ok(b"10.0.0.1:1234".to_vec()));
        assert!(matches!(
            mock::key_value_try_get(&client, b"missing"),
            Err(Error::NotFound { message, .. }) if message.contains("missing"),
        ));
        drop(client);
        assert_eq!(Arc::strong_count(&store), 1);
    }

    #[test]
    fn test_client_options() {
        assert_eq!(ClientOptions::default(), ClientOptions::Custom(HashMap::new()));
        assert_eq!(
            ClientOptions::Cpu(CpuClientOptions { device_count: Some(4) }).to_named_values(),
            vec![NamedValue::new("cpu_device_count", 4_i64)],
        );
        assert!(ClientOptions::Cpu(CpuClientOptions::default()).to_named_values().is_empty());
        assert_eq!(
            ClientOptions::Gpu(GpuClientOptions {
                platform: Some(GpuPlatform::Cuda),
                visible_devices: Some(vec![0, 2]),
                node_id: Some(1),
                node_count: Some(2),
                should_stage_host_to_device_transfers: false,
                allocator: GpuMemoryAllocator::Platform,
            })
            .to_named_values(),
            vec![
                NamedValue::new("platform_name", "cuda"),
                NamedValue::new("visible_devices", [0, 2]),
                NamedValue::new("node_id", 1_i64),
                NamedValue::new("node_count", 2_i64),
                NamedValue::new("should_stage_host_to_device_transfers", false),
                NamedValue::new("preallocate", false),
                NamedValue::new("allocator", "platform"),
            ],
        );
        assert_eq!(
            GpuClientOptions::default().to_named_values(),
            vec![
                NamedValue::new("should_stage_host_to_device_transfers", true),
                NamedValue::new("preallocate", true),
                NamedValue::new("memory_fraction", 0.75_f32),
                NamedValue::new("allocator", "bfc"),
            ],
        );
        assert_eq!(
            GpuClientOptions {
                platform: Some(GpuPlatform::Rocm),
                allocator: GpuMemoryAllocator::CudaAsync { memory_fraction_to_preallocate: None },
                ..Default::default()
            }
            .to_named_values()[0],
            NamedValue::new("platform_name", "ROCM"),
        );

        let plugin = mock::plugin();
        let client = plugin.client(ClientOptions::Custom(mock::options([("platform_name", "gpu")]))).unwrap();
        assert_eq!(client.platform_name(), "gpu");
    }
}
