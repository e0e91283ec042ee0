use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::protos::{ComputationDeviceAssignment, DeviceAssignmentProto};
use crate::{
    Api, Client, Error, Memory, MemoryStatistics, NamedValue, ProcessIndex, Value, invoke_pjrt_api_error_fn,
    slice_from_c_api, str_from_c_api,
};

/// Type alias used to represent [`Device`] IDs, which are unique among devices of the same type (e.g., CPUs, GPUs)
/// and, on multi-host environments, are also unique across all devices and all hosts.
pub type DeviceId = usize;

/// Type alias used to represent the opaque local hardware IDs of [`Device`]s (e.g., a CUDA device number).
pub type LocalHardwareId = usize;

/// Type alias used to represent replica IDs in [`DeviceAssignment`]s.
pub type ReplicaId = usize;

/// Type alias used to represent computation IDs in [`DeviceAssignment`]s.
pub type ComputationId = usize;

/// Device exposed by a [`Client`] (e.g., a specific CPU, GPU, or TPU).
///
/// Like [`Memory`]s, [`Device`]s are views into state that the owning [`Client`] builds exactly once, during its
/// initialization. Their identity ([`Device::id`], [`Device::kind`], etc.) and their attached [`Memory`]s are
/// therefore available without calling into the plugin. The `'c` lifetime ties every [`Device`] to its [`Client`].
#[derive(Copy, Clone)]
pub struct Device<'c> {
    client: &'c Client,
    index: usize,
}

impl<'c> Device<'c> {
    pub(crate) fn new(client: &'c Client, index: usize) -> Self {
        Self { client, index }
    }

    fn state(&self) -> &'c DeviceState {
        self.client.device_state(self.index)
    }

    /// Returns the [`PJRT_Device`](ffi::PJRT_Device) that corresponds to this [`Device`] and which can be passed to
    /// functions in the PJRT C API.
    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Device {
        self.state().handle
    }

    /// [`Client`] that owns this [`Device`].
    pub fn client(&self) -> &'c Client {
        self.client
    }

    /// ID of this [`Device`]. IDs are unique among devices of the same type (e.g., CPUs, GPUs) and, in multi-host
    /// environments, they are also unique across all devices and all hosts.
    pub fn id(&self) -> DeviceId {
        self.state().description.id()
    }

    /// Vendor-dependent string that identifies the kind of this [`Device`] (e.g., "Tesla V100-SXM2-16GB").
    pub fn kind(&self) -> &'c str {
        self.state().description.kind()
    }

    /// Index of the process that this [`Device`] belongs to (i.e., is _addressable_ from). In multi-process settings
    /// every client sees the devices of all processes, but only those whose process index matches
    /// [`Client::process_index`] are addressable.
    pub fn process_index(&self) -> ProcessIndex {
        self.state().description.process_index()
    }

    /// [`DeviceDescription`] associated with this [`Device`].
    pub fn description(&self) -> &'c DeviceDescription<'c> {
        &self.state().description
    }

    /// [`DeviceAttribute`] with the provided name, or [`Error::NotFound`] if this [`Device`] has no such attribute.
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<&'c DeviceAttribute, Error> {
        self.description().attribute(name)
    }

    /// Vendor-specific attributes of this [`Device`], fetched from the plugin on first use.
    pub fn attributes(&self) -> Result<&'c HashMap<String, DeviceAttribute>, Error> {
        self.description().attributes()
    }

    /// Opaque local hardware ID of this [`Device`] (e.g., its CUDA device number). Local hardware IDs are not
    /// guaranteed to be dense and are [`None`] for devices that are not addressable.
    pub fn local_hardware_id(&self) -> Option<LocalHardwareId> {
        self.state().local_hardware_id
    }

    /// Returns `true` if the owning [`Client`] can issue commands to this [`Device`].
    pub fn is_addressable(&self) -> bool {
        self.state().is_addressable
    }

    /// [`Memory`]s that this [`Device`] can address.
    pub fn addressable_memories(&self) -> Vec<Memory<'c>> {
        self.state().memories.iter().map(|index| Memory::new(self.client, *index)).collect()
    }

    /// Default [`Memory`] of this [`Device`] (i.e., the memory in which data processed by this device is stored by
    /// default).
    pub fn default_memory(&self) -> Result<Memory<'c>, Error> {
        use ffi::PJRT_Device_DefaultMemory_Args;
        let handle =
            invoke_pjrt_api_error_fn!(self.client.api(), PJRT_Device_DefaultMemory, { device = self.to_c_api() }, {
                memory
            })?;
        self.client.memory_from_c_api(handle)
    }

    /// Returns memory/allocator statistics for this [`Device`] (intended for diagnostic purposes). Not all plugins
    /// support this and those that do not return [`Error::Unimplemented`]. Fields that the plugin does not report
    /// are [`None`].
    pub fn memory_statistics(&self) -> Result<MemoryStatistics, Error> {
        use ffi::PJRT_Device_MemoryStats_Args;
        invoke_pjrt_api_error_fn!(self.client.api(), PJRT_Device_MemoryStats, { device = self.to_c_api() }, {
            bytes_in_use,
            peak_bytes_in_use,
            peak_bytes_in_use_is_set,
            num_allocs,
            num_allocs_is_set,
            largest_alloc_size,
            largest_alloc_size_is_set,
            bytes_limit,
            bytes_limit_is_set,
            bytes_reserved,
            bytes_reserved_is_set,
            peak_bytes_reserved,
            peak_bytes_reserved_is_set,
            bytes_reservable_limit,
            bytes_reservable_limit_is_set,
            largest_free_block_bytes,
            largest_free_block_bytes_is_set,
            pool_bytes,
            pool_bytes_is_set,
            peak_pool_bytes,
            peak_pool_bytes_is_set,
        })
        .map(
            |(
                bytes_in_use,
                peak_bytes_in_use,
                peak_bytes_in_use_is_set,
                num_allocs,
                num_allocs_is_set,
                largest_alloc_size,
                largest_alloc_size_is_set,
                bytes_limit,
                bytes_limit_is_set,
                bytes_reserved,
                bytes_reserved_is_set,
                peak_bytes_reserved,
                peak_bytes_reserved_is_set,
                bytes_reservable_limit,
                bytes_reservable_limit_is_set,
                largest_free_block_bytes,
                largest_free_block_bytes_is_set,
                pool_bytes,
                pool_bytes_is_set,
                peak_pool_bytes,
                peak_pool_bytes_is_set,
            )| MemoryStatistics {
                bytes_in_use: bytes_in_use.cast_unsigned(),
                peak_bytes_in_use: peak_bytes_in_use_is_set.then_some(peak_bytes_in_use.cast_unsigned()),
                allocation_count: num_allocs_is_set.then_some(num_allocs.cast_unsigned()),
                largest_allocation_size: largest_alloc_size_is_set.then_some(largest_alloc_size.cast_unsigned()),
                bytes_limit: bytes_limit_is_set.then_some(bytes_limit.cast_unsigned()),
                reserved_bytes: bytes_reserved_is_set.then_some(bytes_reserved.cast_unsigned()),
                peak_reserved_bytes: peak_bytes_reserved_is_set.then_some(peak_bytes_reserved.cast_unsigned()),
                reservable_bytes_limit: bytes_reservable_limit_is_set.then_some(bytes_reservable_limit.cast_unsigned()),
                largest_free_block_bytes: largest_free_block_bytes_is_set
                    .then_some(largest_free_block_bytes.cast_unsigned()),
                pool_bytes: pool_bytes_is_set.then_some(pool_bytes.cast_unsigned()),
                peak_pool_bytes: peak_pool_bytes_is_set.then_some(peak_pool_bytes.cast_unsigned()),
            },
        )
    }
}

impl Display for Device<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.description())
    }
}

impl Debug for Device<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Device[{}]", self.description().debug_string)
    }
}

impl PartialEq for Device<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.client, other.client) && self.index == other.index
    }
}

impl Eq for Device<'_> {}

/// Properties of a device that are read from the plugin once, when the owning [`Client`] is created.
pub(crate) struct DeviceState {
    pub(crate) handle: *mut ffi::PJRT_Device,
    pub(crate) description: DeviceDescription<'static>,
    pub(crate) local_hardware_id: Option<LocalHardwareId>,
    pub(crate) is_addressable: bool,

    /// Indices (into the [`Client`] memory table) of the memories that this device can address. This is populated by
    /// the first attachment pass during [`Client`] initialization.
    pub(crate) memories: Vec<usize>,
}

impl DeviceState {
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Device, api: Api) -> Result<Self, Error> {
        use ffi::{PJRT_Device_GetDescription_Args, PJRT_Device_IsAddressable_Args, PJRT_Device_LocalHardwareId_Args};

        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT device handle is a null pointer"));
        }

        let description =
            invoke_pjrt_api_error_fn!(api, PJRT_Device_GetDescription, { device = handle }, { device_description })?;
        let description = unsafe { DeviceDescription::from_c_api(description, api) }?;
        let is_addressable =
            invoke_pjrt_api_error_fn!(api, PJRT_Device_IsAddressable, { device = handle }, { is_addressable })?;
        let local_hardware_id =
            invoke_pjrt_api_error_fn!(api, PJRT_Device_LocalHardwareId, { device = handle }, { local_hardware_id })?;
        Ok(Self {
            handle,
            description,
            local_hardware_id: (local_hardware_id >= 0).then_some(local_hardware_id as usize),
            is_addressable,
            memories: Vec::new(),
        })
    }
}

/// Value of a [`Device`] attribute. Device attributes are restricted to strings, integers, and integer lists.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceAttribute {
    String(String),
    I64(i64),
    I64List(Vec<i64>),
}

impl DeviceAttribute {
    /// Converts an attribute reported by a plugin.
    ///
    /// # Panics
    ///
    /// Panics if the attribute is neither a string, nor an integer, nor an integer list, which plugins must never
    /// report for devices.
    fn from_named_value(named_value: NamedValue) -> (String, Self) {
        let value = match named_value.value {
            Value::String(value) => Self::String(value),
            Value::I64(value) => Self::I64(value),
            Value::I64List(value) => Self::I64List(value),
            value => panic!("unsupported value for PJRT device attribute '{}': {value}", named_value.name),
        };
        (named_value.name, value)
    }
}

/// Description of a device. Descriptions are available both for the [`Device`]s of a [`Client`] (through
/// [`Device::description`]) and for devices that are only described by a [`Topology`](crate::Topology), which is
/// what enables compiling executables without having the target hardware available.
///
/// The `'o` lifetime ties a [`DeviceDescription`] to the object that owns the underlying handle.
pub struct DeviceDescription<'o> {
    handle: *mut ffi::PJRT_DeviceDescription,
    api: Api,
    id: DeviceId,
    process_index: ProcessIndex,
    kind: String,
    to_string: String,
    debug_string: String,

    /// Cached [`DeviceDescription::attributes`], fetched from the plugin on first use.
    attributes: OnceLock<Result<HashMap<String, DeviceAttribute>, Error>>,

    owner: PhantomData<&'o ()>,
}

impl DeviceDescription<'_> {
    /// Reads the identity of the device described by the provided handle.
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_DeviceDescription, api: Api) -> Result<Self, Error> {
        use ffi::{
            PJRT_DeviceDescription_DebugString_Args, PJRT_DeviceDescription_Id_Args, PJRT_DeviceDescription_Kind_Args,
            PJRT_DeviceDescription_ProcessIndex_Args, PJRT_DeviceDescription_ToString_Args,
        };

        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT device description handle is a null pointer"));
        }

        let id = invoke_pjrt_api_error_fn!(api, PJRT_DeviceDescription_Id, { device_description = handle }, { id })?;
        let process_index = invoke_pjrt_api_error_fn!(
            api,
            PJRT_DeviceDescription_ProcessIndex,
            { device_description = handle },
            { process_index },
        )?;
        let (kind, kind_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_DeviceDescription_Kind,
            { device_description = handle },
            { device_kind, device_kind_size },
        )?;
        let (to_string, to_string_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_DeviceDescription_ToString,
            { device_description = handle },
            { to_string, to_string_size },
        )?;
        let (debug_string, debug_string_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_DeviceDescription_DebugString,
            { device_description = handle },
            { debug_string, debug_string_size },
        )?;
        Ok(Self {
            handle,
            api,
            id: id as usize,
            process_index: process_index as usize,
            kind: str_from_c_api(kind, kind_size).into_owned(),
            to_string: str_from_c_api(to_string, to_string_size).into_owned(),
            debug_string: str_from_c_api(debug_string, debug_string_size).into_owned(),
            attributes: OnceLock::new(),
            owner: PhantomData,
        })
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_DeviceDescription {
        self.handle
    }

    /// [`DeviceId`] of the described device.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Index of the process that the described device belongs to.
    pub fn process_index(&self) -> ProcessIndex {
        self.process_index
    }

    /// Vendor-dependent string that identifies the kind of the described device.
    pub fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// [`DeviceAttribute`] with the provided name, or [`Error::NotFound`] if the described device has no such
    /// attribute.
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<&DeviceAttribute, Error> {
        let name = name.as_ref();
        self.attributes()?
            .get(name)
            .ok_or_else(|| Error::not_found(format!("no attribute named '{name}' in this PJRT device description")))
    }

    /// Vendor-specific attributes of the described device. They are fetched from the plugin on the first call and
    /// the outcome of that call (including any error) is returned on every subsequent call.
    ///
    /// # Panics
    ///
    /// Panics if the plugin reports an attribute whose value is not a string, an integer, or an integer list.
    pub fn attributes(&self) -> Result<&HashMap<String, DeviceAttribute>, Error> {
        self.attributes
            .get_or_init(|| {
                use ffi::PJRT_DeviceDescription_Attributes_Args;
                let (attributes, attribute_count) = invoke_pjrt_api_error_fn!(
                    self.api,
                    PJRT_DeviceDescription_Attributes,
                    { device_description = self.to_c_api() },
                    { attributes, num_attributes },
                )?;
                Ok(unsafe { slice_from_c_api(attributes, attribute_count) }
                    .iter()
                    .map(|attribute| DeviceAttribute::from_named_value(unsafe { NamedValue::from_c_api(attribute) }))
                    .collect())
            })
            .as_ref()
            .map_err(|error| error.clone())
    }
}

impl Display for DeviceDescription<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.to_string)
    }
}

impl Debug for DeviceDescription<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "DeviceDescription[{}]", self.debug_string)
    }
}

unsafe impl Send for DeviceDescription<'_> {}
unsafe impl Sync for DeviceDescription<'_> {}

/// Represents the [`Device`] assignment for a set of replicated computations. Specifically, for `R` replicas and `C`
/// computations, `R * C` [`Device`]s are required to execute those computations in parallel. [`DeviceAssignment`]s hold
/// the mapping from `(r, c)`, where `r` is a replica index and `c` is a computation (i.e., partition) index, to the
/// [`DeviceId`] of the [`Device`] on which the corresponding computation should be executed.
///
/// The default [`DeviceAssignment`] for a given [`Client`] can be obtained using [`Client::default_device_assignment`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAssignment {
    replica_count: usize,
    computation_count: usize,

    /// [`DeviceId`]s for all `(replica, computation)` pairs, stored in row-major order.
    assignment: Vec<DeviceId>,
}

impl DeviceAssignment {
    /// Builds a [`DeviceAssignment`] from a row-major list of [`DeviceId`]s, returning [`Error::InvalidArgument`] if
    /// the list does not contain exactly `replica_count * computation_count` entries.
    pub fn new(replica_count: usize, computation_count: usize, assignment: Vec<DeviceId>) -> Result<Self, Error> {
        if assignment.len() != replica_count * computation_count {
            return Err(Error::invalid_argument(format!(
                "expected {} device IDs for {replica_count} replica(s) and {computation_count} computation(s), \
                 but got {}",
                replica_count * computation_count,
                assignment.len(),
            )));
        }
        Ok(Self { replica_count, computation_count, assignment })
    }

    /// Number of replicas that this [`DeviceAssignment`] has been computed for.
    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    /// Number of computations that this [`DeviceAssignment`] has been computed for.
    pub fn computation_count(&self) -> usize {
        self.computation_count
    }

    /// Returns the [`DeviceId`] that replica `replica_id` of computation `computation_id` is assigned to, or an
    /// [`Error::FailedPrecondition`] if either index is out of range.
    pub fn device_id(&self, replica_id: ReplicaId, computation_id: ComputationId) -> Result<DeviceId, Error> {
        if replica_id >= self.replica_count {
            Err(Error::failed_precondition("replica ID is out of range"))
        } else if computation_id >= self.computation_count {
            Err(Error::failed_precondition("computation ID is out of range"))
        } else {
            Ok(self.assignment[replica_id * self.computation_count + computation_id])
        }
    }

    /// Returns the replica ID assigned to the [`Device`] with the provided [`DeviceId`]. See
    /// [`DeviceAssignment::logical_id`] for the failure modes.
    pub fn replica_id(&self, device_id: DeviceId) -> Result<ReplicaId, Error> {
        self.logical_id(device_id).map(|(replica_id, _)| replica_id)
    }

    /// Returns the computation ID assigned to the [`Device`] with the provided [`DeviceId`]. See
    /// [`DeviceAssignment::logical_id`] for the failure modes.
    pub fn computation_id(&self, device_id: DeviceId) -> Result<ComputationId, Error> {
        self.logical_id(device_id).map(|(_, computation_id)| computation_id)
    }

    /// Returns the logical ID (i.e., the pair of replica ID and computation ID) assigned to the [`Device`] with the
    /// provided [`DeviceId`]. Returns [`Error::Internal`] if the device appears more than once or not at all.
    pub fn logical_id(&self, device_id: DeviceId) -> Result<(ReplicaId, ComputationId), Error> {
        let mut positions = self.assignment.iter().enumerate().filter(|(_, id)| **id == device_id);
        match (positions.next(), positions.next()) {
            (Some((position, _)), None) => {
                Ok((position / self.computation_count, position % self.computation_count))
            }
            (Some(_), Some(_)) => Err(Error::internal("duplicate device ID")),
            (None, _) => Err(Error::internal("device ID not found")),
        }
    }

    /// Converts this [`DeviceAssignment`] into its Protobuf representation, which is organized by computation.
    pub fn proto(&self) -> DeviceAssignmentProto {
        let computation_devices = (0..self.computation_count)
            .map(|computation_id| ComputationDeviceAssignment {
                replica_device_ids: (0..self.replica_count)
                    .map(|replica_id| self.assignment[replica_id * self.computation_count + computation_id] as i64)
                    .collect(),
            })
            .collect();
        DeviceAssignmentProto {
            replica_count: self.replica_count as i32,
            computation_count: self.computation_count as i32,
            computation_devices,
        }
    }

    /// Builds a [`DeviceAssignment`] from its Protobuf representation, returning [`Error::InvalidArgument`] if the
    /// message is missing any `(replica, computation)` entry.
    pub fn from_proto(proto: &DeviceAssignmentProto) -> Result<Self, Error> {
        let replica_count = proto.replica_count.max(0) as usize;
        let computation_count = proto.computation_count.max(0) as usize;
        let mut assignment = Vec::with_capacity(replica_count * computation_count);
        for replica_id in 0..replica_count {
            for computation_id in 0..computation_count {
                let device_id = proto
                    .computation_devices
                    .get(computation_id)
                    .and_then(|devices| devices.replica_device_ids.get(replica_id))
                    .ok_or_else(|| Error::invalid_argument("invalid device assignment"))?;
                assignment.push(*device_id as DeviceId);
            }
        }
        Ok(Self { replica_count, computation_count, assignment })
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::errors::ffi::PJRT_Error;
    use crate::ffi::PJRT_Extension_Base;
    use crate::memories::ffi::PJRT_Memory;
    use crate::values::ffi::PJRT_NamedValue;

    // We represent opaque C types as structs with a particular structure that is following the convention
    // suggested in [the Rustonomicon](https://doc.rust-lang.org/nomicon/ffi.html#representing-opaque-structs).
    #[repr(C)]
    pub struct PJRT_Device {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Device_GetDescription_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub device_description: *mut PJRT_DeviceDescription,
    }

    impl PJRT_Device_GetDescription_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device,
                device_description: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Device_GetDescription =
        unsafe extern "C" fn(args: *mut PJRT_Device_GetDescription_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Device_LocalHardwareId_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub local_hardware_id: std::ffi::c_int,
    }

    impl PJRT_Device_LocalHardwareId_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), device, local_hardware_id: 0 }
        }
    }

    pub type PJRT_Device_LocalHardwareId =
        unsafe extern "C" fn(args: *mut PJRT_Device_LocalHardwareId_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Device_IsAddressable_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub is_addressable: bool,
    }

    impl PJRT_Device_IsAddressable_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device,
                is_addressable: false,
            }
        }
    }

    pub type PJRT_Device_IsAddressable =
        unsafe extern "C" fn(args: *mut PJRT_Device_IsAddressable_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Device_AddressableMemories_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub memories: *const *mut PJRT_Memory,
        pub num_memories: usize,
    }

    impl PJRT_Device_AddressableMemories_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device,
                memories: std::ptr::null(),
                num_memories: 0,
            }
        }
    }

    pub type PJRT_Device_AddressableMemories =
        unsafe extern "C" fn(args: *mut PJRT_Device_AddressableMemories_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Device_DefaultMemory_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub memory: *mut PJRT_Memory,
    }

    impl PJRT_Device_DefaultMemory_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device,
                memory: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Device_DefaultMemory =
        unsafe extern "C" fn(args: *mut PJRT_Device_DefaultMemory_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Device_MemoryStats_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device: *mut PJRT_Device,
        pub bytes_in_use: i64,
        pub peak_bytes_in_use: i64,
        pub peak_bytes_in_use_is_set: bool,
        pub num_allocs: i64,
        pub num_allocs_is_set: bool,
        pub largest_alloc_size: i64,
        pub largest_alloc_size_is_set: bool,
        pub bytes_limit: i64,
        pub bytes_limit_is_set: bool,
        pub bytes_reserved: i64,
        pub bytes_reserved_is_set: bool,
        pub peak_bytes_reserved: i64,
        pub peak_bytes_reserved_is_set: bool,
        pub bytes_reservable_limit: i64,
        pub bytes_reservable_limit_is_set: bool,
        pub largest_free_block_bytes: i64,
        pub largest_free_block_bytes_is_set: bool,
        pub pool_bytes: i64,
        pub pool_bytes_is_set: bool,
        pub peak_pool_bytes: i64,
        pub peak_pool_bytes_is_set: bool,
    }

    impl PJRT_Device_MemoryStats_Args {
        pub fn new(device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device,
                bytes_in_use: 0,
                peak_bytes_in_use: 0,
                peak_bytes_in_use_is_set: false,
                num_allocs: 0,
                num_allocs_is_set: false,
                largest_alloc_size: 0,
                largest_alloc_size_is_set: false,
                bytes_limit: 0,
                bytes_limit_is_set: false,
                bytes_reserved: 0,
                bytes_reserved_is_set: false,
                peak_bytes_reserved: 0,
                peak_bytes_reserved_is_set: false,
                bytes_reservable_limit: 0,
                bytes_reservable_limit_is_set: false,
                largest_free_block_bytes: 0,
                largest_free_block_bytes_is_set: false,
                pool_bytes: 0,
                pool_bytes_is_set: false,
                peak_pool_bytes: 0,
                peak_pool_bytes_is_set: false,
            }
        }
    }

    pub type PJRT_Device_MemoryStats = unsafe extern "C" fn(args: *mut PJRT_Device_MemoryStats_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_DeviceDescription_Id_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub id: std::ffi::c_int,
    }

    impl PJRT_DeviceDescription_Id_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), device_description, id: 0 }
        }
    }

    pub type PJRT_DeviceDescription_Id =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_Id_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription_Kind_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub device_kind: *const std::ffi::c_char,
        pub device_kind_size: usize,
    }

    impl PJRT_DeviceDescription_Kind_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device_description,
                device_kind: std::ptr::null(),
                device_kind_size: 0,
            }
        }
    }

    pub type PJRT_DeviceDescription_Kind =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_Kind_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription_ProcessIndex_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub process_index: std::ffi::c_int,
    }

    impl PJRT_DeviceDescription_ProcessIndex_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device_description,
                process_index: 0,
            }
        }
    }

    pub type PJRT_DeviceDescription_ProcessIndex =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_ProcessIndex_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription_Attributes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub num_attributes: usize,
        pub attributes: *const PJRT_NamedValue,
    }

    impl PJRT_DeviceDescription_Attributes_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device_description,
                num_attributes: 0,
                attributes: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_DeviceDescription_Attributes =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_Attributes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription_ToString_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub to_string: *const std::ffi::c_char,
        pub to_string_size: usize,
    }

    impl PJRT_DeviceDescription_ToString_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device_description,
                to_string: std::ptr::null(),
                to_string_size: 0,
            }
        }
    }

    pub type PJRT_DeviceDescription_ToString =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_ToString_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_DeviceDescription_DebugString_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub device_description: *mut PJRT_DeviceDescription,
        pub debug_string: *const std::ffi::c_char,
        pub debug_string_size: usize,
    }

    impl PJRT_DeviceDescription_DebugString_Args {
        pub fn new(device_description: *mut PJRT_DeviceDescription) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                device_description,
                debug_string: std::ptr::null(),
                debug_string_size: 0,
            }
        }
    }

    pub type PJRT_DeviceDescription_DebugString =
        unsafe extern "C" fn(args: *mut PJRT_DeviceDescription_DebugString_Args) -> *mut PJRT_Error;
}
