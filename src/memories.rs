use std::fmt::{Debug, Display};

use crate::{Api, Client, Device, Error, invoke_pjrt_api_error_fn, str_from_c_api};

/// Type alias used to represent [`Memory`] IDs, which are unique among all memories of the same kind.
pub type MemoryId = usize;

/// Memory space exposed by a [`Client`]. Memory spaces describe locations of memory that are either _pinned_ to a
/// specific [`Device`] or accessible from several [`Device`]s (e.g., pinned host memory).
///
/// [`Memory`]s are lightweight views into state that their [`Client`] builds once, when it is created. All of their
/// properties are therefore available without calling into the plugin, and the `'c` lifetime makes sure that the
/// [`Client`] outlives every [`Memory`] obtained from it.
#[derive(Copy, Clone)]
pub struct Memory<'c> {
    client: &'c Client,
    index: usize,
}

impl<'c> Memory<'c> {
    pub(crate) fn new(client: &'c Client, index: usize) -> Self {
        Self { client, index }
    }

    fn state(&self) -> &'c MemoryState {
        self.client.memory_state(self.index)
    }

    /// Returns the [`PJRT_Memory`](ffi::PJRT_Memory) that corresponds to this [`Memory`] and which can be passed to
    /// functions in the PJRT C API.
    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Memory {
        self.state().handle
    }

    /// [`Client`] that owns this [`Memory`].
    pub fn client(&self) -> &'c Client {
        self.client
    }

    /// ID of this [`Memory`] that is unique among all memories of the same kind.
    pub fn id(&self) -> MemoryId {
        self.state().id
    }

    /// Platform-dependent string that identifies the kind of this [`Memory`] (e.g., `"device"` or `"pinned_host"`).
    pub fn kind(&self) -> &'c str {
        self.state().kind.as_str()
    }

    /// [`Device`]s that can address this [`Memory`].
    pub fn addressable_by_devices(&self) -> Vec<Device<'c>> {
        self.state().devices.iter().map(|index| Device::new(self.client, *index)).collect()
    }
}

impl Display for Memory<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.state().to_string)
    }
}

impl Debug for Memory<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.state().debug_string)
    }
}

impl PartialEq for Memory<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.client, other.client) && self.index == other.index
    }
}

impl Eq for Memory<'_> {}

/// Properties of a memory space that are read from the plugin once, when the owning [`Client`] is created.
pub(crate) struct MemoryState {
    pub(crate) handle: *mut ffi::PJRT_Memory,
    pub(crate) id: MemoryId,
    pub(crate) kind: String,
    pub(crate) to_string: String,
    pub(crate) debug_string: String,

    /// Indices (into the [`Client`] device table) of the devices that can address this memory. This is populated by
    /// the second attachment pass during [`Client`] initialization.
    pub(crate) devices: Vec<usize>,
}

impl MemoryState {
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Memory, api: Api) -> Result<Self, Error> {
        use ffi::{PJRT_Memory_DebugString_Args, PJRT_Memory_Id_Args, PJRT_Memory_Kind_Args, PJRT_Memory_ToString_Args};

        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT memory handle is a null pointer"));
        }

        let id = invoke_pjrt_api_error_fn!(api, PJRT_Memory_Id, { memory = handle }, { id })?;
        let (kind, kind_size) =
            invoke_pjrt_api_error_fn!(api, PJRT_Memory_Kind, { memory = handle }, { kind, kind_size })?;
        let (to_string, to_string_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_Memory_ToString,
            { memory = handle },
            { to_string, to_string_size },
        )?;
        let (debug_string, debug_string_size) = invoke_pjrt_api_error_fn!(
            api,
            PJRT_Memory_DebugString,
            { memory = handle },
            { debug_string, debug_string_size },
        )?;
        Ok(Self {
            handle,
            id: id as usize,
            kind: str_from_c_api(kind, kind_size).into_owned(),
            to_string: str_from_c_api(to_string, to_string_size).into_owned(),
            debug_string: str_from_c_api(debug_string, debug_string_size).into_owned(),
            devices: Vec::new(),
        })
    }
}

/// Statistics about the memory of a [`Device`]. Apart from [`MemoryStatistics::bytes_in_use`], plugins are free to
/// not report any of these fields.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryStatistics {
    /// Number of bytes in use.
    pub bytes_in_use: u64,

    /// Peak number of bytes in use.
    pub peak_bytes_in_use: Option<u64>,

    /// Number of allocations thus far.
    pub allocation_count: Option<u64>,

    /// Size (in bytes) of the largest allocation encountered thus far.
    pub largest_allocation_size: Option<u64>,

    /// Upper limit on the number of user-allocatable bytes, if such a limit is known.
    pub bytes_limit: Option<u64>,

    /// Number of reserved bytes.
    pub reserved_bytes: Option<u64>,

    /// Peak number of reserved bytes.
    pub peak_reserved_bytes: Option<u64>,

    /// Upper limit on the number of reservable bytes, if such a limit is known.
    pub reservable_bytes_limit: Option<u64>,

    /// Size (in bytes) of the largest free memory block.
    pub largest_free_block_bytes: Option<u64>,

    /// Number of bytes held by the allocator. This may be higher than [`MemoryStatistics::bytes_in_use`] if the
    /// allocator holds a pool of memory (e.g., a best-fit with coalescing allocator).
    pub pool_bytes: Option<u64>,

    /// Peak number of bytes held by the allocator.
    pub peak_pool_bytes: Option<u64>,
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::devices::ffi::PJRT_Device;
    use crate::errors::ffi::PJRT_Error;
    use crate::ffi::PJRT_Extension_Base;

    #[repr(C)]
    pub struct PJRT_Memory {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Memory_Id_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory: *mut PJRT_Memory,
        pub id: std::ffi::c_int,
    }

    impl PJRT_Memory_Id_Args {
        pub fn new(memory: *mut PJRT_Memory) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), memory, id: 0 }
        }
    }

    pub type PJRT_Memory_Id = unsafe extern "C" fn(args: *mut PJRT_Memory_Id_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Memory_Kind_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory: *mut PJRT_Memory,
        pub kind: *const std::ffi::c_char,
        pub kind_size: usize,
    }

    impl PJRT_Memory_Kind_Args {
        pub fn new(memory: *mut PJRT_Memory) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                memory,
                kind: std::ptr::null_mut(),
                kind_size: 0,
            }
        }
    }

    pub type PJRT_Memory_Kind = unsafe extern "C" fn(args: *mut PJRT_Memory_Kind_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Memory_AddressableByDevices_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory: *mut PJRT_Memory,
        pub devices: *const *mut PJRT_Device,
        pub num_devices: usize,
    }

    impl PJRT_Memory_AddressableByDevices_Args {
        pub fn new(memory: *mut PJRT_Memory) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                memory,
                devices: std::ptr::null(),
                num_devices: 0,
            }
        }
    }

    pub type PJRT_Memory_AddressableByDevices =
        unsafe extern "C" fn(args: *mut PJRT_Memory_AddressableByDevices_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Memory_ToString_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory: *mut PJRT_Memory,
        pub to_string: *const std::ffi::c_char,
        pub to_string_size: usize,
    }

    impl PJRT_Memory_ToString_Args {
        pub fn new(memory: *mut PJRT_Memory) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                memory,
                to_string: std::ptr::null(),
                to_string_size: 0,
            }
        }
    }

    pub type PJRT_Memory_ToString = unsafe extern "C" fn(args: *mut PJRT_Memory_ToString_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Memory_DebugString_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory: *mut PJRT_Memory,
        pub debug_string: *const std::ffi::c_char,
        pub debug_string_size: usize,
    }

    impl PJRT_Memory_DebugString_Args {
        pub fn new(memory: *mut PJRT_Memory) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                memory,
                debug_string: std::ptr::null(),
                debug_string_size: 0,
            }
        }
    }

    pub type PJRT_Memory_DebugString = unsafe extern "C" fn(args: *mut PJRT_Memory_DebugString_Args) -> *mut PJRT_Error;
}
