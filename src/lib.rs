#![allow(clippy::missing_safety_doc)]

//! Host-side runtime for accelerator backends that are exposed through the [PJRT](https://openxla.org/xla/pjrt)
//! C plugin ABI.
//!
//! A [`Plugin`] is loaded from a shared library (see [`load_plugin`]) and used to create a [`Client`]. The [`Client`]
//! discovers the [`Device`]s and [`Memory`] spaces that the backend exposes, compiles programs into
//! [`LoadedExecutable`]s, and moves data between the host and the devices as [`Buffer`]s. Asynchronous backend work
//! is surfaced as [`Event`]s and [`CompletionFuture`]s.

use std::borrow::Cow;
use std::collections::HashMap;

pub mod buffers;
pub mod clients;
pub mod devices;
pub mod errors;
pub mod events;
pub mod memories;
pub mod plugins;
pub mod programs;
pub mod protos;
pub mod topologies;
pub mod transfers;
pub mod values;
pub mod versions;

pub use buffers::*;
pub use clients::*;
pub use devices::*;
pub use errors::*;
pub use events::*;
pub use memories::*;
pub use plugins::*;
pub use programs::*;
pub use protos::*;
pub use topologies::*;
pub use transfers::*;
pub use values::*;
pub use versions::*;

pub(crate) mod macros;

#[cfg(test)]
pub(crate) mod mock;

pub(crate) use macros::{invoke_pjrt_api_error_fn, invoke_pjrt_api_raw_fn, invoke_pjrt_api_void_fn};

/// Copyable handle to the function table that a plugin's `GetPjrtApi` returned. The table stays valid while the
/// plugin library is loaded, which the process-wide plugin cache guarantees.
#[derive(Copy, Clone)]
pub(crate) struct Api {
    handle: *const ffi::PJRT_Api,
}

impl Api {
    pub(crate) unsafe fn from_c_api(handle: *const ffi::PJRT_Api) -> Result<Self, Error> {
        if handle.is_null() {
            Err(Error::invalid_argument("the provided PJRT API handle is a null pointer"))
        } else {
            Ok(Self { handle })
        }
    }

    pub(crate) unsafe fn to_c_api(&self) -> *const ffi::PJRT_Api {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        *self
    }

    pub(crate) fn version(&self) -> Version {
        let version = unsafe { &(*self.to_c_api()).pjrt_api_version };
        Version { major: version.major_version as usize, minor: version.minor_version as usize }
    }

    /// Reads the slot named `name`, which starts `offset` bytes into the function table. `slot` must only read that
    /// one field, since plugins built against older headers hand out shorter tables.
    pub(crate) fn function<F>(
        &self,
        name: &str,
        offset: usize,
        slot: impl FnOnce(*const ffi::PJRT_Api) -> Option<F>,
    ) -> Result<F, Error> {
        let version = self.version();
        if unsafe { (*self.handle).struct_size } <= offset {
            tracing::trace!(function = name, "PJRT function is outside of the function table");
            return Err(Error::unimplemented(format!(
                "`{name}` is not available in the loaded PJRT plugin (version {version})",
            )));
        }
        slot(self.handle).ok_or_else(|| {
            Error::unimplemented(format!("`{name}` is not implemented in the loaded PJRT plugin (version {version})"))
        })
    }

    pub(crate) fn attribute<N: AsRef<str>>(&self, name: N) -> Result<Value, Error> {
        let name = name.as_ref();
        self.attributes()?
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("no attribute named '{name}' found in this PJRT plugin")))
    }

    pub(crate) fn attributes(&self) -> Result<HashMap<String, Value>, Error> {
        use crate::plugins::ffi::PJRT_Plugin_Attributes_Args;
        let (attributes, attribute_count) =
            invoke_pjrt_api_error_fn!(*self, PJRT_Plugin_Attributes, {}, { attributes, num_attributes })?;
        Ok(hash_map_from_c_api(attributes, attribute_count))
    }
}

unsafe impl Send for Api {}
unsafe impl Sync for Api {}

/// Reads a (not necessarily null-terminated) C string of `size` bytes, replacing invalid UTF-8 sequences. The result
/// only allocates when such a replacement is necessary.
pub(crate) fn str_from_c_api<'a>(ptr: *const std::ffi::c_char, size: usize) -> Cow<'a, str> {
    String::from_utf8_lossy(unsafe { slice_from_c_api(ptr as *const u8, size) })
}

/// Collects a `PJRT_NamedValue` array into a map from name to [`Value`].
pub(crate) fn hash_map_from_c_api(ptr: *const values::ffi::PJRT_NamedValue, size: usize) -> HashMap<String, Value> {
    unsafe { slice_from_c_api(ptr, size) }
        .iter()
        .map(|value| unsafe { NamedValue::from_c_api(value) })
        .map(|named_value| (named_value.name, named_value.value))
        .collect()
}

/// Builds a slice from a pointer and length pair returned by a plugin. Null pointers and zero lengths both produce an
/// empty slice, since [`std::slice::from_raw_parts`] does not accept null pointers.
pub(crate) unsafe fn slice_from_c_api<'a, T>(ptr: *const T, size: usize) -> &'a [T] {
    if ptr.is_null() || size == 0 { &[] } else { unsafe { std::slice::from_raw_parts(ptr, size) } }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use crate::buffers::ffi::*;
    use crate::clients::ffi::*;
    use crate::devices::ffi::*;
    use crate::errors::ffi::*;
    use crate::events::ffi::*;
    use crate::memories::ffi::*;
    use crate::plugins::ffi::*;
    use crate::programs::ffi::*;
    use crate::topologies::ffi::*;
    use crate::transfers::ffi::*;
    use crate::versions::ffi::*;

    pub type PJRT_Extension_Type = std::ffi::c_uint;

    /// Header shared by all PJRT extension structs, which form a singly linked list through `next`.
    #[repr(C)]
    pub struct PJRT_Extension_Base {
        pub struct_size: usize,
        pub extension_type: PJRT_Extension_Type,
        pub next: *mut PJRT_Extension_Base,
    }

    /// Signature used for function table slots that this crate never calls.
    pub type PJRT_Unused_Fn = unsafe extern "C" fn(args: *mut std::ffi::c_void) -> *mut PJRT_Error;

    /// PJRT function table. Fields are only ever appended, and so `struct_size` determines which of them a given
    /// plugin provides. Slots past `PJRT_Client_TopologyDescription` are not used by this crate and are omitted;
    /// that is fine because this struct is only ever read through pointers handed out by plugins.
    #[repr(C)]
    pub struct PJRT_Api {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub pjrt_api_version: PJRT_Api_Version,

        pub PJRT_Error_Destroy: Option<PJRT_Error_Destroy>,
        pub PJRT_Error_Message: Option<PJRT_Error_Message>,
        pub PJRT_Error_GetCode: Option<PJRT_Error_GetCode>,

        pub PJRT_Plugin_Initialize: Option<PJRT_Plugin_Initialize>,
        pub PJRT_Plugin_Attributes: Option<PJRT_Plugin_Attributes>,

        pub PJRT_Event_Destroy: Option<PJRT_Event_Destroy>,
        pub PJRT_Event_IsReady: Option<PJRT_Event_IsReady>,
        pub PJRT_Event_Error: Option<PJRT_Event_Error>,
        pub PJRT_Event_Await: Option<PJRT_Event_Await>,
        pub PJRT_Event_OnReady: Option<PJRT_Event_OnReady>,

        pub PJRT_Client_Create: Option<PJRT_Client_Create>,
        pub PJRT_Client_Destroy: Option<PJRT_Client_Destroy>,
        pub PJRT_Client_PlatformName: Option<PJRT_Client_PlatformName>,
        pub PJRT_Client_ProcessIndex: Option<PJRT_Client_ProcessIndex>,
        pub PJRT_Client_PlatformVersion: Option<PJRT_Client_PlatformVersion>,
        pub PJRT_Client_Devices: Option<PJRT_Client_Devices>,
        pub PJRT_Client_AddressableDevices: Option<PJRT_Client_AddressableDevices>,
        pub PJRT_Client_LookupDevice: Option<PJRT_Client_LookupDevice>,
        pub PJRT_Client_LookupAddressableDevice: Option<PJRT_Client_LookupAddressableDevice>,
        pub PJRT_Client_AddressableMemories: Option<PJRT_Client_AddressableMemories>,
        pub PJRT_Client_Compile: Option<PJRT_Client_Compile>,
        pub PJRT_Client_DefaultDeviceAssignment: Option<PJRT_Client_DefaultDeviceAssignment>,
        pub PJRT_Client_BufferFromHostBuffer: Option<PJRT_Client_BufferFromHostBuffer>,

        pub PJRT_DeviceDescription_Id: Option<PJRT_DeviceDescription_Id>,
        pub PJRT_DeviceDescription_ProcessIndex: Option<PJRT_DeviceDescription_ProcessIndex>,
        pub PJRT_DeviceDescription_Attributes: Option<PJRT_DeviceDescription_Attributes>,
        pub PJRT_DeviceDescription_Kind: Option<PJRT_DeviceDescription_Kind>,
        pub PJRT_DeviceDescription_DebugString: Option<PJRT_DeviceDescription_DebugString>,
        pub PJRT_DeviceDescription_ToString: Option<PJRT_DeviceDescription_ToString>,

        pub PJRT_Device_GetDescription: Option<PJRT_Device_GetDescription>,
        pub PJRT_Device_IsAddressable: Option<PJRT_Device_IsAddressable>,
        pub PJRT_Device_LocalHardwareId: Option<PJRT_Device_LocalHardwareId>,
        pub PJRT_Device_AddressableMemories: Option<PJRT_Device_AddressableMemories>,
        pub PJRT_Device_DefaultMemory: Option<PJRT_Device_DefaultMemory>,
        pub PJRT_Device_MemoryStats: Option<PJRT_Device_MemoryStats>,

        pub PJRT_Memory_Id: Option<PJRT_Memory_Id>,
        pub PJRT_Memory_Kind: Option<PJRT_Memory_Kind>,
        pub PJRT_Memory_DebugString: Option<PJRT_Memory_DebugString>,
        pub PJRT_Memory_ToString: Option<PJRT_Memory_ToString>,
        pub PJRT_Memory_AddressableByDevices: Option<PJRT_Memory_AddressableByDevices>,

        pub PJRT_Executable_Destroy: Option<PJRT_Executable_Destroy>,
        pub PJRT_Executable_Name: Option<PJRT_Executable_Name>,
        pub PJRT_Executable_NumReplicas: Option<PJRT_Executable_NumReplicas>,
        pub PJRT_Executable_NumPartitions: Option<PJRT_Executable_NumPartitions>,
        pub PJRT_Executable_NumOutputs: Option<PJRT_Executable_NumOutputs>,
        pub PJRT_Executable_SizeOfGeneratedCodeInBytes: Option<PJRT_Executable_SizeOfGeneratedCodeInBytes>,
        pub PJRT_Executable_GetCostAnalysis: Option<PJRT_Executable_GetCostAnalysis>,
        pub PJRT_Executable_OutputMemoryKinds: Option<PJRT_Executable_OutputMemoryKinds>,
        pub PJRT_Executable_OptimizedProgram: Option<PJRT_Unused_Fn>,
        pub PJRT_Executable_Serialize: Option<PJRT_Executable_Serialize>,

        pub PJRT_LoadedExecutable_Destroy: Option<PJRT_LoadedExecutable_Destroy>,
        pub PJRT_LoadedExecutable_GetExecutable: Option<PJRT_LoadedExecutable_GetExecutable>,
        pub PJRT_LoadedExecutable_AddressableDevices: Option<PJRT_LoadedExecutable_AddressableDevices>,
        pub PJRT_LoadedExecutable_Delete: Option<PJRT_LoadedExecutable_Delete>,
        pub PJRT_LoadedExecutable_IsDeleted: Option<PJRT_LoadedExecutable_IsDeleted>,
        pub PJRT_LoadedExecutable_Execute: Option<PJRT_LoadedExecutable_Execute>,
        pub PJRT_Executable_DeserializeAndLoad: Option<PJRT_Executable_DeserializeAndLoad>,
        pub PJRT_LoadedExecutable_Fingerprint: Option<PJRT_Unused_Fn>,

        pub PJRT_Buffer_Destroy: Option<PJRT_Buffer_Destroy>,
        pub PJRT_Buffer_ElementType: Option<PJRT_Buffer_ElementType>,
        pub PJRT_Buffer_Dimensions: Option<PJRT_Buffer_Dimensions>,
        pub PJRT_Buffer_UnpaddedDimensions: Option<PJRT_Buffer_UnpaddedDimensions>,
        pub PJRT_Buffer_DynamicDimensionIndices: Option<PJRT_Buffer_DynamicDimensionIndices>,
        pub PJRT_Buffer_GetMemoryLayout: Option<PJRT_Buffer_GetMemoryLayout>,
        pub PJRT_Buffer_OnDeviceSizeInBytes: Option<PJRT_Buffer_OnDeviceSizeInBytes>,
        pub PJRT_Buffer_Device: Option<PJRT_Buffer_Device>,
        pub PJRT_Buffer_Memory: Option<PJRT_Buffer_Memory>,
        pub PJRT_Buffer_Delete: Option<PJRT_Buffer_Delete>,
        pub PJRT_Buffer_IsDeleted: Option<PJRT_Buffer_IsDeleted>,
        pub PJRT_Buffer_CopyToDevice: Option<PJRT_Buffer_CopyToDevice>,
        pub PJRT_Buffer_ToHostBuffer: Option<PJRT_Buffer_ToHostBuffer>,
        pub PJRT_Buffer_IsOnCpu: Option<PJRT_Buffer_IsOnCpu>,
        pub PJRT_Buffer_ReadyEvent: Option<PJRT_Buffer_ReadyEvent>,
        pub PJRT_Buffer_UnsafePointer: Option<PJRT_Buffer_UnsafePointer>,
        pub PJRT_Buffer_IncreaseExternalReferenceCount: Option<PJRT_Buffer_IncreaseExternalReferenceCount>,
        pub PJRT_Buffer_DecreaseExternalReferenceCount: Option<PJRT_Buffer_DecreaseExternalReferenceCount>,
        pub PJRT_Buffer_OpaqueDeviceMemoryDataPointer: Option<PJRT_Buffer_OpaqueDeviceMemoryDataPointer>,

        pub PJRT_CopyToDeviceStream_Destroy: Option<PJRT_CopyToDeviceStream_Destroy>,
        pub PJRT_CopyToDeviceStream_AddChunk: Option<PJRT_CopyToDeviceStream_AddChunk>,
        pub PJRT_CopyToDeviceStream_TotalBytes: Option<PJRT_CopyToDeviceStream_TotalBytes>,
        pub PJRT_CopyToDeviceStream_GranuleSize: Option<PJRT_CopyToDeviceStream_GranuleSize>,
        pub PJRT_CopyToDeviceStream_CurrentBytes: Option<PJRT_CopyToDeviceStream_CurrentBytes>,

        pub PJRT_TopologyDescription_Create: Option<PJRT_TopologyDescription_Create>,
        pub PJRT_TopologyDescription_Destroy: Option<PJRT_TopologyDescription_Destroy>,
        pub PJRT_TopologyDescription_PlatformName: Option<PJRT_TopologyDescription_PlatformName>,
        pub PJRT_TopologyDescription_PlatformVersion: Option<PJRT_TopologyDescription_PlatformVersion>,
        pub PJRT_TopologyDescription_GetDeviceDescriptions: Option<PJRT_TopologyDescription_GetDeviceDescriptions>,
        pub PJRT_TopologyDescription_Serialize: Option<PJRT_TopologyDescription_Serialize>,
        pub PJRT_TopologyDescription_Attributes: Option<PJRT_TopologyDescription_Attributes>,

        pub PJRT_Compile: Option<PJRT_Compile>,

        pub PJRT_Executable_OutputElementTypes: Option<PJRT_Executable_OutputElementTypes>,
        pub PJRT_Executable_OutputDimensions: Option<PJRT_Executable_OutputDimensions>,

        pub PJRT_Buffer_CopyToMemory: Option<PJRT_Buffer_CopyToMemory>,

        pub PJRT_Client_CreateViewOfDeviceBuffer: Option<PJRT_Client_CreateViewOfDeviceBuffer>,

        pub PJRT_Executable_Fingerprint: Option<PJRT_Executable_Fingerprint>,

        pub PJRT_Client_TopologyDescription: Option<PJRT_Client_TopologyDescription>,
    }
}
