use std::fmt::Display;

use crate::Error;

/// PJRT ABI [`Version`] that this crate has been written against.
pub static VERSION: Version = Version { major: ffi::PJRT_API_MAJOR as usize, minor: ffi::PJRT_API_MINOR as usize };

/// Oldest minor version of the PJRT ABI that supports [`Buffer::copy_to_memory`](crate::Buffer::copy_to_memory).
pub const MIN_COPY_TO_MEMORY_MINOR_VERSION: usize = 32;

/// Oldest minor version of the PJRT ABI that supports
/// [`Client::create_view_of_device_buffer`](crate::Client::create_view_of_device_buffer).
pub const MIN_CREATE_VIEW_OF_DEVICE_BUFFER_MINOR_VERSION: usize = 33;

/// Version of the PJRT ABI implemented by a plugin.
///
/// A plugin is usable when its major version matches [`VERSION`]. Minor versions only ever add functions at the end
/// of the function table, and so individual features are gated on the plugin's minor version (see
/// [`Version::require_minor`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Incremented on ABI-incompatible changes (e.g., removed functions or reordered struct fields).
    pub major: usize,

    /// Incremented on ABI-compatible additions (e.g., new trailing functions or struct fields).
    pub minor: usize,
}

impl Version {
    /// Returns an [`Error::PluginVersionMismatch`] if a plugin with this version cannot be driven by this crate.
    pub fn check_compatibility(&self) -> Result<(), Error> {
        if self.major == VERSION.major {
            Ok(())
        } else {
            Err(Error::plugin_version_mismatch(format!(
                "the plugin implements PJRT C API version {self} but a version compatible with {VERSION} is required",
            )))
        }
    }

    /// Returns an [`Error::Unimplemented`] naming `operation` when this version is older than minor version `minor`.
    pub fn require_minor(&self, minor: usize, operation: &str) -> Result<(), Error> {
        if self.minor >= minor {
            Ok(())
        } else {
            Err(Error::unimplemented(format!(
                "{operation} requires PJRT C API minor version {minor} or newer but the plugin implements {self}",
            )))
        }
    }
}

impl Display for Version {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}.{}", self.major, self.minor)
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use crate::ffi::PJRT_Extension_Base;

    pub const PJRT_API_MAJOR: u32 = 0;
    pub const PJRT_API_MINOR: u32 = 91;

    #[repr(C)]
    pub struct PJRT_Api_Version {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub major_version: std::ffi::c_int,
        pub minor_version: std::ffi::c_int,
    }

    impl PJRT_Api_Version {
        pub fn new(major_version: std::ffi::c_int, minor_version: std::ffi::c_int) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), major_version, minor_version }
        }
    }
}
