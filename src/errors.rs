use std::backtrace::Backtrace;

use thiserror::Error;

use crate::{Api, invoke_pjrt_api_error_fn, invoke_pjrt_api_void_fn, str_from_c_api};

/// Errors produced while talking to a PJRT plugin. Apart from the two plugin loading variants, every variant mirrors
/// one of the [Abseil status codes](https://abseil.io/docs/cpp/guides/status-codes) that PJRT reports through its
/// `PJRT_Error` objects.
///
/// The `backtrace` field of each variant is captured when the error is constructed. It is stored as a [`String`]
/// because [`Backtrace`] is neither [`Clone`] nor comparable, and errors are cloned when they are cached (e.g., in
/// memoized completion futures).
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    #[error("failed to load a PJRT plugin from '{path}': {error}")]
    PluginLoadingError { path: String, error: String, backtrace: String },

    #[error("unsupported PJRT plugin version; {message}")]
    PluginVersionMismatch { message: String, backtrace: String },

    #[error("{message}")]
    Cancelled { message: String, backtrace: String },

    #[error("{message}")]
    Unknown { message: String, backtrace: String },

    #[error("{message}")]
    InvalidArgument { message: String, backtrace: String },

    #[error("{message}")]
    DeadlineExceeded { message: String, backtrace: String },

    #[error("{message}")]
    NotFound { message: String, backtrace: String },

    #[error("{message}")]
    AlreadyExists { message: String, backtrace: String },

    #[error("{message}")]
    PermissionDenied { message: String, backtrace: String },

    #[error("{message}")]
    ResourceExhausted { message: String, backtrace: String },

    #[error("{message}")]
    FailedPrecondition { message: String, backtrace: String },

    #[error("{message}")]
    Aborted { message: String, backtrace: String },

    #[error("{message}")]
    OutOfRange { message: String, backtrace: String },

    #[error("{message}")]
    Unimplemented { message: String, backtrace: String },

    #[error("{message}")]
    Internal { message: String, backtrace: String },

    #[error("{message}")]
    Unavailable { message: String, backtrace: String },

    #[error("{message}")]
    DataLoss { message: String, backtrace: String },

    #[error("{message}")]
    Unauthenticated { message: String, backtrace: String },
}

impl Error {
    /// Converts the provided [`PJRT_Error`](ffi::PJRT_Error) into an [`Error`], destroying the backend error object
    /// in the process (including on every failure path). Returns `Ok(None)` for a null handle or for an error object
    /// whose status code is `OK`.
    #[allow(non_upper_case_globals)]
    pub(crate) unsafe fn from_c_api(handle: *const ffi::PJRT_Error, api: Api) -> Result<Option<Self>, Self> {
        use ffi::*;

        if handle.is_null() {
            return Ok(None);
        }

        let destroy = || invoke_pjrt_api_void_fn!(api, PJRT_Error_Destroy, { error = handle as *mut _ });
        let message = invoke_pjrt_api_void_fn!(api, PJRT_Error_Message, { error = handle }, { message, message_size });
        let (message, message_size) = message.inspect_err(|_: &Self| drop::<Result<(), Self>>(destroy()))?;
        let message = str_from_c_api(message, message_size).into_owned();
        let code = invoke_pjrt_api_error_fn!(api, PJRT_Error_GetCode, { error = handle }, { code });
        let code = code.inspect_err(|_| drop(destroy()))?;
        destroy()?;
        Ok(match StatusCode::from_c_api(code) {
            Some(StatusCode::Ok) => None,
            Some(code) => Some(Self::with_code(code, message)),
            None => Some(Self::plugin_version_mismatch(format!("unknown PJRT error code {code}: {message}"))),
        })
    }

    /// Builds a backend error object for this [`Error`] through the callback-error function that the backend passes
    /// to host callbacks. The backend takes ownership of the returned object.
    pub(crate) unsafe fn to_c_api(&self, callback: *mut ffi::PJRT_CallbackError) -> *mut ffi::PJRT_Error {
        if callback.is_null() {
            panic!("the PJRT plugin did not provide an error callback function");
        }
        let message = self.message();
        unsafe { (*callback)(self.code().to_c_api(), message.as_ptr() as *const _, message.len()) }
    }

    /// Creates the [`Error`] variant that corresponds to the provided [`StatusCode`].
    pub fn with_code<M: Into<String>>(code: StatusCode, message: M) -> Self {
        match code {
            StatusCode::Ok | StatusCode::Unknown => Self::unknown(message),
            StatusCode::Cancelled => Self::cancelled(message),
            StatusCode::InvalidArgument => Self::invalid_argument(message),
            StatusCode::DeadlineExceeded => Self::deadline_exceeded(message),
            StatusCode::NotFound => Self::not_found(message),
            StatusCode::AlreadyExists => Self::already_exists(message),
            StatusCode::PermissionDenied => Self::permission_denied(message),
            StatusCode::ResourceExhausted => Self::resource_exhausted(message),
            StatusCode::FailedPrecondition => Self::failed_precondition(message),
            StatusCode::Aborted => Self::aborted(message),
            StatusCode::OutOfRange => Self::out_of_range(message),
            StatusCode::Unimplemented => Self::unimplemented(message),
            StatusCode::Internal => Self::internal(message),
            StatusCode::Unavailable => Self::unavailable(message),
            StatusCode::DataLoss => Self::data_loss(message),
            StatusCode::Unauthenticated => Self::unauthenticated(message),
        }
    }

    /// Creates a new [`Error::PluginLoadingError`].
    pub fn plugin_loading_error<P: Into<String>, E: Into<String>>(path: P, error: E) -> Self {
        Self::PluginLoadingError { path: path.into(), error: error.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::PluginVersionMismatch`].
    pub fn plugin_version_mismatch<M: Into<String>>(message: M) -> Self {
        Self::PluginVersionMismatch { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Cancelled`].
    pub fn cancelled<M: Into<String>>(message: M) -> Self {
        Self::Cancelled { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Unknown`].
    pub fn unknown<M: Into<String>>(message: M) -> Self {
        Self::Unknown { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::InvalidArgument`].
    pub fn invalid_argument<M: Into<String>>(message: M) -> Self {
        Self::InvalidArgument { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::DeadlineExceeded`].
    pub fn deadline_exceeded<M: Into<String>>(message: M) -> Self {
        Self::DeadlineExceeded { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::NotFound`].
    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::AlreadyExists`].
    pub fn already_exists<M: Into<String>>(message: M) -> Self {
        Self::AlreadyExists { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::PermissionDenied`].
    pub fn permission_denied<M: Into<String>>(message: M) -> Self {
        Self::PermissionDenied { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::ResourceExhausted`].
    pub fn resource_exhausted<M: Into<String>>(message: M) -> Self {
        Self::ResourceExhausted { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::FailedPrecondition`].
    pub fn failed_precondition<M: Into<String>>(message: M) -> Self {
        Self::FailedPrecondition { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Aborted`].
    pub fn aborted<M: Into<String>>(message: M) -> Self {
        Self::Aborted { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::OutOfRange`].
    pub fn out_of_range<M: Into<String>>(message: M) -> Self {
        Self::OutOfRange { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Unimplemented`].
    pub fn unimplemented<M: Into<String>>(message: M) -> Self {
        Self::Unimplemented { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Internal`].
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Unavailable`].
    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::Unavailable { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::DataLoss`].
    pub fn data_loss<M: Into<String>>(message: M) -> Self {
        Self::DataLoss { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Creates a new [`Error::Unauthenticated`].
    pub fn unauthenticated<M: Into<String>>(message: M) -> Self {
        Self::Unauthenticated { message: message.into(), backtrace: Backtrace::capture().to_string() }
    }

    /// Returns `true` if this error signals that the loaded plugin does not support the requested feature. Callers
    /// often recover from such errors by falling back to a default value.
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Self::Unimplemented { .. })
    }

    /// Returns the [`StatusCode`] of this [`Error`].
    pub fn code(&self) -> StatusCode {
        match self {
            Self::PluginLoadingError { .. } | Self::PluginVersionMismatch { .. } | Self::Unknown { .. } => {
                StatusCode::Unknown
            }
            Self::Cancelled { .. } => StatusCode::Cancelled,
            Self::InvalidArgument { .. } => StatusCode::InvalidArgument,
            Self::DeadlineExceeded { .. } => StatusCode::DeadlineExceeded,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::AlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::PermissionDenied { .. } => StatusCode::PermissionDenied,
            Self::ResourceExhausted { .. } => StatusCode::ResourceExhausted,
            Self::FailedPrecondition { .. } => StatusCode::FailedPrecondition,
            Self::Aborted { .. } => StatusCode::Aborted,
            Self::OutOfRange { .. } => StatusCode::OutOfRange,
            Self::Unimplemented { .. } => StatusCode::Unimplemented,
            Self::Internal { .. } => StatusCode::Internal,
            Self::Unavailable { .. } => StatusCode::Unavailable,
            Self::DataLoss { .. } => StatusCode::DataLoss,
            Self::Unauthenticated { .. } => StatusCode::Unauthenticated,
        }
    }

    /// Returns the message of this [`Error`] as it would be reported back to a PJRT plugin.
    pub fn message(&self) -> String {
        match self {
            Self::PluginLoadingError { path, error, .. } => format!("failed to load plugin from {path:?}; {error}"),
            Self::PluginVersionMismatch { message, .. } => format!("plugin version mismatch; {message}"),
            Self::Cancelled { message, .. }
            | Self::Unknown { message, .. }
            | Self::InvalidArgument { message, .. }
            | Self::DeadlineExceeded { message, .. }
            | Self::NotFound { message, .. }
            | Self::AlreadyExists { message, .. }
            | Self::PermissionDenied { message, .. }
            | Self::ResourceExhausted { message, .. }
            | Self::FailedPrecondition { message, .. }
            | Self::Aborted { message, .. }
            | Self::OutOfRange { message, .. }
            | Self::Unimplemented { message, .. }
            | Self::Internal { message, .. }
            | Self::Unavailable { message, .. }
            | Self::DataLoss { message, .. }
            | Self::Unauthenticated { message, .. } => message.clone(),
        }
    }
}

/// Status codes used by PJRT error objects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Returns [`None`] for codes that this crate does not know about (e.g., codes added by newer plugins).
    #[allow(non_upper_case_globals)]
    pub(crate) fn from_c_api(code: ffi::PJRT_Error_Code) -> Option<Self> {
        use ffi::*;
        Some(match code {
            PJRT_Error_Code_OK => Self::Ok,
            PJRT_Error_Code_CANCELLED => Self::Cancelled,
            PJRT_Error_Code_UNKNOWN => Self::Unknown,
            PJRT_Error_Code_INVALID_ARGUMENT => Self::InvalidArgument,
            PJRT_Error_Code_DEADLINE_EXCEEDED => Self::DeadlineExceeded,
            PJRT_Error_Code_NOT_FOUND => Self::NotFound,
            PJRT_Error_Code_ALREADY_EXISTS => Self::AlreadyExists,
            PJRT_Error_Code_PERMISSION_DENIED => Self::PermissionDenied,
            PJRT_Error_Code_RESOURCE_EXHAUSTED => Self::ResourceExhausted,
            PJRT_Error_Code_FAILED_PRECONDITION => Self::FailedPrecondition,
            PJRT_Error_Code_ABORTED => Self::Aborted,
            PJRT_Error_Code_OUT_OF_RANGE => Self::OutOfRange,
            PJRT_Error_Code_UNIMPLEMENTED => Self::Unimplemented,
            PJRT_Error_Code_INTERNAL => Self::Internal,
            PJRT_Error_Code_UNAVAILABLE => Self::Unavailable,
            PJRT_Error_Code_DATA_LOSS => Self::DataLoss,
            PJRT_Error_Code_UNAUTHENTICATED => Self::Unauthenticated,
            _ => return None,
        })
    }

    pub(crate) fn to_c_api(self) -> ffi::PJRT_Error_Code {
        match self {
            Self::Ok => ffi::PJRT_Error_Code_OK,
            Self::Cancelled => ffi::PJRT_Error_Code_CANCELLED,
            Self::Unknown => ffi::PJRT_Error_Code_UNKNOWN,
            Self::InvalidArgument => ffi::PJRT_Error_Code_INVALID_ARGUMENT,
            Self::DeadlineExceeded => ffi::PJRT_Error_Code_DEADLINE_EXCEEDED,
            Self::NotFound => ffi::PJRT_Error_Code_NOT_FOUND,
            Self::AlreadyExists => ffi::PJRT_Error_Code_ALREADY_EXISTS,
            Self::PermissionDenied => ffi::PJRT_Error_Code_PERMISSION_DENIED,
            Self::ResourceExhausted => ffi::PJRT_Error_Code_RESOURCE_EXHAUSTED,
            Self::FailedPrecondition => ffi::PJRT_Error_Code_FAILED_PRECONDITION,
            Self::Aborted => ffi::PJRT_Error_Code_ABORTED,
            Self::OutOfRange => ffi::PJRT_Error_Code_OUT_OF_RANGE,
            Self::Unimplemented => ffi::PJRT_Error_Code_UNIMPLEMENTED,
            Self::Internal => ffi::PJRT_Error_Code_INTERNAL,
            Self::Unavailable => ffi::PJRT_Error_Code_UNAVAILABLE,
            Self::DataLoss => ffi::PJRT_Error_Code_DATA_LOSS,
            Self::Unauthenticated => ffi::PJRT_Error_Code_UNAUTHENTICATED,
        }
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::ffi::PJRT_Extension_Base;

    #[repr(C)]
    pub struct PJRT_Error {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Error_Message_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub error: *const PJRT_Error,
        pub message: *const std::ffi::c_char,
        pub message_size: usize,
    }

    impl PJRT_Error_Message_Args {
        pub fn new(error: *const PJRT_Error) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                error,
                message: std::ptr::null(),
                message_size: 0,
            }
        }
    }

    pub type PJRT_Error_Message = unsafe extern "C" fn(args: *mut PJRT_Error_Message_Args);

    pub type PJRT_Error_Code = std::ffi::c_uint;
    pub const PJRT_Error_Code_OK: PJRT_Error_Code = 0;
    pub const PJRT_Error_Code_CANCELLED: PJRT_Error_Code = 1;
    pub const PJRT_Error_Code_UNKNOWN: PJRT_Error_Code = 2;
    pub const PJRT_Error_Code_INVALID_ARGUMENT: PJRT_Error_Code = 3;
    pub const PJRT_Error_Code_DEADLINE_EXCEEDED: PJRT_Error_Code = 4;
    pub const PJRT_Error_Code_NOT_FOUND: PJRT_Error_Code = 5;
    pub const PJRT_Error_Code_ALREADY_EXISTS: PJRT_Error_Code = 6;
    pub const PJRT_Error_Code_PERMISSION_DENIED: PJRT_Error_Code = 7;
    pub const PJRT_Error_Code_RESOURCE_EXHAUSTED: PJRT_Error_Code = 8;
    pub const PJRT_Error_Code_FAILED_PRECONDITION: PJRT_Error_Code = 9;
    pub const PJRT_Error_Code_ABORTED: PJRT_Error_Code = 10;
    pub const PJRT_Error_Code_OUT_OF_RANGE: PJRT_Error_Code = 11;
    pub const PJRT_Error_Code_UNIMPLEMENTED: PJRT_Error_Code = 12;
    pub const PJRT_Error_Code_INTERNAL: PJRT_Error_Code = 13;
    pub const PJRT_Error_Code_UNAVAILABLE: PJRT_Error_Code = 14;
    pub const PJRT_Error_Code_DATA_LOSS: PJRT_Error_Code = 15;
    pub const PJRT_Error_Code_UNAUTHENTICATED: PJRT_Error_Code = 16;

    #[repr(C)]
    pub struct PJRT_Error_GetCode_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub error: *const PJRT_Error,
        pub code: PJRT_Error_Code,
    }

    impl PJRT_Error_GetCode_Args {
        pub fn new(error: *const PJRT_Error) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), error, code: 0 }
        }
    }

    pub type PJRT_Error_GetCode = unsafe extern "C" fn(args: *mut PJRT_Error_GetCode_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Error_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub error: *mut PJRT_Error,
    }

    impl PJRT_Error_Destroy_Args {
        pub fn new(error: *mut PJRT_Error) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), error }
        }
    }

    pub type PJRT_Error_Destroy = unsafe extern "C" fn(args: *mut PJRT_Error_Destroy_Args);

    /// Function handed to host callbacks so that they can build a [`PJRT_Error`] to return to the plugin.
    pub type PJRT_CallbackError = unsafe extern "C" fn(
        code: PJRT_Error_Code,
        message: *const std::ffi::c_char,
        message_size: usize,
    ) -> *mut PJRT_Error;
}
