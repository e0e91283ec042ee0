//! Host/device streaming used by programs that communicate with the host while they run. Programs _send_ data to the
//! host in [`Chunk`]s through [`SendCallback`]s, and they _receive_ data from the host through [`ReceiveCallback`]s,
//! which are handed a [`CopyToDeviceStream`] to feed.

use std::sync::{Mutex, PoisonError};

use crate::{Api, CompletionFuture, Error, Event, invoke_pjrt_api_error_fn, slice_from_c_api};

/// Contiguous piece of host data exchanged with a PJRT plugin. A [`Chunk`] owns its bytes together with the function
/// that frees them, which allows ownership of the bytes to move between this crate and the plugin without copies.
pub struct Chunk {
    raw: ffi::PJRT_Chunk,
}

impl Chunk {
    /// Creates a [`Chunk`] that owns `data`.
    pub fn new(data: Vec<u8>) -> Self {
        unsafe extern "C" fn deleter(_data: *mut std::ffi::c_void, deleter_arg: *mut std::ffi::c_void) {
            drop(unsafe { Box::from_raw(deleter_arg as *mut Vec<u8>) });
        }

        let mut data = Box::new(data);
        let raw = ffi::PJRT_Chunk {
            data: data.as_mut_ptr() as *mut std::ffi::c_void,
            size: data.len(),
            deleter: Some(deleter),
            deleter_arg: Box::into_raw(data) as *mut std::ffi::c_void,
        };
        Self { raw }
    }

    /// Takes ownership of the bytes of a chunk that the plugin handed over. The deleter of `handle` is cleared so that
    /// the bytes are freed exactly once, when the returned [`Chunk`] is dropped.
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Chunk) -> Result<Self, Error> {
        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT chunk handle is a null pointer"));
        }
        let handle = unsafe { &mut *handle };
        let raw = ffi::PJRT_Chunk {
            data: handle.data,
            size: handle.size,
            deleter: handle.deleter.take(),
            deleter_arg: handle.deleter_arg,
        };
        Ok(Self { raw })
    }

    /// Gives up ownership of the bytes of this [`Chunk`]. Whoever receives the returned struct becomes responsible for
    /// invoking its deleter.
    pub(crate) fn into_c_api(self) -> ffi::PJRT_Chunk {
        let chunk = std::mem::ManuallyDrop::new(self);
        ffi::PJRT_Chunk {
            data: chunk.raw.data,
            size: chunk.raw.size,
            deleter: chunk.raw.deleter,
            deleter_arg: chunk.raw.deleter_arg,
        }
    }

    pub fn data(&self) -> &[u8] {
        unsafe { slice_from_c_api(self.raw.data as *const u8, self.raw.size) }
    }

    pub fn len(&self) -> usize {
        self.raw.size
    }

    pub fn is_empty(&self) -> bool {
        self.raw.size == 0
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if let Some(deleter) = self.raw.deleter.take() {
            unsafe { deleter(self.raw.data, self.raw.deleter_arg) };
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Chunk[{} bytes]", self.raw.size)
    }
}

unsafe impl Send for Chunk {}

/// Stream through which a [`ReceiveCallback`] copies host data to the device that is running a program.
///
/// The total size of the transfer and its granule size are fixed for the lifetime of the stream and are fetched once,
/// when the stream is created. Data is submitted with [`CopyToDeviceStream::add_chunk`]; every chunk except for the
/// last one must be a multiple of [`CopyToDeviceStream::granule_bytes`] in size, and the chunks must add up to exactly
/// [`CopyToDeviceStream::total_bytes`]. The plugin waits until the stream is complete before it resumes the program.
///
/// Dropping the stream destroys the backend stream.
pub struct CopyToDeviceStream {
    handle: *mut ffi::PJRT_CopyToDeviceStream,
    api: Api,
    total_bytes: usize,
    granule_bytes: usize,

    /// Number of bytes submitted so far, as last reported by the plugin. The lock also serializes submissions.
    current_bytes: Mutex<usize>,
}

impl CopyToDeviceStream {
    /// Takes ownership of a stream that the plugin handed to a receive callback. The stream is destroyed if its sizes
    /// cannot be queried.
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_CopyToDeviceStream, api: Api) -> Result<Self, Error> {
        use ffi::{PJRT_CopyToDeviceStream_GranuleSize_Args, PJRT_CopyToDeviceStream_TotalBytes_Args};

        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT copy-to-device stream handle is a null pointer"));
        }
        let mut stream = Self { handle, api, total_bytes: 0, granule_bytes: 0, current_bytes: Mutex::new(0) };
        stream.total_bytes =
            invoke_pjrt_api_error_fn!(api, PJRT_CopyToDeviceStream_TotalBytes, { stream = handle }, { total_bytes })?
                as usize;
        stream.granule_bytes = invoke_pjrt_api_error_fn!(
            api,
            PJRT_CopyToDeviceStream_GranuleSize,
            { stream = handle },
            { granule_size_in_bytes },
        )? as usize;
        Ok(stream)
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_CopyToDeviceStream {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        self.api
    }

    /// Total number of bytes that this stream expects.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn granule_bytes(&self) -> usize {
        self.granule_bytes
    }

    /// Number of bytes that have been submitted to this stream so far.
    pub fn current_bytes(&self) -> usize {
        *self.current_bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn remaining_bytes(&self) -> usize {
        self.total_bytes.saturating_sub(self.current_bytes())
    }

    /// Submits `chunk` to the device. The returned [`CompletionFuture`] resolves once the chunk has been transferred;
    /// errors reported by the plugin while submitting the chunk resolve it immediately. If the plugin accepts the
    /// chunk but cannot report the new stream size, [`CopyToDeviceStream::current_bytes`] advances by the chunk size.
    pub fn add_chunk(&self, chunk: Chunk) -> CompletionFuture {
        use ffi::{PJRT_CopyToDeviceStream_AddChunk_Args, PJRT_CopyToDeviceStream_CurrentBytes_Args};

        let mut current_bytes = self.current_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let size = chunk.len();

        // The plugin takes ownership of the chunk bytes as part of this call, even when it fails.
        let mut chunk = chunk.into_c_api();
        let event = match invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_CopyToDeviceStream_AddChunk,
            { stream = self.to_c_api(), chunk = &mut chunk as *mut _ },
            { transfer_complete },
        )
        .and_then(|handle| unsafe { Event::from_c_api(handle, self.api(), ()) })
        {
            Ok(event) => event,
            Err(error) => return CompletionFuture::ready(Err(error)),
        };

        let bytes = match invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_CopyToDeviceStream_CurrentBytes,
            { stream = self.to_c_api() },
            { current_bytes },
        ) {
            Ok(bytes) => bytes as usize,
            Err(error) => {
                tracing::warn!(%error, "failed to query the size of a PJRT copy-to-device stream");
                current_bytes.saturating_add(size).min(self.total_bytes)
            }
        };
        *current_bytes = bytes;
        tracing::trace!(size, current_bytes = *current_bytes, "added chunk to PJRT copy-to-device stream");
        event.into_completion()
    }
}

impl Drop for CopyToDeviceStream {
    fn drop(&mut self) {
        use ffi::PJRT_CopyToDeviceStream_Destroy_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_CopyToDeviceStream_Destroy, { stream = self.to_c_api() })
            .expect("failed to destroy PJRT copy-to-device stream");
    }
}

impl std::fmt::Debug for CopyToDeviceStream {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CopyToDeviceStream")
            .field("total_bytes", &self.total_bytes)
            .field("granule_bytes", &self.granule_bytes)
            .field("current_bytes", &self.current_bytes())
            .finish()
    }
}

unsafe impl Send for CopyToDeviceStream {}
unsafe impl Sync for CopyToDeviceStream {}

type SendFunction = dyn FnMut(Chunk, usize, bool) -> Result<(), Error> + Send;
type ReceiveFunction = dyn FnMut(CopyToDeviceStream) + Send;

/// Host callback for the _send_ operation of a program with a matching channel ID.
///
/// The plugin streams the sent value to the callback in [`Chunk`]s, invoking it once per chunk with the total size of
/// the value and a flag that is `true` for the last chunk. The data is always in major-to-minor layout. An [`Error`]
/// returned by the callback is reported back to the plugin, although not every plugin propagates it into the
/// execution.
pub struct SendCallback {
    channel_id: i64,
    function: Mutex<Box<SendFunction>>,
}

impl SendCallback {
    pub fn new<F: FnMut(Chunk, usize, bool) -> Result<(), Error> + Send + 'static>(
        channel_id: i64,
        function: F,
    ) -> Self {
        Self { channel_id, function: Mutex::new(Box::new(function)) }
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// The returned struct points to `self`, which must neither move nor be dropped while the plugin may still invoke
    /// the callback.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_SendCallbackInfo {
        unsafe extern "C" fn callback(
            chunk: *mut ffi::PJRT_Chunk,
            callback_error: *mut crate::errors::ffi::PJRT_CallbackError,
            total_size_in_bytes: usize,
            done: bool,
            user_arg: *mut std::ffi::c_void,
        ) -> *mut crate::errors::ffi::PJRT_Error {
            let callback = unsafe { &*(user_arg as *const SendCallback) };
            let result = unsafe { Chunk::from_c_api(chunk) }.and_then(|chunk| {
                let mut function = callback.function.lock().unwrap_or_else(PoisonError::into_inner);
                function(chunk, total_size_in_bytes, done)
            });
            match result {
                Ok(()) => std::ptr::null_mut(),
                Err(error) => unsafe { error.to_c_api(callback_error) },
            }
        }

        ffi::PJRT_SendCallbackInfo {
            channel_id: self.channel_id,
            user_arg: self as *const Self as *mut std::ffi::c_void,
            send_callback: callback,
        }
    }
}

impl std::fmt::Debug for SendCallback {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "SendCallback[channel_id={}]", self.channel_id)
    }
}

/// Host callback for the _receive_ operation of a program with a matching channel ID. The callback is invoked once per
/// operation with a [`CopyToDeviceStream`] that it must fill (possibly later and from another thread).
pub struct ReceiveCallback {
    channel_id: i64,
    function: Mutex<Box<ReceiveFunction>>,
}

impl ReceiveCallback {
    pub fn new<F: FnMut(CopyToDeviceStream) + Send + 'static>(channel_id: i64, function: F) -> Self {
        Self { channel_id, function: Mutex::new(Box::new(function)) }
    }

    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// Attaches the [`Api`] through which the streams passed to this callback are driven.
    pub(crate) fn bind(self, api: Api) -> BoundReceiveCallback {
        BoundReceiveCallback { callback: self, api }
    }
}

impl std::fmt::Debug for ReceiveCallback {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "ReceiveCallback[channel_id={}]", self.channel_id)
    }
}

/// [`ReceiveCallback`] bound to the [`Api`] of the plugin that invokes it.
pub(crate) struct BoundReceiveCallback {
    callback: ReceiveCallback,
    api: Api,
}

impl BoundReceiveCallback {
    /// The returned struct points to `self`, which must neither move nor be dropped while the plugin may still invoke
    /// the callback.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_RecvCallbackInfo {
        unsafe extern "C" fn callback(stream: *mut ffi::PJRT_CopyToDeviceStream, user_arg: *mut std::ffi::c_void) {
            let bound = unsafe { &*(user_arg as *const BoundReceiveCallback) };
            match unsafe { CopyToDeviceStream::from_c_api(stream, bound.api) } {
                Ok(stream) => {
                    let mut function = bound.callback.function.lock().unwrap_or_else(PoisonError::into_inner);
                    function(stream);
                }
                Err(error) => tracing::warn!(
                    %error,
                    channel_id = bound.callback.channel_id,
                    "failed to set up PJRT copy-to-device stream for a receive callback",
                ),
            }
        }

        ffi::PJRT_RecvCallbackInfo {
            channel_id: self.callback.channel_id,
            user_arg: self as *const Self as *mut std::ffi::c_void,
            recv_callback: callback,
        }
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::errors::ffi::{PJRT_CallbackError, PJRT_Error};
    use crate::events::ffi::PJRT_Event;
    use crate::ffi::PJRT_Extension_Base;

    #[repr(C)]
    pub struct PJRT_Chunk {
        pub data: *mut std::ffi::c_void,
        pub size: usize,
        pub deleter: Option<unsafe extern "C" fn(data: *mut std::ffi::c_void, deleter_arg: *mut std::ffi::c_void)>,
        pub deleter_arg: *mut std::ffi::c_void,
    }

    // We represent opaque C types as structs with a particular structure that is following the convention
    // suggested in [the Rustonomicon](https://doc.rust-lang.org/nomicon/ffi.html#representing-opaque-structs).
    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream_CurrentBytes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub stream: *mut PJRT_CopyToDeviceStream,
        pub current_bytes: i64,
    }

    impl PJRT_CopyToDeviceStream_CurrentBytes_Args {
        pub fn new(stream: *mut PJRT_CopyToDeviceStream) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), stream, current_bytes: 0 }
        }
    }

    pub type PJRT_CopyToDeviceStream_CurrentBytes =
        unsafe extern "C" fn(args: *mut PJRT_CopyToDeviceStream_CurrentBytes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream_TotalBytes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub stream: *mut PJRT_CopyToDeviceStream,
        pub total_bytes: i64,
    }

    impl PJRT_CopyToDeviceStream_TotalBytes_Args {
        pub fn new(stream: *mut PJRT_CopyToDeviceStream) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), stream, total_bytes: 0 }
        }
    }

    pub type PJRT_CopyToDeviceStream_TotalBytes =
        unsafe extern "C" fn(args: *mut PJRT_CopyToDeviceStream_TotalBytes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream_GranuleSize_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub stream: *mut PJRT_CopyToDeviceStream,
        pub granule_size_in_bytes: i64,
    }

    impl PJRT_CopyToDeviceStream_GranuleSize_Args {
        pub fn new(stream: *mut PJRT_CopyToDeviceStream) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                stream,
                granule_size_in_bytes: 0,
            }
        }
    }

    pub type PJRT_CopyToDeviceStream_GranuleSize =
        unsafe extern "C" fn(args: *mut PJRT_CopyToDeviceStream_GranuleSize_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream_AddChunk_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub stream: *mut PJRT_CopyToDeviceStream,
        pub chunk: *mut PJRT_Chunk,
        pub transfer_complete: *mut PJRT_Event,
    }

    impl PJRT_CopyToDeviceStream_AddChunk_Args {
        pub fn new(stream: *mut PJRT_CopyToDeviceStream, chunk: *mut PJRT_Chunk) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                stream,
                chunk,
                transfer_complete: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_CopyToDeviceStream_AddChunk =
        unsafe extern "C" fn(args: *mut PJRT_CopyToDeviceStream_AddChunk_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_CopyToDeviceStream_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub stream: *mut PJRT_CopyToDeviceStream,
    }

    impl PJRT_CopyToDeviceStream_Destroy_Args {
        pub fn new(stream: *mut PJRT_CopyToDeviceStream) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), stream }
        }
    }

    pub type PJRT_CopyToDeviceStream_Destroy =
        unsafe extern "C" fn(args: *mut PJRT_CopyToDeviceStream_Destroy_Args) -> *mut PJRT_Error;

    pub type PJRT_SendCallback = unsafe extern "C" fn(
        chunk: *mut PJRT_Chunk,
        callback_error: *mut PJRT_CallbackError,
        total_size_in_bytes: usize,
        done: bool,
        user_arg: *mut std::ffi::c_void,
    ) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_SendCallbackInfo {
        pub channel_id: i64,
        pub user_arg: *mut std::ffi::c_void,
        pub send_callback: PJRT_SendCallback,
    }

    pub type PJRT_RecvCallback =
        unsafe extern "C" fn(stream: *mut PJRT_CopyToDeviceStream, user_arg: *mut std::ffi::c_void);

    #[repr(C)]
    pub struct PJRT_RecvCallbackInfo {
        pub channel_id: i64,
        pub user_arg: *mut std::ffi::c_void,
        pub recv_callback: PJRT_RecvCallback,
    }
}
