use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};

use crate::{Api, Error, invoke_pjrt_api_error_fn};

/// Notification returned by PJRT functions that enqueue asynchronous work. An [`Event`] may carry a payload `O` that
/// is handed back once the work completes (e.g., the host bytes that a device-to-host transfer is writing into).
///
/// [`Event`]s are [`Future`]s, but unlike most Rust futures, the work they track is already running by the time they
/// are created. Dropping an [`Event`] destroys the backend event object but does not cancel that work.
pub struct Event<O> {
    handle: *mut ffi::PJRT_Event,
    api: Api,

    /// Payload returned on completion. This is always [`Some`] until it is handed out.
    output: Option<O>,

    /// [`CompletionFuture`] created on the first call to [`Future::poll`].
    completion: Option<CompletionFuture>,
}

impl<O> Event<O> {
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Event, api: Api, output: O) -> Result<Self, Error> {
        if handle.is_null() {
            Err(Error::invalid_argument("the provided PJRT event handle is a null pointer"))
        } else {
            Ok(Self { handle, api, output: Some(output), completion: None })
        }
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Event {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        self.api
    }

    /// Returns `true` if the work tracked by this [`Event`] has finished, successfully or not.
    pub fn is_ready(&self) -> Result<bool, Error> {
        use ffi::PJRT_Event_IsReady_Args;
        invoke_pjrt_api_error_fn!(self.api, PJRT_Event_IsReady, { event = self.to_c_api() }, { is_ready })
    }

    /// Registers `callback` to be invoked once the work tracked by this [`Event`] finishes. The callback receives the
    /// [`Error`] that the work ran into, if any. It runs on whatever thread the plugin uses to signal completion and
    /// must therefore be [`Send`]. If registration fails, the callback is dropped without being invoked.
    pub fn on_ready<F: FnOnce(Option<Error>) + Send + 'static>(&self, callback: F) -> Result<(), Error> {
        use ffi::PJRT_Event_OnReady_Args;

        extern "C" fn callback_fn<F: FnOnce(Option<Error>)>(
            error: *mut crate::errors::ffi::PJRT_Error,
            arg: *mut std::ffi::c_void,
        ) {
            let (callback, api) = *unsafe { Box::from_raw(arg as *mut (F, Api)) };
            let error = match unsafe { Error::from_c_api(error, api) } {
                Ok(error) => error,
                Err(error) => Some(error),
            };
            callback(error)
        }

        let callback_fn_arg = Box::into_raw(Box::new((callback, self.api)));
        invoke_pjrt_api_error_fn!(
            self.api,
            PJRT_Event_OnReady,
            { event = self.to_c_api(), callback = callback_fn::<F>, user_arg = callback_fn_arg as *mut _ },
        )
        .inspect_err(|_| drop(unsafe { Box::from_raw(callback_fn_arg) }))
    }

    /// Returns a [`CompletionFuture`] that resolves when the work tracked by this [`Event`] finishes. If the plugin
    /// refuses to register the completion callback, the returned future is already resolved with that failure.
    pub fn completion(&self) -> CompletionFuture {
        let (promise, future) = CompletionFuture::channel();
        match self.on_ready(move |error| promise.set(error.map_or(Ok(()), Err))) {
            Ok(()) => future,
            Err(error) => CompletionFuture::ready(Err(error)),
        }
    }

    /// Like [`Event::completion`], but consumes the [`Event`] (destroying the backend event object right away).
    pub fn into_completion(self) -> CompletionFuture {
        self.completion()
    }

    /// Like [`Event::completion`], but also keeps `keep_alive` alive until the tracked work finishes. If the callback
    /// cannot be registered, `keep_alive` is leaked, as the tracked work may still be using it.
    pub(crate) fn completion_with<K: Send + 'static>(&self, keep_alive: K) -> CompletionFuture {
        let keep_alive = Arc::new(Mutex::new(Some(keep_alive)));
        let released = keep_alive.clone();
        let (promise, future) = CompletionFuture::channel();
        match self.on_ready(move |error| {
            promise.set(error.map_or(Ok(()), Err));
            drop(released.lock().unwrap_or_else(PoisonError::into_inner).take());
        }) {
            Ok(()) => future,
            Err(error) => {
                tracing::warn!(%error, "failed to register PJRT completion callback; leaking its context");
                std::mem::forget(keep_alive.lock().unwrap_or_else(PoisonError::into_inner).take());
                CompletionFuture::ready(Err(error))
            }
        }
    }

    /// Blocks the current thread until the work tracked by this [`Event`] finishes and returns its payload.
    pub fn r#await(mut self) -> Result<O, Error> {
        use ffi::PJRT_Event_Await_Args;
        invoke_pjrt_api_error_fn!(self.api, PJRT_Event_Await, { event = self.to_c_api() })?;
        self.take_output()
    }

    /// Returns the [`Error`] that the tracked work ran into, or `Ok(None)` if it succeeded. This is only meaningful
    /// once [`Event::is_ready`] returns `true`; calling it earlier returns [`Error::FailedPrecondition`].
    pub fn error(&self) -> Result<Option<Error>, Error> {
        use ffi::PJRT_Event_Error_Args;
        if !self.is_ready()? {
            return Err(Error::failed_precondition("`Event::error` can only be called once the event is ready"));
        }
        Ok(invoke_pjrt_api_error_fn!(self.api, PJRT_Event_Error, { event = self.to_c_api() }).err())
    }

    fn take_output(&mut self) -> Result<O, Error> {
        self.output.take().ok_or_else(|| Error::failed_precondition("the payload of this event has already been taken"))
    }
}

impl<O: Unpin> Future for Event<O> {
    type Output = Result<O, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let event = self.get_mut();
        if event.completion.is_none() {
            event.completion = Some(event.completion());
        }
        match event.completion.as_mut().map(|completion| completion.poll_unpin(cx)) {
            Some(Poll::Ready(Ok(()))) => Poll::Ready(event.take_output()),
            Some(Poll::Ready(Err(error))) => Poll::Ready(Err(error)),
            Some(Poll::Pending) | None => Poll::Pending,
        }
    }
}

impl<O> Drop for Event<O> {
    fn drop(&mut self) {
        use ffi::PJRT_Event_Destroy_Args;
        invoke_pjrt_api_error_fn!(self.api, PJRT_Event_Destroy, { event = self.to_c_api() })
            .expect("failed to destroy PJRT event");
    }
}

unsafe impl<O: Send> Send for Event<O> {}

/// Future that resolves exactly once to the outcome of some asynchronous work. Cloning a [`CompletionFuture`] is
/// cheap and all clones observe the same outcome, which makes it suitable for memoization (e.g., in
/// [`Buffer::ready_future`](crate::Buffer::ready_future)).
///
/// The plugin thread that signals completion only fulfills the underlying one-shot channel and wakes the polling
/// task; code awaiting the future always runs wherever the future is polled.
#[derive(Clone)]
pub struct CompletionFuture {
    inner: Shared<BoxFuture<'static, Result<(), Error>>>,
}

impl CompletionFuture {
    /// Returns a [`CompletionFuture`] that is already resolved with `result`.
    pub fn ready(result: Result<(), Error>) -> Self {
        Self { inner: futures::future::ready(result).boxed().shared() }
    }

    /// Returns a connected [`Promise`] and [`CompletionFuture`] pair. If the [`Promise`] is dropped without being
    /// fulfilled, the future resolves to [`Error::Cancelled`].
    pub(crate) fn channel() -> (Promise, Self) {
        let (sender, receiver) = oneshot::channel();
        let inner = receiver
            .map(|result| {
                result.unwrap_or_else(|_| {
                    Err(Error::cancelled("the completion promise was dropped before being fulfilled"))
                })
            })
            .boxed()
            .shared();
        (Promise { sender }, Self { inner })
    }

    /// Returns the outcome of this future if it has already resolved, without blocking.
    pub fn peek(&self) -> Option<Result<(), Error>> {
        self.inner.clone().now_or_never()
    }

    /// Blocks the current thread until this future resolves.
    pub fn wait(self) -> Result<(), Error> {
        futures::executor::block_on(self)
    }
}

impl Future for CompletionFuture {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl std::fmt::Debug for CompletionFuture {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("CompletionFuture").field("outcome", &self.inner.peek()).finish()
    }
}

/// Producer side of a [`CompletionFuture`]. Consuming [`Promise::set`] makes fulfillment exactly-once.
pub(crate) struct Promise {
    sender: oneshot::Sender<Result<(), Error>>,
}

impl Promise {
    pub(crate) fn set(self, result: Result<(), Error>) {
        // The receiving side is gone when every clone of the future has been dropped, which is fine.
        let _ = self.sender.send(result);
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::errors::ffi::PJRT_Error;
    use crate::ffi::PJRT_Extension_Base;

    #[repr(C)]
    pub struct PJRT_Event {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Event_IsReady_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub event: *mut PJRT_Event,
        pub is_ready: bool,
    }

    impl PJRT_Event_IsReady_Args {
        pub fn new(event: *mut PJRT_Event) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), event, is_ready: false }
        }
    }

    pub type PJRT_Event_IsReady = unsafe extern "C" fn(args: *mut PJRT_Event_IsReady_Args) -> *mut PJRT_Error;

    /// Invoked by the plugin once the event is ready. The callee takes ownership of `error`, which is null on success.
    pub type PJRT_Event_OnReadyCallback = unsafe extern "C" fn(error: *mut PJRT_Error, user_arg: *mut std::ffi::c_void);

    #[repr(C)]
    pub struct PJRT_Event_OnReady_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub event: *mut PJRT_Event,
        pub callback: PJRT_Event_OnReadyCallback,
        pub user_arg: *mut std::ffi::c_void,
    }

    impl PJRT_Event_OnReady_Args {
        pub fn new(
            event: *mut PJRT_Event,
            callback: PJRT_Event_OnReadyCallback,
            user_arg: *mut std::ffi::c_void,
        ) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), event, callback, user_arg }
        }
    }

    pub type PJRT_Event_OnReady = unsafe extern "C" fn(args: *mut PJRT_Event_OnReady_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Event_Await_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub event: *mut PJRT_Event,
    }

    impl PJRT_Event_Await_Args {
        pub fn new(event: *mut PJRT_Event) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), event }
        }
    }

    pub type PJRT_Event_Await = unsafe extern "C" fn(args: *mut PJRT_Event_Await_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Event_Error_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub event: *mut PJRT_Event,
    }

    impl PJRT_Event_Error_Args {
        pub fn new(event: *mut PJRT_Event) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), event }
        }
    }

    pub type PJRT_Event_Error = unsafe extern "C" fn(args: *mut PJRT_Event_Error_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Event_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub event: *mut PJRT_Event,
    }

    impl PJRT_Event_Destroy_Args {
        pub fn new(event: *mut PJRT_Event) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), event }
        }
    }

    pub type PJRT_Event_Destroy = unsafe extern "C" fn(args: *mut PJRT_Event_Destroy_Args) -> *mut PJRT_Error;
}
