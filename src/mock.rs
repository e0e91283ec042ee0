//! In-process PJRT plugin that backs the unit tests of this crate. Every function of the `PJRT_Api` table is
//! implemented with plain Rust state (buffers are host byte vectors, events are condition variables, and an
//! "execution" copies its first argument into each output) so that the safe wrappers can be driven end to end
//! without loading a shared library. Each call is recorded in a thread-local log that tests can inspect.
//!
//! Client behavior is steered through client creation options:
//!
//!   - `platform_name` (string, defaults to `"cpu"`), `cpu_device_count` (defaults to 2), and `remote_device_count`
//!     (defaults to 0) shape the device topology.
//!   - Boolean flags such as `fail_devices`, `memories_unimplemented`, `strided_layout`, `fail_execute`, or
//!     `defer_completion` make individual plugin functions misbehave in specific ways. `null_output` and
//!     `null_completion_event` make an execution hand back a null handle for the last device.

#![allow(non_snake_case)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void};
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, LazyLock, Mutex, MutexGuard, PoisonError};

use crate::buffers::ffi::*;
use crate::clients::ffi::*;
use crate::devices::ffi::*;
use crate::errors::ffi::*;
use crate::events::ffi::*;
use crate::ffi::PJRT_Api;
use crate::memories::ffi::*;
use crate::plugins::ffi::*;
use crate::programs::ffi::*;
use crate::topologies::ffi::*;
use crate::transfers::ffi::*;
use crate::values::ffi::*;
use crate::versions::ffi::*;
use crate::{Client, ElementType, Error, NamedValue, Plugin, Value, slice_from_c_api, str_from_c_api};

pub const DEFAULT_MINOR_VERSION: usize = PJRT_API_MINOR as usize;

const PLATFORM_VERSION: &str = "mock 0.1";
const EXECUTABLE_NAME: &str = "identity";
const SERIALIZED_EXECUTABLE_PREFIX: &[u8] = b"mock-executable:";

thread_local! {
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static FAIL_ON_READY: Cell<bool> = const { Cell::new(false) };
    static LAST_COMPILED_PROGRAM: RefCell<Option<(String, Vec<u8>)>> = const { RefCell::new(None) };
    static DEFERRED_COMPLETIONS: RefCell<Vec<(Trigger, Outcome)>> = const { RefCell::new(Vec::new()) };
}

static PLUGIN_ATTRIBUTES: LazyLock<NamedValues> = LazyLock::new(|| {
    NamedValues::new(vec![
        NamedValue::new("xla_version", 2_i64),
        NamedValue::new("stablehlo_current_version", [1_i64, 9, 5]),
    ])
});

fn record(name: &str) {
    let _ = CALLS.try_with(|calls| calls.borrow_mut().push(name.to_string()));
}

pub fn reset_calls() {
    CALLS.with_borrow_mut(Vec::clear);
}

pub fn calls() -> Vec<String> {
    CALLS.with_borrow(Vec::clone)
}

pub fn call_count(name: &str) -> usize {
    CALLS.with_borrow(|calls| calls.iter().filter(|call| *call == name).count())
}

/// While set, `PJRT_Event_OnReady` refuses to register callbacks on the current thread.
pub fn fail_on_ready(fail: bool) {
    FAIL_ON_READY.set(fail);
}

/// Program most recently handed to `PJRT_Client_Compile` or `PJRT_Compile` on the current thread, as a
/// `(format, code)` pair.
pub fn last_compiled_program() -> Option<(String, Vec<u8>)> {
    LAST_COMPILED_PROGRAM.with_borrow(Clone::clone)
}

/// Completes every event that was held back by a client created with the `defer_completion` or
/// `defer_host_buffer_done` option.
pub fn fire_deferred_completions() {
    for (trigger, outcome) in DEFERRED_COMPLETIONS.with_borrow_mut(std::mem::take) {
        trigger.fire(outcome.as_ref().map(|(code, message)| (*code, message.as_str())));
    }
}

pub fn options<V: Into<Value>, const N: usize>(options: [(&str, V); N]) -> HashMap<String, Value> {
    options.into_iter().map(|(name, value)| (name.to_string(), value.into())).collect()
}

pub fn plugin() -> Plugin {
    unsafe { Plugin::from_c_api(api_with_version(0, DEFAULT_MINOR_VERSION as c_int)) }
        .expect("failed to initialize the mock PJRT plugin")
}

/// Function table of the mock plugin that reports the provided API version. The table is leaked.
pub fn api_with_version(major: c_int, minor: c_int) -> *const PJRT_Api {
    Box::leak(Box::new(api(major, minor)))
}

/// Mock plugin whose function table claims to end after `struct_size` bytes.
pub fn plugin_with_struct_size(struct_size: usize) -> Plugin {
    let mut api = api(0, DEFAULT_MINOR_VERSION as c_int);
    api.struct_size = struct_size;
    unsafe { Plugin::from_c_api(Box::leak(Box::new(api))) }.expect("failed to initialize the mock PJRT plugin")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn c_str(value: &str) -> (*const c_char, usize) {
    (value.as_ptr() as *const c_char, value.len())
}

fn success() -> *mut PJRT_Error {
    null_mut()
}

fn flag(options: &HashMap<String, Value>, name: &str) -> bool {
    matches!(options.get(name), Some(Value::Bool(true)))
}

unsafe fn named_values_from_c_api(values: *const PJRT_NamedValue, count: usize) -> Vec<NamedValue> {
    unsafe { slice_from_c_api(values, count) }.iter().map(|value| unsafe { NamedValue::from_c_api(value) }).collect()
}

/// Owned [`NamedValue`]s together with the C views that the mock hands out for them.
struct NamedValues {
    #[allow(dead_code)]
    values: Vec<NamedValue>,
    handles: Vec<PJRT_NamedValue>,
}

impl NamedValues {
    fn new(values: Vec<NamedValue>) -> Self {
        let handles = values.iter().map(|value| unsafe { value.to_c_api() }).collect();
        Self { values, handles }
    }

    fn to_c_api(&self) -> (*const PJRT_NamedValue, usize) {
        (self.handles.as_ptr(), self.handles.len())
    }
}

// The handles only point into the heap allocations owned by `values`, which are never mutated.
unsafe impl Send for NamedValues {}
unsafe impl Sync for NamedValues {}

macro_rules! mock_fn {
    ($name:ident($args:ident: $args_type:ty) $body:block) => {
        #[allow(unused_unsafe)]
        unsafe extern "C" fn $name($args: *mut $args_type) -> *mut PJRT_Error {
            record(stringify!($name));
            let $args = unsafe { &mut *$args };
            unsafe { $body }
        }
    };
}

// Errors.

type Outcome = Option<(PJRT_Error_Code, String)>;

struct MockError {
    code: PJRT_Error_Code,
    message: String,
}

pub fn error<M: Into<String>>(code: PJRT_Error_Code, message: M) -> *mut PJRT_Error {
    Box::into_raw(Box::new(MockError { code, message: message.into() })) as *mut PJRT_Error
}

fn outcome_error(outcome: &Outcome) -> *mut PJRT_Error {
    match outcome {
        Some((code, message)) => error(*code, message.as_str()),
        None => success(),
    }
}

/// Takes ownership of an error produced through this mock and returns its contents.
unsafe fn take_error(handle: *mut PJRT_Error) -> Outcome {
    if handle.is_null() {
        None
    } else {
        let error = unsafe { Box::from_raw(handle as *mut MockError) };
        Some((error.code, error.message))
    }
}

unsafe fn error_state<'a>(handle: *const PJRT_Error) -> &'a MockError {
    unsafe { &*(handle as *const MockError) }
}

unsafe extern "C" fn create_callback_error(
    code: PJRT_Error_Code,
    message: *const c_char,
    message_size: usize,
) -> *mut PJRT_Error {
    error(code, str_from_c_api(message, message_size).into_owned())
}

static CALLBACK_ERROR: PJRT_CallbackError = create_callback_error;

/// Error constructor that the mock hands to host callbacks.
pub fn callback_error_fn() -> *mut PJRT_CallbackError {
    &CALLBACK_ERROR as *const PJRT_CallbackError as *mut PJRT_CallbackError
}

unsafe extern "C" fn PJRT_Error_Destroy(args: *mut PJRT_Error_Destroy_Args) {
    record("PJRT_Error_Destroy");
    let args = unsafe { &mut *args };
    drop(unsafe { Box::from_raw(args.error as *mut MockError) });
}

unsafe extern "C" fn PJRT_Error_Message(args: *mut PJRT_Error_Message_Args) {
    record("PJRT_Error_Message");
    let args = unsafe { &mut *args };
    (args.message, args.message_size) = c_str(&unsafe { error_state(args.error) }.message);
}

mock_fn!(PJRT_Error_GetCode(args: PJRT_Error_GetCode_Args) {
    args.code = error_state(args.error).code;
    success()
});

// Plugin.

mock_fn!(PJRT_Plugin_Initialize(_args: PJRT_Plugin_Initialize_Args) { success() });

mock_fn!(PJRT_Plugin_Attributes(args: PJRT_Plugin_Attributes_Args) {
    (args.attributes, args.num_attributes) = PLUGIN_ATTRIBUTES.to_c_api();
    success()
});

// Events.

#[derive(Default)]
struct EventState {
    outcome: Option<Outcome>,
    callbacks: Vec<(PJRT_Event_OnReadyCallback, usize)>,
}

#[derive(Default)]
struct MockEvent {
    state: Mutex<EventState>,
    ready: Condvar,
}

/// Completes a pending event created by [`pending_event`], from any thread.
pub struct Trigger(Arc<MockEvent>);

impl Trigger {
    pub fn fire(&self, outcome: Option<(PJRT_Error_Code, &str)>) {
        let outcome = outcome.map(|(code, message)| (code, message.to_string()));
        let callbacks = {
            let mut state = lock(&self.0.state);
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.callbacks)
        };
        self.0.ready.notify_all();
        for (callback, user_arg) in callbacks {
            unsafe { callback(outcome_error(&outcome), user_arg as *mut c_void) };
        }
    }
}

fn event_handle(event: Arc<MockEvent>) -> *mut PJRT_Event {
    Arc::into_raw(event) as *mut PJRT_Event
}

unsafe fn event_state<'a>(handle: *mut PJRT_Event) -> &'a MockEvent {
    unsafe { &*(handle as *const MockEvent) }
}

fn completed_event(outcome: Outcome) -> *mut PJRT_Event {
    let event = MockEvent::default();
    lock(&event.state).outcome = Some(outcome);
    event_handle(Arc::new(event))
}

pub fn ready_event(outcome: Option<(PJRT_Error_Code, &str)>) -> *mut PJRT_Event {
    completed_event(outcome.map(|(code, message)| (code, message.to_string())))
}

pub fn pending_event() -> (*mut PJRT_Event, Trigger) {
    let event = Arc::new(MockEvent::default());
    (event_handle(event.clone()), Trigger(event))
}

mock_fn!(PJRT_Event_Destroy(args: PJRT_Event_Destroy_Args) {
    drop(Arc::from_raw(args.event as *const MockEvent));
    success()
});

mock_fn!(PJRT_Event_IsReady(args: PJRT_Event_IsReady_Args) {
    args.is_ready = lock(&event_state(args.event).state).outcome.is_some();
    success()
});

mock_fn!(PJRT_Event_Error(args: PJRT_Event_Error_Args) {
    match &lock(&event_state(args.event).state).outcome {
        Some(outcome) => outcome_error(outcome),
        None => error(PJRT_Error_Code_FAILED_PRECONDITION, "the event is not ready yet"),
    }
});

mock_fn!(PJRT_Event_Await(args: PJRT_Event_Await_Args) {
    let event = event_state(args.event);
    let state = event
        .ready
        .wait_while(lock(&event.state), |state| state.outcome.is_none())
        .unwrap_or_else(PoisonError::into_inner);
    state.outcome.as_ref().map(outcome_error).unwrap_or_else(success)
});

mock_fn!(PJRT_Event_OnReady(args: PJRT_Event_OnReady_Args) {
    if FAIL_ON_READY.get() {
        return error(PJRT_Error_Code_UNAVAILABLE, "PJRT_Event_OnReady is disabled in the mock plugin");
    }
    let event = event_state(args.event);
    let mut state = lock(&event.state);
    match state.outcome.clone() {
        Some(outcome) => {
            drop(state);
            (args.callback)(outcome_error(&outcome), args.user_arg);
        }
        None => state.callbacks.push((args.callback, args.user_arg as usize)),
    }
    success()
});

// Clients.

struct KeyValueCallbacks {
    get: PJRT_KeyValueGetCallback,
    get_user_arg: *mut c_void,
    try_get: PJRT_KeyValueTryGetCallback,
    try_get_user_arg: *mut c_void,
    put: PJRT_KeyValuePutCallback,
    put_user_arg: *mut c_void,
}

struct MockClient {
    platform_name: String,
    options: HashMap<String, Value>,
    devices: Vec<Box<MockDevice>>,
    device_handles: Vec<*mut PJRT_Device>,
    addressable_device_handles: Vec<*mut PJRT_Device>,
    #[allow(dead_code)]
    memories: Vec<Box<MockMemory>>,
    memory_handles: Vec<*mut PJRT_Memory>,
    key_value_callbacks: Option<KeyValueCallbacks>,
    topology: Box<MockTopology>,
}

impl MockClient {
    fn new(options: HashMap<String, Value>, key_value_callbacks: Option<KeyValueCallbacks>) -> Box<Self> {
        let platform_name = match options.get("platform_name") {
            Some(Value::String(platform_name)) => platform_name.clone(),
            _ => "cpu".to_string(),
        };
        let count = |name: &str, default: usize| match options.get(name) {
            Some(Value::I64(count)) => *count as usize,
            _ => default,
        };
        let addressable_count = count("cpu_device_count", 2);
        let remote_count = count("remote_device_count", 0);
        let bool_attribute = flag(&options, "bool_device_attribute");

        let mut devices = (0..addressable_count + remote_count)
            .map(|index| {
                let addressable = index < addressable_count;
                Box::new(MockDevice {
                    description: MockDescription::new(index, if addressable { 0 } else { 1 }, &platform_name),
                    local_hardware_id: if addressable { index as c_int } else { -1 },
                    memories: Vec::new(),
                    default_memory: null_mut(),
                })
            })
            .collect::<Vec<_>>();
        if bool_attribute {
            for device in &mut devices {
                device.description.attributes = MockDescription::attributes(device.description.id, true);
            }
        }
        let device_handles = devices
            .iter_mut()
            .map(|device| &mut **device as *mut MockDevice as *mut PJRT_Device)
            .collect::<Vec<_>>();
        let addressable_device_handles = device_handles[..addressable_count].to_vec();

        let mut memories = (0..addressable_count)
            .map(|index| MockMemory::new(index, "device", vec![device_handles[index]]))
            .collect::<Vec<_>>();
        memories.push(MockMemory::new(addressable_count, "pinned_host", addressable_device_handles.clone()));
        let memory_handles = memories
            .iter_mut()
            .map(|memory| &mut **memory as *mut MockMemory as *mut PJRT_Memory)
            .collect::<Vec<_>>();
        for (index, device) in devices.iter_mut().take(addressable_count).enumerate() {
            device.memories = vec![memory_handles[index], memory_handles[addressable_count]];
            device.default_memory = memory_handles[index];
        }

        let topology = MockTopology::new(&platform_name, &platform_name, addressable_count, Vec::new());
        Box::new(Self {
            platform_name,
            options,
            devices,
            device_handles,
            addressable_device_handles,
            memories,
            memory_handles,
            key_value_callbacks,
            topology,
        })
    }

    fn flag(&self, name: &str) -> bool {
        flag(&self.options, name)
    }
}

unsafe fn client_state<'a>(handle: *mut PJRT_Client) -> &'a MockClient {
    unsafe { &*(handle as *const MockClient) }
}

mock_fn!(PJRT_Client_Create(args: PJRT_Client_Create_Args) {
    let options = named_values_from_c_api(args.create_options, args.num_options)
        .into_iter()
        .map(|option| (option.name, option.value))
        .collect();
    let key_value_callbacks = match (args.kv_get_callback, args.kv_try_get_callback, args.kv_put_callback) {
        (Some(get), Some(try_get), Some(put)) => Some(KeyValueCallbacks {
            get,
            get_user_arg: args.kv_get_user_arg,
            try_get,
            try_get_user_arg: args.kv_try_get_user_arg,
            put,
            put_user_arg: args.kv_put_user_arg,
        }),
        _ => None,
    };
    args.client = Box::into_raw(MockClient::new(options, key_value_callbacks)) as *mut PJRT_Client;
    success()
});

mock_fn!(PJRT_Client_Destroy(args: PJRT_Client_Destroy_Args) {
    drop(Box::from_raw(args.client as *mut MockClient));
    success()
});

mock_fn!(PJRT_Client_PlatformName(args: PJRT_Client_PlatformName_Args) {
    (args.platform_name, args.platform_name_size) = c_str(&client_state(args.client).platform_name);
    success()
});

mock_fn!(PJRT_Client_PlatformVersion(args: PJRT_Client_PlatformVersion_Args) {
    (args.platform_version, args.platform_version_size) = c_str(PLATFORM_VERSION);
    success()
});

mock_fn!(PJRT_Client_ProcessIndex(args: PJRT_Client_ProcessIndex_Args) {
    args.process_index = 0;
    success()
});

mock_fn!(PJRT_Client_Devices(args: PJRT_Client_Devices_Args) {
    let client = client_state(args.client);
    if client.flag("fail_devices") {
        return error(PJRT_Error_Code_INTERNAL, "failed to enumerate the mock devices");
    }
    (args.devices, args.num_devices) = (client.device_handles.as_ptr(), client.device_handles.len());
    success()
});

mock_fn!(PJRT_Client_AddressableDevices(args: PJRT_Client_AddressableDevices_Args) {
    let handles = &client_state(args.client).addressable_device_handles;
    (args.addressable_devices, args.num_addressable_devices) = (handles.as_ptr(), handles.len());
    success()
});

mock_fn!(PJRT_Client_LookupDevice(args: PJRT_Client_LookupDevice_Args) {
    let client = client_state(args.client);
    match client.devices.iter().position(|device| device.description.id == args.id) {
        Some(index) => {
            args.device = client.device_handles[index];
            success()
        }
        None => error(PJRT_Error_Code_INVALID_ARGUMENT, format!("no device with id {}", args.id)),
    }
});

mock_fn!(PJRT_Client_LookupAddressableDevice(args: PJRT_Client_LookupAddressableDevice_Args) {
    let client = client_state(args.client);
    let index = client.devices.iter().position(|device| {
        device.local_hardware_id >= 0 && device.local_hardware_id == args.local_hardware_id
    });
    match index {
        Some(index) => {
            args.addressable_device = client.device_handles[index];
            success()
        }
        None => error(
            PJRT_Error_Code_INVALID_ARGUMENT,
            format!("no addressable device with local hardware id {}", args.local_hardware_id),
        ),
    }
});

mock_fn!(PJRT_Client_AddressableMemories(args: PJRT_Client_AddressableMemories_Args) {
    let client = client_state(args.client);
    if client.flag("memories_unimplemented") {
        return error(PJRT_Error_Code_UNIMPLEMENTED, "memories are not supported by this mock client");
    }
    (args.addressable_memories, args.num_addressable_memories) =
        (client.memory_handles.as_ptr(), client.memory_handles.len());
    success()
});

mock_fn!(PJRT_Client_DefaultDeviceAssignment(args: PJRT_Client_DefaultDeviceAssignment_Args) {
    let device_count = client_state(args.client).addressable_device_handles.len().max(1);
    let assignment = std::slice::from_raw_parts_mut(args.default_assignment, args.default_assignment_size);
    for (index, device_id) in assignment.iter_mut().enumerate() {
        *device_id = (index % device_count) as c_int;
    }
    success()
});

mock_fn!(PJRT_Client_Compile(args: PJRT_Client_Compile_Args) {
    let client = client_state(args.client);
    let code = record_program(&*args.program);
    let executable = Arc::new(MockExecutable::new(code, true, &client.options));
    args.executable = MockLoadedExecutable::into_handle(executable, client);
    success()
});

mock_fn!(PJRT_Client_BufferFromHostBuffer(args: PJRT_Client_BufferFromHostBuffer_Args) {
    let dimensions = slice_from_c_api(args.dims, args.num_dims).to_vec();
    let element_size = element_size(args.data_type);
    let byte_strides = slice_from_c_api(args.byte_strides, args.num_byte_strides);
    let data = gather(args.data as *const u8, &dimensions, element_size, byte_strides);
    let (device, memory) = placement(args.device, args.memory);
    let client = client_state(args.client);
    args.buffer = MockBuffer::into_handle(client, args.data_type, dimensions, data, device, memory);
    args.done_with_host_buffer = if client.flag("no_done_event") {
        null_mut()
    } else if client.flag("defer_host_buffer_done") {
        let (event, trigger) = pending_event();
        DEFERRED_COMPLETIONS.with_borrow_mut(|completions| completions.push((trigger, None)));
        event
    } else {
        completed_event(None)
    };
    success()
});

mock_fn!(PJRT_Client_CreateViewOfDeviceBuffer(args: PJRT_Client_CreateViewOfDeviceBuffer_Args) {
    let dimensions = slice_from_c_api(args.dims, args.num_dims).to_vec();
    let data = gather(args.device_buffer_ptr as *const u8, &dimensions, element_size(args.element_type), &[]);
    let (device, memory) = placement(args.device, args.memory);
    let client = client_state(args.client);
    args.buffer = MockBuffer::into_handle(client, args.element_type, dimensions, data, device, memory);
    let buffer = &mut *(args.buffer as *mut MockBuffer);
    buffer.on_delete = Some((args.on_delete_callback, args.device_buffer_ptr, args.on_delete_callback_arg));
    success()
});

mock_fn!(PJRT_Client_TopologyDescription(args: PJRT_Client_TopologyDescription_Args) {
    args.topology = &*client_state(args.client).topology as *const MockTopology as *mut PJRT_TopologyDescription;
    success()
});

unsafe fn key_value_callbacks(client: &Client) -> &KeyValueCallbacks {
    unsafe { client_state(client.to_c_api()) }
        .key_value_callbacks
        .as_ref()
        .expect("the mock client was created without a key-value store")
}

fn key_value_result(error: *mut PJRT_Error, client: &Client) -> Result<(), Error> {
    match unsafe { Error::from_c_api(error, client.api()) } {
        Ok(None) => Ok(()),
        Ok(Some(error)) | Err(error) => Err(error),
    }
}

unsafe extern "C" fn ignore_value(_value: *mut c_char) {}

/// Calls the key-value store "put" callback that the crate registered when creating `client`.
pub fn key_value_put(client: &Client, key: &[u8], value: &[u8]) -> Result<(), Error> {
    let callbacks = unsafe { key_value_callbacks(client) };
    let mut args = PJRT_KeyValuePutCallback_Args {
        struct_size: size_of::<PJRT_KeyValuePutCallback_Args>(),
        extension_start: null_mut(),
        key: key.as_ptr() as *const c_char,
        key_size: key.len(),
        value: value.as_ptr() as *const c_char,
        value_size: value.len(),
        callback_error: callback_error_fn(),
        user_arg: callbacks.put_user_arg,
    };
    key_value_result(unsafe { (callbacks.put)(&mut args) }, client)
}

/// Calls the blocking key-value store "get" callback that the crate registered when creating `client`.
pub fn key_value_get(client: &Client, key: &[u8], timeout_in_ms: c_int) -> Result<Vec<u8>, Error> {
    let callbacks = unsafe { key_value_callbacks(client) };
    let mut args = PJRT_KeyValueGetCallback_Args {
        struct_size: size_of::<PJRT_KeyValueGetCallback_Args>(),
        extension_start: null_mut(),
        key: key.as_ptr() as *const c_char,
        key_size: key.len(),
        timeout_in_ms,
        callback_error: callback_error_fn(),
        user_arg: callbacks.get_user_arg,
        value: null_mut(),
        value_size: 0,
        value_deleter_callback: ignore_value,
    };
    key_value_result(unsafe { (callbacks.get)(&mut args) }, client)?;
    let value = unsafe { slice_from_c_api(args.value as *const u8, args.value_size) }.to_vec();
    unsafe { (args.value_deleter_callback)(args.value) };
    Ok(value)
}

/// Calls the non-blocking key-value store "get" callback that the crate registered when creating `client`.
pub fn key_value_try_get(client: &Client, key: &[u8]) -> Result<Vec<u8>, Error> {
    let callbacks = unsafe { key_value_callbacks(client) };
    let mut args = PJRT_KeyValueTryGetCallback_Args {
        struct_size: size_of::<PJRT_KeyValueTryGetCallback_Args>(),
        extension_start: null_mut(),
        key: key.as_ptr() as *const c_char,
        key_size: key.len(),
        callback_error: callback_error_fn(),
        user_arg: callbacks.try_get_user_arg,
        value: null_mut(),
        value_size: 0,
        value_deleter_callback: ignore_value,
    };
    key_value_result(unsafe { (callbacks.try_get)(&mut args) }, client)?;
    let value = unsafe { slice_from_c_api(args.value as *const u8, args.value_size) }.to_vec();
    unsafe { (args.value_deleter_callback)(args.value) };
    Ok(value)
}

// Devices.

struct MockDescription {
    id: c_int,
    process_index: c_int,
    kind: String,
    to_string: String,
    debug_string: String,
    attributes: NamedValues,
}

impl MockDescription {
    fn new(index: usize, process_index: c_int, kind: &str) -> Self {
        Self {
            id: index as c_int,
            process_index,
            kind: kind.to_string(),
            to_string: format!("CpuDevice(id={index})"),
            debug_string: format!("MockDevice(id={index}, kind={kind})"),
            attributes: Self::attributes(index as c_int, false),
        }
    }

    fn attributes(id: c_int, with_bool: bool) -> NamedValues {
        let mut attributes = vec![
            NamedValue::new("vendor", "mock"),
            NamedValue::new("core_count", 4_i64),
            NamedValue::new("coords", vec![id as i64, 0, 0]),
        ];
        if with_bool {
            attributes.push(NamedValue::new("supports_bfloat16", true));
        }
        NamedValues::new(attributes)
    }

    fn handle(&self) -> *mut PJRT_DeviceDescription {
        self as *const Self as *mut PJRT_DeviceDescription
    }
}

struct MockDevice {
    description: MockDescription,
    local_hardware_id: c_int,
    memories: Vec<*mut PJRT_Memory>,
    default_memory: *mut PJRT_Memory,
}

unsafe fn device_state<'a>(handle: *mut PJRT_Device) -> &'a MockDevice {
    unsafe { &*(handle as *const MockDevice) }
}

unsafe fn description_state<'a>(handle: *mut PJRT_DeviceDescription) -> &'a MockDescription {
    unsafe { &*(handle as *const MockDescription) }
}

mock_fn!(PJRT_Device_GetDescription(args: PJRT_Device_GetDescription_Args) {
    args.device_description = device_state(args.device).description.handle();
    success()
});

mock_fn!(PJRT_Device_IsAddressable(args: PJRT_Device_IsAddressable_Args) {
    args.is_addressable = device_state(args.device).local_hardware_id >= 0;
    success()
});

mock_fn!(PJRT_Device_LocalHardwareId(args: PJRT_Device_LocalHardwareId_Args) {
    args.local_hardware_id = device_state(args.device).local_hardware_id;
    success()
});

mock_fn!(PJRT_Device_AddressableMemories(args: PJRT_Device_AddressableMemories_Args) {
    let memories = &device_state(args.device).memories;
    (args.memories, args.num_memories) = (memories.as_ptr(), memories.len());
    success()
});

mock_fn!(PJRT_Device_DefaultMemory(args: PJRT_Device_DefaultMemory_Args) {
    let device = device_state(args.device);
    if device.default_memory.is_null() {
        return error(PJRT_Error_Code_NOT_FOUND, "the mock device has no default memory");
    }
    args.memory = device.default_memory;
    success()
});

mock_fn!(PJRT_Device_MemoryStats(args: PJRT_Device_MemoryStats_Args) {
    args.bytes_in_use = 1024;
    (args.peak_bytes_in_use, args.peak_bytes_in_use_is_set) = (2048, true);
    (args.num_allocs, args.num_allocs_is_set) = (3, true);
    success()
});

mock_fn!(PJRT_DeviceDescription_Id(args: PJRT_DeviceDescription_Id_Args) {
    args.id = description_state(args.device_description).id;
    success()
});

mock_fn!(PJRT_DeviceDescription_ProcessIndex(args: PJRT_DeviceDescription_ProcessIndex_Args) {
    args.process_index = description_state(args.device_description).process_index;
    success()
});

mock_fn!(PJRT_DeviceDescription_Attributes(args: PJRT_DeviceDescription_Attributes_Args) {
    (args.attributes, args.num_attributes) = description_state(args.device_description).attributes.to_c_api();
    success()
});

mock_fn!(PJRT_DeviceDescription_Kind(args: PJRT_DeviceDescription_Kind_Args) {
    (args.device_kind, args.device_kind_size) = c_str(&description_state(args.device_description).kind);
    success()
});

mock_fn!(PJRT_DeviceDescription_DebugString(args: PJRT_DeviceDescription_DebugString_Args) {
    (args.debug_string, args.debug_string_size) = c_str(&description_state(args.device_description).debug_string);
    success()
});

mock_fn!(PJRT_DeviceDescription_ToString(args: PJRT_DeviceDescription_ToString_Args) {
    (args.to_string, args.to_string_size) = c_str(&description_state(args.device_description).to_string);
    success()
});

// Memories.

struct MockMemory {
    id: c_int,
    kind: String,
    to_string: String,
    debug_string: String,
    devices: Vec<*mut PJRT_Device>,
}

impl MockMemory {
    fn new(id: usize, kind: &str, devices: Vec<*mut PJRT_Device>) -> Box<Self> {
        Box::new(Self {
            id: id as c_int,
            kind: kind.to_string(),
            to_string: format!("{}_{id}", kind.to_uppercase()),
            debug_string: format!("MockMemory(id={id}, kind={kind})"),
            devices,
        })
    }
}

unsafe fn memory_state<'a>(handle: *mut PJRT_Memory) -> &'a MockMemory {
    unsafe { &*(handle as *const MockMemory) }
}

mock_fn!(PJRT_Memory_Id(args: PJRT_Memory_Id_Args) {
    args.id = memory_state(args.memory).id;
    success()
});

mock_fn!(PJRT_Memory_Kind(args: PJRT_Memory_Kind_Args) {
    (args.kind, args.kind_size) = c_str(&memory_state(args.memory).kind);
    success()
});

mock_fn!(PJRT_Memory_DebugString(args: PJRT_Memory_DebugString_Args) {
    (args.debug_string, args.debug_string_size) = c_str(&memory_state(args.memory).debug_string);
    success()
});

mock_fn!(PJRT_Memory_ToString(args: PJRT_Memory_ToString_Args) {
    (args.to_string, args.to_string_size) = c_str(&memory_state(args.memory).to_string);
    success()
});

mock_fn!(PJRT_Memory_AddressableByDevices(args: PJRT_Memory_AddressableByDevices_Args) {
    let devices = &memory_state(args.memory).devices;
    (args.devices, args.num_devices) = (devices.as_ptr(), devices.len());
    success()
});

// Buffers.

type DeleteCallback = unsafe extern "C" fn(*mut c_void, *mut c_void);

struct MockBuffer {
    client: *const MockClient,
    element_type: PJRT_Buffer_Type,
    dimensions: Vec<i64>,
    minor_to_major: Vec<i64>,
    byte_strides: Vec<i64>,
    dynamic_dimensions: Vec<usize>,
    data: Vec<u8>,
    device: *mut PJRT_Device,
    memory: *mut PJRT_Memory,
    deleted: AtomicBool,
    external_references: AtomicUsize,
    on_delete: Option<(DeleteCallback, *mut c_void, *mut c_void)>,
}

impl MockBuffer {
    fn into_handle(
        client: &MockClient,
        element_type: PJRT_Buffer_Type,
        dimensions: Vec<i64>,
        data: Vec<u8>,
        device: *mut PJRT_Device,
        memory: *mut PJRT_Memory,
    ) -> *mut PJRT_Buffer {
        let rank = dimensions.len();
        let element_size = element_size(element_type) as i64;
        let byte_strides =
            (0..rank).map(|axis| dimensions[axis + 1..].iter().product::<i64>() * element_size).collect();
        let dynamic_dimensions =
            if client.flag("dynamic_last_dimension") && rank > 0 { vec![rank - 1] } else { Vec::new() };
        let buffer = Box::new(Self {
            client,
            element_type,
            minor_to_major: (0..rank as i64).rev().collect(),
            byte_strides,
            dynamic_dimensions,
            dimensions,
            data,
            device,
            memory,
            deleted: AtomicBool::new(false),
            external_references: AtomicUsize::new(0),
            on_delete: None,
        });
        Box::into_raw(buffer) as *mut PJRT_Buffer
    }

    fn client(&self) -> &MockClient {
        unsafe { &*self.client }
    }

    fn copy(&self, device: *mut PJRT_Device, memory: *mut PJRT_Memory) -> *mut PJRT_Buffer {
        Self::into_handle(self.client(), self.element_type, self.dimensions.clone(), self.data.clone(), device, memory)
    }
}

unsafe fn buffer_state<'a>(handle: *mut PJRT_Buffer) -> &'a MockBuffer {
    unsafe { &*(handle as *const MockBuffer) }
}

fn element_size(element_type: PJRT_Buffer_Type) -> usize {
    unsafe { ElementType::from_c_api(element_type) }.byte_size().unwrap_or(1)
}

/// Resolves the device and memory that a new buffer is placed in from a device or memory destination.
unsafe fn placement(device: *mut PJRT_Device, memory: *mut PJRT_Memory) -> (*mut PJRT_Device, *mut PJRT_Memory) {
    if memory.is_null() {
        (device, unsafe { device_state(device) }.default_memory)
    } else {
        (unsafe { memory_state(memory) }.devices.first().copied().unwrap_or(null_mut()), memory)
    }
}

/// Copies a host array with the provided byte strides into a dense row-major byte vector.
unsafe fn gather(data: *const u8, dimensions: &[i64], element_size: usize, byte_strides: &[i64]) -> Vec<u8> {
    let element_count = dimensions.iter().product::<i64>().max(0) as usize;
    if data.is_null() || element_count * element_size == 0 {
        return Vec::new();
    }
    if byte_strides.is_empty() {
        return unsafe { std::slice::from_raw_parts(data, element_count * element_size) }.to_vec();
    }
    let mut bytes = Vec::with_capacity(element_count * element_size);
    let mut index = vec![0_i64; dimensions.len()];
    for _ in 0..element_count {
        let offset = index.iter().zip(byte_strides).map(|(index, stride)| index * stride).sum::<i64>();
        bytes.extend_from_slice(unsafe { std::slice::from_raw_parts(data.offset(offset as isize), element_size) });
        for axis in (0..dimensions.len()).rev() {
            index[axis] += 1;
            if index[axis] < dimensions[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    bytes
}

mock_fn!(PJRT_Buffer_Destroy(args: PJRT_Buffer_Destroy_Args) {
    let buffer = Box::from_raw(args.buffer as *mut MockBuffer);
    if let Some((callback, pointer, user_arg)) = buffer.on_delete {
        callback(pointer, user_arg);
    }
    success()
});

mock_fn!(PJRT_Buffer_ElementType(args: PJRT_Buffer_ElementType_Args) {
    args.element_type = buffer_state(args.buffer).element_type;
    success()
});

mock_fn!(PJRT_Buffer_Dimensions(args: PJRT_Buffer_Dimensions_Args) {
    let dimensions = &buffer_state(args.buffer).dimensions;
    (args.dims, args.num_dims) = (dimensions.as_ptr(), dimensions.len());
    success()
});

mock_fn!(PJRT_Buffer_UnpaddedDimensions(args: PJRT_Buffer_UnpaddedDimensions_Args) {
    let dimensions = &buffer_state(args.buffer).dimensions;
    (args.unpadded_dims, args.num_dims) = (dimensions.as_ptr(), dimensions.len());
    success()
});

mock_fn!(PJRT_Buffer_DynamicDimensionIndices(args: PJRT_Buffer_DynamicDimensionIndices_Args) {
    let buffer = buffer_state(args.buffer);
    if buffer.client().flag("dynamic_dimensions_unimplemented") {
        return error(PJRT_Error_Code_UNIMPLEMENTED, "dynamic dimensions are not supported by this mock client");
    }
    (args.dynamic_dim_indices, args.num_dynamic_dims) =
        (buffer.dynamic_dimensions.as_ptr(), buffer.dynamic_dimensions.len());
    success()
});

mock_fn!(PJRT_Buffer_GetMemoryLayout(args: PJRT_Buffer_GetMemoryLayout_Args) {
    let buffer = buffer_state(args.buffer);
    args.layout = if buffer.client().flag("strided_layout") {
        let strides = PJRT_Buffer_MemoryLayout_Strides::new(buffer.byte_strides.as_ptr(), buffer.byte_strides.len());
        PJRT_Buffer_MemoryLayout::new(
            PJRT_Buffer_MemoryLayout_Value { strides },
            PJRT_Buffer_MemoryLayout_Type_Strides,
        )
    } else {
        let tiled = PJRT_Buffer_MemoryLayout_Tiled::new(
            buffer.minor_to_major.as_ptr(),
            buffer.minor_to_major.len(),
            std::ptr::null(),
            std::ptr::null(),
            0,
        );
        PJRT_Buffer_MemoryLayout::new(PJRT_Buffer_MemoryLayout_Value { tiled }, PJRT_Buffer_MemoryLayout_Type_Tiled)
    };
    success()
});

mock_fn!(PJRT_Buffer_OnDeviceSizeInBytes(args: PJRT_Buffer_OnDeviceSizeInBytes_Args) {
    args.on_device_size_in_bytes = buffer_state(args.buffer).data.len();
    success()
});

mock_fn!(PJRT_Buffer_Device(args: PJRT_Buffer_Device_Args) {
    args.device = buffer_state(args.buffer).device;
    success()
});

mock_fn!(PJRT_Buffer_Memory(args: PJRT_Buffer_Memory_Args) {
    args.memory = buffer_state(args.buffer).memory;
    success()
});

mock_fn!(PJRT_Buffer_Delete(args: PJRT_Buffer_Delete_Args) {
    buffer_state(args.buffer).deleted.store(true, Ordering::SeqCst);
    success()
});

mock_fn!(PJRT_Buffer_IsDeleted(args: PJRT_Buffer_IsDeleted_Args) {
    args.is_deleted = buffer_state(args.buffer).deleted.load(Ordering::SeqCst);
    success()
});

mock_fn!(PJRT_Buffer_CopyToDevice(args: PJRT_Buffer_CopyToDevice_Args) {
    let (device, memory) = placement(args.dst_device, null_mut());
    args.dst_buffer = buffer_state(args.buffer).copy(device, memory);
    success()
});

mock_fn!(PJRT_Buffer_CopyToMemory(args: PJRT_Buffer_CopyToMemory_Args) {
    let (device, memory) = placement(null_mut(), args.dst_memory);
    args.dst_buffer = buffer_state(args.buffer).copy(device, memory);
    success()
});

mock_fn!(PJRT_Buffer_ToHostBuffer(args: PJRT_Buffer_ToHostBuffer_Args) {
    let data = &buffer_state(args.src).data;
    if args.dst.is_null() {
        args.dst_size = data.len();
        return success();
    }
    let size = data.len().min(args.dst_size);
    std::ptr::copy_nonoverlapping(data.as_ptr(), args.dst as *mut u8, size);
    args.event = completed_event(None);
    success()
});

mock_fn!(PJRT_Buffer_IsOnCpu(args: PJRT_Buffer_IsOnCpu_Args) {
    args.is_on_cpu = buffer_state(args.buffer).client().platform_name == "cpu";
    success()
});

mock_fn!(PJRT_Buffer_ReadyEvent(args: PJRT_Buffer_ReadyEvent_Args) {
    args.event = completed_event(None);
    success()
});

mock_fn!(PJRT_Buffer_UnsafePointer(args: PJRT_Buffer_UnsafePointer_Args) {
    args.buffer_pointer = buffer_state(args.buffer).data.as_ptr() as usize;
    success()
});

mock_fn!(PJRT_Buffer_IncreaseExternalReferenceCount(args: PJRT_Buffer_IncreaseExternalReferenceCount_Args) {
    buffer_state(args.buffer).external_references.fetch_add(1, Ordering::SeqCst);
    success()
});

mock_fn!(PJRT_Buffer_DecreaseExternalReferenceCount(args: PJRT_Buffer_DecreaseExternalReferenceCount_Args) {
    let references = &buffer_state(args.buffer).external_references;
    match references.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1)) {
        Ok(_) => success(),
        Err(_) => error(PJRT_Error_Code_FAILED_PRECONDITION, "the buffer has no external references"),
    }
});

mock_fn!(PJRT_Buffer_OpaqueDeviceMemoryDataPointer(args: PJRT_Buffer_OpaqueDeviceMemoryDataPointer_Args) {
    let buffer = buffer_state(args.buffer);
    if buffer.client().flag("opaque_pointer_fails") {
        return error(PJRT_Error_Code_INTERNAL, "the device memory pointer is unavailable");
    }
    args.device_memory_ptr = buffer.data.as_ptr() as *mut c_void;
    success()
});

// Host-to-device streams.

#[derive(Default)]
struct StreamState {
    contents: Vec<u8>,
    deleted_chunks: usize,
    destroyed: bool,
    current_bytes_unavailable: bool,
}

struct MockStream {
    total_bytes: usize,
    granule_bytes: usize,
    state: Mutex<StreamState>,
}

/// Test-side view of a stream created by [`stream`] that outlives the stream handle.
pub struct StreamView(Arc<MockStream>);

impl StreamView {
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.0.state).contents.clone()
    }

    pub fn deleted_chunks(&self) -> usize {
        lock(&self.0.state).deleted_chunks
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.0.state).destroyed
    }

    /// Makes `PJRT_CopyToDeviceStream_CurrentBytes` fail for this stream.
    pub fn fail_current_bytes(&self) {
        lock(&self.0.state).current_bytes_unavailable = true;
    }
}

pub fn stream(total_bytes: usize, granule_bytes: usize) -> (*mut PJRT_CopyToDeviceStream, StreamView) {
    let stream = Arc::new(MockStream { total_bytes, granule_bytes, state: Mutex::default() });
    (Arc::into_raw(stream.clone()) as *mut PJRT_CopyToDeviceStream, StreamView(stream))
}

unsafe fn stream_state<'a>(handle: *mut PJRT_CopyToDeviceStream) -> &'a MockStream {
    unsafe { &*(handle as *const MockStream) }
}

mock_fn!(PJRT_CopyToDeviceStream_Destroy(args: PJRT_CopyToDeviceStream_Destroy_Args) {
    let stream = Arc::from_raw(args.stream as *const MockStream);
    lock(&stream.state).destroyed = true;
    success()
});

mock_fn!(PJRT_CopyToDeviceStream_AddChunk(args: PJRT_CopyToDeviceStream_AddChunk_Args) {
    let stream = stream_state(args.stream);
    let chunk = &mut *args.chunk;
    let bytes = slice_from_c_api(chunk.data as *const u8, chunk.size).to_vec();
    let mut state = lock(&stream.state);
    if let Some(deleter) = chunk.deleter.take() {
        deleter(chunk.data, chunk.deleter_arg);
        state.deleted_chunks += 1;
    }
    if state.contents.len() + bytes.len() > stream.total_bytes {
        return error(
            PJRT_Error_Code_INVALID_ARGUMENT,
            format!("a chunk of {} bytes does not fit in the remaining stream capacity", bytes.len()),
        );
    }
    state.contents.extend_from_slice(&bytes);
    args.transfer_complete = completed_event(None);
    success()
});

mock_fn!(PJRT_CopyToDeviceStream_TotalBytes(args: PJRT_CopyToDeviceStream_TotalBytes_Args) {
    args.total_bytes = stream_state(args.stream).total_bytes as i64;
    success()
});

mock_fn!(PJRT_CopyToDeviceStream_GranuleSize(args: PJRT_CopyToDeviceStream_GranuleSize_Args) {
    args.granule_size_in_bytes = stream_state(args.stream).granule_bytes as i64;
    success()
});

mock_fn!(PJRT_CopyToDeviceStream_CurrentBytes(args: PJRT_CopyToDeviceStream_CurrentBytes_Args) {
    let state = lock(&stream_state(args.stream).state);
    if state.current_bytes_unavailable {
        return error(PJRT_Error_Code_UNAVAILABLE, "the mock stream cannot report its current size");
    }
    args.current_bytes = state.contents.len() as i64;
    success()
});

// Executables.

struct MockExecutable {
    code: Vec<u8>,
    loaded: bool,
    fingerprint: Option<String>,
    reports_outputs: bool,
    output_types: [PJRT_Buffer_Type; 1],
    output_dimensions: [i64; 2],
    output_ranks: [usize; 1],
    output_memory_kinds: [*const c_char; 1],
    output_memory_kind_sizes: [usize; 1],
    cost_analysis: NamedValues,
}

impl MockExecutable {
    fn new(code: Vec<u8>, loaded: bool, options: &HashMap<String, Value>) -> Self {
        let fingerprint = if flag(options, "fingerprint_unimplemented") {
            None
        } else if code.is_empty() {
            Some(String::new())
        } else {
            Some(format!("fp-{}", code.len()))
        };
        let (memory_kind, memory_kind_size) = c_str("device");
        Self {
            code,
            loaded,
            fingerprint,
            reports_outputs: !flag(options, "output_types_null"),
            output_types: [PJRT_Buffer_Type_F32],
            output_dimensions: [2, 2],
            output_ranks: [2],
            output_memory_kinds: [memory_kind],
            output_memory_kind_sizes: [memory_kind_size],
            cost_analysis: NamedValues::new(vec![NamedValue::new("flops", 4.0_f32)]),
        }
    }

    fn output_count(&self) -> usize {
        self.output_types.len()
    }
}

unsafe fn executable_state<'a>(handle: *mut PJRT_Executable) -> &'a MockExecutable {
    unsafe { &*(handle as *const MockExecutable) }
}

fn executable_handle(executable: Arc<MockExecutable>) -> *mut PJRT_Executable {
    Arc::into_raw(executable) as *mut PJRT_Executable
}

unsafe fn record_program(program: &PJRT_Program) -> Vec<u8> {
    let code = unsafe { slice_from_c_api(program.code as *const u8, program.code_size) }.to_vec();
    let format = str_from_c_api(program.format, program.format_size).into_owned();
    LAST_COMPILED_PROGRAM.set(Some((format, code.clone())));
    code
}

unsafe extern "C" fn delete_serialized_executable(serialized: *mut PJRT_SerializedExecutable) {
    drop(unsafe { Box::from_raw(serialized as *mut Vec<u8>) });
}

unsafe extern "C" fn delete_serialized_topology(serialized: *mut PJRT_SerializedTopology) {
    drop(unsafe { Box::from_raw(serialized as *mut Vec<u8>) });
}

mock_fn!(PJRT_Executable_Destroy(args: PJRT_Executable_Destroy_Args) {
    drop(Arc::from_raw(args.executable as *const MockExecutable));
    success()
});

mock_fn!(PJRT_Executable_Name(args: PJRT_Executable_Name_Args) {
    (args.executable_name, args.executable_name_size) = c_str(EXECUTABLE_NAME);
    success()
});

mock_fn!(PJRT_Executable_NumReplicas(args: PJRT_Executable_NumReplicas_Args) {
    args.num_replicas = 1;
    success()
});

mock_fn!(PJRT_Executable_NumPartitions(args: PJRT_Executable_NumPartitions_Args) {
    args.num_partitions = 1;
    success()
});

mock_fn!(PJRT_Executable_NumOutputs(args: PJRT_Executable_NumOutputs_Args) {
    args.num_outputs = executable_state(args.executable).output_count();
    success()
});

mock_fn!(PJRT_Executable_SizeOfGeneratedCodeInBytes(args: PJRT_Executable_SizeOfGeneratedCodeInBytes_Args) {
    args.size_in_bytes = if executable_state(args.executable).loaded { 128 } else { -1 };
    success()
});

mock_fn!(PJRT_Executable_GetCostAnalysis(args: PJRT_Executable_GetCostAnalysis_Args) {
    (args.properties, args.num_properties) = executable_state(args.executable).cost_analysis.to_c_api();
    success()
});

mock_fn!(PJRT_Executable_OutputMemoryKinds(args: PJRT_Executable_OutputMemoryKinds_Args) {
    let executable = executable_state(args.executable);
    args.num_outputs = executable.output_count();
    args.memory_kinds = executable.output_memory_kinds.as_ptr();
    args.memory_kind_sizes = executable.output_memory_kind_sizes.as_ptr();
    success()
});

mock_fn!(PJRT_Executable_OutputElementTypes(args: PJRT_Executable_OutputElementTypes_Args) {
    let executable = executable_state(args.executable);
    if executable.reports_outputs {
        args.output_types = executable.output_types.as_ptr() as *mut PJRT_Buffer_Type;
        args.num_output_types = executable.output_count();
    }
    success()
});

mock_fn!(PJRT_Executable_OutputDimensions(args: PJRT_Executable_OutputDimensions_Args) {
    let executable = executable_state(args.executable);
    args.num_outputs = executable.output_count();
    if executable.reports_outputs {
        args.dims = executable.output_dimensions.as_ptr();
        args.dim_sizes = executable.output_ranks.as_ptr();
    }
    success()
});

mock_fn!(PJRT_Executable_Fingerprint(args: PJRT_Executable_Fingerprint_Args) {
    match &executable_state(args.executable).fingerprint {
        Some(fingerprint) => {
            (args.executable_fingerprint, args.executable_fingerprint_size) = c_str(fingerprint);
            success()
        }
        None => error(PJRT_Error_Code_UNIMPLEMENTED, "fingerprints are not supported by this mock client"),
    }
});

mock_fn!(PJRT_Executable_Serialize(args: PJRT_Executable_Serialize_Args) {
    let executable = executable_state(args.executable as *mut PJRT_Executable);
    let serialized = Box::new([SERIALIZED_EXECUTABLE_PREFIX, executable.code.as_slice()].concat());
    (args.serialized_bytes, args.serialized_bytes_size) = (serialized.as_ptr() as *const c_char, serialized.len());
    args.serialized_executable = Box::into_raw(serialized) as *mut PJRT_SerializedExecutable;
    args.serialized_executable_deleter = Some(delete_serialized_executable);
    success()
});

mock_fn!(PJRT_Compile(args: PJRT_Compile_Args) {
    let options = if args.client.is_null() { HashMap::new() } else { client_state(args.client).options.clone() };
    let code = record_program(&*args.program);
    args.executable = executable_handle(Arc::new(MockExecutable::new(code, false, &options)));
    success()
});

// Loaded executables.

struct MockLoadedExecutable {
    executable: Arc<MockExecutable>,
    client: *const MockClient,
    deleted: AtomicBool,
}

impl MockLoadedExecutable {
    fn into_handle(executable: Arc<MockExecutable>, client: &MockClient) -> *mut PJRT_LoadedExecutable {
        let loaded_executable = Box::new(Self { executable, client, deleted: AtomicBool::new(false) });
        Box::into_raw(loaded_executable) as *mut PJRT_LoadedExecutable
    }

    fn client(&self) -> &MockClient {
        unsafe { &*self.client }
    }
}

unsafe fn loaded_executable_state<'a>(handle: *mut PJRT_LoadedExecutable) -> &'a MockLoadedExecutable {
    unsafe { &*(handle as *const MockLoadedExecutable) }
}

/// Hands a chunk holding a copy of `data` to a send callback and returns the error it reported, if any.
unsafe fn send(info: &PJRT_SendCallbackInfo, data: &[u8]) -> Outcome {
    unsafe extern "C" fn delete_chunk(_data: *mut c_void, deleter_arg: *mut c_void) {
        drop(unsafe { Box::from_raw(deleter_arg as *mut Vec<u8>) });
    }

    let mut bytes = Box::new(data.to_vec());
    let mut chunk = PJRT_Chunk {
        data: bytes.as_mut_ptr() as *mut c_void,
        size: bytes.len(),
        deleter: Some(delete_chunk),
        deleter_arg: Box::into_raw(bytes) as *mut c_void,
    };
    let error = unsafe { (info.send_callback)(&mut chunk, callback_error_fn(), data.len(), true, info.user_arg) };
    if let Some(deleter) = chunk.deleter.take() {
        unsafe { deleter(chunk.data, chunk.deleter_arg) };
    }
    unsafe { take_error(error) }
}

/// Lets a receive callback fill a stream sized like `data` and returns the received bytes once the stream is full.
unsafe fn receive(info: &PJRT_RecvCallbackInfo, data: &[u8]) -> Option<Vec<u8>> {
    let (handle, view) = stream(data.len(), 4);
    unsafe { (info.recv_callback)(handle, info.user_arg) };
    let contents = view.contents();
    (contents.len() == data.len()).then_some(contents)
}

mock_fn!(PJRT_LoadedExecutable_Destroy(args: PJRT_LoadedExecutable_Destroy_Args) {
    drop(Box::from_raw(args.executable as *mut MockLoadedExecutable));
    success()
});

mock_fn!(PJRT_LoadedExecutable_GetExecutable(args: PJRT_LoadedExecutable_GetExecutable_Args) {
    args.executable = executable_handle(loaded_executable_state(args.loaded_executable).executable.clone());
    success()
});

mock_fn!(PJRT_LoadedExecutable_AddressableDevices(args: PJRT_LoadedExecutable_AddressableDevices_Args) {
    let devices = &loaded_executable_state(args.executable).client().addressable_device_handles;
    (args.addressable_devices, args.num_addressable_devices) = (devices.as_ptr(), devices.len());
    success()
});

mock_fn!(PJRT_LoadedExecutable_Delete(args: PJRT_LoadedExecutable_Delete_Args) {
    loaded_executable_state(args.executable).deleted.store(true, Ordering::SeqCst);
    success()
});

mock_fn!(PJRT_LoadedExecutable_IsDeleted(args: PJRT_LoadedExecutable_IsDeleted_Args) {
    args.is_deleted = loaded_executable_state(args.executable).deleted.load(Ordering::SeqCst);
    success()
});

mock_fn!(PJRT_LoadedExecutable_Execute(args: PJRT_LoadedExecutable_Execute_Args) {
    let loaded_executable = loaded_executable_state(args.executable);
    let client = loaded_executable.client();
    if client.flag("fail_execute") {
        return error(PJRT_Error_Code_INTERNAL, "the mock execution failed");
    }
    let options = &*args.options;
    for device_index in 0..args.num_devices {
        let arguments = slice_from_c_api(*args.argument_lists.add(device_index), args.num_args);
        let (element_type, dimensions, mut data) = match arguments.first() {
            Some(argument) => {
                let argument = buffer_state(*argument);
                (argument.element_type, argument.dimensions.clone(), argument.data.clone())
            }
            None => (PJRT_Buffer_Type_F32, vec![2, 2], vec![0; 16]),
        };
        let device = if args.execute_device.is_null() {
            client.addressable_device_handles[device_index]
        } else {
            args.execute_device
        };

        let mut failure = None;
        if !options.send_callbacks.is_null() {
            let infos = slice_from_c_api(*options.send_callbacks.add(device_index), options.num_send_ops);
            for info in infos {
                let outcome = send(info, &data);
                failure = failure.or(outcome);
            }
        }
        if !options.recv_callbacks.is_null() {
            let infos = slice_from_c_api(*options.recv_callbacks.add(device_index), options.num_recv_ops);
            for info in infos {
                if let Some(received) = receive(info, &data) {
                    data = received;
                }
            }
        }

        let outputs = *args.output_lists.add(device_index);
        let memory = device_state(device).default_memory;
        let last_device = device_index + 1 == args.num_devices;
        let output_count = loaded_executable.executable.output_count();
        for output_index in 0..output_count {
            let null_output = last_device && output_index + 1 == output_count && client.flag("null_output");
            *outputs.add(output_index) = if null_output {
                null_mut()
            } else {
                MockBuffer::into_handle(client, element_type, dimensions.clone(), data.clone(), device, memory)
            };
        }

        if !args.device_complete_events.is_null() {
            let event = if last_device && client.flag("null_completion_event") {
                null_mut()
            } else if client.flag("defer_completion") {
                let (event, trigger) = pending_event();
                DEFERRED_COMPLETIONS.with_borrow_mut(|completions| completions.push((trigger, failure)));
                event
            } else {
                completed_event(failure)
            };
            *args.device_complete_events.add(device_index) = event;
        }
    }
    success()
});

mock_fn!(PJRT_Executable_DeserializeAndLoad(args: PJRT_Executable_DeserializeAndLoad_Args) {
    let client = client_state(args.client);
    let serialized = slice_from_c_api(args.serialized_executable as *const u8, args.serialized_executable_size);
    match serialized.strip_prefix(SERIALIZED_EXECUTABLE_PREFIX) {
        Some(code) => {
            let executable = Arc::new(MockExecutable::new(code.to_vec(), true, &client.options));
            args.loaded_executable = MockLoadedExecutable::into_handle(executable, client);
            success()
        }
        None => error(PJRT_Error_Code_INVALID_ARGUMENT, "the provided bytes are not a serialized mock executable"),
    }
});

// Topologies.

struct MockTopology {
    name: String,
    platform_name: String,
    #[allow(dead_code)]
    descriptions: Vec<MockDescription>,
    description_handles: Vec<*mut PJRT_DeviceDescription>,
    attributes: NamedValues,
}

impl MockTopology {
    fn new(name: &str, platform_name: &str, device_count: usize, options: Vec<NamedValue>) -> Box<Self> {
        let descriptions =
            (0..device_count).map(|index| MockDescription::new(index, 0, platform_name)).collect::<Vec<_>>();
        let description_handles = descriptions.iter().map(MockDescription::handle).collect();
        let mut attributes = vec![NamedValue::new("num_slices", 1_i64)];
        attributes.extend(options);
        Box::new(Self {
            name: name.to_string(),
            platform_name: platform_name.to_string(),
            descriptions,
            description_handles,
            attributes: NamedValues::new(attributes),
        })
    }
}

unsafe fn topology_state<'a>(handle: *const PJRT_TopologyDescription) -> &'a MockTopology {
    unsafe { &*(handle as *const MockTopology) }
}

mock_fn!(PJRT_TopologyDescription_Create(args: PJRT_TopologyDescription_Create_Args) {
    let name = str_from_c_api(args.topology_name, args.topology_name_size);
    let options = named_values_from_c_api(args.create_options, args.num_options);
    args.topology = Box::into_raw(MockTopology::new(&name, "cpu", 2, options)) as *mut PJRT_TopologyDescription;
    success()
});

mock_fn!(PJRT_TopologyDescription_Destroy(args: PJRT_TopologyDescription_Destroy_Args) {
    drop(Box::from_raw(args.topology as *mut MockTopology));
    success()
});

mock_fn!(PJRT_TopologyDescription_PlatformName(args: PJRT_TopologyDescription_PlatformName_Args) {
    (args.platform_name, args.platform_name_size) = c_str(&topology_state(args.topology).platform_name);
    success()
});

mock_fn!(PJRT_TopologyDescription_PlatformVersion(args: PJRT_TopologyDescription_PlatformVersion_Args) {
    (args.platform_version, args.platform_version_size) = c_str(PLATFORM_VERSION);
    success()
});

mock_fn!(PJRT_TopologyDescription_GetDeviceDescriptions(args: PJRT_TopologyDescription_GetDeviceDescriptions_Args) {
    let descriptions = &topology_state(args.topology).description_handles;
    (args.descriptions, args.num_descriptions) = (descriptions.as_ptr(), descriptions.len());
    success()
});

mock_fn!(PJRT_TopologyDescription_Attributes(args: PJRT_TopologyDescription_Attributes_Args) {
    (args.attributes, args.num_attributes) = topology_state(args.topology).attributes.to_c_api();
    success()
});

mock_fn!(PJRT_TopologyDescription_Serialize(args: PJRT_TopologyDescription_Serialize_Args) {
    let serialized = Box::new(format!("mock-topology:{}", topology_state(args.topology).name).into_bytes());
    (args.serialized_bytes, args.serialized_bytes_size) = (serialized.as_ptr() as *const c_char, serialized.len());
    args.serialized_topology = Box::into_raw(serialized) as *mut PJRT_SerializedTopology;
    args.serialized_topology_deleter = Some(delete_serialized_topology);
    success()
});

fn api(major: c_int, minor: c_int) -> PJRT_Api {
    PJRT_Api {
        struct_size: size_of::<PJRT_Api>(),
        extension_start: null_mut(),
        pjrt_api_version: PJRT_Api_Version::new(major, minor),
        PJRT_Error_Destroy: Some(PJRT_Error_Destroy),
        PJRT_Error_Message: Some(PJRT_Error_Message),
        PJRT_Error_GetCode: Some(PJRT_Error_GetCode),
        PJRT_Plugin_Initialize: Some(PJRT_Plugin_Initialize),
        PJRT_Plugin_Attributes: Some(PJRT_Plugin_Attributes),
        PJRT_Event_Destroy: Some(PJRT_Event_Destroy),
        PJRT_Event_IsReady: Some(PJRT_Event_IsReady),
        PJRT_Event_Error: Some(PJRT_Event_Error),
        PJRT_Event_Await: Some(PJRT_Event_Await),
        PJRT_Event_OnReady: Some(PJRT_Event_OnReady),
        PJRT_Client_Create: Some(PJRT_Client_Create),
        PJRT_Client_Destroy: Some(PJRT_Client_Destroy),
        PJRT_Client_PlatformName: Some(PJRT_Client_PlatformName),
        PJRT_Client_ProcessIndex: Some(PJRT_Client_ProcessIndex),
        PJRT_Client_PlatformVersion: Some(PJRT_Client_PlatformVersion),
        PJRT_Client_Devices: Some(PJRT_Client_Devices),
        PJRT_Client_AddressableDevices: Some(PJRT_Client_AddressableDevices),
        PJRT_Client_LookupDevice: Some(PJRT_Client_LookupDevice),
        PJRT_Client_LookupAddressableDevice: Some(PJRT_Client_LookupAddressableDevice),
        PJRT_Client_AddressableMemories: Some(PJRT_Client_AddressableMemories),
        PJRT_Client_Compile: Some(PJRT_Client_Compile),
        PJRT_Client_DefaultDeviceAssignment: Some(PJRT_Client_DefaultDeviceAssignment),
        PJRT_Client_BufferFromHostBuffer: Some(PJRT_Client_BufferFromHostBuffer),
        PJRT_DeviceDescription_Id: Some(PJRT_DeviceDescription_Id),
        PJRT_DeviceDescription_ProcessIndex: Some(PJRT_DeviceDescription_ProcessIndex),
        PJRT_DeviceDescription_Attributes: Some(PJRT_DeviceDescription_Attributes),
        PJRT_DeviceDescription_Kind: Some(PJRT_DeviceDescription_Kind),
        PJRT_DeviceDescription_DebugString: Some(PJRT_DeviceDescription_DebugString),
        PJRT_DeviceDescription_ToString: Some(PJRT_DeviceDescription_ToString),
        PJRT_Device_GetDescription: Some(PJRT_Device_GetDescription),
        PJRT_Device_IsAddressable: Some(PJRT_Device_IsAddressable),
        PJRT_Device_LocalHardwareId: Some(PJRT_Device_LocalHardwareId),
        PJRT_Device_AddressableMemories: Some(PJRT_Device_AddressableMemories),
        PJRT_Device_DefaultMemory: Some(PJRT_Device_DefaultMemory),
        PJRT_Device_MemoryStats: Some(PJRT_Device_MemoryStats),
        PJRT_Memory_Id: Some(PJRT_Memory_Id),
        PJRT_Memory_Kind: Some(PJRT_Memory_Kind),
        PJRT_Memory_DebugString: Some(PJRT_Memory_DebugString),
        PJRT_Memory_ToString: Some(PJRT_Memory_ToString),
        PJRT_Memory_AddressableByDevices: Some(PJRT_Memory_AddressableByDevices),
        PJRT_Executable_Destroy: Some(PJRT_Executable_Destroy),
        PJRT_Executable_Name: Some(PJRT_Executable_Name),
        PJRT_Executable_NumReplicas: Some(PJRT_Executable_NumReplicas),
        PJRT_Executable_NumPartitions: Some(PJRT_Executable_NumPartitions),
        PJRT_Executable_NumOutputs: Some(PJRT_Executable_NumOutputs),
        PJRT_Executable_SizeOfGeneratedCodeInBytes: Some(PJRT_Executable_SizeOfGeneratedCodeInBytes),
        PJRT_Executable_GetCostAnalysis: Some(PJRT_Executable_GetCostAnalysis),
        PJRT_Executable_OutputMemoryKinds: Some(PJRT_Executable_OutputMemoryKinds),
        PJRT_Executable_OptimizedProgram: None,
        PJRT_Executable_Serialize: Some(PJRT_Executable_Serialize),
        PJRT_LoadedExecutable_Destroy: Some(PJRT_LoadedExecutable_Destroy),
        PJRT_LoadedExecutable_GetExecutable: Some(PJRT_LoadedExecutable_GetExecutable),
        PJRT_LoadedExecutable_AddressableDevices: Some(PJRT_LoadedExecutable_AddressableDevices),
        PJRT_LoadedExecutable_Delete: Some(PJRT_LoadedExecutable_Delete),
        PJRT_LoadedExecutable_IsDeleted: Some(PJRT_LoadedExecutable_IsDeleted),
        PJRT_LoadedExecutable_Execute: Some(PJRT_LoadedExecutable_Execute),
        PJRT_Executable_DeserializeAndLoad: Some(PJRT_Executable_DeserializeAndLoad),
        PJRT_LoadedExecutable_Fingerprint: None,
        PJRT_Buffer_Destroy: Some(PJRT_Buffer_Destroy),
        PJRT_Buffer_ElementType: Some(PJRT_Buffer_ElementType),
        PJRT_Buffer_Dimensions: Some(PJRT_Buffer_Dimensions),
        PJRT_Buffer_UnpaddedDimensions: Some(PJRT_Buffer_UnpaddedDimensions),
        PJRT_Buffer_DynamicDimensionIndices: Some(PJRT_Buffer_DynamicDimensionIndices),
        PJRT_Buffer_GetMemoryLayout: Some(PJRT_Buffer_GetMemoryLayout),
        PJRT_Buffer_OnDeviceSizeInBytes: Some(PJRT_Buffer_OnDeviceSizeInBytes),
        PJRT_Buffer_Device: Some(PJRT_Buffer_Device),
        PJRT_Buffer_Memory: Some(PJRT_Buffer_Memory),
        PJRT_Buffer_Delete: Some(PJRT_Buffer_Delete),
        PJRT_Buffer_IsDeleted: Some(PJRT_Buffer_IsDeleted),
        PJRT_Buffer_CopyToDevice: Some(PJRT_Buffer_CopyToDevice),
        PJRT_Buffer_ToHostBuffer: Some(PJRT_Buffer_ToHostBuffer),
        PJRT_Buffer_IsOnCpu: Some(PJRT_Buffer_IsOnCpu),
        PJRT_Buffer_ReadyEvent: Some(PJRT_Buffer_ReadyEvent),
        PJRT_Buffer_UnsafePointer: Some(PJRT_Buffer_UnsafePointer),
        PJRT_Buffer_IncreaseExternalReferenceCount: Some(PJRT_Buffer_IncreaseExternalReferenceCount),
        PJRT_Buffer_DecreaseExternalReferenceCount: Some(PJRT_Buffer_DecreaseExternalReferenceCount),
        PJRT_Buffer_OpaqueDeviceMemoryDataPointer: Some(PJRT_Buffer_OpaqueDeviceMemoryDataPointer),
        PJRT_CopyToDeviceStream_Destroy: Some(PJRT_CopyToDeviceStream_Destroy),
        PJRT_CopyToDeviceStream_AddChunk: Some(PJRT_CopyToDeviceStream_AddChunk),
        PJRT_CopyToDeviceStream_TotalBytes: Some(PJRT_CopyToDeviceStream_TotalBytes),
        PJRT_CopyToDeviceStream_GranuleSize: Some(PJRT_CopyToDeviceStream_GranuleSize),
        PJRT_CopyToDeviceStream_CurrentBytes: Some(PJRT_CopyToDeviceStream_CurrentBytes),
        PJRT_TopologyDescription_Create: Some(PJRT_TopologyDescription_Create),
        PJRT_TopologyDescription_Destroy: Some(PJRT_TopologyDescription_Destroy),
        PJRT_TopologyDescription_PlatformName: Some(PJRT_TopologyDescription_PlatformName),
        PJRT_TopologyDescription_PlatformVersion: Some(PJRT_TopologyDescription_PlatformVersion),
        PJRT_TopologyDescription_GetDeviceDescriptions: Some(PJRT_TopologyDescription_GetDeviceDescriptions),
        PJRT_TopologyDescription_Serialize: Some(PJRT_TopologyDescription_Serialize),
        PJRT_TopologyDescription_Attributes: Some(PJRT_TopologyDescription_Attributes),
        PJRT_Compile: Some(PJRT_Compile),
        PJRT_Executable_OutputElementTypes: Some(PJRT_Executable_OutputElementTypes),
        PJRT_Executable_OutputDimensions: Some(PJRT_Executable_OutputDimensions),
        PJRT_Buffer_CopyToMemory: Some(PJRT_Buffer_CopyToMemory),
        PJRT_Client_CreateViewOfDeviceBuffer: Some(PJRT_Client_CreateViewOfDeviceBuffer),
        PJRT_Executable_Fingerprint: Some(PJRT_Executable_Fingerprint),
        PJRT_Client_TopologyDescription: Some(PJRT_Client_TopologyDescription),
    }
}
