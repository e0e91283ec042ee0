//! Compilation of programs into executables and the execution of those executables on the devices of a [`Client`].
//!
//! A [`Program`] is an opaque payload tagged with its format. [`Client::compile`] turns it into a [`LoadedExecutable`]
//! that is bound to the compiling client and can be launched with [`LoadedExecutable::execute`]. Programs may also be
//! compiled ahead of time against a [`Topology`](crate::Topology), which produces an unloaded [`Executable`] that can
//! only be inspected and serialized.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::CStr;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::transfers::BoundReceiveCallback;
use crate::{
    Api, Buffer, Client, CompilationOptions, CompletionFuture, Device, ElementType, Error, Event, ReceiveCallback,
    SendCallback, Value, hash_map_from_c_api, invoke_pjrt_api_error_fn, slice_from_c_api, str_from_c_api,
};

/// MLIR bytecode version that [`Client::compile_mlir`] requests from [`MlirModule::to_bytecode`]. Plugins are only
/// guaranteed to accept this version.
pub const MLIR_BYTECODE_VERSION: i64 = 1;

/// Program that can be compiled by a PJRT plugin. The payload is opaque to this crate and is handed to the plugin
/// together with the name of its format.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    /// Serialized XLA `HloModuleProto`.
    Hlo { proto: Vec<u8> },

    /// [MLIR](https://mlir.llvm.org/) module (typically in the StableHLO dialect) serialized as bytecode.
    Mlir { bytecode: Vec<u8> },
}

impl Program {
    /// Name of the format of this [`Program`], as understood by PJRT plugins.
    pub fn format(&self) -> &'static str {
        match self {
            Self::Hlo { .. } => "hlo",
            Self::Mlir { .. } => "mlir",
        }
    }

    pub fn code(&self) -> &[u8] {
        match self {
            Self::Hlo { proto } => proto,
            Self::Mlir { bytecode } => bytecode,
        }
    }

    fn c_format(&self) -> &'static CStr {
        match self {
            Self::Hlo { .. } => c"hlo",
            Self::Mlir { .. } => c"mlir",
        }
    }

    /// The returned struct borrows the code of this [`Program`] and must not outlive it.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_Program {
        let code = self.code();
        let format = self.c_format();
        ffi::PJRT_Program::new(code.as_ptr() as *mut _, code.len(), format.as_ptr(), format.count_bytes())
    }
}

/// In-memory MLIR module that can be compiled with [`Client::compile_mlir`]. Parsing and legalizing the module is up
/// to the implementation; this crate only needs its serialized bytecode.
pub trait MlirModule {
    /// Serializes this module as MLIR bytecode of the provided bytecode `version`.
    fn to_bytecode(&self, version: i64) -> Result<Vec<u8>, Error>;
}

/// Compiled [`Program`] that is not bound to a [`Client`]. [`Executable`]s are produced by ahead-of-time compilation
/// (see [`Topology::compile`](crate::Topology::compile)) and are also available for every [`LoadedExecutable`]
/// through [`LoadedExecutable::executable`].
pub struct Executable {
    handle: *mut ffi::PJRT_Executable,
    api: Api,

    /// Cached [`Executable::cost_analysis`] so that it will only be constructed once.
    cost_analysis: OnceLock<Result<HashMap<String, Value>, Error>>,
}

impl Executable {
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Executable, api: Api) -> Result<Self, Error> {
        if handle.is_null() {
            Err(Error::invalid_argument("the provided PJRT executable handle is a null pointer"))
        } else {
            Ok(Self { handle, api, cost_analysis: OnceLock::new() })
        }
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Executable {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        self.api
    }

    pub fn name(&self) -> Result<Cow<'_, str>, Error> {
        use ffi::PJRT_Executable_Name_Args;
        invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_Name,
            { executable = self.to_c_api() },
            { executable_name, executable_name_size },
        )
        .map(|(name, name_size)| str_from_c_api(name, name_size))
    }

    pub fn replica_count(&self) -> Result<usize, Error> {
        use ffi::PJRT_Executable_NumReplicas_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Executable_NumReplicas, { executable = self.to_c_api() }, {
            num_replicas
        })
    }

    pub fn partition_count(&self) -> Result<usize, Error> {
        use ffi::PJRT_Executable_NumPartitions_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Executable_NumPartitions, { executable = self.to_c_api() }, {
            num_partitions
        })
    }

    /// Number of outputs that each execution of this [`Executable`] produces per device.
    pub fn output_count(&self) -> Result<usize, Error> {
        use ffi::PJRT_Executable_NumOutputs_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Executable_NumOutputs, { executable = self.to_c_api() }, {
            num_outputs
        })
    }

    /// Returns the [`ElementType`] of each output. Plugins that do not track output types report them as a null
    /// array, which is surfaced as [`Error::Unimplemented`].
    pub fn output_element_types(&self) -> Result<Vec<ElementType>, Error> {
        use ffi::PJRT_Executable_OutputElementTypes_Args;
        let (output_types, output_type_count) = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_OutputElementTypes,
            { executable = self.to_c_api() },
            { output_types, num_output_types },
        )?;
        if output_types.is_null() {
            return Err(Error::unimplemented(
                "the PJRT plugin does not report the element types of executable outputs",
            ));
        }
        Ok(unsafe { slice_from_c_api(output_types, output_type_count) }
            .iter()
            .map(|output_type| unsafe { ElementType::from_c_api(*output_type) })
            .collect())
    }

    /// Returns the dimensions of each output. Like [`Executable::output_element_types`], a null answer from the plugin
    /// is surfaced as [`Error::Unimplemented`].
    pub fn output_dimensions(&self) -> Result<Vec<Vec<u64>>, Error> {
        use ffi::PJRT_Executable_OutputDimensions_Args;
        let (output_count, dimensions, ranks) = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_OutputDimensions,
            { executable = self.to_c_api() },
            { num_outputs, dims, dim_sizes },
        )?;
        let unreported =
            || Error::unimplemented("the PJRT plugin does not report the dimensions of executable outputs");
        if ranks.is_null() && output_count > 0 {
            return Err(unreported());
        }
        let ranks = unsafe { slice_from_c_api(ranks, output_count) };
        let dimension_count = ranks.iter().sum::<usize>();
        if dimensions.is_null() && dimension_count > 0 {
            return Err(unreported());
        }
        let dimensions = unsafe { slice_from_c_api(dimensions, dimension_count) };
        let mut offset = 0;
        Ok(ranks
            .iter()
            .map(|rank| {
                let output_dimensions = dimensions[offset..offset + rank].iter().map(|size| *size as u64).collect();
                offset += rank;
                output_dimensions
            })
            .collect())
    }

    /// Returns the kind of the [`Memory`](crate::Memory) that each output is placed in (e.g., `"device"`).
    pub fn output_memory_kinds(&self) -> Result<Vec<Cow<'_, str>>, Error> {
        use ffi::PJRT_Executable_OutputMemoryKinds_Args;
        let (output_count, memory_kinds, memory_kind_sizes) = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_OutputMemoryKinds,
            { executable = self.to_c_api() },
            { num_outputs, memory_kinds, memory_kind_sizes },
        )?;
        let memory_kinds = unsafe { slice_from_c_api(memory_kinds, output_count) };
        let memory_kind_sizes = unsafe { slice_from_c_api(memory_kind_sizes, output_count) };
        Ok(memory_kinds.iter().zip(memory_kind_sizes).map(|(kind, size)| str_from_c_api(*kind, *size)).collect())
    }

    /// Size of the code generated for this [`Executable`]. Plugins report a non-positive size when it is not known
    /// (e.g., for ahead-of-time compiled executables), which is surfaced as [`Error::Unavailable`].
    pub fn generated_code_size_in_bytes(&self) -> Result<usize, Error> {
        use ffi::PJRT_Executable_SizeOfGeneratedCodeInBytes_Args;
        let size = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_SizeOfGeneratedCodeInBytes,
            { executable = self.to_c_api() },
            { size_in_bytes },
        )?;
        usize::try_from(size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| Error::unavailable("the size of the generated code of this executable is unknown"))
    }

    /// Returns a fingerprint that identifies this [`Executable`]. Executables compiled from identical inputs share
    /// fingerprints. Returns `Ok(None)` when the plugin does not compute fingerprints.
    pub fn fingerprint(&self) -> Result<Option<String>, Error> {
        use ffi::PJRT_Executable_Fingerprint_Args;
        match invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_Fingerprint,
            { executable = self.to_c_api() },
            { executable_fingerprint, executable_fingerprint_size },
        ) {
            Ok((fingerprint, fingerprint_size)) => {
                let fingerprint = str_from_c_api(fingerprint, fingerprint_size);
                Ok(if fingerprint.is_empty() { None } else { Some(fingerprint.into_owned()) })
            }
            Err(error) if error.is_unimplemented() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Returns the properties that the plugin's cost analysis computes for this [`Executable`] (e.g., `"flops"`). The
    /// set of properties is platform-specific.
    pub fn cost_analysis(&self) -> Result<&HashMap<String, Value>, Error> {
        self.cost_analysis
            .get_or_init(|| {
                use ffi::PJRT_Executable_GetCostAnalysis_Args;
                let (properties, property_count) = invoke_pjrt_api_error_fn!(
                    self.api(),
                    PJRT_Executable_GetCostAnalysis,
                    { executable = self.to_c_api() },
                    { properties, num_properties },
                )?;
                Ok(hash_map_from_c_api(properties, property_count))
            })
            .as_ref()
            .map_err(|error| error.clone())
    }

    /// Serializes this [`Executable`] so that it can later be reloaded with [`Client::deserialize_executable`] by a
    /// client of the same platform and plugin version.
    pub fn serialize(&self) -> Result<SerializedExecutable, Error> {
        use ffi::PJRT_Executable_Serialize_Args;
        invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_Serialize,
            { executable = self.to_c_api() },
            { serialized_bytes, serialized_bytes_size, serialized_executable, serialized_executable_deleter },
        )
        .map(|(data, data_size, handle, deleter)| SerializedExecutable { handle, deleter, data, data_size })
    }
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Ok(name) => write!(formatter, "Executable[{name}]"),
            Err(_) => write!(formatter, "Executable[?]"),
        }
    }
}

unsafe impl Send for Executable {}
unsafe impl Sync for Executable {}

impl Drop for Executable {
    fn drop(&mut self) {
        use ffi::PJRT_Executable_Destroy_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Executable_Destroy, { executable = self.to_c_api() })
            .expect("failed to destroy PJRT executable");
    }
}

/// Bytes produced by [`Executable::serialize`]. The bytes are owned by the plugin and released when this value is
/// dropped. The format is platform-specific and not stable across plugin versions.
pub struct SerializedExecutable {
    handle: *mut ffi::PJRT_SerializedExecutable,
    deleter: Option<unsafe extern "C" fn(executable: *mut ffi::PJRT_SerializedExecutable)>,
    data: *const std::ffi::c_char,
    data_size: usize,
}

impl SerializedExecutable {
    pub fn data(&self) -> &[u8] {
        unsafe { slice_from_c_api(self.data as *const u8, self.data_size) }
    }
}

impl PartialEq for SerializedExecutable {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for SerializedExecutable {}

impl Hash for SerializedExecutable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data().hash(state);
    }
}

impl std::fmt::Debug for SerializedExecutable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "SerializedExecutable[{} bytes]", self.data_size)
    }
}

unsafe impl Send for SerializedExecutable {}
unsafe impl Sync for SerializedExecutable {}

impl Drop for SerializedExecutable {
    fn drop(&mut self) {
        if let Some(deleter) = self.deleter {
            unsafe { deleter(self.handle) };
        }
    }
}

/// Options for a single invocation of [`LoadedExecutable::execute`].
#[derive(Default)]
pub struct ExecuteOptions {
    /// Identifier of this launch within a multi-device or multi-host launch. Plugins may use it to detect launches
    /// that were issued in different orders on different hosts.
    pub launch_id: i32,

    /// [`SendCallback`]s for each device that the program is launched on. This must either be empty or contain one
    /// list per device, and all lists must have the same length.
    pub send_callbacks: Vec<Vec<SendCallback>>,

    /// [`ReceiveCallback`]s for each device, with the same shape requirements as [`ExecuteOptions::send_callbacks`].
    pub receive_callbacks: Vec<Vec<ReceiveCallback>>,

    /// Whether host callbacks observe data in major-to-minor layout. PJRT plugins only support that layout, and so
    /// this must be set whenever callbacks are provided.
    pub use_major_to_minor_data_layout_for_callbacks: bool,

    /// Indices of arguments that must not be donated to the program (i.e., whose buffers must stay valid).
    pub non_donatable_input_indices: Vec<i64>,

    /// Whether to return a [`CompletionFuture`] per device that resolves when the execution on that device finishes.
    pub track_completion: bool,
}

impl ExecuteOptions {
    fn uses_host_callbacks(&self) -> bool {
        !self.send_callbacks.is_empty() || !self.receive_callbacks.is_empty()
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ExecuteOptions")
            .field("launch_id", &self.launch_id)
            .field("send_callbacks", &self.send_callbacks)
            .field("receive_callbacks", &self.receive_callbacks)
            .field("use_major_to_minor_data_layout_for_callbacks", &self.use_major_to_minor_data_layout_for_callbacks)
            .field("non_donatable_input_indices", &self.non_donatable_input_indices)
            .field("track_completion", &self.track_completion)
            .finish()
    }
}

/// Outputs of [`LoadedExecutable::execute`], indexed first by device and then by program output.
#[derive(Debug)]
pub struct ExecuteResult<'c> {
    pub outputs: Vec<Vec<Buffer<'c>>>,

    /// One [`CompletionFuture`] per device, present only if [`ExecuteOptions::track_completion`] was set.
    pub completions: Option<Vec<CompletionFuture>>,
}

/// Outputs of [`LoadedExecutable::execute_sharded`] and [`LoadedExecutable::execute_portable`].
#[derive(Debug)]
pub struct DeviceExecuteResult<'c> {
    pub outputs: Vec<Buffer<'c>>,
    pub completion: Option<CompletionFuture>,
}

/// Host callbacks of one execution. The plugin holds raw pointers into this struct, and so it is shared with the
/// completion continuation of every device and released only after all of them have run.
struct CallbackContexts {
    send: Vec<Vec<SendCallback>>,
    receive: Vec<Vec<BoundReceiveCallback>>,
}

/// Compiled [`Program`] that is loaded onto the devices of the [`Client`] that compiled it and ready to be executed.
pub struct LoadedExecutable<'c> {
    handle: *mut ffi::PJRT_LoadedExecutable,
    client: &'c Client,
    executable: Executable,
    addressable_devices: Vec<Device<'c>>,
}

impl<'c> LoadedExecutable<'c> {
    /// Wraps a loaded executable handle that `client` produced. The unloaded [`Executable`] and the addressable
    /// devices are fetched right away; if that fails, the handle is destroyed before the error is returned.
    pub(crate) unsafe fn from_c_api(
        handle: *mut ffi::PJRT_LoadedExecutable,
        client: &'c Client,
    ) -> Result<Self, Error> {
        use ffi::{
            PJRT_LoadedExecutable_AddressableDevices_Args, PJRT_LoadedExecutable_Destroy_Args,
            PJRT_LoadedExecutable_GetExecutable_Args,
        };

        if handle.is_null() {
            return Err(Error::invalid_argument("the provided PJRT loaded executable handle is a null pointer"));
        }

        let api = client.api();
        let initialize = || -> Result<(Executable, Vec<Device<'c>>), Error> {
            let executable = invoke_pjrt_api_error_fn!(
                api,
                PJRT_LoadedExecutable_GetExecutable,
                { loaded_executable = handle },
                { executable },
            )?;
            let executable = unsafe { Executable::from_c_api(executable, api) }?;
            let (devices, device_count) = invoke_pjrt_api_error_fn!(
                api,
                PJRT_LoadedExecutable_AddressableDevices,
                { executable = handle },
                { addressable_devices, num_addressable_devices },
            )?;
            let addressable_devices = unsafe { slice_from_c_api(devices, device_count) }
                .iter()
                .map(|device| client.device_from_c_api(*device))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((executable, addressable_devices))
        };

        match initialize() {
            Ok((executable, addressable_devices)) => Ok(Self { handle, client, executable, addressable_devices }),
            Err(error) => {
                let destroyed = invoke_pjrt_api_error_fn!(api, PJRT_LoadedExecutable_Destroy, { executable = handle });
                if let Err(error) = destroyed {
                    tracing::warn!(%error, "failed to destroy partially initialized PJRT loaded executable");
                }
                Err(error)
            }
        }
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_LoadedExecutable {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        self.client.api()
    }

    /// [`Client`] that this [`LoadedExecutable`] is loaded on.
    pub fn client(&self) -> &'c Client {
        self.client
    }

    /// Unloaded [`Executable`] that describes this [`LoadedExecutable`].
    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    /// Addressable [`Device`]s that this [`LoadedExecutable`] runs on, in the order in which
    /// [`LoadedExecutable::execute`] expects per-device arguments.
    pub fn addressable_devices(&self) -> &[Device<'c>] {
        &self.addressable_devices
    }

    pub fn is_deleted(&self) -> Result<bool, Error> {
        use ffi::PJRT_LoadedExecutable_IsDeleted_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_LoadedExecutable_IsDeleted, { executable = self.to_c_api() }, {
            is_deleted
        })
    }

    /// Releases the device resources of this [`LoadedExecutable`] once all in-flight executions complete, without
    /// destroying the [`LoadedExecutable`] itself. Afterwards, only [`LoadedExecutable::is_deleted`] is meaningful.
    pub fn delete(&self) -> Result<(), Error> {
        use ffi::PJRT_LoadedExecutable_Delete_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_LoadedExecutable_Delete, { executable = self.to_c_api() })
    }

    /// Executes this [`LoadedExecutable`] on `arguments.len()` devices at once. `arguments[d][i]` is argument `i` of
    /// the program on device `d`; every device must receive the same number of arguments.
    ///
    /// Execution is asynchronous: the returned [`Buffer`]s may still be in the process of being computed when this
    /// function returns. Use [`Buffer::ready_future`] or the per-device completions (see
    /// [`ExecuteOptions::track_completion`]) to wait for them. Any host callbacks in `options` stay alive until the
    /// execution completes on every device.
    pub fn execute(&self, arguments: &[Vec<&Buffer<'c>>], options: ExecuteOptions) -> Result<ExecuteResult<'c>, Error> {
        let arguments = arguments.iter().map(|arguments| arguments.as_slice()).collect::<Vec<_>>();
        self.launch(&arguments, options, None)
    }

    /// Executes one shard of this [`LoadedExecutable`] on `device` only. The caller is responsible for launching the
    /// other shards on their devices. Host callbacks are not supported on this path.
    pub fn execute_sharded(
        &self,
        arguments: &[&Buffer<'c>],
        device: Device<'c>,
        options: ExecuteOptions,
    ) -> Result<DeviceExecuteResult<'c>, Error> {
        self.launch_on_device(arguments, device, options)
    }

    /// Executes a portable [`LoadedExecutable`] (i.e., one compiled with
    /// [`CompilationOptions::compile_portable_executable`]) on `device`. Host callbacks are not supported on this path.
    pub fn execute_portable(
        &self,
        arguments: &[&Buffer<'c>],
        device: Device<'c>,
        options: ExecuteOptions,
    ) -> Result<DeviceExecuteResult<'c>, Error> {
        self.launch_on_device(arguments, device, options)
    }

    fn launch_on_device(
        &self,
        arguments: &[&Buffer<'c>],
        device: Device<'c>,
        options: ExecuteOptions,
    ) -> Result<DeviceExecuteResult<'c>, Error> {
        if options.uses_host_callbacks() {
            return Err(Error::unimplemented(
                "send and receive callbacks are not supported when executing on a single device",
            ));
        }
        if !std::ptr::eq(device.client(), self.client) {
            return Err(Error::invalid_argument(format!(
                "cannot execute on {device}, which belongs to a different PJRT client than this executable",
            )));
        }
        let mut result = self.launch(&[arguments], options, Some(device))?;
        Ok(DeviceExecuteResult {
            outputs: result.outputs.pop().unwrap_or_default(),
            completion: result.completions.and_then(|mut completions| completions.pop()),
        })
    }

    fn launch(
        &self,
        arguments: &[&[&Buffer<'c>]],
        options: ExecuteOptions,
        device: Option<Device<'c>>,
    ) -> Result<ExecuteResult<'c>, Error> {
        use ffi::PJRT_LoadedExecutable_Execute_Args;

        let uses_host_callbacks = options.uses_host_callbacks();
        if uses_host_callbacks && !options.use_major_to_minor_data_layout_for_callbacks {
            return Err(Error::unimplemented(
                "PJRT plugins only support host callbacks with \
                    `ExecuteOptions::use_major_to_minor_data_layout_for_callbacks` set",
            ));
        }

        let device_count = arguments.len();
        let argument_count = arguments.first().map(|arguments| arguments.len()).ok_or_else(|| {
            Error::invalid_argument("executing a PJRT program requires arguments for at least one device")
        })?;
        if let Some(index) = arguments.iter().position(|arguments| arguments.len() != argument_count) {
            return Err(Error::invalid_argument(format!(
                "expected {argument_count} argument(s) for each device but got {} for device {index}",
                arguments[index].len(),
            )));
        }
        let send_op_count = callback_op_count(&options.send_callbacks, device_count, "send")?;
        let receive_op_count = callback_op_count(&options.receive_callbacks, device_count, "receive")?;

        let argument_handles = arguments
            .iter()
            .map(|arguments| arguments.iter().map(|buffer| unsafe { buffer.to_c_api() }).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let argument_lists = argument_handles.iter().map(|handles| handles.as_ptr()).collect::<Vec<_>>();

        let output_count = self.executable.output_count()?;
        let output_handle = std::ptr::null_mut::<crate::buffers::ffi::PJRT_Buffer>();
        let mut output_handles = vec![vec![output_handle; output_count]; device_count];
        let output_lists = output_handles.iter_mut().map(|handles| handles.as_mut_ptr()).collect::<Vec<_>>();

        let api = self.api();
        let contexts = Arc::new(CallbackContexts {
            send: options.send_callbacks,
            receive: options
                .receive_callbacks
                .into_iter()
                .map(|callbacks| callbacks.into_iter().map(|callback| callback.bind(api)).collect())
                .collect(),
        });
        let mut send_infos = contexts
            .send
            .iter()
            .map(|callbacks| callbacks.iter().map(|callback| unsafe { callback.to_c_api() }).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let mut send_lists = send_infos.iter_mut().map(|infos| infos.as_mut_ptr()).collect::<Vec<_>>();
        let mut receive_infos = contexts
            .receive
            .iter()
            .map(|callbacks| callbacks.iter().map(|callback| unsafe { callback.to_c_api() }).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let mut receive_lists = receive_infos.iter_mut().map(|infos| infos.as_mut_ptr()).collect::<Vec<_>>();

        let mut execute_options = ffi::PJRT_ExecuteOptions::new(
            if send_lists.is_empty() { std::ptr::null_mut() } else { send_lists.as_mut_ptr() },
            if receive_lists.is_empty() { std::ptr::null_mut() } else { receive_lists.as_mut_ptr() },
            send_op_count,
            receive_op_count,
            options.launch_id,
            options.non_donatable_input_indices.as_ptr(),
            options.non_donatable_input_indices.len(),
            std::ptr::null_mut(),
            std::ptr::null(),
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );

        let request_completions = options.track_completion || uses_host_callbacks;
        let mut completion_events = vec![std::ptr::null_mut::<crate::events::ffi::PJRT_Event>(); device_count];

        tracing::debug!(
            devices = device_count,
            arguments = argument_count,
            outputs = output_count,
            send_ops = send_op_count,
            receive_ops = receive_op_count,
            launch_id = options.launch_id,
            "executing PJRT loaded executable",
        );
        invoke_pjrt_api_error_fn!(
            api,
            PJRT_LoadedExecutable_Execute,
            {
                executable = self.to_c_api(),
                options = &mut execute_options as *mut _,
                argument_lists = argument_lists.as_ptr(),
                num_devices = device_count,
                num_args = argument_count,
                output_lists = output_lists.as_ptr(),
                device_complete_events = if request_completions {
                    completion_events.as_mut_ptr()
                } else {
                    std::ptr::null_mut()
                },
                execute_device = device.map(|device| device.to_c_api()).unwrap_or(std::ptr::null_mut()),
            },
        )?;

        // Completions are attached before any output is wrapped so that the callback contexts stay with the
        // events even when one of the handles below turns out to be null.
        let mut failure = None;
        let mut completions = Vec::with_capacity(if request_completions { device_count } else { 0 });
        for handle in completion_events.into_iter().filter(|_| request_completions) {
            match unsafe { Event::from_c_api(handle, api, ()) } {
                Ok(event) if uses_host_callbacks => completions.push(event.completion_with(contexts.clone())),
                Ok(event) => completions.push(event.completion()),
                Err(error) => {
                    if uses_host_callbacks && failure.is_none() {
                        // Nothing reports when that device stops calling into its callbacks.
                        tracing::warn!("PJRT execution returned no completion event; leaking its host callbacks");
                        std::mem::forget(contexts.clone());
                    }
                    failure.get_or_insert(error);
                }
            }
        }

        // Every non-null output is owned right away, so that the ones already produced are destroyed on failure.
        let mut outputs = Vec::with_capacity(device_count);
        for handles in output_handles {
            let mut buffers = Vec::with_capacity(output_count);
            for handle in handles {
                match unsafe { Buffer::from_c_api(handle, self.client) } {
                    Ok(buffer) => buffers.push(buffer),
                    Err(error) => {
                        failure.get_or_insert(error);
                    }
                }
            }
            outputs.push(buffers);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(ExecuteResult { outputs, completions: options.track_completion.then_some(completions) }),
        }
    }
}

/// Checks that `callbacks` is either empty or holds one equally long list per device, and returns the length of those
/// lists.
fn callback_op_count<C>(callbacks: &[Vec<C>], device_count: usize, kind: &str) -> Result<usize, Error> {
    if callbacks.is_empty() {
        return Ok(0);
    }
    if callbacks.len() != device_count {
        return Err(Error::invalid_argument(format!(
            "expected {kind} callbacks for {device_count} device(s) but got {} list(s)",
            callbacks.len(),
        )));
    }
    let op_count = callbacks[0].len();
    match callbacks.iter().position(|callbacks| callbacks.len() != op_count) {
        Some(index) => Err(Error::invalid_argument(format!(
            "expected {op_count} {kind} callback(s) for each device but got {} for device {index}",
            callbacks[index].len(),
        ))),
        None => Ok(op_count),
    }
}

impl std::fmt::Debug for LoadedExecutable<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Loaded{:?}", self.executable)
    }
}

unsafe impl Send for LoadedExecutable<'_> {}
unsafe impl Sync for LoadedExecutable<'_> {}

impl Drop for LoadedExecutable<'_> {
    fn drop(&mut self) {
        use ffi::PJRT_LoadedExecutable_Destroy_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_LoadedExecutable_Destroy, { executable = self.to_c_api() })
            .expect("failed to destroy PJRT loaded executable");
    }
}

impl Client {
    /// Compiles `program` for the devices of this [`Client`] (just-in-time compilation). For ahead-of-time compilation
    /// without a client, see [`Topology::compile`](crate::Topology::compile).
    pub fn compile(&self, program: &Program, options: &CompilationOptions) -> Result<LoadedExecutable<'_>, Error> {
        use ffi::PJRT_Client_Compile_Args;
        let c_program = unsafe { program.to_c_api() };
        let options = options.to_bytes();
        tracing::debug!(
            platform = self.platform_name(),
            format = program.format(),
            size = program.code().len(),
            "compiling PJRT program",
        );
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Client_Compile,
            {
                client = self.to_c_api(),
                program = &c_program as *const _,
                compile_options = options.as_ptr() as *const _,
                compile_options_size = options.len(),
            },
            { executable },
        )?;
        unsafe { LoadedExecutable::from_c_api(handle, self) }
    }

    /// Compiles a serialized XLA `HloModuleProto`.
    pub fn compile_hlo(&self, proto: &[u8], options: &CompilationOptions) -> Result<LoadedExecutable<'_>, Error> {
        self.compile(&Program::Hlo { proto: proto.to_vec() }, options)
    }

    /// Compiles an [`MlirModule`], serialized as bytecode of version [`MLIR_BYTECODE_VERSION`].
    pub fn compile_mlir<M: MlirModule + ?Sized>(
        &self,
        module: &M,
        options: &CompilationOptions,
    ) -> Result<LoadedExecutable<'_>, Error> {
        let bytecode = module.to_bytecode(MLIR_BYTECODE_VERSION)?;
        self.compile(&Program::Mlir { bytecode }, options)
    }

    /// Loads an executable that was produced by [`Executable::serialize`] on the same platform and plugin version.
    /// `options` optionally overrides the compilation options that were serialized along with the executable.
    pub fn deserialize_executable(
        &self,
        data: &[u8],
        options: Option<&CompilationOptions>,
    ) -> Result<LoadedExecutable<'_>, Error> {
        use ffi::PJRT_Executable_DeserializeAndLoad_Args;
        let options = options.map(|options| options.to_bytes());
        let (options, options_size) =
            options.as_ref().map_or((std::ptr::null(), 0), |options| (options.as_ptr() as *const _, options.len()));
        tracing::debug!(platform = self.platform_name(), size = data.len(), "deserializing PJRT executable");
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Executable_DeserializeAndLoad,
            {
                client = self.to_c_api(),
                serialized_executable = data.as_ptr() as *const _,
                serialized_executable_size = data.len(),
                overridden_serialized_compile_options = options,
                overridden_serialized_compile_options_size = options_size,
            },
            { loaded_executable },
        )?;
        unsafe { LoadedExecutable::from_c_api(handle, self) }
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::buffers::ffi::{PJRT_Buffer, PJRT_Buffer_Type};
    use crate::clients::ffi::PJRT_Client;
    use crate::devices::ffi::PJRT_Device;
    use crate::errors::ffi::PJRT_Error;
    use crate::events::ffi::PJRT_Event;
    use crate::ffi::PJRT_Extension_Base;
    use crate::topologies::ffi::PJRT_TopologyDescription;
    use crate::transfers::ffi::{PJRT_RecvCallbackInfo, PJRT_SendCallbackInfo};
    use crate::values::ffi::PJRT_NamedValue;

    #[repr(C)]
    pub struct PJRT_Program {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub code: *mut std::ffi::c_char,
        pub code_size: usize,
        pub format: *const std::ffi::c_char,
        pub format_size: usize,
    }

    impl PJRT_Program {
        pub fn new(
            code: *mut std::ffi::c_char,
            code_size: usize,
            format: *const std::ffi::c_char,
            format_size: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                code,
                code_size,
                format,
                format_size,
            }
        }
    }

    // We represent opaque C types as structs with a particular structure that is following the convention
    // suggested in [the Rustonomicon](https://doc.rust-lang.org/nomicon/ffi.html#representing-opaque-structs).
    #[repr(C)]
    pub struct PJRT_Executable {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Executable_Name_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub executable_name: *const std::ffi::c_char,
        pub executable_name_size: usize,
    }

    impl PJRT_Executable_Name_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                executable_name: std::ptr::null(),
                executable_name_size: 0,
            }
        }
    }

    pub type PJRT_Executable_Name = unsafe extern "C" fn(args: *mut PJRT_Executable_Name_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_NumReplicas_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_replicas: usize,
    }

    impl PJRT_Executable_NumReplicas_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable, num_replicas: 0 }
        }
    }

    pub type PJRT_Executable_NumReplicas =
        unsafe extern "C" fn(args: *mut PJRT_Executable_NumReplicas_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_NumPartitions_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_partitions: usize,
    }

    impl PJRT_Executable_NumPartitions_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                num_partitions: 0,
            }
        }
    }

    pub type PJRT_Executable_NumPartitions =
        unsafe extern "C" fn(args: *mut PJRT_Executable_NumPartitions_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_NumOutputs_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_outputs: usize,
    }

    impl PJRT_Executable_NumOutputs_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable, num_outputs: 0 }
        }
    }

    pub type PJRT_Executable_NumOutputs =
        unsafe extern "C" fn(args: *mut PJRT_Executable_NumOutputs_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_OutputElementTypes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub output_types: *mut PJRT_Buffer_Type,
        pub num_output_types: usize,
    }

    impl PJRT_Executable_OutputElementTypes_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                output_types: std::ptr::null_mut(),
                num_output_types: 0,
            }
        }
    }

    pub type PJRT_Executable_OutputElementTypes =
        unsafe extern "C" fn(args: *mut PJRT_Executable_OutputElementTypes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_OutputDimensions_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_outputs: usize,
        pub dims: *const i64,
        pub dim_sizes: *const usize,
    }

    impl PJRT_Executable_OutputDimensions_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                num_outputs: 0,
                dims: std::ptr::null(),
                dim_sizes: std::ptr::null(),
            }
        }
    }

    pub type PJRT_Executable_OutputDimensions =
        unsafe extern "C" fn(args: *mut PJRT_Executable_OutputDimensions_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_OutputMemoryKinds_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_outputs: usize,
        pub memory_kinds: *const *const std::ffi::c_char,
        pub memory_kind_sizes: *const usize,
    }

    impl PJRT_Executable_OutputMemoryKinds_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                num_outputs: 0,
                memory_kinds: std::ptr::null(),
                memory_kind_sizes: std::ptr::null(),
            }
        }
    }

    pub type PJRT_Executable_OutputMemoryKinds =
        unsafe extern "C" fn(args: *mut PJRT_Executable_OutputMemoryKinds_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_SizeOfGeneratedCodeInBytes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub size_in_bytes: i64,
    }

    impl PJRT_Executable_SizeOfGeneratedCodeInBytes_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable, size_in_bytes: 0 }
        }
    }

    pub type PJRT_Executable_SizeOfGeneratedCodeInBytes =
        unsafe extern "C" fn(args: *mut PJRT_Executable_SizeOfGeneratedCodeInBytes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_Fingerprint_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub executable_fingerprint: *const std::ffi::c_char,
        pub executable_fingerprint_size: usize,
    }

    impl PJRT_Executable_Fingerprint_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                executable_fingerprint: std::ptr::null_mut(),
                executable_fingerprint_size: 0,
            }
        }
    }

    pub type PJRT_Executable_Fingerprint =
        unsafe extern "C" fn(args: *mut PJRT_Executable_Fingerprint_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_GetCostAnalysis_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
        pub num_properties: usize,
        pub properties: *const PJRT_NamedValue,
    }

    impl PJRT_Executable_GetCostAnalysis_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                num_properties: 0,
                properties: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Executable_GetCostAnalysis =
        unsafe extern "C" fn(args: *mut PJRT_Executable_GetCostAnalysis_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_Executable,
    }

    impl PJRT_Executable_Destroy_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable }
        }
    }

    pub type PJRT_Executable_Destroy = unsafe extern "C" fn(args: *mut PJRT_Executable_Destroy_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_SerializedExecutable {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_Executable_Serialize_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *const PJRT_Executable,
        pub serialized_bytes: *const std::ffi::c_char,
        pub serialized_bytes_size: usize,
        pub serialized_executable: *mut PJRT_SerializedExecutable,
        pub serialized_executable_deleter: Option<unsafe extern "C" fn(exec: *mut PJRT_SerializedExecutable)>,
    }

    impl PJRT_Executable_Serialize_Args {
        pub fn new(executable: *mut PJRT_Executable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                serialized_bytes: std::ptr::null(),
                serialized_bytes_size: 0,
                serialized_executable: std::ptr::null_mut(),
                serialized_executable_deleter: None,
            }
        }
    }

    pub type PJRT_Executable_Serialize =
        unsafe extern "C" fn(args: *mut PJRT_Executable_Serialize_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_LoadedExecutable {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_GetExecutable_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub loaded_executable: *mut PJRT_LoadedExecutable,
        pub executable: *mut PJRT_Executable,
    }

    impl PJRT_LoadedExecutable_GetExecutable_Args {
        pub fn new(loaded_executable: *mut PJRT_LoadedExecutable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                loaded_executable,
                executable: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_LoadedExecutable_GetExecutable =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_GetExecutable_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_AddressableDevices_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_LoadedExecutable,
        pub addressable_devices: *const *mut PJRT_Device,
        pub num_addressable_devices: usize,
    }

    impl PJRT_LoadedExecutable_AddressableDevices_Args {
        pub fn new(executable: *mut PJRT_LoadedExecutable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                addressable_devices: std::ptr::null(),
                num_addressable_devices: 0,
            }
        }
    }

    pub type PJRT_LoadedExecutable_AddressableDevices =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_AddressableDevices_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_IsDeleted_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_LoadedExecutable,
        pub is_deleted: bool,
    }

    impl PJRT_LoadedExecutable_IsDeleted_Args {
        pub fn new(executable: *mut PJRT_LoadedExecutable) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                is_deleted: false,
            }
        }
    }

    pub type PJRT_LoadedExecutable_IsDeleted =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_IsDeleted_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_Delete_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_LoadedExecutable,
    }

    impl PJRT_LoadedExecutable_Delete_Args {
        pub fn new(executable: *mut PJRT_LoadedExecutable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable }
        }
    }

    pub type PJRT_LoadedExecutable_Delete =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_Delete_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_LoadedExecutable,
    }

    impl PJRT_LoadedExecutable_Destroy_Args {
        pub fn new(executable: *mut PJRT_LoadedExecutable) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), executable }
        }
    }

    pub type PJRT_LoadedExecutable_Destroy =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_Destroy_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Compile_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub topology: *const PJRT_TopologyDescription,
        pub program: *const PJRT_Program,
        pub compile_options: *const std::ffi::c_char,
        pub compile_options_size: usize,
        pub client: *mut PJRT_Client,
        pub executable: *mut PJRT_Executable,
    }

    impl PJRT_Compile_Args {
        pub fn new(
            topology: *const PJRT_TopologyDescription,
            program: *const PJRT_Program,
            compile_options: *const std::ffi::c_char,
            compile_options_size: usize,
            client: *mut PJRT_Client,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                topology,
                program,
                compile_options,
                compile_options_size,
                client,
                executable: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Compile = unsafe extern "C" fn(args: *mut PJRT_Compile_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_Compile_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub program: *const PJRT_Program,
        pub compile_options: *const std::ffi::c_char,
        pub compile_options_size: usize,
        pub executable: *mut PJRT_LoadedExecutable,
    }

    impl PJRT_Client_Compile_Args {
        pub fn new(
            client: *mut PJRT_Client,
            program: *const PJRT_Program,
            compile_options: *const std::ffi::c_char,
            compile_options_size: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                program,
                compile_options,
                compile_options_size,
                executable: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Client_Compile = unsafe extern "C" fn(args: *mut PJRT_Client_Compile_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Executable_DeserializeAndLoad_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub serialized_executable: *const std::ffi::c_char,
        pub serialized_executable_size: usize,
        pub loaded_executable: *mut PJRT_LoadedExecutable,
        pub overridden_serialized_compile_options: *const std::ffi::c_char,
        pub overridden_serialized_compile_options_size: usize,
    }

    impl PJRT_Executable_DeserializeAndLoad_Args {
        pub fn new(
            client: *mut PJRT_Client,
            serialized_executable: *const std::ffi::c_char,
            serialized_executable_size: usize,
            overridden_serialized_compile_options: *const std::ffi::c_char,
            overridden_serialized_compile_options_size: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                serialized_executable,
                serialized_executable_size,
                loaded_executable: std::ptr::null_mut(),
                overridden_serialized_compile_options,
                overridden_serialized_compile_options_size,
            }
        }
    }

    pub type PJRT_Executable_DeserializeAndLoad =
        unsafe extern "C" fn(args: *mut PJRT_Executable_DeserializeAndLoad_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_ExecuteOptions {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub send_callbacks: *mut *mut PJRT_SendCallbackInfo,
        pub recv_callbacks: *mut *mut PJRT_RecvCallbackInfo,
        pub num_send_ops: usize,
        pub num_recv_ops: usize,
        pub launch_id: std::ffi::c_int,
        pub non_donatable_input_indices: *const i64,
        pub num_non_donatable_input_indices: usize,
        pub context: *mut std::ffi::c_void,
        pub call_location: *const std::ffi::c_char,
        pub num_tasks: usize,
        pub task_ids: *mut std::ffi::c_int,
        pub incarnation_ids: *mut i64,
    }

    impl PJRT_ExecuteOptions {
        #[allow(clippy::too_many_arguments)]
        pub fn new(
            send_callbacks: *mut *mut PJRT_SendCallbackInfo,
            recv_callbacks: *mut *mut PJRT_RecvCallbackInfo,
            num_send_ops: usize,
            num_recv_ops: usize,
            launch_id: std::ffi::c_int,
            non_donatable_input_indices: *const i64,
            num_non_donatable_input_indices: usize,
            context: *mut std::ffi::c_void,
            call_location: *const std::ffi::c_char,
            num_tasks: usize,
            task_ids: *mut std::ffi::c_int,
            incarnation_ids: *mut i64,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                send_callbacks,
                recv_callbacks,
                num_send_ops,
                num_recv_ops,
                launch_id,
                non_donatable_input_indices,
                num_non_donatable_input_indices,
                context,
                call_location,
                num_tasks,
                task_ids,
                incarnation_ids,
            }
        }
    }

    #[repr(C)]
    pub struct PJRT_LoadedExecutable_Execute_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub executable: *mut PJRT_LoadedExecutable,
        pub options: *mut PJRT_ExecuteOptions,
        pub argument_lists: *const *const *mut PJRT_Buffer,
        pub num_devices: usize,
        pub num_args: usize,
        pub output_lists: *const *mut *mut PJRT_Buffer,
        pub device_complete_events: *mut *mut PJRT_Event,
        pub execute_device: *mut PJRT_Device,
    }

    impl PJRT_LoadedExecutable_Execute_Args {
        #[allow(clippy::too_many_arguments)]
        pub fn new(
            executable: *mut PJRT_LoadedExecutable,
            options: *mut PJRT_ExecuteOptions,
            argument_lists: *const *const *mut PJRT_Buffer,
            num_devices: usize,
            num_args: usize,
            output_lists: *const *mut *mut PJRT_Buffer,
            device_complete_events: *mut *mut PJRT_Event,
            execute_device: *mut PJRT_Device,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                executable,
                options,
                argument_lists,
                num_devices,
                num_args,
                output_lists,
                device_complete_events,
                execute_device,
            }
        }
    }

    pub type PJRT_LoadedExecutable_Execute =
        unsafe extern "C" fn(args: *mut PJRT_LoadedExecutable_Execute_Args) -> *mut PJRT_Error;
}
