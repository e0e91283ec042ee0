//! Protobuf messages that are exchanged with PJRT plugins as serialized payloads. Only the fields that this crate
//! needs are declared; unknown fields written by plugins are skipped when decoding.

use prost::Message;

/// Options for compiling a program into an executable.
///
/// This type corresponds to `CompileOptionsProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct CompilationOptions {
    /// If `true`, the computation expects a single tuple argument containing all parameters.
    #[prost(bool, tag = "2")]
    pub parameter_is_tupled_arguments: bool,

    #[prost(message, optional, tag = "3")]
    pub executable_build_options: Option<ExecutableCompilationOptions>,

    /// If `true`, the resulting executable is not specialized for specific devices and can be loaded on any
    /// compatible device. This is useful for ahead-of-time compilation against a [`Topology`](crate::Topology).
    #[prost(bool, tag = "4")]
    pub compile_portable_executable: bool,

    #[prost(int64, tag = "5")]
    pub profile_version: i64,

    /// If `true`, the compiler may modify the input MLIR module in place.
    #[prost(bool, tag = "9")]
    pub allow_in_place_mlir_modification: bool,
}

impl CompilationOptions {
    /// Returns options for a program with `replica_count` replicas and `partition_count` partitions and no fixed
    /// device assignment.
    pub fn new(replica_count: i64, partition_count: i64) -> Self {
        Self {
            executable_build_options: Some(ExecutableCompilationOptions {
                device_ordinal: -1,
                replica_count,
                partition_count,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Serializes these options into the payload expected by the compile functions of PJRT plugins.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

/// Options controlling how an executable is built.
///
/// This type corresponds to `ExecutableBuildOptionsProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct ExecutableCompilationOptions {
    /// Ordinal of the device to compile for, or `-1` to leave it unset.
    #[prost(int64, tag = "1")]
    pub device_ordinal: i64,

    #[prost(int64, tag = "4")]
    pub replica_count: i64,

    #[prost(int64, tag = "5")]
    pub partition_count: i64,

    #[prost(bool, tag = "6")]
    pub use_spmd_partitioning: bool,

    #[prost(bool, tag = "7")]
    pub use_auto_spmd_partitioning: bool,

    /// Static device assignment. If not set, the executable can run with any compatible device assignment.
    #[prost(message, optional, tag = "9")]
    pub device_assignment: Option<DeviceAssignmentProto>,
}

/// Device IDs of all replicas of a single computation.
///
/// This type corresponds to `DeviceAssignmentProto.ComputationDevice` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct ComputationDeviceAssignment {
    #[prost(int64, repeated, tag = "1")]
    pub replica_device_ids: Vec<i64>,
}

/// Serialized form of a [`DeviceAssignment`](crate::DeviceAssignment), organized by computation (i.e., partition).
///
/// This type corresponds to `DeviceAssignmentProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct DeviceAssignmentProto {
    #[prost(int32, tag = "1")]
    pub replica_count: i32,

    #[prost(int32, tag = "2")]
    pub computation_count: i32,

    #[prost(message, repeated, tag = "3")]
    pub computation_devices: Vec<ComputationDeviceAssignment>,
}
