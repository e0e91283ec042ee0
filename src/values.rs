use std::fmt::Display;

use crate::{slice_from_c_api, str_from_c_api};

/// Value of an option or attribute that crosses the PJRT plugin boundary. Plugin, client, and topology attributes
/// may use any of these kinds, while device attributes are restricted to strings, integers, and integer lists
/// (see [`DeviceAttribute`](crate::DeviceAttribute)).
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum Value {
    Bool(bool),
    I64(i64),
    I64List(Vec<i64>),
    F32(f32),
    String(String),
}

impl Value {
    pub fn r#bool<V: Into<bool>>(value: V) -> Self {
        Self::Bool(value.into())
    }

    pub fn i64<V: Into<i64>>(value: V) -> Self {
        Self::I64(value.into())
    }

    pub fn i64_list<V: Into<Vec<i64>>>(value: V) -> Self {
        Self::I64List(value.into())
    }

    pub fn f32<V: Into<f32>>(value: V) -> Self {
        Self::F32(value.into())
    }

    pub fn string<V: Into<String>>(value: V) -> Self {
        Self::String(value.into())
    }

    /// Returns the contained string, if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the contained integer, if this is a [`Value::I64`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the contained integer list, if this is a [`Value::I64List`].
    pub fn as_i64_list(&self) -> Option<&[i64]> {
        match self {
            Self::I64List(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Returns the [`PJRT_NamedValue_Type`](ffi::PJRT_NamedValue_Type) tag of this value.
    fn value_type(&self) -> ffi::PJRT_NamedValue_Type {
        match self {
            Self::Bool(_) => ffi::PJRT_NamedValue_Type_kBool,
            Self::I64(_) => ffi::PJRT_NamedValue_Type_kInt64,
            Self::I64List(_) => ffi::PJRT_NamedValue_Type_kInt64List,
            Self::F32(_) => ffi::PJRT_NamedValue_Type_kFloat,
            Self::String(_) => ffi::PJRT_NamedValue_Type_kString,
        }
    }
}

impl Display for Value {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::I64(value) => write!(formatter, "{value}"),
            Self::I64List(value) => write!(formatter, "{value:?}"),
            Self::F32(value) => write!(formatter, "{value}"),
            Self::String(value) => write!(formatter, "\"{value}\""),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Self::I64List(value)
    }
}

impl<const N: usize> From<[i64; N]> for Value {
    fn from(value: [i64; N]) -> Self {
        Self::I64List(value.into())
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

/// [`Value`] paired with the name under which it is passed to (or received from) a PJRT plugin.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedValue {
    pub name: String,
    pub value: Value,
}

impl NamedValue {
    pub fn new<S: AsRef<str>, V: Into<Value>>(name: S, value: V) -> Self {
        Self { name: name.as_ref().to_string(), value: value.into() }
    }

    /// Reads a [`NamedValue`] that a PJRT plugin returned.
    ///
    /// # Panics
    ///
    /// Panics if the plugin reports a value type that is not part of the PJRT ABI.
    pub(crate) unsafe fn from_c_api(handle: &ffi::PJRT_NamedValue) -> Self {
        let name = str_from_c_api(handle.name, handle.name_size).into_owned();
        let value = unsafe {
            match handle.value_type {
                ffi::PJRT_NamedValue_Type_kBool => Value::Bool(handle.value.bool_value),
                ffi::PJRT_NamedValue_Type_kInt64 => Value::I64(handle.value.int64_value),
                ffi::PJRT_NamedValue_Type_kInt64List => {
                    Value::I64List(slice_from_c_api(handle.value.int64_array_value, handle.value_size).to_vec())
                }
                ffi::PJRT_NamedValue_Type_kFloat => Value::F32(handle.value.float_value),
                ffi::PJRT_NamedValue_Type_kString => {
                    Value::String(str_from_c_api(handle.value.string_value, handle.value_size).into_owned())
                }
                value_type => panic!("unsupported PJRT named value type: {value_type}"),
            }
        };
        Self { name, value }
    }

    /// Borrows this [`NamedValue`] as a [`PJRT_NamedValue`](ffi::PJRT_NamedValue).
    ///
    /// # Safety
    ///
    /// The result points into `self` and must not outlive it.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_NamedValue {
        let (value, value_size) = match &self.value {
            Value::Bool(value) => (ffi::PJRT_Value { bool_value: *value }, 1),
            Value::I64(value) => (ffi::PJRT_Value { int64_value: *value }, 1),
            Value::I64List(value) => (ffi::PJRT_Value { int64_array_value: value.as_ptr() }, value.len()),
            Value::F32(value) => (ffi::PJRT_Value { float_value: *value }, 1),
            Value::String(value) => (ffi::PJRT_Value { string_value: value.as_ptr() as *const _ }, value.len()),
        };
        ffi::PJRT_NamedValue::new(
            self.name.as_ptr() as *const _,
            self.name.len(),
            self.value.value_type(),
            value,
            value_size,
        )
    }
}

impl Display for NamedValue {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}: {}", self.name, self.value)
    }
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use crate::ffi::PJRT_Extension_Base;

    pub type PJRT_NamedValue_Type = std::ffi::c_uint;
    pub const PJRT_NamedValue_Type_kString: PJRT_NamedValue_Type = 0;
    pub const PJRT_NamedValue_Type_kInt64: PJRT_NamedValue_Type = 1;
    pub const PJRT_NamedValue_Type_kInt64List: PJRT_NamedValue_Type = 2;
    pub const PJRT_NamedValue_Type_kFloat: PJRT_NamedValue_Type = 3;
    pub const PJRT_NamedValue_Type_kBool: PJRT_NamedValue_Type = 4;

    #[repr(C)]
    #[derive(Copy, Clone)]
    pub union PJRT_Value {
        pub string_value: *const std::ffi::c_char,
        pub int64_value: i64,
        pub int64_array_value: *const i64,
        pub float_value: f32,
        pub bool_value: bool,
    }

    #[repr(C)]
    pub struct PJRT_NamedValue {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub name: *const std::ffi::c_char,
        pub name_size: usize,
        pub value_type: PJRT_NamedValue_Type,
        pub value: PJRT_Value,
        pub value_size: usize,
    }

    impl PJRT_NamedValue {
        pub fn new(
            name: *const std::ffi::c_char,
            name_size: usize,
            value_type: PJRT_NamedValue_Type,
            value: PJRT_Value,
            value_size: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                name,
                name_size,
                value_type,
                value,
                value_size,
            }
        }
    }
}
