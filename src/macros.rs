//! Call helpers for the PJRT function table.
//!
//! Every helper takes an [`Api`](crate::Api) (or any value with an `api()` method), the name of a `PJRT_Api` slot,
//! the inputs of the matching `<name>_Args` constructor in declaration order, and the `_Args` fields to read back
//! once the call returns. The `_Args` type must be in scope at the call site. Slots that the plugin's function table
//! does not reach, and slots that it leaves empty, are reported as [`Error::Unimplemented`](crate::Error) without
//! calling into the plugin.

/// Calls `$fn` and returns its requested outputs along with the raw `PJRT_Error` pointer that it returned.
macro_rules! invoke_pjrt_api_raw_fn {
    (
        $api:expr,
        $fn:ident,
        { $($input_name:ident = $input_value:expr),* $(,)? },
        { $($output_name:ident),* $(,)? } $(,)?
    ) => {
        paste::paste! {
            match $api.api().function(
                stringify!($fn),
                std::mem::offset_of!($crate::ffi::PJRT_Api, $fn),
                |table| unsafe { (*table).$fn },
            ) {
                Ok(function) => {
                    tracing::trace!(function = stringify!($fn), "invoking PJRT function");
                    let mut args = unsafe { [<$fn _Args>]::new($($input_value),*) };
                    let error = unsafe { function(&mut args as *mut _) };
                    Ok((($(args.$output_name),*), error))
                }
                Err(error) => Err(error),
            }
        }
    };
}

/// Calls a `void` PJRT function. The result is only an [`Err`] when the plugin does not provide `$fn`.
macro_rules! invoke_pjrt_api_void_fn {
    ($api:expr, $fn:ident $(,)?) => {
        $crate::invoke_pjrt_api_void_fn!($api, $fn, {}, {})
    };
    ($api:expr, $fn:ident, { $($input_name:ident = $input_value:expr),* $(,)? } $(,)?) => {
        $crate::invoke_pjrt_api_void_fn!($api, $fn, { $($input_name = $input_value),* }, {})
    };
    (
        $api:expr,
        $fn:ident,
        { $($input_name:ident = $input_value:expr),* $(,)? },
        { $($output_name:ident),* $(,)? } $(,)?
    ) => {
        $crate::invoke_pjrt_api_raw_fn!($api, $fn, { $($input_name = $input_value),* }, { $($output_name),* })
            .map(|(outputs, _)| outputs)
    };
}

/// Calls a PJRT function that returns a `PJRT_Error*`. A returned error is destroyed and surfaced as
/// [`Err`](crate::Error).
macro_rules! invoke_pjrt_api_error_fn {
    ($api:expr, $fn:ident $(,)?) => {
        $crate::invoke_pjrt_api_error_fn!($api, $fn, {}, {})
    };
    ($api:expr, $fn:ident, { $($input_name:ident = $input_value:expr),* $(,)? } $(,)?) => {
        $crate::invoke_pjrt_api_error_fn!($api, $fn, { $($input_name = $input_value),* }, {})
    };
    (
        $api:expr,
        $fn:ident,
        { $($input_name:ident = $input_value:expr),* $(,)? },
        { $($output_name:ident),* $(,)? } $(,)?
    ) => {{
        let api = $api.api();
        $crate::invoke_pjrt_api_raw_fn!(api, $fn, { $($input_name = $input_value),* }, { $($output_name),* })
            .and_then(|(outputs, error)| match unsafe { $crate::Error::from_c_api(error, api) } {
                Ok(None) => Ok(outputs),
                Ok(Some(error)) | Err(error) => Err(error),
            })
    }};
}

pub(crate) use {invoke_pjrt_api_error_fn, invoke_pjrt_api_raw_fn, invoke_pjrt_api_void_fn};
