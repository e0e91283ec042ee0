use std::fmt::{Debug, Display};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::{
    Api, Client, CompletionFuture, Device, Error, Event, MIN_COPY_TO_MEMORY_MINOR_VERSION,
    MIN_CREATE_VIEW_OF_DEVICE_BUFFER_MINOR_VERSION, Memory, invoke_pjrt_api_error_fn, slice_from_c_api,
};

/// Type of the individual values stored in a [`Buffer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    /// Placeholder reported by plugins for unknown or missing element types.
    Invalid,

    /// Token values that are threaded between side-effecting operations.
    Token,

    /// Boolean values.
    Predicate,

    I2,
    I4,
    I8,
    I16,
    I32,
    I64,
    U2,
    U4,
    U8,
    U16,
    U32,
    U64,

    /// 4-bit microscaling floating-point values with 2 exponent bits and 1 mantissa bit (finite values only).
    F4E2M1FN,

    F8E3M4,
    F8E4M3,

    /// 8-bit floating-point values with 4 exponent bits and 3 mantissa bits, without infinities.
    F8E4M3FN,

    /// Like [`ElementType::F8E4M3FN`], but with unsigned zeros and an exponent bias of `8`.
    F8E4M3FNUZ,

    /// Like [`ElementType::F8E4M3FNUZ`], but with an exponent bias of `11`.
    F8E4M3B11FNUZ,

    F8E5M2,

    /// 8-bit floating-point values with 5 exponent bits and 2 mantissa bits, unsigned zeros and no infinities.
    F8E5M2FNUZ,

    /// 8-bit microscaling scale values with 8 exponent bits and no sign or mantissa bits.
    F8E8M0FNU,

    /// 16-bit "brain" floating-point values with 8 exponent bits and 7 mantissa bits.
    BF16,

    F16,
    F32,
    F64,

    /// Complex values made of two [`ElementType::F32`] components.
    C64,

    /// Complex values made of two [`ElementType::F64`] components.
    C128,
}

impl ElementType {
    pub(crate) unsafe fn from_c_api(r#type: ffi::PJRT_Buffer_Type) -> Self {
        match r#type {
            ffi::PJRT_Buffer_Type_TOKEN => Self::Token,
            ffi::PJRT_Buffer_Type_PRED => Self::Predicate,
            ffi::PJRT_Buffer_Type_S2 => Self::I2,
            ffi::PJRT_Buffer_Type_S4 => Self::I4,
            ffi::PJRT_Buffer_Type_S8 => Self::I8,
            ffi::PJRT_Buffer_Type_S16 => Self::I16,
            ffi::PJRT_Buffer_Type_S32 => Self::I32,
            ffi::PJRT_Buffer_Type_S64 => Self::I64,
            ffi::PJRT_Buffer_Type_U2 => Self::U2,
            ffi::PJRT_Buffer_Type_U4 => Self::U4,
            ffi::PJRT_Buffer_Type_U8 => Self::U8,
            ffi::PJRT_Buffer_Type_U16 => Self::U16,
            ffi::PJRT_Buffer_Type_U32 => Self::U32,
            ffi::PJRT_Buffer_Type_U64 => Self::U64,
            ffi::PJRT_Buffer_Type_F4E2M1FN => Self::F4E2M1FN,
            ffi::PJRT_Buffer_Type_F8E3M4 => Self::F8E3M4,
            ffi::PJRT_Buffer_Type_F8E4M3 => Self::F8E4M3,
            ffi::PJRT_Buffer_Type_F8E4M3FN => Self::F8E4M3FN,
            ffi::PJRT_Buffer_Type_F8E4M3FNUZ => Self::F8E4M3FNUZ,
            ffi::PJRT_Buffer_Type_F8E4M3B11FNUZ => Self::F8E4M3B11FNUZ,
            ffi::PJRT_Buffer_Type_F8E5M2 => Self::F8E5M2,
            ffi::PJRT_Buffer_Type_F8E5M2FNUZ => Self::F8E5M2FNUZ,
            ffi::PJRT_Buffer_Type_F8E8M0FNU => Self::F8E8M0FNU,
            ffi::PJRT_Buffer_Type_BF16 => Self::BF16,
            ffi::PJRT_Buffer_Type_F16 => Self::F16,
            ffi::PJRT_Buffer_Type_F32 => Self::F32,
            ffi::PJRT_Buffer_Type_F64 => Self::F64,
            ffi::PJRT_Buffer_Type_C64 => Self::C64,
            ffi::PJRT_Buffer_Type_C128 => Self::C128,
            _ => Self::Invalid,
        }
    }

    #[allow(clippy::wrong_self_convention)]
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_Buffer_Type {
        match self {
            Self::Invalid => ffi::PJRT_Buffer_Type_INVALID,
            Self::Token => ffi::PJRT_Buffer_Type_TOKEN,
            Self::Predicate => ffi::PJRT_Buffer_Type_PRED,
            Self::I2 => ffi::PJRT_Buffer_Type_S2,
            Self::I4 => ffi::PJRT_Buffer_Type_S4,
            Self::I8 => ffi::PJRT_Buffer_Type_S8,
            Self::I16 => ffi::PJRT_Buffer_Type_S16,
            Self::I32 => ffi::PJRT_Buffer_Type_S32,
            Self::I64 => ffi::PJRT_Buffer_Type_S64,
            Self::U2 => ffi::PJRT_Buffer_Type_U2,
            Self::U4 => ffi::PJRT_Buffer_Type_U4,
            Self::U8 => ffi::PJRT_Buffer_Type_U8,
            Self::U16 => ffi::PJRT_Buffer_Type_U16,
            Self::U32 => ffi::PJRT_Buffer_Type_U32,
            Self::U64 => ffi::PJRT_Buffer_Type_U64,
            Self::F4E2M1FN => ffi::PJRT_Buffer_Type_F4E2M1FN,
            Self::F8E3M4 => ffi::PJRT_Buffer_Type_F8E3M4,
            Self::F8E4M3 => ffi::PJRT_Buffer_Type_F8E4M3,
            Self::F8E4M3FN => ffi::PJRT_Buffer_Type_F8E4M3FN,
            Self::F8E4M3FNUZ => ffi::PJRT_Buffer_Type_F8E4M3FNUZ,
            Self::F8E4M3B11FNUZ => ffi::PJRT_Buffer_Type_F8E4M3B11FNUZ,
            Self::F8E5M2 => ffi::PJRT_Buffer_Type_F8E5M2,
            Self::F8E5M2FNUZ => ffi::PJRT_Buffer_Type_F8E5M2FNUZ,
            Self::F8E8M0FNU => ffi::PJRT_Buffer_Type_F8E8M0FNU,
            Self::BF16 => ffi::PJRT_Buffer_Type_BF16,
            Self::F16 => ffi::PJRT_Buffer_Type_F16,
            Self::F32 => ffi::PJRT_Buffer_Type_F32,
            Self::F64 => ffi::PJRT_Buffer_Type_F64,
            Self::C64 => ffi::PJRT_Buffer_Type_C64,
            Self::C128 => ffi::PJRT_Buffer_Type_C128,
        }
    }

    /// Number of bytes that a single value of this type occupies in a dense host array, or [`None`] for types that
    /// are not byte-addressable (i.e., sub-byte types, tokens and [`ElementType::Invalid`]).
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            Self::Invalid | Self::Token | Self::I2 | Self::I4 | Self::U2 | Self::U4 | Self::F4E2M1FN => None,
            Self::Predicate
            | Self::I8
            | Self::U8
            | Self::F8E3M4
            | Self::F8E4M3
            | Self::F8E4M3FN
            | Self::F8E4M3FNUZ
            | Self::F8E4M3B11FNUZ
            | Self::F8E5M2
            | Self::F8E5M2FNUZ
            | Self::F8E8M0FNU => Some(1),
            Self::I16 | Self::U16 | Self::BF16 | Self::F16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::C64 => Some(8),
            Self::C128 => Some(16),
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Invalid => "invalid",
            Self::Token => "token",
            Self::Predicate => "pred",
            Self::I2 => "s2",
            Self::I4 => "s4",
            Self::I8 => "s8",
            Self::I16 => "s16",
            Self::I32 => "s32",
            Self::I64 => "s64",
            Self::U2 => "u2",
            Self::U4 => "u4",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F4E2M1FN => "f4e2m1fn",
            Self::F8E3M4 => "f8e3m4",
            Self::F8E4M3 => "f8e4m3",
            Self::F8E4M3FN => "f8e4m3fn",
            Self::F8E4M3FNUZ => "f8e4m3fnuz",
            Self::F8E4M3B11FNUZ => "f8e4m3b11fnuz",
            Self::F8E5M2 => "f8e5m2",
            Self::F8E5M2FNUZ => "f8e5m2fnuz",
            Self::F8E8M0FNU => "f8e8m0fnu",
            Self::BF16 => "bf16",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::C64 => "c64",
            Self::C128 => "c128",
        })
    }
}

/// Dimension of a [`Tile`]. A tile dimension either has a fixed size or is _combined_ with the next minor dimension
/// before tiling is applied (rendered as `*`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TileDimension(i64);

impl TileDimension {
    pub fn sized(size: usize) -> Self {
        Self(size as i64)
    }

    pub fn combined() -> Self {
        Self(i64::MIN)
    }

    /// Returns [`None`] for combined dimensions.
    pub fn size(&self) -> Option<usize> {
        if self.is_combined() { None } else { Some(self.0 as usize) }
    }

    pub fn is_combined(&self) -> bool {
        self.0 == i64::MIN
    }
}

impl Display for TileDimension {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.size() {
            None => write!(formatter, "*"),
            Some(size) => write!(formatter, "{size}"),
        }
    }
}

impl Debug for TileDimension {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "TileDimension[{self}]")
    }
}

/// Tile of a [`TiledLayout`], with dimensions ordered from most major to most minor. Refer to the
/// [XLA documentation](https://openxla.org/xla/tiled_layout) for the semantics of tiling.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile {
    pub dimensions: Vec<TileDimension>,
}

impl Display for Tile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "({})", join(&self.dimensions))
    }
}

impl Debug for Tile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Tile[{self}]")
    }
}

/// Tiling-based memory layout. This is the only kind of layout that plugins report for device buffers.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TiledLayout {
    minor_to_major: Vec<i64>,

    /// Dimensions of all tiles, flattened in tile order.
    tile_dimensions: Vec<TileDimension>,

    /// Number of entries of `tile_dimensions` that belong to each tile.
    tile_dimension_sizes: Vec<usize>,
}

impl TiledLayout {
    pub(crate) unsafe fn from_c_api(layout: ffi::PJRT_Buffer_MemoryLayout_Tiled) -> Self {
        let minor_to_major = unsafe { slice_from_c_api(layout.minor_to_major, layout.minor_to_major_size) }.to_vec();
        let tile_dimension_sizes = unsafe { slice_from_c_api(layout.tile_dim_sizes, layout.num_tiles) }.to_vec();
        let tile_dimension_count = tile_dimension_sizes.iter().sum();
        let tile_dimensions = unsafe { slice_from_c_api(layout.tile_dims, tile_dimension_count) }
            .iter()
            .map(|dimension| TileDimension(*dimension))
            .collect();
        Self { minor_to_major, tile_dimensions, tile_dimension_sizes }
    }

    /// The returned struct borrows the vectors of this [`TiledLayout`] and must not outlive it.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_Buffer_MemoryLayout_Tiled {
        ffi::PJRT_Buffer_MemoryLayout_Tiled::new(
            self.minor_to_major.as_ptr(),
            self.minor_to_major.len(),
            self.tile_dimensions.as_ptr() as *const i64,
            self.tile_dimension_sizes.as_ptr(),
            self.tile_dimension_sizes.len(),
        )
    }

    pub fn new(minor_to_major: Vec<i64>, tiles: Vec<Tile>) -> Self {
        Self {
            minor_to_major,
            tile_dimensions: tiles.iter().flat_map(|tile| tile.dimensions.iter().copied()).collect(),
            tile_dimension_sizes: tiles.iter().map(|tile| tile.dimensions.len()).collect(),
        }
    }

    /// Dense, untiled layout of a `rank`-dimensional array whose last dimension varies fastest. This is the layout of
    /// host arrays in row-major (C) order.
    pub fn major_to_minor(rank: usize) -> Self {
        Self::new((0..rank as i64).rev().collect(), Vec::new())
    }

    /// Logical dimension indices ordered from the fastest varying (most minor) to the slowest varying (most major).
    pub fn minor_to_major(&self) -> &[i64] {
        self.minor_to_major.as_slice()
    }

    /// Tiles of this layout, outermost tiling first.
    pub fn tiles(&self) -> Vec<Tile> {
        self.tile_dimension_sizes
            .iter()
            .scan(0, |offset, &size| {
                let start = *offset;
                *offset += size;
                Some(Tile { dimensions: self.tile_dimensions[start..*offset].to_vec() })
            })
            .collect()
    }
}

impl Display for TiledLayout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{{{}", join(&self.minor_to_major))?;
        let tiles = self.tiles();
        if !tiles.is_empty() {
            formatter.write_str(":T")?;
            tiles.iter().try_for_each(|tile| write!(formatter, "{tile}"))?;
        }
        formatter.write_str("}")
    }
}

impl Debug for TiledLayout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "TiledLayout[{self}]")
    }
}

/// Strided memory layout: the element at index `(i, j, k)` lives at byte offset
/// `i * strides[0] + j * strides[1] + k * strides[2]`. Strides may be negative.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StridedLayout {
    strides: Vec<i64>,
}

impl StridedLayout {
    pub(crate) unsafe fn from_c_api(layout: ffi::PJRT_Buffer_MemoryLayout_Strides) -> Self {
        Self { strides: unsafe { slice_from_c_api(layout.byte_strides, layout.num_byte_strides) }.to_vec() }
    }

    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_Buffer_MemoryLayout_Strides {
        ffi::PJRT_Buffer_MemoryLayout_Strides::new(self.strides.as_ptr(), self.strides.len())
    }

    pub fn new(strides: Vec<i64>) -> Self {
        Self { strides }
    }

    /// Byte strides of a dense row-major array with the provided `dimensions` and `element_type`. Returns
    /// [`Error::Unimplemented`] for element types that are not byte-addressable.
    pub fn dense(element_type: ElementType, dimensions: &[u64]) -> Result<Self, Error> {
        let element_size = element_type.byte_size().ok_or_else(|| {
            Error::unimplemented(format!("dense byte strides are not defined for '{element_type}' elements"))
        })?;
        let mut strides = vec![0; dimensions.len()];
        let mut stride = element_size as i64;
        for (index, dimension) in dimensions.iter().enumerate().rev() {
            strides[index] = stride;
            stride *= *dimension as i64;
        }
        Ok(Self { strides })
    }

    pub fn strides(&self) -> &[i64] {
        self.strides.as_slice()
    }
}

impl Display for StridedLayout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "strides({})", join(&self.strides))
    }
}

impl Debug for StridedLayout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "StridedLayout[{self}]")
    }
}

/// Mapping from the logical indices of an array to physical offsets in its storage.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layout {
    Tiled(TiledLayout),
    Strided(StridedLayout),
}

impl Layout {
    /// Reads a layout written by the plugin. Returns [`None`] for layout kinds that this crate does not know about.
    pub(crate) unsafe fn from_c_api(layout: &ffi::PJRT_Buffer_MemoryLayout) -> Option<Self> {
        unsafe {
            match layout.memory_layout_type {
                ffi::PJRT_Buffer_MemoryLayout_Type_Tiled => {
                    Some(Self::Tiled(TiledLayout::from_c_api(layout.memory_layout.tiled)))
                }
                ffi::PJRT_Buffer_MemoryLayout_Type_Strides => {
                    Some(Self::Strided(StridedLayout::from_c_api(layout.memory_layout.strides)))
                }
                _ => None,
            }
        }
    }

    /// The returned struct borrows this [`Layout`] and must not outlive it.
    pub(crate) unsafe fn to_c_api(&self) -> ffi::PJRT_Buffer_MemoryLayout {
        match self {
            Self::Tiled(layout) => ffi::PJRT_Buffer_MemoryLayout::new(
                ffi::PJRT_Buffer_MemoryLayout_Value { tiled: unsafe { layout.to_c_api() } },
                ffi::PJRT_Buffer_MemoryLayout_Type_Tiled,
            ),
            Self::Strided(layout) => ffi::PJRT_Buffer_MemoryLayout::new(
                ffi::PJRT_Buffer_MemoryLayout_Value { strides: unsafe { layout.to_c_api() } },
                ffi::PJRT_Buffer_MemoryLayout_Type_Strides,
            ),
        }
    }
}

impl Display for Layout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tiled(layout) => write!(formatter, "{layout}"),
            Self::Strided(layout) => write!(formatter, "{layout}"),
        }
    }
}

impl Debug for Layout {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Layout[{self}]")
    }
}

/// Shape of a dense array: its [`ElementType`], its dimensions and, optionally, its memory [`Layout`]. A missing
/// layout stands for the dense row-major layout (see [`TiledLayout::major_to_minor`]).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    pub element_type: ElementType,
    pub dimensions: Vec<u64>,
    pub layout: Option<Layout>,
}

impl ArrayShape {
    pub fn new<D: Into<Vec<u64>>>(element_type: ElementType, dimensions: D) -> Self {
        Self { element_type, dimensions: dimensions.into(), layout: None }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn element_count(&self) -> u64 {
        self.dimensions.iter().product()
    }

    /// Size of a dense array with this shape, or [`None`] when the element type is not byte-addressable.
    pub fn byte_size(&self) -> Option<usize> {
        self.element_type.byte_size().map(|size| size * self.element_count() as usize)
    }
}

impl Display for ArrayShape {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}[{}]", self.element_type, join(&self.dimensions))?;
        if let Some(layout) = &self.layout {
            write!(formatter, "{layout}")?;
        }
        Ok(())
    }
}

impl Debug for ArrayShape {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "ArrayShape[{self}]")
    }
}

/// Shape of a value produced or consumed by a program.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Array(ArrayShape),
    Tuple(Vec<Shape>),
    Token,
}

impl Display for Shape {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array(shape) => write!(formatter, "{shape}"),
            Self::Tuple(shapes) => write!(formatter, "({})", join(shapes)),
            Self::Token => formatter.write_str("token[]"),
        }
    }
}

impl Debug for Shape {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Shape[{self}]")
    }
}

impl From<ArrayShape> for Shape {
    fn from(shape: ArrayShape) -> Self {
        Self::Array(shape)
    }
}

/// Host-resident array: an [`ArrayShape`] together with the bytes of the array, laid out according to that shape.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    shape: ArrayShape,
    data: Vec<u8>,
}

impl Literal {
    /// Returns [`Error::InvalidArgument`] if the size of `data` does not match `shape`.
    pub fn new(shape: ArrayShape, data: Vec<u8>) -> Result<Self, Error> {
        match shape.byte_size() {
            Some(size) if size != data.len() => Err(Error::invalid_argument(format!(
                "a literal of shape '{shape}' must contain {size} bytes, but {} bytes were provided",
                data.len(),
            ))),
            _ => Ok(Self { shape, data }),
        }
    }

    pub fn shape(&self) -> &ArrayShape {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Debug for Literal {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Literal[{}, {} bytes]", self.shape, self.data.len())
    }
}

/// Array that lives in a device [`Memory`] and is owned by the plugin.
///
/// [`Buffer`]s are asynchronous: they are returned as soon as the work that produces them (a host transfer, a copy or
/// a program execution) has been enqueued, and that work may still be running. [`Buffer::ready_future`] resolves once
/// the data is available (or the producing work failed). A buffer that is not ready yet can still be passed to other
/// operations, which then wait for it on the device.
///
/// Every [`Buffer`] borrows the [`Client`] that owns it. Dropping a [`Buffer`] destroys the backend buffer, which
/// frees the device memory once all pending work that uses it completes.
///
/// # Shapes
///
/// Plugins that support bounded dynamic shapes allocate every buffer for the upper bound of each dimension
/// ([`Buffer::dimensions`]) while the valid data may be smaller ([`Buffer::unpadded_dimensions`]). The dimensions
/// whose size is only known at runtime are reported by [`Buffer::dynamic_dimension_indices`] and
/// [`Buffer::is_dynamic_dimension`].
pub struct Buffer<'c> {
    handle: *mut ffi::PJRT_Buffer,
    client: &'c Client,

    /// Device layout and dynamic dimension flags. Both are fixed for the lifetime of the buffer and are only queried
    /// once.
    cache: Mutex<BufferCache>,

    /// Readiness future created by the first call to [`Buffer::ready_future`].
    ready: OnceLock<CompletionFuture>,
}

#[derive(Default)]
struct BufferCache {
    layout: Option<TiledLayout>,
    is_dynamic_dimension: Option<Vec<bool>>,
}

impl<'c> Buffer<'c> {
    pub(crate) unsafe fn from_c_api(handle: *mut ffi::PJRT_Buffer, client: &'c Client) -> Result<Self, Error> {
        if handle.is_null() {
            Err(Error::invalid_argument("the provided PJRT buffer handle is a null pointer"))
        } else {
            Ok(Self { handle, client, cache: Mutex::new(BufferCache::default()), ready: OnceLock::new() })
        }
    }

    pub(crate) unsafe fn to_c_api(&self) -> *mut ffi::PJRT_Buffer {
        self.handle
    }

    pub(crate) fn api(&self) -> Api {
        self.client.api()
    }

    /// [`Client`] that owns this [`Buffer`].
    pub fn client(&self) -> &'c Client {
        self.client
    }

    pub fn element_type(&self) -> Result<ElementType, Error> {
        use ffi::PJRT_Buffer_ElementType_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_ElementType, { buffer = self.to_c_api() }, { element_type })
            .map(|r#type| unsafe { ElementType::from_c_api(r#type) })
    }

    /// Dimension sizes of this [`Buffer`], including any padding of dynamic dimensions.
    pub fn dimensions(&self) -> Result<&[u64], Error> {
        use ffi::PJRT_Buffer_Dimensions_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_Dimensions, { buffer = self.to_c_api() }, { dims, num_dims })
            .map(|(dimensions, count)| unsafe { slice_from_c_api(dimensions as *const u64, count) })
    }

    /// Dimension sizes of the valid data in this [`Buffer`]. These only differ from [`Buffer::dimensions`] for
    /// dynamic dimensions that are padded up to their bound.
    pub fn unpadded_dimensions(&self) -> Result<&[u64], Error> {
        use ffi::PJRT_Buffer_UnpaddedDimensions_Args;
        invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_UnpaddedDimensions,
            { buffer = self.to_c_api() },
            { unpadded_dims, num_dims },
        )
        .map(|(dimensions, count)| unsafe { slice_from_c_api(dimensions as *const u64, count) })
    }

    /// Indices of the dimensions of this [`Buffer`] whose size is only known at runtime.
    pub fn dynamic_dimension_indices(&self) -> Result<&[usize], Error> {
        use ffi::PJRT_Buffer_DynamicDimensionIndices_Args;
        invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_DynamicDimensionIndices,
            { buffer = self.to_c_api() },
            { dynamic_dim_indices, num_dynamic_dims },
        )
        .map(|(indices, count)| unsafe { slice_from_c_api(indices, count) })
    }

    /// One flag per dimension that is `true` for dynamic dimensions. Plugins that do not support dynamic shapes
    /// (i.e., that report [`Error::Unimplemented`] for [`Buffer::dynamic_dimension_indices`]) produce all-`false`
    /// flags. The flags are computed on the first call and cached.
    pub fn is_dynamic_dimension(&self) -> Result<Vec<bool>, Error> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flags) = &cache.is_dynamic_dimension {
            return Ok(flags.clone());
        }
        let mut flags = vec![false; self.dimensions()?.len()];
        match self.dynamic_dimension_indices() {
            Ok(indices) => {
                for index in indices {
                    if let Some(flag) = flags.get_mut(*index) {
                        *flag = true;
                    }
                }
            }
            Err(error) if error.is_unimplemented() => {}
            Err(error) => return Err(error),
        }
        cache.is_dynamic_dimension = Some(flags.clone());
        Ok(flags)
    }

    /// Device [`TiledLayout`] of this [`Buffer`], fetched on the first call and cached.
    ///
    /// # Panics
    ///
    /// Panics if the plugin reports a layout that is not tiled, which plugins must never do for device buffers.
    pub fn layout(&self) -> Result<TiledLayout, Error> {
        use ffi::PJRT_Buffer_GetMemoryLayout_Args;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layout) = &cache.layout {
            return Ok(layout.clone());
        }
        let layout = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_GetMemoryLayout,
            { buffer = self.to_c_api() },
            { layout },
        )?;
        let layout = match unsafe { Layout::from_c_api(&layout) } {
            Some(Layout::Tiled(layout)) => layout,
            Some(layout) => panic!("the PJRT plugin reported a non-tiled device buffer layout: {layout}"),
            None => panic!("the PJRT plugin reported an unknown device buffer layout type"),
        };
        cache.layout = Some(layout.clone());
        Ok(layout)
    }

    /// Number of bytes that this [`Buffer`] occupies in its [`Memory`], including padding.
    pub fn on_device_size_in_bytes(&self) -> Result<usize, Error> {
        use ffi::PJRT_Buffer_OnDeviceSizeInBytes_Args;
        invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_OnDeviceSizeInBytes,
            { buffer = self.to_c_api() },
            { on_device_size_in_bytes },
        )
    }

    /// [`Device`] on which this [`Buffer`] is placed. The plugin is queried on every call.
    pub fn device(&self) -> Result<Device<'c>, Error> {
        use ffi::PJRT_Buffer_Device_Args;
        let handle =
            invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_Device, { buffer = self.to_c_api() }, { device })?;
        self.client.device_from_c_api(handle)
    }

    /// [`Memory`] in which this [`Buffer`] is allocated. The plugin is queried on every call.
    pub fn memory(&self) -> Result<Memory<'c>, Error> {
        use ffi::PJRT_Buffer_Memory_Args;
        let handle =
            invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_Memory, { buffer = self.to_c_api() }, { memory })?;
        self.client.memory_from_c_api(handle)
    }

    pub fn is_on_cpu(&self) -> Result<bool, Error> {
        use ffi::PJRT_Buffer_IsOnCpu_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_IsOnCpu, { buffer = self.to_c_api() }, { is_on_cpu })
    }

    /// Returns `true` once [`Buffer::delete`] has been called on this buffer or once it has been donated to a program.
    pub fn is_deleted(&self) -> Result<bool, Error> {
        use ffi::PJRT_Buffer_IsDeleted_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_IsDeleted, { buffer = self.to_c_api() }, { is_deleted })
    }

    /// Releases the device memory of this [`Buffer`] once all pending work that uses it completes, without destroying
    /// the [`Buffer`] itself. Afterwards, most operations on this [`Buffer`] fail and [`Buffer::is_deleted`] returns
    /// `true`.
    pub fn delete(&self) -> Result<(), Error> {
        use ffi::PJRT_Buffer_Delete_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_Delete, { buffer = self.to_c_api() })
    }

    /// Asynchronously copies the contents of this [`Buffer`] into a host [`Literal`] of the provided [`Shape`]. Only
    /// array shapes are supported and any other shape results in an [`Error::Unimplemented`]. The returned [`Event`]
    /// resolves to the [`Literal`] once the transfer completes; this function itself does not block.
    pub fn to_literal(&self, shape: &Shape) -> Result<Event<Literal>, Error> {
        let shape = match shape {
            Shape::Array(shape) => shape.clone(),
            shape => {
                return Err(Error::unimplemented(format!(
                    "only array shapes can be transferred to host literals, but got '{shape}'",
                )));
            }
        };
        let layout =
            shape.layout.clone().unwrap_or_else(|| Layout::Tiled(TiledLayout::major_to_minor(shape.dimensions.len())));
        self.transfer_to_host(&layout, |data| Literal { shape, data })
    }

    /// Blocking version of [`Buffer::to_literal`].
    pub fn to_literal_sync(&self, shape: &Shape) -> Result<Literal, Error> {
        self.to_literal(shape)?.r#await()
    }

    /// Enqueues a transfer of the contents of this [`Buffer`] into newly allocated host memory laid out according to
    /// `layout`. `output` wraps the destination bytes into the payload of the returned [`Event`].
    fn transfer_to_host<O, F: FnOnce(Vec<u8>) -> O>(&self, layout: &Layout, output: F) -> Result<Event<O>, Error> {
        use ffi::PJRT_Buffer_ToHostBuffer_Args;
        let mut host_layout = unsafe { layout.to_c_api() };

        // A first call without a destination only reports the required destination size.
        let size = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_ToHostBuffer,
            {
                src = self.to_c_api(),
                host_layout = &mut host_layout as *mut _,
                dst = std::ptr::null_mut(),
                dst_size = 0,
            },
            { dst_size },
        )?;

        // The plugin writes into the heap allocation of `data`, which does not move when `data` is moved into the
        // event payload.
        let mut data = vec![0_u8; size];
        let event = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_ToHostBuffer,
            {
                src = self.to_c_api(),
                host_layout = &mut host_layout as *mut _,
                dst = data.as_mut_ptr() as *mut std::ffi::c_void,
                dst_size = size,
            },
            { event },
        )?;
        tracing::trace!(size, "enqueued PJRT device-to-host transfer");
        unsafe { Event::from_c_api(event, self.api(), output(data)) }
    }

    /// Copies this [`Buffer`] to `device`. Devices of the same [`Client`] are reached through a direct backend copy.
    /// Devices of other clients are reached through the host: the data is first read back synchronously and then
    /// uploaded to `device`. In both cases, the returned [`Buffer`] may not be ready yet.
    pub fn copy_to_device<'d>(&self, device: Device<'d>) -> Result<Buffer<'d>, Error> {
        use ffi::PJRT_Buffer_CopyToDevice_Args;
        if !std::ptr::eq(self.client, device.client()) {
            return self.copy_through_host(BufferDestination::Device(device));
        }
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_CopyToDevice,
            { buffer = self.to_c_api(), dst_device = device.to_c_api() },
            { dst_buffer },
        )?;
        unsafe { Buffer::from_c_api(handle, device.client()) }
    }

    /// Copies this [`Buffer`] to `memory`, in the same way as [`Buffer::copy_to_device`]. Requires a plugin that
    /// implements version [`MIN_COPY_TO_MEMORY_MINOR_VERSION`] or newer of the PJRT ABI.
    pub fn copy_to_memory<'d>(&self, memory: Memory<'d>) -> Result<Buffer<'d>, Error> {
        use ffi::PJRT_Buffer_CopyToMemory_Args;
        self.api().version().require_minor(MIN_COPY_TO_MEMORY_MINOR_VERSION, "copying buffers to memories")?;
        if !std::ptr::eq(self.client, memory.client()) {
            return self.copy_through_host(BufferDestination::Memory(memory));
        }
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_CopyToMemory,
            { buffer = self.to_c_api(), dst_memory = memory.to_c_api() },
            { dst_buffer },
        )?;
        unsafe { Buffer::from_c_api(handle, memory.client()) }
    }

    /// Copies this [`Buffer`] to a destination owned by another [`Client`] by staging its contents in host memory.
    /// The staging bytes are handed to the destination zero-copy and are freed when the destination plugin reports
    /// that it is done with them.
    fn copy_through_host<'d>(&self, destination: BufferDestination<'d>) -> Result<Buffer<'d>, Error> {
        let element_type = self.element_type()?;
        let dimensions = self.dimensions()?.to_vec();
        let byte_strides = StridedLayout::dense(element_type, &dimensions)?;
        let layout = Layout::Tiled(TiledLayout::major_to_minor(dimensions.len()));
        let data = self.transfer_to_host(&layout, |data| data)?.r#await()?;
        tracing::debug!(
            source = self.client.platform_name(),
            destination = destination.client().platform_name(),
            size = data.len(),
            "copying PJRT buffer across clients through host memory",
        );
        upload_staging_bytes(data, element_type, &dimensions, byte_strides.strides(), destination)
    }

    /// Pins the device memory of this [`Buffer`] and returns its opaque device pointer, e.g., to share it with
    /// another framework. The memory stays pinned (i.e., the plugin will neither free nor move it) until the returned
    /// [`ExternalReference`] is dropped.
    pub fn acquire_external_reference(&self) -> Result<ExternalReference<'_>, Error> {
        use ffi::{PJRT_Buffer_IncreaseExternalReferenceCount_Args, PJRT_Buffer_OpaqueDeviceMemoryDataPointer_Args};
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_IncreaseExternalReferenceCount, {
            buffer = self.to_c_api()
        })?;

        // From here on, dropping `reference` releases the count that was just acquired, including on failure.
        let mut reference = ExternalReference { buffer: self, data_pointer: std::ptr::null_mut() };
        reference.data_pointer = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Buffer_OpaqueDeviceMemoryDataPointer,
            { buffer = self.to_c_api() },
            { device_memory_ptr },
        )?;
        Ok(reference)
    }

    /// Returns an [`Event`] that becomes ready when the data of this [`Buffer`] is available or when the work that
    /// produces it fails. Each call creates a new backend event; prefer [`Buffer::ready_future`].
    pub fn ready_event(&self) -> Result<Event<()>, Error> {
        use ffi::PJRT_Buffer_ReadyEvent_Args;
        let handle =
            invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_ReadyEvent, { buffer = self.to_c_api() }, { event })?;
        unsafe { Event::from_c_api(handle, self.api(), ()) }
    }

    /// Returns a [`CompletionFuture`] that resolves when this [`Buffer`] is ready. The readiness event is only
    /// fetched on the first call; later calls return clones of the same future.
    pub fn ready_future(&self) -> CompletionFuture {
        self.ready
            .get_or_init(|| match self.ready_event() {
                Ok(event) => event.into_completion(),
                Err(error) => CompletionFuture::ready(Err(error)),
            })
            .clone()
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        use ffi::PJRT_Buffer_Destroy_Args;
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_Destroy, { buffer = self.to_c_api() })
            .expect("failed to destroy PJRT buffer");
    }
}

impl Debug for Buffer<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Buffer").field("handle", &self.handle).finish()
    }
}

unsafe impl Send for Buffer<'_> {}
unsafe impl Sync for Buffer<'_> {}

/// Pin on the device memory of a [`Buffer`], created by [`Buffer::acquire_external_reference`]. Dropping it
/// releases the pin.
pub struct ExternalReference<'b> {
    buffer: &'b Buffer<'b>,
    data_pointer: *mut std::ffi::c_void,
}

impl<'b> ExternalReference<'b> {
    pub fn buffer(&self) -> &'b Buffer<'b> {
        self.buffer
    }

    /// Opaque pointer to the device memory of the pinned [`Buffer`]. Its meaning depends on the platform (e.g., a
    /// `CUdeviceptr` on CUDA devices) and it is generally not safe to dereference it on the host.
    pub fn data_pointer(&self) -> *mut std::ffi::c_void {
        self.data_pointer
    }
}

impl Drop for ExternalReference<'_> {
    fn drop(&mut self) {
        use ffi::PJRT_Buffer_DecreaseExternalReferenceCount_Args;
        if let Err(error) = invoke_pjrt_api_error_fn!(
            self.buffer.api(),
            PJRT_Buffer_DecreaseExternalReferenceCount,
            { buffer = self.buffer.to_c_api() },
        ) {
            tracing::warn!(%error, "failed to release PJRT buffer external reference");
        }
    }
}

/// Assumptions that the plugin may make about a host buffer passed to [`Client::buffer_from_host_buffer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostBufferSemantics {
    /// The plugin copies the data before the call returns.
    ImmutableOnlyDuringCall,

    /// The plugin may read the data until the done-with-host-buffer notification fires.
    ImmutableUntilTransferCompletes,

    /// The [`Buffer`] may alias the data for as long as it is alive; the plugin never writes to it.
    ImmutableZeroCopy,

    /// The [`Buffer`] may alias the data and the plugin may write to it. Not supported by this crate.
    MutableZeroCopy,
}

impl HostBufferSemantics {
    unsafe fn to_c_api(&self) -> ffi::PJRT_HostBufferSemantics {
        match self {
            Self::ImmutableOnlyDuringCall => ffi::PJRT_HostBufferSemantics_kImmutableOnlyDuringCall,
            Self::ImmutableUntilTransferCompletes => ffi::PJRT_HostBufferSemantics_kImmutableUntilTransferCompletes,
            Self::ImmutableZeroCopy => ffi::PJRT_HostBufferSemantics_kImmutableZeroCopy,
            Self::MutableZeroCopy => ffi::PJRT_HostBufferSemantics_kMutableZeroCopy,
        }
    }
}

/// Placement of a new [`Buffer`]: either a [`Device`] (i.e., its default memory) or a specific [`Memory`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferDestination<'c> {
    Device(Device<'c>),
    Memory(Memory<'c>),
}

impl<'c> BufferDestination<'c> {
    pub fn client(&self) -> &'c Client {
        match self {
            Self::Device(device) => device.client(),
            Self::Memory(memory) => memory.client(),
        }
    }

    /// Returns the device and memory handles to pass to the plugin, exactly one of which is non-null.
    unsafe fn to_c_api(&self) -> (*mut crate::devices::ffi::PJRT_Device, *mut crate::memories::ffi::PJRT_Memory) {
        match self {
            Self::Device(device) => (unsafe { device.to_c_api() }, std::ptr::null_mut()),
            Self::Memory(memory) => (std::ptr::null_mut(), unsafe { memory.to_c_api() }),
        }
    }
}

impl<'c> From<Device<'c>> for BufferDestination<'c> {
    fn from(device: Device<'c>) -> Self {
        Self::Device(device)
    }
}

impl<'c> From<Memory<'c>> for BufferDestination<'c> {
    fn from(memory: Memory<'c>) -> Self {
        Self::Memory(memory)
    }
}

/// Callback invoked once the plugin no longer needs a host buffer, with the error of the transfer, if any.
pub type HostBufferDoneCallback = Box<dyn FnOnce(Option<Error>) + Send>;

/// Callback invoked once the plugin releases a view created by [`Client::create_view_of_device_buffer`].
pub type DeviceBufferDeleteCallback = Box<dyn FnOnce() + Send>;

impl Client {
    /// Creates a [`Buffer`] from host data, starting an asynchronous transfer to `destination`.
    ///
    /// `byte_strides` describes the layout of `data` and defaults to the dense row-major layout. `device_layout`
    /// optionally requests a specific layout for the new [`Buffer`]. If provided, `on_done` runs exactly once, when
    /// the plugin no longer needs `data` (which, depending on `semantics`, may be long after this function returns).
    ///
    /// [`HostBufferSemantics::MutableZeroCopy`] is rejected with [`Error::Unimplemented`] and destinations owned by
    /// another [`Client`] with [`Error::InvalidArgument`], in both cases before the plugin is called. If the plugin
    /// creates the buffer but `on_done` cannot be attached to its done-with-host-buffer event (because registration
    /// fails or because the plugin returns no event for semantics that outlive this call), the new buffer is
    /// destroyed, the error is returned, and `on_done` is leaked along with everything it owns, since the plugin may
    /// still be reading `data`.
    ///
    /// # Safety
    ///
    /// `data` must point to an array laid out as described by `element_type`, `dimensions` and `byte_strides`, and it
    /// must stay valid and unmodified for as long as `semantics` requires.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn buffer_from_host_buffer(
        &self,
        data: *const u8,
        element_type: ElementType,
        dimensions: &[u64],
        byte_strides: Option<&[i64]>,
        semantics: HostBufferSemantics,
        destination: BufferDestination<'_>,
        device_layout: Option<&Layout>,
        on_done: Option<HostBufferDoneCallback>,
    ) -> Result<Buffer<'_>, Error> {
        use ffi::PJRT_Client_BufferFromHostBuffer_Args;

        if semantics == HostBufferSemantics::MutableZeroCopy {
            return Err(Error::unimplemented("mutable zero-copy host buffers are not supported"));
        }
        if !std::ptr::eq(self, destination.client()) {
            return Err(Error::invalid_argument("the buffer destination belongs to a different PJRT client"));
        }

        let dimensions = dimensions.iter().map(|dimension| *dimension as i64).collect::<Vec<_>>();
        let (device, memory) = unsafe { destination.to_c_api() };
        let mut device_layout = device_layout.map(|layout| unsafe { layout.to_c_api() });
        let (buffer, done_with_host_buffer) = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Client_BufferFromHostBuffer,
            {
                client = self.to_c_api(),
                data = data as *const std::ffi::c_void,
                data_type = element_type.to_c_api(),
                dims = dimensions.as_ptr(),
                num_dims = dimensions.len(),
                byte_strides = byte_strides.map_or(std::ptr::null(), |strides| strides.as_ptr()),
                num_byte_strides = byte_strides.map_or(0, |strides| strides.len()),
                host_buffer_semantics = semantics.to_c_api(),
                device = device,
                memory = memory,
                device_layout = device_layout.as_mut().map_or(std::ptr::null_mut(), |layout| layout as *mut _),
            },
            { buffer, done_with_host_buffer },
        )?;

        let done_event = if done_with_host_buffer.is_null() {
            None
        } else {
            Some(unsafe { Event::from_c_api(done_with_host_buffer, self.api(), ()) }?)
        };
        let buffer = unsafe { Buffer::from_c_api(buffer, self) }?;
        match (on_done, done_event) {
            (Some(on_done), Some(done_event)) => register_host_buffer_callback(&done_event, on_done)?,
            (Some(on_done), None) if semantics == HostBufferSemantics::ImmutableOnlyDuringCall => on_done(None),
            (Some(on_done), None) => {
                // Nothing reports when the plugin releases `data`, and so `on_done` is leaked.
                std::mem::forget(on_done);
                return Err(Error::internal(format!(
                    "the PJRT plugin did not return a done-with-host-buffer event for {semantics:?} semantics",
                )));
            }
            (None, _) => {}
        }
        Ok(buffer)
    }

    /// Creates a [`Buffer`] by copying `data` to `destination` before this function returns. `data` must hold a dense
    /// row-major array of `element_type` values with the provided `dimensions`.
    pub fn buffer_from_slice<'c>(
        &'c self,
        data: &[u8],
        element_type: ElementType,
        dimensions: &[u64],
        destination: BufferDestination<'c>,
    ) -> Result<Buffer<'c>, Error> {
        let shape = ArrayShape::new(element_type, dimensions);
        match shape.byte_size() {
            Some(size) if size != data.len() => Err(Error::invalid_argument(format!(
                "a host buffer of shape '{shape}' must contain {size} bytes, but {} bytes were provided",
                data.len(),
            ))),
            _ => unsafe {
                self.buffer_from_host_buffer(
                    data.as_ptr(),
                    element_type,
                    dimensions,
                    None,
                    HostBufferSemantics::ImmutableOnlyDuringCall,
                    destination,
                    None,
                    None,
                )
            },
        }
    }

    /// Wraps device memory that was allocated outside of the plugin into a [`Buffer`] without copying it. If
    /// provided, `on_delete` runs exactly once, when the plugin no longer uses the memory. Requires a plugin that
    /// implements version [`MIN_CREATE_VIEW_OF_DEVICE_BUFFER_MINOR_VERSION`] or newer of the PJRT ABI; older plugins
    /// result in an [`Error::Unimplemented`] without being called.
    ///
    /// # Safety
    ///
    /// `device_buffer` must point to device memory of `destination` that holds an array with the provided
    /// `element_type`, `dimensions` and `layout`, and it must stay valid until `on_delete` runs. `stream`, if provided,
    /// must be a platform stream handle (e.g., a `cudaStream_t`) on which the memory becomes ready.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn create_view_of_device_buffer(
        &self,
        device_buffer: *mut std::ffi::c_void,
        element_type: ElementType,
        dimensions: &[u64],
        layout: Option<&Layout>,
        destination: BufferDestination<'_>,
        stream: Option<isize>,
        on_delete: Option<DeviceBufferDeleteCallback>,
    ) -> Result<Buffer<'_>, Error> {
        use ffi::PJRT_Client_CreateViewOfDeviceBuffer_Args;

        extern "C" fn on_delete_callback(_device_buffer: *mut std::ffi::c_void, user_arg: *mut std::ffi::c_void) {
            if !user_arg.is_null() {
                let callback = unsafe { Box::from_raw(user_arg as *mut DeviceBufferDeleteCallback) };
                callback();
            }
        }

        self.api()
            .version()
            .require_minor(MIN_CREATE_VIEW_OF_DEVICE_BUFFER_MINOR_VERSION, "creating views of device buffers")?;
        if !std::ptr::eq(self, destination.client()) {
            return Err(Error::invalid_argument("the buffer destination belongs to a different PJRT client"));
        }

        let dimensions = dimensions.iter().map(|dimension| *dimension as i64).collect::<Vec<_>>();
        let (device, memory) = unsafe { destination.to_c_api() };
        let mut layout = layout.map(|layout| unsafe { layout.to_c_api() });
        let on_delete = on_delete.map_or(std::ptr::null_mut(), |callback| Box::into_raw(Box::new(callback)));
        let handle = invoke_pjrt_api_error_fn!(
            self.api(),
            PJRT_Client_CreateViewOfDeviceBuffer,
            {
                client = self.to_c_api(),
                device_buffer_ptr = device_buffer,
                dims = dimensions.as_ptr(),
                num_dims = dimensions.len(),
                element_type = element_type.to_c_api(),
                layout = layout.as_mut().map_or(std::ptr::null_mut(), |layout| layout as *mut _),
                device = device,
                memory = memory,
                stream = stream.unwrap_or(0),
                on_delete_callback = on_delete_callback,
                on_delete_callback_arg = on_delete as *mut std::ffi::c_void,
            },
            { buffer },
        )
        .inspect_err(|_| {
            if !on_delete.is_null() {
                drop(unsafe { Box::from_raw(on_delete) });
            }
        })?;
        unsafe { Buffer::from_c_api(handle, self) }
    }

    /// Returns the platform-dependent address of `buffer`, which often (but not always) matches its physical address
    /// on the device. Buffers owned by another [`Client`] are rejected with [`Error::InvalidArgument`].
    ///
    /// Reading through the returned address bypasses all synchronization: the device may still be writing to it.
    pub fn unsafe_buffer_pointer(&self, buffer: &Buffer<'_>) -> Result<usize, Error> {
        use ffi::PJRT_Buffer_UnsafePointer_Args;
        if !std::ptr::eq(self, buffer.client()) {
            return Err(Error::invalid_argument(format!(
                "the buffer belongs to a PJRT client for platform '{}', not to this client for platform '{}'",
                buffer.client().platform_name(),
                self.platform_name(),
            )));
        }
        invoke_pjrt_api_error_fn!(self.api(), PJRT_Buffer_UnsafePointer, { buffer = buffer.to_c_api() }, {
            buffer_pointer
        })
    }
}

/// Uploads `staging` to `destination` without copying it. `staging` is dropped exactly once, when the destination
/// plugin reports that it no longer reads it.
fn upload_staging_bytes<'d, B: AsRef<[u8]> + Send + 'static>(
    staging: B,
    element_type: ElementType,
    dimensions: &[u64],
    byte_strides: &[i64],
    destination: BufferDestination<'d>,
) -> Result<Buffer<'d>, Error> {
    let staging = Box::new(staging);
    let pointer = (*staging).as_ref().as_ptr();
    unsafe {
        destination.client().buffer_from_host_buffer(
            pointer,
            element_type,
            dimensions,
            Some(byte_strides),
            HostBufferSemantics::ImmutableZeroCopy,
            destination,
            None,
            Some(Box::new(move |_: Option<Error>| drop(staging))),
        )
    }
}

/// Runs `callback` once the done-with-host-buffer event fires. If the callback cannot be registered, the plugin may
/// still be reading the host data, and so the callback (along with everything it owns) is leaked instead of dropped
/// and the registration error is returned.
fn register_host_buffer_callback(done_event: &Event<()>, callback: HostBufferDoneCallback) -> Result<(), Error> {
    let callback = Arc::new(Mutex::new(Some(callback)));
    let registered = callback.clone();
    done_event
        .on_ready(move |error| {
            if let Some(callback) = registered.lock().unwrap_or_else(PoisonError::into_inner).take() {
                callback(error);
            }
        })
        .inspect_err(|error| {
            tracing::warn!(%error, "failed to register PJRT host buffer callback; leaking the host buffer");
            std::mem::forget(callback.lock().unwrap_or_else(PoisonError::into_inner).take());
        })
}

fn join<T: Display>(values: &[T]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

#[allow(dead_code, non_camel_case_types, non_snake_case, non_upper_case_globals)]
pub(crate) mod ffi {
    use std::marker::{PhantomData, PhantomPinned};

    use crate::clients::ffi::PJRT_Client;
    use crate::devices::ffi::PJRT_Device;
    use crate::errors::ffi::PJRT_Error;
    use crate::events::ffi::PJRT_Event;
    use crate::ffi::PJRT_Extension_Base;
    use crate::memories::ffi::PJRT_Memory;

    // We represent opaque C types as structs with a particular structure that is following the convention
    // suggested in [the Rustonomicon](https://doc.rust-lang.org/nomicon/ffi.html#representing-opaque-structs).
    #[repr(C)]
    pub struct PJRT_Buffer {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    pub type PJRT_Buffer_Type = std::ffi::c_uint;
    pub const PJRT_Buffer_Type_INVALID: PJRT_Buffer_Type = 0;
    pub const PJRT_Buffer_Type_PRED: PJRT_Buffer_Type = 1;
    pub const PJRT_Buffer_Type_S8: PJRT_Buffer_Type = 2;
    pub const PJRT_Buffer_Type_S16: PJRT_Buffer_Type = 3;
    pub const PJRT_Buffer_Type_S32: PJRT_Buffer_Type = 4;
    pub const PJRT_Buffer_Type_S64: PJRT_Buffer_Type = 5;
    pub const PJRT_Buffer_Type_U8: PJRT_Buffer_Type = 6;
    pub const PJRT_Buffer_Type_U16: PJRT_Buffer_Type = 7;
    pub const PJRT_Buffer_Type_U32: PJRT_Buffer_Type = 8;
    pub const PJRT_Buffer_Type_U64: PJRT_Buffer_Type = 9;
    pub const PJRT_Buffer_Type_F16: PJRT_Buffer_Type = 10;
    pub const PJRT_Buffer_Type_F32: PJRT_Buffer_Type = 11;
    pub const PJRT_Buffer_Type_F64: PJRT_Buffer_Type = 12;
    pub const PJRT_Buffer_Type_BF16: PJRT_Buffer_Type = 13;
    pub const PJRT_Buffer_Type_C64: PJRT_Buffer_Type = 14;
    pub const PJRT_Buffer_Type_C128: PJRT_Buffer_Type = 15;
    pub const PJRT_Buffer_Type_F8E5M2: PJRT_Buffer_Type = 16;
    pub const PJRT_Buffer_Type_F8E4M3FN: PJRT_Buffer_Type = 17;
    pub const PJRT_Buffer_Type_F8E4M3B11FNUZ: PJRT_Buffer_Type = 18;
    pub const PJRT_Buffer_Type_F8E5M2FNUZ: PJRT_Buffer_Type = 19;
    pub const PJRT_Buffer_Type_F8E4M3FNUZ: PJRT_Buffer_Type = 20;
    pub const PJRT_Buffer_Type_S4: PJRT_Buffer_Type = 21;
    pub const PJRT_Buffer_Type_U4: PJRT_Buffer_Type = 22;
    pub const PJRT_Buffer_Type_TOKEN: PJRT_Buffer_Type = 23;
    pub const PJRT_Buffer_Type_S2: PJRT_Buffer_Type = 24;
    pub const PJRT_Buffer_Type_U2: PJRT_Buffer_Type = 25;
    pub const PJRT_Buffer_Type_F8E4M3: PJRT_Buffer_Type = 26;
    pub const PJRT_Buffer_Type_F8E3M4: PJRT_Buffer_Type = 27;
    pub const PJRT_Buffer_Type_F8E8M0FNU: PJRT_Buffer_Type = 28;
    pub const PJRT_Buffer_Type_F4E2M1FN: PJRT_Buffer_Type = 29;

    pub type PJRT_Buffer_MemoryLayout_Type = std::ffi::c_uint;
    pub const PJRT_Buffer_MemoryLayout_Type_Tiled: PJRT_Buffer_MemoryLayout_Type = 0;
    pub const PJRT_Buffer_MemoryLayout_Type_Strides: PJRT_Buffer_MemoryLayout_Type = 1;

    #[repr(C)]
    #[derive(Copy, Clone)]
    pub struct PJRT_Buffer_MemoryLayout_Tiled {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub minor_to_major: *const i64,
        pub minor_to_major_size: usize,
        pub tile_dims: *const i64,
        pub tile_dim_sizes: *const usize,
        pub num_tiles: usize,
    }

    impl PJRT_Buffer_MemoryLayout_Tiled {
        pub fn new(
            minor_to_major: *const i64,
            minor_to_major_size: usize,
            tile_dims: *const i64,
            tile_dim_sizes: *const usize,
            num_tiles: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                minor_to_major,
                minor_to_major_size,
                tile_dims,
                tile_dim_sizes,
                num_tiles,
            }
        }
    }

    #[repr(C)]
    #[derive(Copy, Clone)]
    pub struct PJRT_Buffer_MemoryLayout_Strides {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub byte_strides: *const i64,
        pub num_byte_strides: usize,
    }

    impl PJRT_Buffer_MemoryLayout_Strides {
        pub fn new(byte_strides: *const i64, num_byte_strides: usize) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                byte_strides,
                num_byte_strides,
            }
        }
    }

    #[repr(C)]
    pub union PJRT_Buffer_MemoryLayout_Value {
        pub tiled: PJRT_Buffer_MemoryLayout_Tiled,
        pub strides: PJRT_Buffer_MemoryLayout_Strides,
    }

    #[repr(C)]
    pub struct PJRT_Buffer_MemoryLayout {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub memory_layout: PJRT_Buffer_MemoryLayout_Value,
        pub memory_layout_type: PJRT_Buffer_MemoryLayout_Type,
    }

    impl PJRT_Buffer_MemoryLayout {
        pub fn new(
            memory_layout: PJRT_Buffer_MemoryLayout_Value,
            memory_layout_type: PJRT_Buffer_MemoryLayout_Type,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                memory_layout,
                memory_layout_type,
            }
        }
    }

    #[repr(C)]
    pub struct PJRT_Buffer_ElementType_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub element_type: PJRT_Buffer_Type,
    }

    impl PJRT_Buffer_ElementType_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer, element_type: 0 }
        }
    }

    pub type PJRT_Buffer_ElementType = unsafe extern "C" fn(args: *mut PJRT_Buffer_ElementType_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_Dimensions_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub dims: *const i64,
        pub num_dims: usize,
    }

    impl PJRT_Buffer_Dimensions_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                dims: std::ptr::null(),
                num_dims: 0,
            }
        }
    }

    pub type PJRT_Buffer_Dimensions = unsafe extern "C" fn(args: *mut PJRT_Buffer_Dimensions_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_UnpaddedDimensions_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub unpadded_dims: *const i64,
        pub num_dims: usize,
    }

    impl PJRT_Buffer_UnpaddedDimensions_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                unpadded_dims: std::ptr::null(),
                num_dims: 0,
            }
        }
    }

    pub type PJRT_Buffer_UnpaddedDimensions =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_UnpaddedDimensions_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_DynamicDimensionIndices_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub dynamic_dim_indices: *const usize,
        pub num_dynamic_dims: usize,
    }

    impl PJRT_Buffer_DynamicDimensionIndices_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                dynamic_dim_indices: std::ptr::null(),
                num_dynamic_dims: 0,
            }
        }
    }

    pub type PJRT_Buffer_DynamicDimensionIndices =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_DynamicDimensionIndices_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_Device_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub device: *mut PJRT_Device,
    }

    impl PJRT_Buffer_Device_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                device: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_Device = unsafe extern "C" fn(args: *mut PJRT_Buffer_Device_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_IsOnCpu_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub is_on_cpu: bool,
    }

    impl PJRT_Buffer_IsOnCpu_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer, is_on_cpu: false }
        }
    }

    pub type PJRT_Buffer_IsOnCpu = unsafe extern "C" fn(args: *mut PJRT_Buffer_IsOnCpu_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_Memory_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub memory: *mut PJRT_Memory,
    }

    impl PJRT_Buffer_Memory_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                memory: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_Memory = unsafe extern "C" fn(args: *mut PJRT_Buffer_Memory_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_GetMemoryLayout_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub layout: PJRT_Buffer_MemoryLayout,
    }

    impl PJRT_Buffer_GetMemoryLayout_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                // The plugin overwrites the whole layout, and all of its fields are valid when zeroed.
                layout: unsafe { std::mem::zeroed() },
            }
        }
    }

    pub type PJRT_Buffer_GetMemoryLayout =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_GetMemoryLayout_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_OnDeviceSizeInBytes_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub on_device_size_in_bytes: usize,
    }

    impl PJRT_Buffer_OnDeviceSizeInBytes_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                on_device_size_in_bytes: 0,
            }
        }
    }

    pub type PJRT_Buffer_OnDeviceSizeInBytes =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_OnDeviceSizeInBytes_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_ToHostBuffer_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub src: *mut PJRT_Buffer,
        pub host_layout: *mut PJRT_Buffer_MemoryLayout,
        pub dst: *mut std::ffi::c_void,
        pub dst_size: usize,
        pub event: *mut PJRT_Event,
    }

    impl PJRT_Buffer_ToHostBuffer_Args {
        pub fn new(
            src: *mut PJRT_Buffer,
            host_layout: *mut PJRT_Buffer_MemoryLayout,
            dst: *mut std::ffi::c_void,
            dst_size: usize,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                src,
                host_layout,
                dst,
                dst_size,
                event: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_ToHostBuffer =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_ToHostBuffer_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_CopyToMemory_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub dst_memory: *mut PJRT_Memory,
        pub dst_buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_CopyToMemory_Args {
        pub fn new(buffer: *mut PJRT_Buffer, dst_memory: *mut PJRT_Memory) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                dst_memory,
                dst_buffer: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_CopyToMemory =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_CopyToMemory_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_CopyToDevice_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub dst_device: *mut PJRT_Device,
        pub dst_buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_CopyToDevice_Args {
        pub fn new(buffer: *mut PJRT_Buffer, dst_device: *mut PJRT_Device) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                dst_device,
                dst_buffer: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_CopyToDevice =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_CopyToDevice_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_ReadyEvent_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub event: *mut PJRT_Event,
    }

    impl PJRT_Buffer_ReadyEvent_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                event: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_ReadyEvent = unsafe extern "C" fn(args: *mut PJRT_Buffer_ReadyEvent_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_IncreaseExternalReferenceCount_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_IncreaseExternalReferenceCount_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer }
        }
    }

    pub type PJRT_Buffer_IncreaseExternalReferenceCount =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_IncreaseExternalReferenceCount_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_DecreaseExternalReferenceCount_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_DecreaseExternalReferenceCount_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer }
        }
    }

    pub type PJRT_Buffer_DecreaseExternalReferenceCount =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_DecreaseExternalReferenceCount_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_OpaqueDeviceMemoryDataPointer_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub device_memory_ptr: *mut std::ffi::c_void,
    }

    impl PJRT_Buffer_OpaqueDeviceMemoryDataPointer_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                buffer,
                device_memory_ptr: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Buffer_OpaqueDeviceMemoryDataPointer =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_OpaqueDeviceMemoryDataPointer_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_UnsafePointer_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub buffer_pointer: usize,
    }

    impl PJRT_Buffer_UnsafePointer_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer, buffer_pointer: 0 }
        }
    }

    pub type PJRT_Buffer_UnsafePointer =
        unsafe extern "C" fn(args: *mut PJRT_Buffer_UnsafePointer_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_IsDeleted_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
        pub is_deleted: bool,
    }

    impl PJRT_Buffer_IsDeleted_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer, is_deleted: false }
        }
    }

    pub type PJRT_Buffer_IsDeleted = unsafe extern "C" fn(args: *mut PJRT_Buffer_IsDeleted_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_Delete_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_Delete_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer }
        }
    }

    pub type PJRT_Buffer_Delete = unsafe extern "C" fn(args: *mut PJRT_Buffer_Delete_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Buffer_Destroy_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Buffer_Destroy_Args {
        pub fn new(buffer: *mut PJRT_Buffer) -> Self {
            Self { struct_size: size_of::<Self>(), extension_start: std::ptr::null_mut(), buffer }
        }
    }

    pub type PJRT_Buffer_Destroy = unsafe extern "C" fn(args: *mut PJRT_Buffer_Destroy_Args) -> *mut PJRT_Error;

    pub type PJRT_HostBufferSemantics = std::ffi::c_uint;
    pub const PJRT_HostBufferSemantics_kImmutableOnlyDuringCall: PJRT_HostBufferSemantics = 0;
    pub const PJRT_HostBufferSemantics_kImmutableUntilTransferCompletes: PJRT_HostBufferSemantics = 1;
    pub const PJRT_HostBufferSemantics_kImmutableZeroCopy: PJRT_HostBufferSemantics = 2;
    pub const PJRT_HostBufferSemantics_kMutableZeroCopy: PJRT_HostBufferSemantics = 3;

    #[repr(C)]
    pub struct PJRT_Client_BufferFromHostBuffer_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub data: *const std::ffi::c_void,
        pub data_type: PJRT_Buffer_Type,
        pub dims: *const i64,
        pub num_dims: usize,
        pub byte_strides: *const i64,
        pub num_byte_strides: usize,
        pub host_buffer_semantics: PJRT_HostBufferSemantics,
        pub device: *mut PJRT_Device,
        pub memory: *mut PJRT_Memory,
        pub device_layout: *mut PJRT_Buffer_MemoryLayout,
        pub done_with_host_buffer: *mut PJRT_Event,
        pub buffer: *mut PJRT_Buffer,
    }

    impl PJRT_Client_BufferFromHostBuffer_Args {
        #[allow(clippy::too_many_arguments)]
        pub fn new(
            client: *mut PJRT_Client,
            data: *const std::ffi::c_void,
            data_type: PJRT_Buffer_Type,
            dims: *const i64,
            num_dims: usize,
            byte_strides: *const i64,
            num_byte_strides: usize,
            host_buffer_semantics: PJRT_HostBufferSemantics,
            device: *mut PJRT_Device,
            memory: *mut PJRT_Memory,
            device_layout: *mut PJRT_Buffer_MemoryLayout,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                data,
                data_type,
                dims,
                num_dims,
                byte_strides,
                num_byte_strides,
                host_buffer_semantics,
                device,
                memory,
                device_layout,
                done_with_host_buffer: std::ptr::null_mut(),
                buffer: std::ptr::null_mut(),
            }
        }
    }

    pub type PJRT_Client_BufferFromHostBuffer =
        unsafe extern "C" fn(args: *mut PJRT_Client_BufferFromHostBuffer_Args) -> *mut PJRT_Error;

    #[repr(C)]
    pub struct PJRT_Client_CreateViewOfDeviceBuffer_Args {
        pub struct_size: usize,
        pub extension_start: *mut PJRT_Extension_Base,
        pub client: *mut PJRT_Client,
        pub device_buffer_ptr: *mut std::ffi::c_void,
        pub dims: *const i64,
        pub num_dims: usize,
        pub element_type: PJRT_Buffer_Type,
        pub layout: *mut PJRT_Buffer_MemoryLayout,
        pub device: *mut PJRT_Device,
        pub on_delete_callback:
            unsafe extern "C" fn(device_buffer_ptr: *mut std::ffi::c_void, user_arg: *mut std::ffi::c_void),
        pub on_delete_callback_arg: *mut std::ffi::c_void,
        pub stream: isize,
        pub buffer: *mut PJRT_Buffer,
        pub memory: *mut PJRT_Memory,
    }

    impl PJRT_Client_CreateViewOfDeviceBuffer_Args {
        #[allow(clippy::too_many_arguments)]
        pub fn new(
            client: *mut PJRT_Client,
            device_buffer_ptr: *mut std::ffi::c_void,
            dims: *const i64,
            num_dims: usize,
            element_type: PJRT_Buffer_Type,
            layout: *mut PJRT_Buffer_MemoryLayout,
            device: *mut PJRT_Device,
            memory: *mut PJRT_Memory,
            stream: isize,
            on_delete_callback: unsafe extern "C" fn(
                device_buffer_ptr: *mut std::ffi::c_void,
                user_arg: *mut std::ffi::c_void,
            ),
            on_delete_callback_arg: *mut std::ffi::c_void,
        ) -> Self {
            Self {
                struct_size: size_of::<Self>(),
                extension_start: std::ptr::null_mut(),
                client,
                device_buffer_ptr,
                dims,
                num_dims,
                element_type,
                layout,
                device,
                on_delete_callback,
                on_delete_callback_arg,
                stream,
                buffer: std::ptr::null_mut(),
                memory,
            }
        }
    }

    pub type PJRT_Client_CreateViewOfDeviceBuffer =
        unsafe extern "C" fn(args: *mut PJRT_Client_CreateViewOfDeviceBuffer_Args) -> *mut PJRT_Error;
}
