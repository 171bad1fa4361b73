mod components;
mod errors;

pub use components::{
    backends, resample, resample_into, AccessMode, BackendBand, BackendDataset, Band, BandId,
    BlockCache, BlockHandle, BlockIo, BlockKey, BlockState, CacheConfig, Capabilities, Context,
    CreateRequest, Dataset, Driver, DriverDescriptor, DriverMatch, DriverRegistry, Metadata,
    OpenInfo, OptionDef, OptionKind, OptionSchema, Pixel, PixelType, Progress, ResamplePolicy,
    Window,
};
pub use errors::{RastroError, Result};
