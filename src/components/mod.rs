pub mod backends;
pub mod band;
pub mod cache;
pub mod capability;
pub mod context;
pub mod dataset;
pub mod driver;
pub mod pixel;
pub mod progress;
pub mod registry;
pub mod resample;
pub mod window;

pub use band::Band;
pub use cache::{BandId, BlockCache, BlockHandle, BlockKey, BlockState, CacheConfig};
pub use capability::{Capabilities, DriverDescriptor, OptionDef, OptionKind, OptionSchema};
pub use context::Context;
pub use dataset::Dataset;
pub use driver::{
    AccessMode, BackendBand, BackendDataset, BlockIo, CreateRequest, Driver, DriverMatch, OpenInfo,
};
pub use pixel::{Pixel, PixelType};
pub use progress::Progress;
pub use registry::DriverRegistry;
pub use resample::{resample, resample_into, ResamplePolicy};
pub use window::Window;

use std::collections::HashMap;
pub type Metadata = HashMap<String, String>;
