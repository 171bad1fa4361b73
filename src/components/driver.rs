use std::{fmt::Debug, sync::Arc};

use crate::{
    components::{
        capability::DriverDescriptor, dataset::Dataset, pixel::PixelType, progress::Progress,
        Metadata,
    },
    errors::{RastroError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    Update,
}

/// Outcome of a driver's identification probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMatch {
    /// The driver is certain the resource is its format.
    Definite,
    /// The resource could be this format; the warning is surfaced if
    /// the match is accepted.
    Possible(String),
    No,
}

/// What a driver gets to look at when identifying or opening a
/// resource: the name and a small prefix of its bytes, never more.
#[derive(Debug, Clone, Copy)]
pub struct OpenInfo<'a> {
    pub name: &'a str,
    /// Leading bytes of the resource, empty when it has none (virtual
    /// names, missing files).
    pub header: &'a [u8],
    pub mode: AccessMode,
}

/// Per-band block I/O primitive a backend hands to the core.
///
/// Blocks are always full sized; for edge blocks only the in-raster
/// region is meaningful. Buffers are native-endian pixel bytes.
pub trait BlockIo: Send + Sync + Debug {
    fn read_block(&self, col: usize, row: usize) -> Result<Vec<u8>>;
    fn write_block(&self, col: usize, row: usize, data: &[u8]) -> Result<()>;
}

/// Band description returned by a backend open/create call.
#[derive(Debug)]
pub struct BackendBand {
    pub size: (usize, usize),
    pub pixel_type: PixelType,
    pub block_size: (usize, usize),
    pub no_data: Option<f64>,
    pub metadata: Metadata,
    pub io: Arc<dyn BlockIo>,
    /// Lower resolution versions of this band, finest first.
    pub overviews: Vec<BackendBand>,
}

/// Dataset description returned by a backend open/create call.
#[derive(Debug)]
pub struct BackendDataset {
    pub size: (usize, usize),
    /// Affine georeferencing coefficients in GDAL order
    /// (x_off, x_res, x_skew, y_off, y_skew, y_res).
    pub geo_transform: Option<[f64; 6]>,
    pub crs: Option<String>,
    pub metadata: Metadata,
    pub bands: Vec<BackendBand>,
}

/// Parameters of a create call, options already validated against the
/// driver's declared schema.
#[derive(Debug)]
pub struct CreateRequest<'a> {
    pub name: &'a str,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub pixel_type: PixelType,
    pub options: &'a Metadata,
}

/// One pluggable format backend.
///
/// `identify` and `open` are mandatory; the remaining operations are
/// optional and report [RastroError::Unsupported] by default, which the
/// registry treats as "this driver declares no such handler".
pub trait Driver: Send + Sync + Debug {
    fn descriptor(&self) -> &DriverDescriptor;

    /// Cheap probe: header bytes and name inspection only, never a full
    /// parse or expensive I/O.
    fn identify(&self, info: &OpenInfo) -> DriverMatch;

    /// May decline with `Ok(None)` even after a positive [Self::identify].
    fn open(&self, info: &OpenInfo) -> Result<Option<BackendDataset>>;

    fn create(&self, request: &CreateRequest) -> Result<BackendDataset> {
        let _ = request;
        Err(RastroError::Unsupported {
            driver: self.descriptor().name.clone(),
            operation: "create",
        })
    }

    fn create_copy(
        &self,
        name: &str,
        source: &Dataset,
        options: &Metadata,
        progress: &mut Progress,
    ) -> Result<BackendDataset> {
        let _ = (name, source, options, progress);
        Err(RastroError::Unsupported {
            driver: self.descriptor().name.clone(),
            operation: "create_copy",
        })
    }

    fn delete(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(RastroError::Unsupported {
            driver: self.descriptor().name.clone(),
            operation: "delete",
        })
    }
}
