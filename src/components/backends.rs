/// Bundled reference backends.
///
/// Real format codecs live outside the core; the in-memory driver here
/// exercises the whole backend contract and backs the test suite and
/// benches.
pub mod mem {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use crate::{
        components::{
            capability::{Capabilities, DriverDescriptor, OptionDef, OptionKind, OptionSchema},
            driver::{
                BackendBand, BackendDataset, BlockIo, CreateRequest, Driver, DriverMatch, OpenInfo,
            },
            pixel::PixelType,
            Metadata,
        },
        errors::{RastroError, Result},
    };

    /// Names handled by the in-memory driver start with this prefix.
    pub const PREFIX: &str = "MEM:";

    #[derive(Debug)]
    struct MemBand {
        pixel_type: PixelType,
        block_size: (usize, usize),
        no_data: Option<f64>,
        blocks: Mutex<HashMap<(usize, usize), Vec<u8>>>,
    }

    impl MemBand {
        fn block_bytes(&self) -> usize {
            self.block_size.0 * self.block_size.1 * self.pixel_type.bytes()
        }
    }

    #[derive(Debug)]
    struct MemDataset {
        size: (usize, usize),
        geo_transform: Option<[f64; 6]>,
        crs: Option<String>,
        metadata: Metadata,
        bands: Vec<Arc<MemBand>>,
    }

    #[derive(Debug)]
    struct MemBlockIo(Arc<MemBand>);

    impl BlockIo for MemBlockIo {
        fn read_block(&self, col: usize, row: usize) -> Result<Vec<u8>> {
            let blocks = self.0.blocks.lock().expect("mem band lock");
            Ok(blocks
                .get(&(col, row))
                .cloned()
                .unwrap_or_else(|| vec![0; self.0.block_bytes()]))
        }

        fn write_block(&self, col: usize, row: usize, data: &[u8]) -> Result<()> {
            let mut blocks = self.0.blocks.lock().expect("mem band lock");
            blocks.insert((col, row), data.to_vec());
            Ok(())
        }
    }

    /// In-memory rasters addressed as `MEM:<name>`.
    ///
    /// Datasets persist in the driver for its lifetime, so a created
    /// dataset can be re-opened through the registry until deleted.
    #[derive(Debug)]
    pub struct MemDriver {
        descriptor: DriverDescriptor,
        store: Mutex<HashMap<String, Arc<MemDataset>>>,
    }

    impl Default for MemDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemDriver {
        pub fn new() -> Self {
            Self {
                descriptor: DriverDescriptor {
                    name: "MEM".to_string(),
                    description: "In-memory rasters".to_string(),
                    capabilities: Capabilities {
                        raster: true,
                        vector: false,
                        create: true,
                        create_copy: false,
                        update: true,
                        subdatasets: false,
                        virtual_io: true,
                    },
                    create_types: PixelType::ALL.to_vec(),
                    creation_options: OptionSchema::new(vec![
                        OptionDef::new(
                            "BLOCKXSIZE",
                            OptionKind::Int {
                                min: Some(1),
                                max: Some(1 << 16),
                            },
                            None,
                            "Block width; defaults to the raster width",
                        ),
                        OptionDef::new(
                            "BLOCKYSIZE",
                            OptionKind::Int {
                                min: Some(1),
                                max: Some(1 << 16),
                            },
                            None,
                            "Block height; defaults to 1 (scanline blocks)",
                        ),
                        OptionDef::new("NODATA", OptionKind::Float, None, "No-data sentinel"),
                        OptionDef::new(
                            "GEOTRANSFORM",
                            OptionKind::String,
                            None,
                            "Six comma separated affine coefficients",
                        ),
                        OptionDef::new("CRS", OptionKind::String, None, "Spatial reference"),
                        OptionDef::new(
                            "INTERLEAVE",
                            OptionKind::Choice(vec!["BAND".to_string(), "PIXEL".to_string()]),
                            Some("BAND"),
                            "Stored pixel layout",
                        ),
                    ]),
                },
                store: Mutex::new(HashMap::new()),
            }
        }

        fn backend_dataset(dataset: &MemDataset) -> BackendDataset {
            BackendDataset {
                size: dataset.size,
                geo_transform: dataset.geo_transform,
                crs: dataset.crs.clone(),
                metadata: dataset.metadata.clone(),
                bands: dataset
                    .bands
                    .iter()
                    .map(|band| BackendBand {
                        size: dataset.size,
                        pixel_type: band.pixel_type,
                        block_size: band.block_size,
                        no_data: band.no_data,
                        metadata: Metadata::new(),
                        io: Arc::new(MemBlockIo(Arc::clone(band))),
                        overviews: Vec::new(),
                    })
                    .collect(),
            }
        }
    }

    fn create_failed(name: &str, reason: String) -> RastroError {
        RastroError::CreateFailed {
            driver: "MEM".to_string(),
            name: name.to_string(),
            reason,
        }
    }

    fn parse_geo_transform(name: &str, value: &str) -> Result<[f64; 6]> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| create_failed(name, format!("bad GEOTRANSFORM `{value}`")))?;
        parts
            .try_into()
            .map_err(|_| create_failed(name, "GEOTRANSFORM needs six coefficients".to_string()))
    }

    impl Driver for MemDriver {
        fn descriptor(&self) -> &DriverDescriptor {
            &self.descriptor
        }

        fn identify(&self, info: &OpenInfo) -> DriverMatch {
            if info.name.starts_with(PREFIX) {
                DriverMatch::Definite
            } else {
                DriverMatch::No
            }
        }

        fn open(&self, info: &OpenInfo) -> Result<Option<BackendDataset>> {
            let store = self.store.lock().expect("mem store lock");
            // Unknown names decline even though the prefix identified.
            Ok(store.get(info.name).map(|dataset| Self::backend_dataset(dataset)))
        }

        fn create(&self, request: &CreateRequest) -> Result<BackendDataset> {
            if request.width == 0 || request.height == 0 {
                return Err(create_failed(request.name, "empty raster size".to_string()));
            }
            // Options arrive validated against the schema; only
            // driver-specific constraints are checked here.
            let block_w = match request.options.get("BLOCKXSIZE") {
                Some(value) => value.parse::<usize>().unwrap_or(request.width),
                None => request.width,
            };
            let block_h = match request.options.get("BLOCKYSIZE") {
                Some(value) => value.parse::<usize>().unwrap_or(1),
                None => 1,
            };
            let no_data = request
                .options
                .get("NODATA")
                .and_then(|value| value.parse::<f64>().ok());
            let geo_transform = request
                .options
                .get("GEOTRANSFORM")
                .map(|value| parse_geo_transform(request.name, value))
                .transpose()?;
            let crs = request.options.get("CRS").cloned();
            let mut metadata = Metadata::new();
            if let Some(interleave) = request.options.get("INTERLEAVE") {
                metadata.insert("INTERLEAVE".to_string(), interleave.to_ascii_uppercase());
            }

            let dataset = Arc::new(MemDataset {
                size: (request.width, request.height),
                geo_transform,
                crs,
                metadata,
                bands: (0..request.bands)
                    .map(|_| {
                        Arc::new(MemBand {
                            pixel_type: request.pixel_type,
                            block_size: (block_w, block_h),
                            no_data,
                            blocks: Mutex::new(HashMap::new()),
                        })
                    })
                    .collect(),
            });
            let backend = Self::backend_dataset(&dataset);
            self.store
                .lock()
                .expect("mem store lock")
                .insert(request.name.to_string(), dataset);
            Ok(backend)
        }

        fn delete(&self, name: &str) -> Result<()> {
            match self.store.lock().expect("mem store lock").remove(name) {
                Some(_) => Ok(()),
                None => Err(RastroError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no in-memory dataset `{name}`"),
                ))),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::components::driver::AccessMode;

        fn create_request<'a>(name: &'a str, options: &'a Metadata) -> CreateRequest<'a> {
            CreateRequest {
                name,
                width: 40,
                height: 30,
                bands: 2,
                pixel_type: PixelType::U16,
                options,
            }
        }

        #[test]
        fn identify_is_prefix_based() {
            let driver = MemDriver::new();
            let info = OpenInfo {
                name: "MEM:a",
                header: &[],
                mode: AccessMode::ReadOnly,
            };
            assert_eq!(driver.identify(&info), DriverMatch::Definite);
            let info = OpenInfo {
                name: "file.tif",
                header: &[],
                mode: AccessMode::ReadOnly,
            };
            assert_eq!(driver.identify(&info), DriverMatch::No);
        }

        #[test]
        fn open_declines_unknown_names() {
            let driver = MemDriver::new();
            let info = OpenInfo {
                name: "MEM:never-created",
                header: &[],
                mode: AccessMode::ReadOnly,
            };
            assert!(driver.open(&info).unwrap().is_none());
        }

        #[test]
        fn created_datasets_reopen_until_deleted() {
            let driver = MemDriver::new();
            let options = Metadata::new();
            driver
                .create(&create_request("MEM:keep", &options))
                .unwrap();
            let info = OpenInfo {
                name: "MEM:keep",
                header: &[],
                mode: AccessMode::Update,
            };
            let backend = driver.open(&info).unwrap().unwrap();
            assert_eq!(backend.size, (40, 30));
            assert_eq!(backend.bands.len(), 2);
            // Scanline blocks by default.
            assert_eq!(backend.bands[0].block_size, (40, 1));

            driver.delete("MEM:keep").unwrap();
            assert!(driver.open(&info).unwrap().is_none());
            assert!(driver.delete("MEM:keep").is_err());
        }

        #[test]
        fn creation_options_shape_the_dataset() {
            let driver = MemDriver::new();
            let options = Metadata::from([
                ("BLOCKXSIZE".to_string(), "16".to_string()),
                ("BLOCKYSIZE".to_string(), "8".to_string()),
                ("NODATA".to_string(), "-9999".to_string()),
                ("GEOTRANSFORM".to_string(), "10,1,0,20,0,-1".to_string()),
                ("CRS".to_string(), "EPSG:4326".to_string()),
            ]);
            let backend = driver
                .create(&create_request("MEM:shaped", &options))
                .unwrap();
            assert_eq!(backend.bands[0].block_size, (16, 8));
            assert_eq!(backend.bands[0].no_data, Some(-9999.0));
            assert_eq!(backend.geo_transform, Some([10.0, 1.0, 0.0, 20.0, 0.0, -1.0]));
            assert_eq!(backend.crs.as_deref(), Some("EPSG:4326"));
        }

        #[test]
        fn malformed_geo_transform_fails_creation() {
            let driver = MemDriver::new();
            let options = Metadata::from([("GEOTRANSFORM".to_string(), "1,2,3".to_string())]);
            assert!(matches!(
                driver.create(&create_request("MEM:bad", &options)),
                Err(RastroError::CreateFailed { .. })
            ));
        }

        #[test]
        fn blocks_round_trip_through_io() {
            let driver = MemDriver::new();
            let options = Metadata::new();
            let backend = driver.create(&create_request("MEM:io", &options)).unwrap();
            let io = &backend.bands[0].io;
            let nbytes = 40 * 2; // one scanline of u16
            assert_eq!(io.read_block(0, 3).unwrap(), vec![0; nbytes]);
            io.write_block(0, 3, &vec![7; nbytes]).unwrap();
            assert_eq!(io.read_block(0, 3).unwrap(), vec![7; nbytes]);
        }
    }
}
