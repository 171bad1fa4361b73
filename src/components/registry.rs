use std::{
    fs,
    io::Read,
    sync::{Arc, RwLock},
};

use log::{debug, info, warn};

use crate::{
    components::{
        cache::BlockCache,
        dataset::Dataset,
        driver::{AccessMode, CreateRequest, Driver, DriverMatch, OpenInfo},
        pixel::{for_pixel_type, PixelType},
        progress::Progress,
        resample::ResamplePolicy,
        window::Window,
    },
    errors::{RastroError, Result},
};

/// Bytes of a resource handed to identification probes.
const HEADER_PROBE_BYTES: usize = 1024;

/// Ordered collection of format drivers.
///
/// Registration order is significant: it is the probe order during
/// identification and the tie-break among ambiguous matches. The
/// registry lives for the session that owns it; there is no process
/// global.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a driver unless one of the same name is already present
    /// (idempotent). Returns whether the driver was added.
    pub fn register(&self, driver: Arc<dyn Driver>) -> bool {
        let name = driver.descriptor().name.clone();
        let mut drivers = self.drivers.write().expect("registry lock");
        if drivers
            .iter()
            .any(|d| d.descriptor().name.eq_ignore_ascii_case(&name))
        {
            debug!("driver `{name}` already registered");
            return false;
        }
        debug!("registered driver `{name}`");
        drivers.push(driver);
        true
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.read().expect("registry lock").len()
    }

    pub fn driver_names(&self) -> Vec<String> {
        self.drivers
            .read()
            .expect("registry lock")
            .iter()
            .map(|driver| driver.descriptor().name.clone())
            .collect()
    }

    pub fn driver_by_name(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .expect("registry lock")
            .iter()
            .find(|driver| driver.descriptor().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Probes drivers in registration order. The first definite match
    /// wins immediately; failing that, the first possible match is
    /// accepted together with its warning. Probes are cheap by
    /// contract, so a full pass never parses anything.
    pub fn identify(&self, info: &OpenInfo) -> Option<(Arc<dyn Driver>, Option<String>)> {
        let drivers = self.drivers.read().expect("registry lock");
        let mut possible: Option<(Arc<dyn Driver>, String)> = None;
        for driver in drivers.iter() {
            match driver.identify(info) {
                DriverMatch::Definite => {
                    debug!(
                        "`{}` identified as {}",
                        info.name,
                        driver.descriptor().name
                    );
                    return Some((Arc::clone(driver), None));
                }
                DriverMatch::Possible(warning) => {
                    if possible.is_none() {
                        possible = Some((Arc::clone(driver), warning));
                    }
                }
                DriverMatch::No => {}
            }
        }
        possible.map(|(driver, warning)| {
            warn!(
                "`{}` only possibly matches {}: {warning}",
                info.name,
                driver.descriptor().name
            );
            (driver, Some(warning))
        })
    }

    /// Identifies and opens a resource. Identification and opening are
    /// independent decisions: a driver may decline after a positive
    /// probe, and no other driver is tried in that case.
    pub fn open(&self, cache: &Arc<BlockCache>, name: &str, mode: AccessMode) -> Result<Dataset> {
        let header = read_header(name);
        let info = OpenInfo {
            name,
            header: &header,
            mode,
        };
        let (driver, _warning) = self
            .identify(&info)
            .ok_or_else(|| RastroError::NotIdentifiable(name.to_string()))?;
        let descriptor = driver.descriptor();
        if mode == AccessMode::Update && !descriptor.capabilities.update {
            return Err(RastroError::Unsupported {
                driver: descriptor.name.clone(),
                operation: "update",
            });
        }
        match driver.open(&info)? {
            Some(backend) => Dataset::from_backend(name, &descriptor.name, mode, backend, cache),
            None => Err(RastroError::OpenFailed {
                driver: descriptor.name.clone(),
                name: name.to_string(),
                reason: "driver declined the resource".to_string(),
            }),
        }
    }

    /// Creates a new dataset through an explicitly named driver.
    /// Creation options are validated against the driver's declared
    /// schema before the backend sees anything.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        cache: &Arc<BlockCache>,
        driver_name: &str,
        name: &str,
        size: (usize, usize),
        bands: usize,
        pixel_type: PixelType,
        options: &[(String, String)],
    ) -> Result<Dataset> {
        let driver = self
            .driver_by_name(driver_name)
            .ok_or_else(|| RastroError::UnknownDriver(driver_name.to_string()))?;
        let descriptor = driver.descriptor();
        if !descriptor.capabilities.create {
            return Err(RastroError::Unsupported {
                driver: descriptor.name.clone(),
                operation: "create",
            });
        }
        if !descriptor.create_types.contains(&pixel_type) {
            return Err(RastroError::CreateFailed {
                driver: descriptor.name.clone(),
                name: name.to_string(),
                reason: format!("pixel type {pixel_type:?} not creatable"),
            });
        }
        let validated = descriptor.creation_options.validate(options)?;
        let request = CreateRequest {
            name,
            width: size.0,
            height: size.1,
            bands,
            pixel_type,
            options: &validated,
        };
        let backend = driver.create(&request)?;
        info!("created `{name}` via {}", descriptor.name);
        Dataset::from_backend(name, &descriptor.name, AccessMode::Update, backend, cache)
    }

    /// Copies `source` into a new dataset of the named format. Uses the
    /// driver's native copy when it declares one, otherwise a generic
    /// band-by-band block copy driving the progress callback.
    pub fn create_copy(
        &self,
        cache: &Arc<BlockCache>,
        driver_name: &str,
        name: &str,
        source: &Dataset,
        options: &[(String, String)],
        progress: &mut Progress,
    ) -> Result<Dataset> {
        let driver = self
            .driver_by_name(driver_name)
            .ok_or_else(|| RastroError::UnknownDriver(driver_name.to_string()))?;
        let descriptor = driver.descriptor();
        let validated = descriptor.creation_options.validate(options)?;
        if descriptor.capabilities.create_copy {
            let backend = driver.create_copy(name, source, &validated, progress)?;
            return Dataset::from_backend(
                name,
                &descriptor.name,
                AccessMode::Update,
                backend,
                cache,
            );
        }
        self.generic_create_copy(cache, &descriptor.name, name, source, options, progress)
    }

    fn generic_create_copy(
        &self,
        cache: &Arc<BlockCache>,
        driver_name: &str,
        name: &str,
        source: &Dataset,
        options: &[(String, String)],
        progress: &mut Progress,
    ) -> Result<Dataset> {
        if source.band_count() == 0 {
            return Err(RastroError::CreateFailed {
                driver: driver_name.to_string(),
                name: name.to_string(),
                reason: "source has no bands".to_string(),
            });
        }
        let pixel_type = source.band(0)?.pixel_type();
        if source
            .bands()
            .iter()
            .any(|band| band.pixel_type() != pixel_type)
        {
            return Err(RastroError::CreateFailed {
                driver: driver_name.to_string(),
                name: name.to_string(),
                reason: "mixed band pixel types need a native copy".to_string(),
            });
        }
        let destination = self.create(
            cache,
            driver_name,
            name,
            source.size(),
            source.band_count(),
            pixel_type,
            options,
        )?;
        match copy_pixels(source, &destination, progress) {
            Ok(()) => {
                destination.flush()?;
                Ok(destination)
            }
            Err(err) => {
                // Leave no partial result behind; deletion is best
                // effort since the target format may not support it.
                drop(destination);
                if let Err(delete_err) = self.delete(name) {
                    debug!("could not remove partial copy `{name}`: {delete_err}");
                }
                Err(err)
            }
        }
    }

    /// Deletes a resource through its owning driver, falling back to
    /// plain file removal for drivers without a delete handler.
    pub fn delete(&self, name: &str) -> Result<()> {
        let header = read_header(name);
        let info = OpenInfo {
            name,
            header: &header,
            mode: AccessMode::Update,
        };
        let (driver, _) = self
            .identify(&info)
            .ok_or_else(|| RastroError::NotIdentifiable(name.to_string()))?;
        match driver.delete(name) {
            Err(RastroError::Unsupported { .. }) => {
                debug!(
                    "driver {} has no delete handler, removing `{name}` directly",
                    driver.descriptor().name
                );
                Ok(fs::remove_file(name)?)
            }
            other => other,
        }
    }
}

/// Strip-wise pixel copy between two datasets of identical shape.
fn copy_pixels(source: &Dataset, destination: &Dataset, progress: &mut Progress) -> Result<()> {
    let (width, height) = source.size();
    let total_rows = (source.band_count() * height) as f64;
    let mut done_rows = 0usize;
    for index in 0..source.band_count() {
        let src_band = source.band(index)?;
        let dst_band = destination.band(index)?;
        let strip = src_band.block_size().1.max(1);
        let mut row = 0;
        while row < height {
            let rows = strip.min(height - row);
            let window = Window::new(0, row, width, rows);
            for_pixel_type!(src_band.pixel_type(), T => {
                let strip_data: Vec<T> =
                    src_band.read_window(window, window.shape(), ResamplePolicy::Nearest)?;
                dst_band.write_window(window, &strip_data)?;
            });
            row += rows;
            done_rows += rows;
            progress.report(
                done_rows as f64 / total_rows,
                &format!("copying band {} of {}", index + 1, source.band_count()),
            )?;
        }
    }
    Ok(())
}

fn read_header(name: &str) -> Vec<u8> {
    let mut header = vec![0u8; HEADER_PROBE_BYTES];
    match fs::File::open(name) {
        Ok(mut file) => {
            let mut filled = 0;
            while filled < header.len() {
                match file.read(&mut header[filled..]) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => filled += n,
                }
            }
            header.truncate(filled);
            header
        }
        // Virtual names and missing files probe with an empty header.
        Err(_) => Vec::new(),
    }
}
