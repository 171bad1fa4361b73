use std::sync::Arc;

use crate::{
    components::{
        backends::mem::MemDriver,
        cache::{BlockCache, CacheConfig},
        dataset::Dataset,
        driver::{AccessMode, Driver},
        pixel::PixelType,
        progress::Progress,
        registry::DriverRegistry,
    },
    errors::Result,
};

/// One session of the access layer: a driver registry plus the block
/// cache shared by every dataset opened through it.
///
/// Contexts are constructed explicitly and independent of each other,
/// so tests (or embedders) can run several caches side by side; there
/// is no ambient global state to initialize or tear down beyond
/// dropping the context after its datasets are closed.
#[derive(Debug)]
pub struct Context {
    registry: DriverRegistry,
    cache: Arc<BlockCache>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Context {
    pub fn new(cache_config: CacheConfig) -> Self {
        Self {
            registry: DriverRegistry::new(),
            cache: Arc::new(BlockCache::new(cache_config)),
        }
    }

    /// A context with the bundled drivers registered.
    pub fn with_default_drivers(cache_config: CacheConfig) -> Self {
        let context = Self::new(cache_config);
        context.registry.register(Arc::new(MemDriver::new()));
        context
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> bool {
        self.registry.register(driver)
    }

    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    pub fn open(&self, name: &str, mode: AccessMode) -> Result<Dataset> {
        self.registry.open(&self.cache, name, mode)
    }

    pub fn create(
        &self,
        driver_name: &str,
        name: &str,
        size: (usize, usize),
        bands: usize,
        pixel_type: PixelType,
        options: &[(String, String)],
    ) -> Result<Dataset> {
        self.registry
            .create(&self.cache, driver_name, name, size, bands, pixel_type, options)
    }

    pub fn create_copy(
        &self,
        driver_name: &str,
        name: &str,
        source: &Dataset,
        options: &[(String, String)],
        progress: &mut Progress,
    ) -> Result<Dataset> {
        self.registry
            .create_copy(&self.cache, driver_name, name, source, options, progress)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.registry.delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{resample::ResamplePolicy, window::Window},
        errors::RastroError,
    };

    #[test]
    fn contexts_are_independent() {
        let first = Context::with_default_drivers(CacheConfig::default());
        let second = Context::with_default_drivers(CacheConfig::default());
        first
            .create("MEM", "MEM:only-in-first", (8, 8), 1, PixelType::U8, &[])
            .unwrap();
        // The second context's MEM driver has its own store.
        assert!(matches!(
            second.open("MEM:only-in-first", AccessMode::ReadOnly),
            Err(RastroError::OpenFailed { .. })
        ));
    }

    #[test]
    fn create_write_reopen_read() {
        let context = Context::with_default_drivers(CacheConfig::default());
        let created = context
            .create("MEM", "MEM:scratch", (32, 16), 1, PixelType::I16, &[])
            .unwrap();
        let window = Window::new(4, 4, 8, 8);
        let data: Vec<i16> = (0..64).map(|i| i * 3 - 90).collect();
        created
            .band(0)
            .unwrap()
            .write_window(window, &data)
            .unwrap();
        created.close().unwrap();

        let reopened = context.open("MEM:scratch", AccessMode::ReadOnly).unwrap();
        let back: Vec<i16> = reopened
            .band(0)
            .unwrap()
            .read_window(window, window.shape(), ResamplePolicy::default())
            .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn create_copy_via_generic_path_reports_progress() {
        let context = Context::with_default_drivers(CacheConfig::default());
        let source = context
            .create(
                "MEM",
                "MEM:copy-src",
                (16, 16),
                2,
                PixelType::U8,
                &[("BLOCKYSIZE".to_string(), "4".to_string())],
            )
            .unwrap();
        let window = Window::new(0, 0, 16, 16);
        for (index, fill) in [(0usize, 11u8), (1, 22)] {
            source
                .band(index)
                .unwrap()
                .write_window(window, &vec![fill; 256])
                .unwrap();
        }

        let mut fractions = Vec::new();
        let mut progress = Progress::new(|fraction, _| {
            fractions.push(fraction);
            true
        });
        let copy = context
            .create_copy("MEM", "MEM:copy-dst", &source, &[], &mut progress)
            .unwrap();
        drop(progress);
        let back: Vec<u8> = copy
            .read_window(&[0, 1], window, (16, 16), ResamplePolicy::default())
            .unwrap();
        assert!(back[..256].iter().all(|v| *v == 11));
        assert!(back[256..].iter().all(|v| *v == 22));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn cancelled_create_copy_leaves_no_dataset() {
        let context = Context::with_default_drivers(CacheConfig::default());
        let source = context
            .create("MEM", "MEM:cancel-src", (8, 8), 1, PixelType::U8, &[])
            .unwrap();
        let mut progress = Progress::new(|_, _| false);
        assert!(matches!(
            context.create_copy("MEM", "MEM:cancel-dst", &source, &[], &mut progress),
            Err(RastroError::UserCancelled)
        ));
        assert!(matches!(
            context.open("MEM:cancel-dst", AccessMode::ReadOnly),
            Err(RastroError::OpenFailed { .. })
        ));
    }

    #[test]
    fn invalid_creation_options_fail_before_the_backend() {
        let context = Context::with_default_drivers(CacheConfig::default());
        let result = context.create(
            "MEM",
            "MEM:never",
            (8, 8),
            1,
            PixelType::U8,
            &[("BLOCKXSIZE".to_string(), "-4".to_string())],
        );
        assert!(matches!(result, Err(RastroError::InvalidOption { .. })));
        // The backend was never invoked, so nothing to open.
        assert!(matches!(
            context.open("MEM:never", AccessMode::ReadOnly),
            Err(RastroError::OpenFailed { .. })
        ));
    }

    #[test]
    fn delete_dispatches_to_the_driver() {
        let context = Context::with_default_drivers(CacheConfig::default());
        context
            .create("MEM", "MEM:doomed", (4, 4), 1, PixelType::U8, &[])
            .unwrap();
        context.delete("MEM:doomed").unwrap();
        assert!(matches!(
            context.open("MEM:doomed", AccessMode::ReadOnly),
            Err(RastroError::OpenFailed { .. })
        ));
    }
}
