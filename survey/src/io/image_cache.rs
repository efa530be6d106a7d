//! On-disk cache of fetched imagery, one file per coordinate.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::types::LatLng;
use crate::io::capabilities::{CapabilityResult, ImageFetcher};

/// Wraps an [`ImageFetcher`] and keeps every image it returns under `dir`.
///
/// A resumed run re-classifies `unknown` addresses without paying for the
/// download again. Cache I/O failures only cost a refetch.
#[derive(Debug)]
pub struct CachedImageFetcher<F> {
    inner: F,
    dir: PathBuf,
}

impl<F: ImageFetcher> CachedImageFetcher<F> {
    pub fn new(inner: F, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    /// Cache file for `location`, rounded to ~10cm.
    pub fn image_path(&self, location: LatLng) -> PathBuf {
        self.dir
            .join(format!("{:.6}_{:.6}.jpg", location.lat, location.lng))
    }

    fn store(&self, path: &Path, bytes: &[u8]) {
        if let Err(err) = fs::create_dir_all(&self.dir).and_then(|()| fs::write(path, bytes)) {
            warn!(path = %path.display(), err = %err, "failed to cache image");
        }
    }
}

impl<F: ImageFetcher> ImageFetcher for CachedImageFetcher<F> {
    fn fetch(&self, location: LatLng) -> CapabilityResult<Vec<u8>> {
        let path = self.image_path(location);
        match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(path = %path.display(), "image cache hit");
                return Ok(bytes);
            }
            _ => {}
        }
        let bytes = self.inner.fetch(location)?;
        self.store(&path, &bytes);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::capabilities::CapabilityError;
    use crate::test_support::ScriptedImageFetcher;

    #[test]
    fn second_fetch_is_served_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let inner = ScriptedImageFetcher::new();
        let cache = CachedImageFetcher::new(&inner, temp.path().join("images"));
        let location = LatLng::new(-37.8, 144.9);

        let first = cache.fetch(location).expect("first fetch");
        let second = cache.fetch(location).expect("second fetch");

        assert_eq!(first, second);
        assert_eq!(inner.calls(), vec![location]);
        assert!(cache.image_path(location).is_file());
        assert!(
            cache
                .image_path(location)
                .ends_with("-37.800000_144.900000.jpg")
        );
    }

    #[test]
    fn failures_are_not_cached() {
        let temp = tempfile::tempdir().expect("tempdir");
        let inner = ScriptedImageFetcher::new().then_fail(CapabilityError::transient("HTTP 503"));
        let cache = CachedImageFetcher::new(&inner, temp.path());
        let location = LatLng::new(1.0, 2.0);

        assert!(cache.fetch(location).is_err());
        assert!(!cache.image_path(location).exists());
        assert!(cache.fetch(location).is_ok());
        assert_eq!(inner.calls().len(), 2);
    }
}
