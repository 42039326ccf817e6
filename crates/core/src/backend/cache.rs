//! Memoizing backend wrapper
//!
//! Materializations are keyed by expression fingerprint, so repeated
//! histograms and reductions over the same composite and region hit the cache
//! instead of the wrapped backend.

use super::{Composite, CompositeRequest, HistogramSummary, RasterBackend, ReduceParams};
use crate::aoi::Aoi;
use crate::error::{Error, Result};
use crate::expr::{CollectionQuery, Image, Reducer};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Cache sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Number of cached materializations
    pub capacity: usize,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Reduction(Option<f64>),
    Histogram(Option<HistogramSummary>),
    Size(usize),
}

/// LRU cache in front of another [`RasterBackend`].
///
/// Composite construction is passed straight through; it registers state in
/// the wrapped backend.
pub struct CachedBackend<B> {
    inner: B,
    cache: Mutex<LruCache<String, CachedValue>>,
}

impl<B: RasterBackend> CachedBackend<B> {
    pub fn new(inner: B, params: CacheParams) -> Self {
        let cap = NonZeroUsize::new(params.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, CachedValue>>> {
        self.cache
            .lock()
            .map_err(|_| Error::Backend("cache lock poisoned".into()))
    }

    fn lookup(&self, key: &str) -> Result<Option<CachedValue>> {
        let hit = self.lock()?.get(key).cloned();
        if hit.is_some() {
            trace!("cache hit {}", key);
        }
        Ok(hit)
    }

    fn store(&self, key: String, value: CachedValue) -> Result<()> {
        self.lock()?.put(key, value);
        Ok(())
    }
}

impl<B: RasterBackend> RasterBackend for CachedBackend<B> {
    fn composite(&self, request: &CompositeRequest) -> Result<Composite> {
        self.inner.composite(request)
    }

    fn reduce_region(
        &self,
        image: &Image,
        reducer: Reducer,
        region: &Aoi,
        params: &ReduceParams,
    ) -> Result<Option<f64>> {
        let key = format!(
            "reduce|{}|{}|{}|{}|{}|{}",
            reducer,
            image.fingerprint(),
            region.fingerprint(),
            params.scale,
            params.max_pixels,
            params.best_effort
        );
        if let Some(CachedValue::Reduction(v)) = self.lookup(&key)? {
            return Ok(v);
        }
        let v = self.inner.reduce_region(image, reducer, region, params)?;
        self.store(key, CachedValue::Reduction(v))?;
        Ok(v)
    }

    fn histogram(
        &self,
        image: &Image,
        region: &Aoi,
        scale: f64,
        max_buckets: usize,
    ) -> Result<Option<HistogramSummary>> {
        let key = format!(
            "histogram|{}|{}|{}|{}",
            image.fingerprint(),
            region.fingerprint(),
            scale,
            max_buckets
        );
        if let Some(CachedValue::Histogram(h)) = self.lookup(&key)? {
            return Ok(h);
        }
        let h = self.inner.histogram(image, region, scale, max_buckets)?;
        self.store(key, CachedValue::Histogram(h.clone()))?;
        Ok(h)
    }

    fn collection_size(&self, query: &CollectionQuery, region: &Aoi) -> Result<usize> {
        let key = format!("size|{}|{}", query.fingerprint(), region.fingerprint());
        if let Some(CachedValue::Size(n)) = self.lookup(&key)? {
            return Ok(n);
        }
        let n = self.inner.collection_size(query, region)?;
        self.store(key, CachedValue::Size(n))?;
        Ok(n)
    }
}
