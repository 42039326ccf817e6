//! In-memory reference backend
//!
//! Evaluates [`Image`] expressions over georeferenced [`Raster`] grids held in
//! memory. NaN is the masked value throughout: band algebra propagates it and
//! reducers skip it.

use super::{Composite, CompositeReducer, CompositeRequest, HistogramSummary, RasterBackend, ReduceParams};
use crate::aoi::Aoi;
use crate::error::{Error, Result};
use crate::expr::{CollectionQuery, Expr, Image, Reducer};
use crate::raster::Raster;
use chrono::NaiveDate;
use lru::LruCache;
use ndarray::{Array2, Zip};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

/// Approximate meters per degree at the equator
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Composites kept alive at once; one assessment builds at most a handful
pub const DEFAULT_COMPOSITE_CAPACITY: usize = 64;

type CompositeBands = Arc<Vec<(String, Raster)>>;

/// One dated image of a dataset (optical scene, radar pass, rainfall grid).
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub dataset: String,
    pub date: NaiveDate,
    /// Scene-level cloud percentage, when the sensor reports one
    pub cloud_pct: Option<f64>,
    pub properties: BTreeMap<String, String>,
    pub bands: Vec<(String, Raster)>,
}

impl Acquisition {
    pub fn new(dataset: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            dataset: dataset.into(),
            date,
            cloud_pct: None,
            properties: BTreeMap::new(),
            bands: Vec::new(),
        }
    }

    pub fn with_band(mut self, name: impl Into<String>, raster: Raster) -> Self {
        self.bands.push((name.into(), raster));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_cloud_pct(mut self, pct: f64) -> Self {
        self.cloud_pct = Some(pct);
        self
    }

    pub fn band(&self, name: &str) -> Option<&Raster> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.bands.first().map(|(_, r)| r.bounds())
    }

    fn matches(&self, query: &CollectionQuery) -> bool {
        self.dataset == query.dataset
            && query.window.contains(self.date)
            && self.band(&query.band).is_some()
            && query
                .filters
                .iter()
                .all(|(k, v)| self.properties.get(k).is_some_and(|p| p == v))
    }
}

/// Evaluated expression: broadcastable scalar or full grid
enum Value {
    Scalar(f64),
    Grid(Raster),
}

/// Backend that keeps every acquisition and static layer in memory.
#[derive(Debug)]
pub struct LocalBackend {
    meters_per_unit: f64,
    acquisitions: Vec<Acquisition>,
    layers: HashMap<String, HashMap<String, Raster>>,
    /// Built composites by request id. Evicted ids stop resolving
    /// (`UnknownSource`) rather than being rebuilt under a stale handle.
    composites: RwLock<LruCache<String, CompositeBands>>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    /// Empty backend for lon/lat grids
    pub fn new() -> Self {
        Self {
            meters_per_unit: METERS_PER_DEGREE,
            acquisitions: Vec::new(),
            layers: HashMap::new(),
            composites: RwLock::new(LruCache::new(composite_capacity(DEFAULT_COMPOSITE_CAPACITY))),
        }
    }

    /// Maximum number of composites held in memory
    pub fn with_composite_capacity(self, capacity: usize) -> Self {
        Self {
            composites: RwLock::new(LruCache::new(composite_capacity(capacity))),
            ..self
        }
    }

    /// Ground meters per CRS unit (1.0 for projected grids)
    pub fn with_meters_per_unit(mut self, meters: f64) -> Self {
        self.meters_per_unit = meters;
        self
    }

    pub fn with_acquisition(mut self, acquisition: Acquisition) -> Self {
        self.acquisitions.push(acquisition);
        self
    }

    /// Register a static (undated) layer such as elevation
    pub fn with_layer(mut self, dataset: impl Into<String>, band: impl Into<String>, raster: Raster) -> Self {
        self.layers
            .entry(dataset.into())
            .or_default()
            .insert(band.into(), raster);
        self
    }

    /// Number of composites currently registered
    pub fn composite_count(&self) -> usize {
        self.composites.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Drop every registered composite; handles issued earlier stop resolving
    pub fn clear_composites(&self) -> Result<()> {
        self.write_composites()?.clear();
        Ok(())
    }

    fn write_composites(&self) -> Result<RwLockWriteGuard<'_, LruCache<String, CompositeBands>>> {
        self.composites
            .write()
            .map_err(|_| Error::Backend("composite registry poisoned".into()))
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    fn lookup_band(&self, source: &str, band: &str) -> Result<Raster> {
        {
            let composites = self
                .composites
                .read()
                .map_err(|_| Error::Backend("composite registry poisoned".into()))?;
            if let Some(bands) = composites.peek(source) {
                return bands
                    .iter()
                    .find(|(n, _)| n == band)
                    .map(|(_, r)| r.clone())
                    .ok_or_else(|| Error::UnknownBand {
                        source_id: source.to_string(),
                        band: band.to_string(),
                    });
            }
        }
        match self.layers.get(source) {
            Some(bands) => bands.get(band).cloned().ok_or_else(|| Error::UnknownBand {
                source_id: source.to_string(),
                band: band.to_string(),
            }),
            None => Err(Error::UnknownSource(source.to_string())),
        }
    }

    fn eval(&self, image: &Image) -> Result<Value> {
        match image.expr() {
            Expr::Band { source, band } => Ok(Value::Grid(self.lookup_band(source, band)?)),
            Expr::Constant(v) => Ok(Value::Scalar(*v)),
            Expr::NormalizedDifference(a, b) => {
                combine(self.eval(a)?, self.eval(b)?, |a, b| {
                    let sum = a + b;
                    if sum.abs() < 1e-10 {
                        f64::NAN
                    } else {
                        (a - b) / sum
                    }
                })
            }
            Expr::Binary { op, left, right } => {
                let op = *op;
                combine(self.eval(left)?, self.eval(right)?, move |a, b| op.apply(a, b))
            }
            Expr::Abs(inner) => Ok(match self.eval(inner)? {
                Value::Scalar(v) => Value::Scalar(v.abs()),
                Value::Grid(r) => {
                    let data = r.data().mapv(f64::abs);
                    Value::Grid(r.with_data(data)?)
                }
            }),
            Expr::MeanOf(images) => {
                let values = images
                    .iter()
                    .map(|i| self.eval(i))
                    .collect::<Result<Vec<_>>>()?;
                reduce_stack(values, Reducer::Mean)
            }
            Expr::Collection { query, reducer } => {
                let members: Vec<Value> = self
                    .acquisitions
                    .iter()
                    .filter(|a| a.matches(query))
                    .filter_map(|a| a.band(&query.band).cloned().map(Value::Grid))
                    .collect();
                debug!(
                    "collection {} matched {} images",
                    query.fingerprint(),
                    members.len()
                );
                reduce_stack(members, *reducer)
            }
        }
    }

    /// Valid pixel values of `image` whose centres fall inside `region`
    fn region_values(&self, image: &Image, region: &Aoi, params: &ReduceParams) -> Result<Vec<f64>> {
        let raster = match self.eval(image)? {
            Value::Scalar(v) => return Ok(if v.is_nan() { vec![] } else { vec![v] }),
            Value::Grid(r) => r,
        };
        if params.max_pixels == 0 {
            return Err(Error::InvalidParameter {
                name: "max_pixels",
                value: "0".into(),
                reason: "pixel cap must be positive".into(),
            });
        }

        let native_m = raster.cell_size() * self.meters_per_unit;
        // One block covering the whole grid is the coarsest useful level
        let coarsest = raster.rows().max(raster.cols()).max(1);
        let mut factor = if native_m > 0.0 && params.scale > native_m {
            ((params.scale / native_m).floor() as usize).min(coarsest)
        } else {
            1
        };

        loop {
            let grid = raster.block_mean(factor);
            let mut inside = 0u64;
            let mut values = Vec::new();
            for ((row, col), &v) in grid.data().indexed_iter() {
                let (x, y) = grid.cell_center(row, col);
                if region.contains(x, y) {
                    inside += 1;
                    if !v.is_nan() {
                        values.push(v);
                    }
                }
            }
            if inside <= params.max_pixels {
                return Ok(values);
            }
            if !params.best_effort || factor >= coarsest {
                return Err(Error::TooManyPixels {
                    count: inside,
                    max: params.max_pixels,
                });
            }
            warn!(
                "{} pixels exceed maxPixels {}; coarsening by {}",
                inside,
                params.max_pixels,
                (factor * 2).min(coarsest)
            );
            factor = (factor * 2).min(coarsest);
        }
    }
}

impl RasterBackend for LocalBackend {
    fn composite(&self, request: &CompositeRequest) -> Result<Composite> {
        let dataset = request.satellite.dataset();
        let id = composite_id(request);

        if let Some(bands) = self.write_composites()?.get(&id) {
            debug!("composite {} reused", id);
            let names = bands.iter().map(|(n, _)| n.clone()).collect();
            return Ok(Composite::new(id, dataset.to_string(), request.window, names));
        }

        let mut selected: Vec<&Acquisition> = self
            .acquisitions
            .iter()
            .filter(|a| a.dataset == dataset && request.window.contains(a.date))
            .filter(|a| {
                !request.satellite.filters_cloud()
                    || a.cloud_pct.map_or(true, |c| c < request.max_cloud)
            })
            .filter(|a| a.bounds().is_some_and(|b| request.aoi.intersects_bounds(b)))
            .collect();
        selected.sort_by_key(|a| a.date);
        debug!("composite {} from {} acquisitions", id, selected.len());

        let band_names: Vec<String> = match selected.first() {
            Some(first) => first
                .bands
                .iter()
                .map(|(n, _)| n.clone())
                .filter(|n| selected.iter().all(|a| a.band(n).is_some()))
                .collect(),
            None => Vec::new(),
        };

        let mut bands = Vec::with_capacity(band_names.len());
        for name in &band_names {
            let stack: Vec<&Raster> = selected.iter().filter_map(|a| a.band(name)).collect();
            let reduced = composite_band(&stack, request.reducer)?;
            bands.push((name.clone(), clip(&reduced, &request.aoi)?));
        }

        if let Some((evicted, _)) = self.write_composites()?.push(id.clone(), Arc::new(bands)) {
            if evicted != id {
                debug!("composite {} evicted", evicted);
            }
        }

        Ok(Composite::new(id, dataset.to_string(), request.window, band_names))
    }

    fn reduce_region(
        &self,
        image: &Image,
        reducer: Reducer,
        region: &Aoi,
        params: &ReduceParams,
    ) -> Result<Option<f64>> {
        let values = self.region_values(image, region, params)?;
        debug!(
            "reduce_region {} of {} over {} pixels at {}m",
            reducer,
            image.name(),
            values.len(),
            params.scale
        );
        if values.is_empty() {
            return Ok(None);
        }
        let sum: f64 = values.iter().sum();
        Ok(Some(match reducer {
            Reducer::Sum => sum,
            Reducer::Mean => sum / values.len() as f64,
        }))
    }

    fn histogram(
        &self,
        image: &Image,
        region: &Aoi,
        scale: f64,
        max_buckets: usize,
    ) -> Result<Option<HistogramSummary>> {
        let values = self.region_values(image, region, &ReduceParams::at_scale(scale))?;
        debug!("histogram of {} over {} pixels", image.name(), values.len());
        Ok(bucketize(&values, max_buckets))
    }

    fn collection_size(&self, query: &CollectionQuery, region: &Aoi) -> Result<usize> {
        Ok(self
            .acquisitions
            .iter()
            .filter(|a| a.matches(query))
            .filter(|a| a.bounds().is_some_and(|b| region.intersects_bounds(b)))
            .count())
    }
}

/// Registry key covering every input that changes a composite's pixels
fn composite_id(request: &CompositeRequest) -> String {
    let cloud = if request.satellite.filters_cloud() {
        format!("cloud<{}", request.max_cloud)
    } else {
        "cloud:any".to_string()
    };
    format!(
        "{}@{}#{}#{}#{}",
        request.satellite.dataset(),
        request.window,
        request.reducer,
        cloud,
        request.aoi.fingerprint()
    )
}

fn composite_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

/// Equal-width buckets between min and max, positioned at their member mean
fn bucketize(values: &[f64], max_buckets: usize) -> Option<HistogramSummary> {
    let (&first, _) = values.split_first()?;
    let (min, max) = values
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if max - min <= 0.0 || max_buckets <= 1 {
        return Some(HistogramSummary {
            bucket_means: vec![values.iter().sum::<f64>() / values.len() as f64],
            counts: vec![values.len() as u64],
        });
    }

    let n = max_buckets;
    let width = (max - min) / n as f64;
    let mut sums = vec![0.0; n];
    let mut counts = vec![0u64; n];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(n - 1);
        sums[idx] += v;
        counts[idx] += 1;
    }

    let bucket_means = sums
        .iter()
        .zip(&counts)
        .enumerate()
        .map(|(i, (&s, &c))| {
            if c > 0 {
                s / c as f64
            } else {
                min + (i as f64 + 0.5) * width
            }
        })
        .collect();

    Some(HistogramSummary {
        bucket_means,
        counts,
    })
}

/// Pixel-wise binary op with scalar broadcasting; NaN in, NaN out
fn combine(a: Value, b: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let op = |x: f64, y: f64| {
        if x.is_nan() || y.is_nan() {
            f64::NAN
        } else {
            f(x, y)
        }
    };
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(op(x, y))),
        (Value::Grid(r), Value::Scalar(y)) => {
            let data = r.data().mapv(|x| op(x, y));
            Ok(Value::Grid(r.with_data(data)?))
        }
        (Value::Scalar(x), Value::Grid(r)) => {
            let data = r.data().mapv(|y| op(x, y));
            Ok(Value::Grid(r.with_data(data)?))
        }
        (Value::Grid(l), Value::Grid(r)) => {
            check_shape(&l, &r)?;
            let data = Zip::from(l.data())
                .and(r.data())
                .map_collect(|&x, &y| op(x, y));
            Ok(Value::Grid(l.with_data(data)?))
        }
    }
}

/// NaN-skipping per-pixel reduction across a stack; empty stack is masked
fn reduce_stack(values: Vec<Value>, reducer: Reducer) -> Result<Value> {
    let mut grids = Vec::new();
    let mut scalars = Vec::new();
    for v in values {
        match v {
            Value::Grid(r) => grids.push(r),
            Value::Scalar(s) => scalars.push(s),
        }
    }

    let reduce = |items: &mut dyn Iterator<Item = f64>| {
        let (sum, n) = items
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        match (n, reducer) {
            (0, _) => f64::NAN,
            (_, Reducer::Sum) => sum,
            (_, Reducer::Mean) => sum / n as f64,
        }
    };

    let Some(template) = grids.first() else {
        return Ok(Value::Scalar(reduce(&mut scalars.iter().copied())));
    };
    for g in &grids[1..] {
        check_shape(template, g)?;
    }

    let (rows, cols) = template.shape();
    let data = Array2::from_shape_fn((rows, cols), |(row, col)| {
        let mut items = grids
            .iter()
            .map(|g| g.data()[(row, col)])
            .chain(scalars.iter().copied());
        reduce(&mut items)
    });
    Ok(Value::Grid(template.with_data(data)?))
}

/// Median or mosaic of a date-ordered stack
fn composite_band(stack: &[&Raster], reducer: CompositeReducer) -> Result<Raster> {
    let template = stack
        .first()
        .ok_or_else(|| Error::Other("empty composite stack".into()))?;
    for r in &stack[1..] {
        check_shape(template, r)?;
    }

    let (rows, cols) = template.shape();
    let data = Array2::from_shape_fn((rows, cols), |(row, col)| match reducer {
        CompositeReducer::Mosaic => stack
            .iter()
            .rev()
            .map(|r| r.data()[(row, col)])
            .find(|v| !v.is_nan())
            .unwrap_or(f64::NAN),
        CompositeReducer::Median => {
            let mut valid: Vec<f64> = stack
                .iter()
                .map(|r| r.data()[(row, col)])
                .filter(|v| !v.is_nan())
                .collect();
            median(&mut valid)
        }
    });
    template.with_data(data)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Mask cells whose centre lies outside the AOI
fn clip(raster: &Raster, aoi: &Aoi) -> Result<Raster> {
    let mut data = raster.data().clone();
    for ((row, col), cell) in data.indexed_iter_mut() {
        let (x, y) = raster.cell_center(row, col);
        if !aoi.contains(x, y) {
            *cell = f64::NAN;
        }
    }
    raster.with_data(data)
}

fn check_shape(expected: &Raster, actual: &Raster) -> Result<()> {
    if expected.shape() != actual.shape() {
        let (er, ec) = expected.shape();
        let (ar, ac) = actual.shape();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}
