//! Deferred single-band image expressions
//!
//! Band algebra is assembled as an immutable expression tree and only
//! evaluated when a [`RasterBackend`](crate::backend::RasterBackend) is asked
//! for a histogram or a region reduction. Building an expression never
//! touches the backend.
//!
//! ```ignore
//! let nbr = post.select("B8")?.normalized_difference(&post.select("B12")?);
//! let burned = nbr.subtract(&pre_nbr).gt(0.27).rename("NBR_mask");
//! ```

use crate::temporal::DateWindow;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Binary band-algebra operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Subtract,
    Gt,
    Lt,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Subtract => "sub",
            BinaryOp::Gt => "gt",
            BinaryOp::Lt => "lt",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Apply to two unmasked values. Logical results are 0/1.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Subtract => a - b,
            BinaryOp::Gt => f64::from(u8::from(a > b)),
            BinaryOp::Lt => f64::from(u8::from(a < b)),
            BinaryOp::And => f64::from(u8::from(a != 0.0 && b != 0.0)),
            BinaryOp::Or => f64::from(u8::from(a != 0.0 || b != 0.0)),
        }
    }
}

/// Pixel-wise reducers, used both across a collection and over a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reducer {
    Mean,
    Sum,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
        })
    }
}

/// Filter over a dated image collection (radar, precipitation, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionQuery {
    pub dataset: String,
    pub band: String,
    /// `[start, end)` acquisition window
    pub window: DateWindow,
    /// Property equality filters, kept sorted for a stable fingerprint
    pub filters: Vec<(String, String)>,
}

impl CollectionQuery {
    pub fn new(dataset: impl Into<String>, band: impl Into<String>, window: DateWindow) -> Self {
        Self {
            dataset: dataset.into(),
            band: band.into(),
            window,
            filters: Vec::new(),
        }
    }

    /// Add a `property == value` filter
    pub fn filter_eq(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((property.into(), value.into()));
        self.filters.sort();
        self
    }

    pub fn fingerprint(&self) -> String {
        let mut out = format!("{}:{}@{}", self.dataset, self.band, self.window);
        for (k, v) in &self.filters {
            let _ = write!(out, "[{}={}]", k, v);
        }
        out
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A band of a composite or a static dataset
    Band { source: String, band: String },
    Constant(f64),
    /// `(a - b) / (a + b)`
    NormalizedDifference(Image, Image),
    Binary {
        op: BinaryOp,
        left: Image,
        right: Image,
    },
    Abs(Image),
    /// Per-pixel mean across several images
    MeanOf(Vec<Image>),
    /// Per-pixel reduction of a filtered collection
    Collection {
        query: CollectionQuery,
        reducer: Reducer,
    },
}

/// Handle to a deferred single-band image.
///
/// Cheap to clone; the name tag plays the role of the band name.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    expr: Arc<Expr>,
    name: Arc<str>,
}

impl Image {
    fn from_expr(expr: Expr, name: &str) -> Self {
        Self {
            expr: Arc::new(expr),
            name: Arc::from(name),
        }
    }

    /// Band `band` of the composite or dataset identified by `source`
    pub fn band(source: &str, band: &str) -> Self {
        Self::from_expr(
            Expr::Band {
                source: source.to_string(),
                band: band.to_string(),
            },
            band,
        )
    }

    pub fn constant(value: f64) -> Self {
        Self::from_expr(Expr::Constant(value), "constant")
    }

    /// Per-pixel `reducer` over every image matching `query`
    pub fn collection(query: CollectionQuery, reducer: Reducer) -> Self {
        let name = query.band.clone();
        Self::from_expr(Expr::Collection { query, reducer }, &name)
    }

    /// Per-pixel mean of `images`, named `mean`
    pub fn mean_of(images: &[Image]) -> Self {
        Self::from_expr(Expr::MeanOf(images.to_vec()), "mean")
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same pixels, new tag
    pub fn rename(&self, name: &str) -> Self {
        Self {
            expr: Arc::clone(&self.expr),
            name: Arc::from(name),
        }
    }

    /// `(self - other) / (self + other)`, named `nd`
    pub fn normalized_difference(&self, other: &Image) -> Self {
        Self::from_expr(Expr::NormalizedDifference(self.clone(), other.clone()), "nd")
    }

    fn binary(&self, op: BinaryOp, rhs: Image) -> Self {
        Self::from_expr(
            Expr::Binary {
                op,
                left: self.clone(),
                right: rhs,
            },
            &self.name,
        )
    }

    pub fn subtract(&self, rhs: impl Into<Image>) -> Self {
        self.binary(BinaryOp::Subtract, rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<Image>) -> Self {
        self.binary(BinaryOp::Gt, rhs.into())
    }

    pub fn lt(&self, rhs: impl Into<Image>) -> Self {
        self.binary(BinaryOp::Lt, rhs.into())
    }

    pub fn and(&self, rhs: impl Into<Image>) -> Self {
        self.binary(BinaryOp::And, rhs.into())
    }

    pub fn or(&self, rhs: impl Into<Image>) -> Self {
        self.binary(BinaryOp::Or, rhs.into())
    }

    pub fn abs(&self) -> Self {
        Self::from_expr(Expr::Abs(self.clone()), &self.name)
    }

    /// Canonical rendering of the expression tree, independent of name tags.
    ///
    /// Two images with equal fingerprints evaluate to the same pixels.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        self.write_fingerprint(&mut out);
        out
    }

    fn write_fingerprint(&self, out: &mut String) {
        match self.expr.as_ref() {
            Expr::Band { source, band } => {
                let _ = write!(out, "{}:{}", source, band);
            }
            Expr::Constant(v) => {
                let _ = write!(out, "{:?}", v);
            }
            Expr::NormalizedDifference(a, b) => {
                out.push_str("nd(");
                a.write_fingerprint(out);
                out.push(',');
                b.write_fingerprint(out);
                out.push(')');
            }
            Expr::Binary { op, left, right } => {
                out.push_str(op.symbol());
                out.push('(');
                left.write_fingerprint(out);
                out.push(',');
                right.write_fingerprint(out);
                out.push(')');
            }
            Expr::Abs(inner) => {
                out.push_str("abs(");
                inner.write_fingerprint(out);
                out.push(')');
            }
            Expr::MeanOf(images) => {
                out.push_str("mean(");
                for (i, image) in images.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    image.write_fingerprint(out);
                }
                out.push(')');
            }
            Expr::Collection { query, reducer } => {
                let _ = write!(out, "{}({})", reducer, query.fingerprint());
            }
        }
    }
}

impl From<f64> for Image {
    fn from(value: f64) -> Self {
        Image::constant(value)
    }
}

impl From<&Image> for Image {
    fn from(image: &Image) -> Self {
        image.clone()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.fingerprint())
    }
}
