use super::{read_dimension, DistValue, Space};
use crate::point::{PointKind, PointRef};
use crate::vector::ops;
use crate::{Params, Result};

/// Metrics over dense `f32` vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealMetric {
    L1,
    L2,
    Linf,
    /// `1 - cosine similarity`
    Cosine,
    /// Negative dot product, so larger products rank closer
    NegDot,
}

#[derive(Debug)]
pub struct DenseRealSpace {
    metric: RealMetric,
    dim: Option<usize>,
}

impl DenseRealSpace {
    pub fn new(metric: RealMetric, dim: Option<usize>) -> Self {
        Self { metric, dim }
    }

    pub(super) fn create(metric: RealMetric, params: &Params) -> Result<Box<dyn Space<f32>>> {
        Ok(Box::new(Self::new(metric, read_dimension(params)?)))
    }
}

impl Space<f32> for DenseRealSpace {
    fn name(&self) -> &'static str {
        match self.metric {
            RealMetric::L1 => "l1",
            RealMetric::L2 => "l2",
            RealMetric::Linf => "linf",
            RealMetric::Cosine => "cosinesimil",
            RealMetric::NegDot => "negdotprod",
        }
    }

    fn point_kind(&self) -> PointKind {
        PointKind::Dense
    }

    fn dimension(&self) -> Option<usize> {
        self.dim
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> f32 {
        let (a, b) = match (f32::dense(a), f32::dense(b)) {
            (Some(a), Some(b)) if a.len() == b.len() => (a, b),
            _ => return f32::MAX,
        };

        match self.metric {
            RealMetric::L1 => ops::l1_distance(a, b),
            RealMetric::L2 => ops::l2_distance(a, b),
            RealMetric::Linf => ops::linf_distance(a, b),
            RealMetric::Cosine => ops::cosine_distance(a, b),
            RealMetric::NegDot => -ops::dot_product(a, b),
        }
    }
}

/// Metrics over dense `i32` vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntMetric {
    L1,
    L2Sqr,
}

#[derive(Debug)]
pub struct DenseIntSpace {
    metric: IntMetric,
    dim: Option<usize>,
}

impl DenseIntSpace {
    pub fn new(metric: IntMetric, dim: Option<usize>) -> Self {
        Self { metric, dim }
    }

    pub(super) fn create(metric: IntMetric, params: &Params) -> Result<Box<dyn Space<i32>>> {
        Ok(Box::new(Self::new(metric, read_dimension(params)?)))
    }
}

impl Space<i32> for DenseIntSpace {
    fn name(&self) -> &'static str {
        match self.metric {
            IntMetric::L1 => "l1_int",
            IntMetric::L2Sqr => "l2sqr_int",
        }
    }

    fn point_kind(&self) -> PointKind {
        PointKind::Dense
    }

    fn dimension(&self) -> Option<usize> {
        self.dim
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> i32 {
        let (a, b) = match (i32::dense(a), i32::dense(b)) {
            (Some(a), Some(b)) if a.len() == b.len() => (a, b),
            _ => return i32::MAX,
        };

        match self.metric {
            IntMetric::L1 => ops::l1_distance_i32(a, b),
            IntMetric::L2Sqr => ops::l2_squared_i32(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_metrics() {
        let a = PointRef::Real(&[0.0, 0.0]);
        let b = PointRef::Real(&[3.0, 4.0]);

        assert_eq!(DenseRealSpace::new(RealMetric::L2, None).distance(a, b), 5.0);
        assert_eq!(DenseRealSpace::new(RealMetric::L1, None).distance(a, b), 7.0);
        assert_eq!(DenseRealSpace::new(RealMetric::Linf, None).distance(a, b), 4.0);

        let c = PointRef::Real(&[1.0, 2.0]);
        assert_eq!(DenseRealSpace::new(RealMetric::NegDot, None).distance(b, c), -11.0);
    }

    #[test]
    fn test_mismatched_lengths_are_farthest() {
        let space = DenseRealSpace::new(RealMetric::L2, None);
        let d = space.distance(PointRef::Real(&[1.0]), PointRef::Real(&[1.0, 2.0]));
        assert_eq!(d, f32::MAX);
    }

    #[test]
    fn test_int_metrics() {
        let a = PointRef::Integer(&[1, 2, 3]);
        let b = PointRef::Integer(&[2, 4, 6]);
        assert_eq!(DenseIntSpace::new(IntMetric::L1, None).distance(a, b), 6);
        assert_eq!(DenseIntSpace::new(IntMetric::L2Sqr, None).distance(a, b), 14);
    }
}
