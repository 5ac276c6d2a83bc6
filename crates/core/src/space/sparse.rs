use super::{no_params, Space};
use crate::point::{PointKind, PointRef};
use crate::vector::sparse::{sparse_cosine_distance, sparse_dot};
use crate::{Params, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseMetric {
    Cosine,
    NegDot,
}

/// Real-valued space over sparse vectors
#[derive(Debug)]
pub struct SparseSpace {
    metric: SparseMetric,
}

impl SparseSpace {
    pub fn new(metric: SparseMetric) -> Self {
        Self { metric }
    }

    pub(super) fn create(metric: SparseMetric, params: &Params) -> Result<Box<dyn Space<f32>>> {
        no_params(params)?;
        Ok(Box::new(Self::new(metric)))
    }
}

impl Space<f32> for SparseSpace {
    fn name(&self) -> &'static str {
        match self.metric {
            SparseMetric::Cosine => "cosinesimil_sparse",
            SparseMetric::NegDot => "negdotprod_sparse",
        }
    }

    fn point_kind(&self) -> PointKind {
        PointKind::Sparse
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> f32 {
        let (PointRef::Sparse(a), PointRef::Sparse(b)) = (a, b) else {
            return f32::MAX;
        };

        match self.metric {
            SparseMetric::Cosine => sparse_cosine_distance(a, b),
            SparseMetric::NegDot => -sparse_dot(a, b),
        }
    }
}
