use super::{read_dimension, Space};
use crate::point::{PointKind, PointRef};
use crate::vector::ops::{bit_hamming, l2_squared_u8};
use crate::{Params, Result};

/// Squared Euclidean distance over fixed-width byte vectors (SIFT-style)
#[derive(Debug)]
pub struct ByteL2SqrSpace {
    dim: Option<usize>,
}

impl ByteL2SqrSpace {
    pub fn new(dim: Option<usize>) -> Self {
        Self { dim }
    }

    pub(super) fn create(params: &Params) -> Result<Box<dyn Space<f32>>> {
        Ok(Box::new(Self::new(read_dimension(params)?)))
    }
}

impl Space<f32> for ByteL2SqrSpace {
    fn name(&self) -> &'static str {
        "l2sqr_sift"
    }

    fn point_kind(&self) -> PointKind {
        PointKind::ByteVector
    }

    fn dimension(&self) -> Option<usize> {
        self.dim
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> f32 {
        match (a, b) {
            (PointRef::Bytes(a), PointRef::Bytes(b)) if a.len() == b.len() => l2_squared_u8(a, b),
            _ => f32::MAX,
        }
    }
}

/// Hamming distance over packed bit vectors
#[derive(Debug)]
pub struct BitHammingSpace {
    dim: Option<usize>,
}

impl BitHammingSpace {
    pub fn new(dim: Option<usize>) -> Self {
        Self { dim }
    }

    pub(super) fn create(params: &Params) -> Result<Box<dyn Space<i32>>> {
        Ok(Box::new(Self::new(read_dimension(params)?)))
    }
}

impl Space<i32> for BitHammingSpace {
    fn name(&self) -> &'static str {
        "bit_hamming"
    }

    fn point_kind(&self) -> PointKind {
        PointKind::ByteVector
    }

    fn dimension(&self) -> Option<usize> {
        self.dim
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> i32 {
        match (a, b) {
            (PointRef::Bytes(a), PointRef::Bytes(b)) if a.len() == b.len() => bit_hamming(a, b),
            _ => i32::MAX,
        }
    }
}
