use super::{no_params, Space};
use crate::point::{PointKind, PointRef};
use crate::vector::edit::{levenshtein, normalized_levenshtein};
use crate::{Params, Result};

/// Edit distance over byte strings, integer valued
#[derive(Debug, Default)]
pub struct LevenSpace;

impl LevenSpace {
    pub(super) fn create(params: &Params) -> Result<Box<dyn Space<i32>>> {
        no_params(params)?;
        Ok(Box::new(Self))
    }
}

impl Space<i32> for LevenSpace {
    fn name(&self) -> &'static str {
        "leven"
    }

    fn point_kind(&self) -> PointKind {
        PointKind::String
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> i32 {
        match (a, b) {
            (PointRef::Text(a), PointRef::Text(b)) => {
                i32::try_from(levenshtein(a, b)).unwrap_or(i32::MAX)
            }
            _ => i32::MAX,
        }
    }
}

/// Edit distance normalized by the longer string, real valued
#[derive(Debug, Default)]
pub struct NormLevenSpace;

impl NormLevenSpace {
    pub(super) fn create(params: &Params) -> Result<Box<dyn Space<f32>>> {
        no_params(params)?;
        Ok(Box::new(Self))
    }
}

impl Space<f32> for NormLevenSpace {
    fn name(&self) -> &'static str {
        "normleven"
    }

    fn point_kind(&self) -> PointKind {
        PointKind::String
    }

    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> f32 {
        match (a, b) {
            (PointRef::Text(a), PointRef::Text(b)) => normalized_levenshtein(a, b),
            _ => f32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leven() {
        let d = LevenSpace.distance(PointRef::Text(b"kitten"), PointRef::Text(b"sitting"));
        assert_eq!(d, 3);

        let d = NormLevenSpace.distance(PointRef::Text(b"ab"), PointRef::Text(b"ac"));
        assert!((d - 0.5).abs() < 1e-6);
    }
}
