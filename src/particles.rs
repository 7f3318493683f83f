use glam::Vec3;
use rand::Rng;

/// Number of fireflies drifting around the portal.
pub const FIREFLY_COUNT: usize = 30;

/// Half the side of the square the fireflies are scattered over.
pub const FIELD_HALF_EXTENT: f32 = 2.0;
pub const FIELD_HEIGHT: f32 = 2.0;

/// Point cloud with one position and one scale per point.
///
/// Buffers are generated once and never mutated; the drift is computed in
/// the shader from the elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct FireflyField {
    positions: Vec<f32>,
    scales: Vec<f32>,
}

impl FireflyField {
    pub fn generate<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let mut positions = Vec::with_capacity(count * 3);
        let mut scales = Vec::with_capacity(count);
        for _ in 0..count {
            positions.push((rng.gen::<f32>() - 0.5) * FIELD_HALF_EXTENT * 2.0);
            positions.push(rng.gen::<f32>() * FIELD_HEIGHT);
            positions.push((rng.gen::<f32>() - 0.5) * FIELD_HALF_EXTENT * 2.0);
            scales.push(rng.gen::<f32>());
        }
        Self { positions, scales }
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    /// Flat `xyz` triples.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec3, f32)> + '_ {
        self.positions
            .chunks_exact(3)
            .zip(&self.scales)
            .map(|(position, scale)| (Vec3::from_slice(position), *scale))
    }
}

/// Scatters `count` fireflies over the ground square.
pub fn generate_fireflies<R: Rng + ?Sized>(count: usize, rng: &mut R) -> FireflyField {
    FireflyField::generate(count, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn field_has_exact_count_and_bounds() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let field = generate_fireflies(FIREFLY_COUNT, &mut rng);
            assert_eq!(field.len(), 30);
            assert_eq!(field.positions().len(), 90);
            for (position, scale) in field.iter() {
                assert!((-2.0..=2.0).contains(&position.x));
                assert!((0.0..=2.0).contains(&position.y));
                assert!((-2.0..=2.0).contains(&position.z));
                assert!((0.0..=1.0).contains(&scale));
            }
        }
    }

    #[test]
    fn same_seed_gives_same_field() {
        let a = generate_fireflies(FIREFLY_COUNT, &mut StdRng::seed_from_u64(9));
        let b = generate_fireflies(FIREFLY_COUNT, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_field() {
        let field = generate_fireflies(0, &mut StdRng::seed_from_u64(1));
        assert!(field.is_empty());
        assert_eq!(field.iter().count(), 0);
    }
}
