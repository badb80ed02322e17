//! Space-filling seed designs.

use lb_types::{LbResult, NormalizedPoint, ParameterSpace, PhysicalPoint};
use rand::seq::SliceRandom;
use rand::Rng;

/// Latin hypercube in the unit cube: `n` rows of `dim` coordinates.
///
/// Each axis is split into `n` equal strata with one uniform draw per
/// stratum, then the axis is shuffled independently, so every stratum of
/// every axis holds exactly one sample. Random draws are consumed axis by
/// axis: `n` uniforms followed by one shuffle.
pub fn latin_hypercube_unit<R: Rng + ?Sized>(
    dim: usize,
    n: usize,
    rng: &mut R,
) -> Vec<NormalizedPoint> {
    let mut rows = vec![vec![0.0; dim]; n];
    if n == 0 {
        return rows;
    }

    let scale = n as f64;
    for axis in 0..dim {
        let mut strata: Vec<f64> = (0..n)
            .map(|i| (i as f64 + rng.random::<f64>()) / scale)
            .collect();
        strata.shuffle(rng);
        for (row, value) in rows.iter_mut().zip(strata) {
            row[axis] = value;
        }
    }

    rows
}

/// Latin hypercube denormalized into physical points, in trial order.
pub fn latin_hypercube<R: Rng + ?Sized>(
    space: &ParameterSpace,
    n: usize,
    rng: &mut R,
) -> LbResult<Vec<PhysicalPoint>> {
    latin_hypercube_unit(space.dim(), n, rng)
        .iter()
        .map(|row| space.denormalize(row))
        .collect()
}

/// A single uniform draw from `[0, 1)^dim`.
pub fn uniform_unit_point<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> NormalizedPoint {
    (0..dim).map(|_| rng.random::<f64>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn assert_stratified(values: &mut [f64]) {
        let n = values.len();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (i, v) in values.iter().enumerate() {
            let stratum = (v * n as f64).floor() as usize;
            assert_eq!(stratum, i, "value {v} landed in stratum {stratum}, expected {i}");
        }
    }

    #[test]
    fn every_axis_has_one_sample_per_stratum() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for &(dim, n) in &[(1, 1), (1, 10), (3, 7), (5, 32)] {
            let rows = latin_hypercube_unit(dim, n, &mut rng);
            assert_eq!(rows.len(), n);
            for axis in 0..dim {
                let mut column: Vec<f64> = rows.iter().map(|r| r[axis]).collect();
                assert_stratified(&mut column);
            }
        }
    }

    #[test]
    fn axes_are_permuted_independently() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let rows = latin_hypercube_unit(2, 40, &mut rng);
        // A lattice would put both coordinates of a row in the same stratum.
        let diagonal = rows
            .iter()
            .filter(|r| (r[0] * 40.0).floor() == (r[1] * 40.0).floor())
            .count();
        assert!(diagonal < 40);
    }

    #[test]
    fn zero_samples_yield_empty_design() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(latin_hypercube_unit(3, 0, &mut rng).is_empty());

        let space = ParameterSpace::from_bounds([("x", 0.0, 1.0)]).unwrap();
        assert!(latin_hypercube(&space, 0, &mut rng).unwrap().is_empty());
    }

    #[test]
    fn physical_design_stays_in_bounds() {
        let space =
            ParameterSpace::from_bounds([("noise_amp", 0.0, 5.0), ("noise_freq", 0.0, 1000.0)])
                .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let design = latin_hypercube(&space, 16, &mut rng).unwrap();
        assert_eq!(design.len(), 16);
        for point in &design {
            for param in space.parameters() {
                let v = point.get(param.name()).unwrap();
                assert!(param.contains(v), "{} = {v} out of bounds", param.name());
            }
        }
    }

    #[test]
    fn same_seed_same_design() {
        let a = latin_hypercube_unit(3, 9, &mut ChaCha8Rng::seed_from_u64(5));
        let b = latin_hypercube_unit(3, 9, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_point_is_in_unit_cube() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let p = uniform_unit_point(4, &mut rng);
            assert_eq!(p.len(), 4);
            assert!(p.iter().all(|c| (0.0..1.0).contains(c)));
        }
    }
}
