#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use vicinity::{Boundary, NeighborListManager, NeighborPolicy, PotentialTable, SimpleSystem, System, TruncatedPotential, Vector};

/// A single stored pair: the two particles, and the distance vector rounded
/// to make it usable as a key
pub type Pair = (usize, usize, Vec<i64>);

/// Potential table where all types interact with the same range
pub fn potentials(n_types: usize, range: f64) -> PotentialTable {
    let mut table = PotentialTable::new(n_types);
    for a in 0..n_types {
        for b in a..n_types {
            table.set(a, b, Arc::new(TruncatedPotential { range: range })).expect("invalid potential");
        }
    }
    return table;
}

/// Particles at random positions inside the box
pub fn random_system<const D: usize>(n_particles: usize, boundary: Boundary<D>, n_types: usize, seed: u64) -> SimpleSystem<D> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut system = SimpleSystem::new(boundary);
    for _ in 0..n_particles {
        let fractional = Vector::new(std::array::from_fn(|_| rng.gen::<f64>()));
        let particle_type = rng.gen_range(0..n_types);
        system.add_particle(particle_type, boundary.cartesian(fractional));
    }
    return system;
}

/// Move all particles by a random displacement with components in
/// `[-max, max]`
pub fn random_moves<const D: usize>(system: &mut SimpleSystem<D>, rng: &mut StdRng, max: f64) {
    for position in system.positions_mut() {
        for k in 0..D {
            position[k] += rng.gen_range(-max..=max);
        }
    }
}

fn key<const D: usize>(dr: Vector<D>) -> Vec<i64> {
    dr.iter().map(|x| (x * 1e6).round() as i64).collect()
}

/// All pairs `i < j` closer than `range` with all the periodic images of `j`,
/// computed by brute force
pub fn reference_pairs<const D: usize, S: System<D>>(system: &S, range: f64, interacts: impl Fn(usize, usize) -> bool) -> Vec<Pair> {
    let boundary = system.boundary();
    let positions = system.positions();
    let types = system.types();

    let mut extent = [0; D];
    for k in 0..D {
        if boundary.is_periodic(k) {
            extent[k] = f64::ceil(range / boundary.distances_between_faces()[k]) as i32 + 1;
        }
    }
    let widths = extent.map(|e| (2 * e + 1) as usize);

    let mut pairs = Vec::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            if !interacts(types[i], types[j]) {
                continue;
            }

            let mut dr = positions[j] - positions[i];
            boundary.nearest_image(&mut dr);
            for flat in 0..widths.iter().product::<usize>() {
                let mut remaining = flat;
                let mut images = [0; D];
                for k in 0..D {
                    images[k] = (remaining % widths[k]) as i32 - extent[k];
                    remaining /= widths[k];
                }

                let image = dr + boundary.image_offset(images);
                if image.norm2() < range * range {
                    pairs.push((i, j, key(image)));
                }
            }
        }
    }
    pairs.sort_unstable();
    return pairs;
}

/// All the pairs in the up lists of the manager
pub fn up_pairs<const D: usize, P: NeighborPolicy<D>>(manager: &NeighborListManager<D, P>, system: &SimpleSystem<D>) -> Vec<Pair> {
    let iterator = manager.iterator(system.positions());
    let mut pairs = Vec::new();
    for i in 0..system.size() {
        iterator.iter_up_neighbors(i, |j, dr| pairs.push((i, j, key(dr))));
    }
    pairs.sort_unstable();
    return pairs;
}

/// All the pairs in the down lists of the manager, as `(j, i, -dr)` so they
/// can be compared with the up pairs
pub fn down_pairs<const D: usize, P: NeighborPolicy<D>>(manager: &NeighborListManager<D, P>, system: &SimpleSystem<D>) -> Vec<Pair> {
    let iterator = manager.iterator(system.positions());
    let mut pairs = Vec::new();
    for i in 0..system.size() {
        iterator.iter_down_neighbors(i, |j, dr| pairs.push((j, i, key(-dr))));
    }
    pairs.sort_unstable();
    return pairs;
}

/// Count how many times each unordered pair appears
pub fn count_pairs(pairs: &[Pair]) -> BTreeMap<(usize, usize), usize> {
    let mut counts = BTreeMap::new();
    for &(i, j, _) in pairs {
        *counts.entry((usize::min(i, j), usize::max(i, j))).or_insert(0) += 1;
    }
    return counts;
}
