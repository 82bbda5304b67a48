use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::{Boundary, System, Vector};
use super::SimpleSystem;

/// Four particles on a periodic ring of length 10
pub fn ring() -> SimpleSystem<1> {
    let mut system = SimpleSystem::new(Boundary::periodic([10.0]));
    for x in [0.0, 3.0, 6.0, 9.0] {
        system.add_particle(0, Vector::new([x]));
    }
    return system;
}

/// Particles at random positions inside the box, with types distributed
/// between `0..n_types`
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

/// All pairs `i < j` closer than `range`, using every periodic image of `j`
/// within a few boxes. The values are the distance vectors for each image.
pub fn reference_pairs<const D: usize, S: System<D>>(system: &S, range: f64) -> BTreeMap<(usize, usize), Vec<Vector<D>>> {
    let boundary = system.boundary();
    let positions = system.positions();

    let mut extent = [0; D];
    for k in 0..D {
        if boundary.is_periodic(k) {
            extent[k] = f64::ceil(range / boundary.distances_between_faces()[k]) as i32 + 1;
        }
    }

    let mut pairs = BTreeMap::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let mut dr = positions[j] - positions[i];
            boundary.nearest_image(&mut dr);

            for_each_image(extent, |images| {
                let image = dr + boundary.image_offset(images);
                if image.norm2() < range * range {
                    pairs.entry((i, j)).or_insert_with(Vec::new).push(image);
                }
            });
        }
    }
    return pairs;
}

fn for_each_image<const D: usize>(extent: [i32; D], mut function: impl FnMut([i32; D])) {
    let widths = extent.map(|e| (2 * e + 1) as usize);
    let total = widths.iter().product::<usize>();
    for flat in 0..total {
        let mut remaining = flat;
        let mut images = [0; D];
        for k in 0..D {
            images[k] = (remaining % widths[k]) as i32 - extent[k];
            remaining /= widths[k];
        }
        function(images);
    }
}
