use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use vicinity::{Boundary, CellIndex, SimpleSystem, Vector3D};

use criterion::{Criterion, BenchmarkId, black_box, criterion_group, criterion_main};

fn assign_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell assignment");
    group.noise_threshold(0.05);

    for &n_particles in black_box(&[1000, 10000, 100000]) {
        let length = f64::cbrt(n_particles as f64 / 0.8);
        let mut rng = StdRng::seed_from_u64(12);
        let mut system = SimpleSystem::new(Boundary::cubic(length));
        for _ in 0..n_particles {
            let position = Vector3D::new([
                // some particles outside of the box
                length * rng.gen_range(-0.5..1.5),
                length * rng.gen::<f64>(),
                length * rng.gen::<f64>(),
            ]);
            system.add_particle(0, position);
        }

        let mut cells = CellIndex::<3>::new(2).unwrap();
        cells.set_range(3.0).unwrap();
        cells.assign_cell_all(&system).unwrap();

        group.bench_function(BenchmarkId::from_parameter(n_particles), |b| b.iter(|| {
            cells.assign_cell_all(&system).unwrap();
        }));
    }
}

fn neighbor_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbor cells enumeration");
    group.noise_threshold(0.05);

    let system = SimpleSystem::new(Boundary::cubic(30.0));
    for cell_radius in black_box([1, 2, 3, 4]) {
        let mut cells = CellIndex::<3>::new(cell_radius).unwrap();
        cells.set_range(3.0).unwrap();
        cells.assign_cell_all(&system).unwrap();

        let cell = cells.cell_of_position(Vector3D::new([15.0, 15.0, 15.0])).expect("cells are not assigned");
        group.bench_function(format!("cell radius = {}", cell_radius), |b| b.iter(|| {
            cells.neighbor_cells(cell).map(|(other, _)| other).sum::<usize>()
        }));
    }
}

criterion_group!(cell_index, assign_cells, neighbor_cells);
criterion_main!(cell_index);
