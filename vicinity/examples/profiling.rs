use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use vicinity::{Boundary, NeighborListManager, NeighborListParameters, PotentialTable, SimpleSystem, System, TruncatedPotential, Vector3D};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let n_particles = match std::env::args().nth(1) {
        Some(value) => value.parse()?,
        None => 10000,
    };

    // enable collection of profiling data
    time_graph::enable_data_collection(true);
    // clear any existing collected data
    time_graph::clear_collected_data();

    // run the simulation
    let updates = random_walk(n_particles, 200)?;
    println!("{} particles, {} neighbor lists updates", n_particles, updates);

    // get the call graph and display it
    let graph = time_graph::get_full_graph();
    // (this requires the "table" feature for the time_graph crate)
    println!("{}", graph.as_short_table());

    // also available for saving profiling data to the disk & future analysis
    // (this requires the "json" feature for the time_graph crate)
    println!("{}", graph.as_json());

    Ok(())
}

/// Move particles randomly in a periodic box, keeping the neighbor lists up
/// to date and counting the close pairs at every step
fn random_walk(n_particles: usize, n_steps: usize) -> Result<u64, Box<dyn std::error::Error>> {
    let length = f64::cbrt(n_particles as f64 / 0.8);
    let mut rng = StdRng::seed_from_u64(0xdeadbeef);

    let mut system = SimpleSystem::new(Boundary::cubic(length));
    for _ in 0..n_particles {
        let position = Vector3D::new([
            length * rng.gen::<f64>(),
            length * rng.gen::<f64>(),
            length * rng.gen::<f64>(),
        ]);
        system.add_particle(0, position);
    }

    let mut potentials = PotentialTable::new(1);
    potentials.set(0, 0, Arc::new(TruncatedPotential { range: 2.5 }))?;

    let parameters = NeighborListParameters::from_json(r#"{
        "neighbor_range": 3.0,
        "cell_radius": 2
    }"#)?;
    let mut manager = NeighborListManager::<3>::new(parameters, potentials)?;
    manager.init(&system)?;

    let mut total_close_pairs = 0_usize;
    for _ in 0..n_steps {
        time_graph::spanned!("Random displacements", {
            for position in system.positions_mut() {
                for k in 0..3 {
                    position[k] += rng.gen_range(-0.05..0.05);
                }
            }
        });

        manager.check_update_neighbors(&system)?;

        let close_pairs = time_graph::spanned!("Neighbors iteration", {
            let iterator = manager.iterator(system.positions());
            let mut close_pairs = 0_usize;
            for i in 0..system.size() {
                iterator.iter_up_neighbors(i, |_, dr| {
                    if dr.norm2() < 1.0 {
                        close_pairs += 1;
                    }
                });
            }
            close_pairs
        });
        total_close_pairs += close_pairs;
    }

    println!("{:.1} pairs closer than 1 per step", total_close_pairs as f64 / n_steps as f64);
    Ok(manager.num_updates())
}
