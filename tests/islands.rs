//! Island merge/split/deactivation invariants (spec.md section 8): a chain
//! of N connected bodies merges within N-1 additions, removing an edge
//! eventually isolates the disconnected tail, and a long-resting island
//! goes to sleep.

use fixrigid3d::dynamics::{DeactivationConfig, IslandManager, RigidBody, RigidBodyBuilder, RigidBodySet};
use fixrigid3d::geometry::{Shape, Sphere};
use fixrigid3d::math::{Fix64, Vector3};

fn sleepy_body() -> RigidBody {
    RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE })).build()
}

#[test]
fn chain_of_n_bodies_merges_to_one_island_within_n_minus_one_connections() {
    const N: usize = 7;
    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let handles: Vec<_> = (0..N).map(|_| bodies.insert(sleepy_body())).collect();

    let mut added = 0;
    for pair in handles.windows(2) {
        islands.add_connection(&mut bodies, pair[0], pair[1]);
        added += 1;
    }
    assert_eq!(added, N - 1);

    let root0 = islands.ensure_member(&mut bodies, handles[0]);
    for &h in &handles[1..] {
        let root = islands.ensure_member(&mut bodies, h);
        assert_eq!(islands.find_root(root), islands.find_root(root0), "chain should collapse to a single island");
    }
}

#[test]
fn disjoint_pairs_stay_in_separate_islands() {
    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let a = bodies.insert(sleepy_body());
    let b = bodies.insert(sleepy_body());
    let c = bodies.insert(sleepy_body());
    let d = bodies.insert(sleepy_body());

    islands.add_connection(&mut bodies, a, b);
    islands.add_connection(&mut bodies, c, d);

    let root_a = islands.ensure_member(&mut bodies, a);
    let root_b = islands.ensure_member(&mut bodies, b);
    let root_c = islands.ensure_member(&mut bodies, c);
    assert_eq!(islands.find_root(root_a), islands.find_root(root_b));
    assert_ne!(islands.find_root(root_a), islands.find_root(root_c));
}

#[test]
fn removing_the_middle_connection_of_a_chain_splits_within_the_attempt_budget() {
    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let a = bodies.insert(sleepy_body());
    let b = bodies.insert(sleepy_body());
    let c = bodies.insert(sleepy_body());
    let d = bodies.insert(sleepy_body());

    islands.add_connection(&mut bodies, a, b);
    islands.add_connection(&mut bodies, b, c);
    islands.add_connection(&mut bodies, c, d);
    islands.remove_connection(b, c);

    let config = DeactivationConfig::default();
    let attempts = ((1.0 / config.max_split_attempts_fraction.to_f64()).ceil() as usize).max(config.min_split_attempts);
    for _ in 0..attempts {
        islands.process_removals(&mut bodies, &config);
    }

    let root_a = islands.find_root(bodies.get(a).unwrap().activity.island.unwrap());
    let root_d = islands.find_root(bodies.get(d).unwrap().activity.island.unwrap());
    assert_ne!(root_a, root_d, "splitting b-c should separate {{a,b}} from {{c,d}}");
}

#[test]
fn a_resting_island_goes_to_sleep_after_the_minimum_low_velocity_time() {
    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let mut resting = sleepy_body();
    resting.linear_velocity = Vector3::ZERO;
    resting.angular_velocity = Vector3::ZERO;
    let handle = bodies.insert(resting);
    islands.ensure_member(&mut bodies, handle);

    let config = DeactivationConfig::default();
    let dt = Fix64::from_ratio(1, 60);
    let ticks_needed = (config.low_velocity_time_minimum.to_f64() / dt.to_f64()).ceil() as usize + 1;
    for _ in 0..ticks_needed {
        islands.update_deactivation(&mut bodies, dt, &config);
    }

    assert!(bodies.get(handle).unwrap().activity.sleeping, "a body at rest past low_velocity_time_minimum should sleep");
}

#[test]
fn waking_a_sleeping_body_clears_its_sleeping_flag() {
    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let mut resting = sleepy_body();
    resting.linear_velocity = Vector3::ZERO;
    resting.angular_velocity = Vector3::ZERO;
    let handle = bodies.insert(resting);
    islands.ensure_member(&mut bodies, handle);

    let config = DeactivationConfig::default();
    let dt = Fix64::from_ratio(1, 60);
    let ticks_needed = (config.low_velocity_time_minimum.to_f64() / dt.to_f64()).ceil() as usize + 1;
    for _ in 0..ticks_needed {
        islands.update_deactivation(&mut bodies, dt, &config);
    }
    assert!(bodies.get(handle).unwrap().activity.sleeping);

    islands.wake_island(&mut bodies, handle);
    assert!(!bodies.get(handle).unwrap().activity.sleeping);
}
