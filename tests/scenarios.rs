//! End-to-end scenarios (spec.md section 8): a handful of the named
//! scenarios driven entirely through the public `Space`/`IslandManager`
//! API, checking the exact numeric expectations spec.md gives for each.

use fixrigid3d::dynamics::{
    DeactivationConfig, IslandManager, Joint, JointKind, JointLimit, RigidBodyBuilder, RigidBodySet,
};
use fixrigid3d::geometry::{BoxShape, Shape, Sphere};
use fixrigid3d::math::{Fix64, Quaternion, Vector3};
use fixrigid3d::pipeline::Space;

fn dt() -> Fix64 {
    Fix64::from_ratio(1, 60)
}

fn ground(half_y: f64) -> Shape {
    Shape::Box(BoxShape { half_extents: Vector3::new(Fix64::from_f64(50.0), Fix64::from_f64(half_y), Fix64::from_f64(50.0)) })
}

#[test]
fn box_on_plane_settles_within_tolerance_and_goes_to_sleep() {
    let mut space = Space::new();
    space
        .add_static(
            RigidBodyBuilder::fixed(ground(0.5)).position(Vector3::new(Fix64::ZERO, Fix64::from_f64(-0.5), Fix64::ZERO)).build(),
        )
        .unwrap();

    let half = Vector3::splat(Fix64::from_f64(0.5));
    let mut box_material = fixrigid3d::dynamics::Material::default();
    box_material.kinetic_friction = Fix64::from_f64(0.5);
    box_material.static_friction = Fix64::from_f64(0.5);
    box_material.bounciness = Fix64::ZERO;

    let falling = space
        .add_entity(
            RigidBodyBuilder::dynamic(Shape::Box(BoxShape { half_extents: half }))
                .position(Vector3::new(Fix64::ZERO, Fix64::from_f64(1.5), Fix64::ZERO))
                .mass(Fix64::ONE)
                .material(box_material)
                .build(),
        )
        .unwrap();

    for _ in 0..120 {
        space.step(dt());
    }

    let body = space.bodies().get(falling).unwrap();
    let y = body.pose.position.y.to_f64();
    assert!((0.500 - 0.011..=0.500 + 0.011).contains(&y), "box settled at unexpected height: {y}");
    assert!(
        body.linear_velocity.length().unwrap_or(Fix64::ZERO).to_f64() <= space.parameters.velocity_lower_limit.to_f64() + 1e-3,
        "box should have nearly stopped"
    );
    assert!(body.activity.sleeping, "a box at rest for long enough should have gone to sleep");
}

#[test]
fn stacked_spheres_settle_at_the_expected_heights() {
    let mut space = Space::new();
    space
        .add_static(
            RigidBodyBuilder::fixed(ground(0.5)).position(Vector3::new(Fix64::ZERO, Fix64::from_f64(-0.5), Fix64::ZERO)).build(),
        )
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let y = 0.7 + i as f64 * 1.05;
        let handle = space
            .add_entity(
                RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.5) }))
                    .position(Vector3::new(Fix64::ZERO, Fix64::from_f64(y), Fix64::ZERO))
                    .mass(Fix64::ONE)
                    .build(),
            )
            .unwrap();
        handles.push(handle);
    }

    for _ in 0..600 {
        space.step(dt());
    }

    let expected = [0.5, 1.5, 2.5, 3.5];
    for (handle, expected_y) in handles.iter().zip(expected) {
        let y = space.bodies().get(*handle).unwrap().pose.position.y.to_f64();
        assert!((expected_y - 0.01..=expected_y + 0.01).contains(&y), "sphere settled at {y}, expected near {expected_y}");
    }
    assert!(handles.iter().all(|h| space.bodies().get(*h).unwrap().activity.sleeping), "the whole stack should be inactive");
}

#[test]
fn distance_limit_pendulum_converges_into_range() {
    let mut space = Space::new();
    let anchor = space
        .add_entity(RigidBodyBuilder::kinematic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.1) })).build())
        .unwrap();
    let bob = space
        .add_entity(
            RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE }))
                .position(Vector3::new(Fix64::from_f64(3.0), Fix64::ZERO, Fix64::ZERO))
                .mass(Fix64::ONE)
                .gravity_override(Vector3::ZERO)
                .build(),
        )
        .unwrap();
    space
        .add_joint(Joint::new(anchor, bob, JointKind::Ball).limit(JointLimit::Distance { min: Fix64::ONE, max: Fix64::TWO }))
        .unwrap();

    let separation = |space: &Space| {
        (space.bodies().get(bob).unwrap().pose.position - space.bodies().get(anchor).unwrap().pose.position)
            .length()
            .unwrap_or(Fix64::ZERO)
    };

    let initial_error = JointLimit::scalar_error(Fix64::ONE, Fix64::TWO, separation(&space));
    assert_eq!(initial_error.to_f64(), 1.0);

    for _ in 0..60 {
        space.step(dt());
    }

    let final_separation = separation(&space).to_f64();
    assert!((0.999..=2.001).contains(&final_separation), "pendulum separation {final_separation} left the limit's range");
    let final_error = JointLimit::scalar_error(Fix64::ONE, Fix64::TWO, Fix64::from_f64(final_separation));
    assert_eq!(final_error, Fix64::ZERO);
}

#[test]
fn swing_limit_stabilizes_near_its_maximum_angle() {
    let mut space = Space::new();
    let anchor = space
        .add_entity(RigidBodyBuilder::kinematic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.1) })).build())
        .unwrap();
    let arm = space
        .add_entity(
            RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.2) }))
                .position(Vector3::new(Fix64::from_f64(1.0), Fix64::ZERO, Fix64::ZERO))
                .mass(Fix64::ONE)
                .gravity_override(Vector3::ZERO)
                // Drive past the pi/4 limit; the limit row must pull it back.
                .angular_velocity(Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::from_f64(6.0)))
                .build(),
        )
        .unwrap();
    space
        .add_joint(
            Joint::new(anchor, arm, JointKind::Ball)
                .limit(JointLimit::Swing { axis: Vector3::Z, maximum_angle: Fix64::QUARTER_PI }),
        )
        .unwrap();

    for _ in 0..300 {
        space.step(dt());
    }

    let relative = space.bodies().get(anchor).unwrap().pose.orientation.conjugate()
        * space.bodies().get(arm).unwrap().pose.orientation;
    let (swing, _) = relative.swing_twist(Vector3::Z);
    let angle = swing.angle().to_f64();
    assert!(angle <= std::f64::consts::FRAC_PI_4 + 0.35, "swing angle {angle} overshot the limit by more than the allowed margin");
}

#[test]
fn ccd_bullet_does_not_tunnel_through_a_thin_wall() {
    let plane_half_thickness = 0.5;
    let plane_shape = || Shape::Box(BoxShape { half_extents: Vector3::new(Fix64::from_f64(50.0), Fix64::from_f64(50.0), Fix64::from_f64(plane_half_thickness)) });
    let plane_position = Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::from_f64(10.0 + plane_half_thickness));

    let mut with_ccd = Space::new();
    with_ccd.add_static(RigidBodyBuilder::fixed(plane_shape()).position(plane_position).build()).unwrap();
    let bullet = with_ccd
        .add_entity(
            RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.1) }))
                .linear_velocity(Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::from_f64(1000.0)))
                .gravity_override(Vector3::ZERO)
                .mass(Fix64::ONE)
                .ccd_enabled(true)
                .build(),
        )
        .unwrap();
    with_ccd.step(dt());
    let z_with_ccd = with_ccd.bodies().get(bullet).unwrap().pose.position.z.to_f64();
    assert!(z_with_ccd <= 10.0 + 1e-2, "CCD-enabled bullet should stop at the wall's near face, landed at z={z_with_ccd}");

    let mut without_ccd = Space::new();
    without_ccd.add_static(RigidBodyBuilder::fixed(plane_shape()).position(plane_position).build()).unwrap();
    let bullet_no_ccd = without_ccd
        .add_entity(
            RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::from_f64(0.1) }))
                .linear_velocity(Vector3::new(Fix64::ZERO, Fix64::ZERO, Fix64::from_f64(1000.0)))
                .gravity_override(Vector3::ZERO)
                .mass(Fix64::ONE)
                .ccd_enabled(false)
                .build(),
        )
        .unwrap();
    without_ccd.step(dt());
    let z_without_ccd = without_ccd.bodies().get(bullet_no_ccd).unwrap().pose.position.z.to_f64();
    assert!(z_without_ccd > 10.0 + plane_half_thickness, "regression guard: discrete integration should tunnel through the wall, landed at z={z_without_ccd}");
}

#[test]
fn island_split_isolates_the_disconnected_tail_within_the_attempt_budget() {
    fn resting_body() -> fixrigid3d::dynamics::RigidBody {
        RigidBodyBuilder::dynamic(Shape::Sphere(Sphere { radius: Fix64::ONE })).build()
    }

    let mut bodies = RigidBodySet::new();
    let mut islands = IslandManager::new();
    let a = bodies.insert(resting_body());
    let b = bodies.insert(resting_body());
    let c = bodies.insert(resting_body());

    islands.add_connection(&mut bodies, a, b);
    islands.add_connection(&mut bodies, b, c);

    let root_before = islands.ensure_member(&mut bodies, a);
    assert_eq!(
        islands.find_root(islands.ensure_member(&mut bodies, c)),
        islands.find_root(root_before),
        "a-b-c should start out as a single island"
    );

    islands.remove_connection(b, c);

    let config = DeactivationConfig::default();
    let ticks = (1.0 / config.max_split_attempts_fraction.to_f64()).ceil() as usize;
    for _ in 0..ticks {
        islands.process_removals(&mut bodies, &config);
    }

    let root_a = islands.find_root(bodies.get(a).unwrap().activity.island.unwrap());
    let root_c = islands.find_root(bodies.get(c).unwrap().activity.island.unwrap());
    assert_ne!(root_a, root_c, "{{c}} should be its own island within ceil(1/max_split_attempts_fraction) ticks");
}
