//! End-to-end impact scenarios: narrow phase contacts fed through the
//! impact handler, checked against conservation and restitution laws.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use impact_collision::{find_contacts, CollisionGeometry, Shape, NEAR_TOLERANCE};
use impact_dynamics::{
    ContactConstraint, FrictionModel, ImpactHandler, ImpactHandlerConfig, UnilateralConstraint,
};
use impact_types::{BodyId, BodySet, DynamicBody, GeomId, RigidBody};
use nalgebra::{Isometry3, Matrix3, Point3, Vector3};

fn unit_sphere_body(id: u64, pos: Point3<f64>, vel: Vector3<f64>) -> RigidBody {
    // Solid unit-mass sphere of radius 1: I = 2/5 m r^2.
    RigidBody::new(BodyId::new(id), 1.0, Matrix3::identity() * 0.4, pos)
        .with_velocity(vel, Vector3::zeros())
}

fn sphere_geom(id: u64, body: u64, radius: f64, pos: Point3<f64>) -> CollisionGeometry {
    CollisionGeometry::new(
        GeomId::new(id),
        BodyId::new(body),
        Shape::sphere(radius),
        Isometry3::translation(pos.x, pos.y, pos.z),
    )
}

fn linear_velocity(bodies: &BodySet, id: u64) -> Vector3<f64> {
    let v = bodies.get(BodyId::new(id)).unwrap().velocity().clone_owned();
    Vector3::new(v[0], v[1], v[2])
}

#[test]
fn two_resting_spheres_under_gravity() {
    // Both spheres fall together for one step; the contact transmits no
    // impulse because the approach velocity is zero, and whatever it does
    // transmit is equal and opposite.
    let dt = 1.0 / 60.0;
    let g = Vector3::new(0.0, -9.81, 0.0);
    let delta = 1e-9;

    let mut bodies = BodySet::new();
    bodies.insert(Box::new(unit_sphere_body(0, Point3::origin(), g * dt)));
    bodies.insert(Box::new(unit_sphere_body(
        1,
        Point3::new(0.0, 2.0 - delta, 0.0),
        g * dt,
    )));

    let ga = sphere_geom(0, 0, 1.0, Point3::origin());
    let gb = sphere_geom(1, 1, 1.0, Point3::new(0.0, 2.0 - delta, 0.0));
    let contacts = find_contacts(&gb, &ga, NEAR_TOLERANCE);
    assert_eq!(contacts.len(), 1);

    let constraints: Vec<UnilateralConstraint> = contacts
        .iter()
        .map(|c| UnilateralConstraint::Contact(ContactConstraint::from_record(c)))
        .collect();

    let va_before = linear_velocity(&bodies, 0);
    let vb_before = linear_velocity(&bodies, 1);

    let mut handler = ImpactHandler::default();
    let report = handler
        .process_constraints(&mut bodies, constraints)
        .unwrap();
    assert_eq!(report.islands, 1);

    let va = linear_velocity(&bodies, 0);
    let vb = linear_velocity(&bodies, 1);

    // Momentum along the normal is exchanged symmetrically.
    assert_relative_eq!(
        (va - va_before).y,
        -(vb - vb_before).y,
        epsilon = 1e-10
    );
    // No tangential impulse on a frictionless head-on contact.
    assert_relative_eq!(va.x, va_before.x, epsilon = 1e-12);
    assert_relative_eq!(va.z, va_before.z, epsilon = 1e-12);
    // They fall together, so the impact changes nothing.
    assert_relative_eq!((va - va_before).norm(), 0.0, epsilon = 1e-9);
    assert_relative_eq!((vb - vb_before).norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn resting_sphere_on_fixed_sphere() {
    // A sphere pressed into a fixed one by a step of gravity: the impulse
    // cancels the approach exactly.
    let dt = 1.0 / 60.0;
    let g = Vector3::new(0.0, -9.81, 0.0);

    let mut bodies = BodySet::new();
    bodies.insert(Box::new(RigidBody::fixed(BodyId::new(0), Point3::origin())));
    bodies.insert(Box::new(unit_sphere_body(
        1,
        Point3::new(0.0, 2.0, 0.0),
        g * dt,
    )));

    let contact = ContactConstraint::new(
        GeomId::new(0),
        GeomId::new(1),
        BodyId::new(1),
        BodyId::new(0),
        Point3::new(0.0, 1.0, 0.0),
        Vector3::y(),
    );

    let mut handler = ImpactHandler::default();
    let report = handler
        .process_constraints(&mut bodies, vec![UnilateralConstraint::Contact(contact)])
        .unwrap();

    // Impulse magnitude is m * |g| * dt.
    assert_relative_eq!(report.impulses[0], 9.81 * dt, epsilon = 1e-9);
    let v = linear_velocity(&bodies, 1);
    assert_relative_eq!(v.y, 0.0, epsilon = 1e-9);
}

#[test]
fn sphere_on_box_penetrating() {
    // Box 2x2x2 at the origin (fixed), sphere r = 0.5 at (0, 1.3, 0)
    // moving down at 1 m/s.
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(RigidBody::fixed(BodyId::new(0), Point3::origin())));
    bodies.insert(Box::new(
        RigidBody::new(
            BodyId::new(1),
            1.0,
            Matrix3::identity() * 0.1,
            Point3::new(0.0, 1.3, 0.0),
        )
        .with_velocity(Vector3::new(0.0, -1.0, 0.0), Vector3::zeros()),
    ));

    let box_geom = CollisionGeometry::new(
        GeomId::new(0),
        BodyId::new(0),
        Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)),
        Isometry3::identity(),
    );
    let sph_geom = sphere_geom(1, 1, 0.5, Point3::new(0.0, 1.3, 0.0));

    // Sphere listed first so the contact treats it as body A.
    let contacts = find_contacts(&sph_geom, &box_geom, NEAR_TOLERANCE);
    assert_eq!(contacts.len(), 1);
    assert_relative_eq!(contacts[0].point.y, 1.0, epsilon = 1e-9);
    assert_relative_eq!(
        (contacts[0].normal - Vector3::y()).norm(),
        0.0,
        epsilon = 1e-12
    );

    let constraints = vec![UnilateralConstraint::Contact(ContactConstraint::from_record(
        &contacts[0],
    ))];
    let mut handler = ImpactHandler::default();
    handler.process_constraints(&mut bodies, constraints).unwrap();

    // Post-impulse normal velocity is non-negative.
    assert!(linear_velocity(&bodies, 1).y >= -1e-9);
}

#[test]
fn restitution_law_head_on() {
    // Post-impulse relative normal velocity = -eps * pre-impulse value.
    for eps in [0.0, 0.5, 1.0] {
        let mut bodies = BodySet::new();
        bodies.insert(Box::new(unit_sphere_body(
            0,
            Point3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        )));
        bodies.insert(Box::new(unit_sphere_body(1, Point3::origin(), Vector3::zeros())));

        let contact = ContactConstraint::new(
            GeomId::new(0),
            GeomId::new(1),
            BodyId::new(0),
            BodyId::new(1),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::y(),
        )
        .with_restitution(eps);

        let mut handler = ImpactHandler::default();
        handler
            .process_constraints(&mut bodies, vec![UnilateralConstraint::Contact(contact)])
            .unwrap();

        let rel = linear_velocity(&bodies, 0).y - linear_velocity(&bodies, 1).y;
        assert_relative_eq!(rel, eps * 1.0, epsilon = 1e-8);
    }
}

#[test]
fn three_body_chain_dissipates() {
    // Three aligned touching spheres, the end one struck: with eps = 0 the
    // impact never adds kinetic energy.
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(unit_sphere_body(0, Point3::origin(), Vector3::zeros())));
    bodies.insert(Box::new(unit_sphere_body(
        1,
        Point3::new(0.0, 2.0, 0.0),
        Vector3::zeros(),
    )));
    bodies.insert(Box::new(unit_sphere_body(
        2,
        Point3::new(0.0, 4.0, 0.0),
        Vector3::new(0.0, -2.0, 0.0),
    )));

    let mk = |a: u64, b: u64, y: f64| {
        UnilateralConstraint::Contact(ContactConstraint::new(
            GeomId::new(a),
            GeomId::new(b),
            BodyId::new(a),
            BodyId::new(b),
            Point3::new(0.0, y, 0.0),
            Vector3::y(),
        ))
    };
    // Normals point from the lower body (B) into the upper body (A).
    let constraints = vec![mk(1, 0, 1.0), mk(2, 1, 3.0)];

    let ke_pre = bodies.total_kinetic_energy();
    let mut handler = ImpactHandler::default();
    let report = handler
        .process_constraints(&mut bodies, constraints)
        .unwrap();
    assert_eq!(report.islands, 1);

    let ke_post = bodies.total_kinetic_energy();
    assert!(
        ke_post <= ke_pre + 1e-9,
        "kinetic energy grew: {ke_pre} -> {ke_post}"
    );

    // All contacts end non-approaching.
    let v0 = linear_velocity(&bodies, 0).y;
    let v1 = linear_velocity(&bodies, 1).y;
    let v2 = linear_velocity(&bodies, 2).y;
    assert!(v1 - v0 >= -1e-9);
    assert!(v2 - v1 >= -1e-9);
}

#[test]
fn impact_idempotence() {
    // Solving again immediately with the updated velocities produces
    // negligible impulses.
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(unit_sphere_body(
        0,
        Point3::new(0.0, 2.0, 0.0),
        Vector3::new(0.0, -3.0, 0.0),
    )));
    bodies.insert(Box::new(unit_sphere_body(1, Point3::origin(), Vector3::zeros())));

    let contact = || {
        UnilateralConstraint::Contact(ContactConstraint::new(
            GeomId::new(0),
            GeomId::new(1),
            BodyId::new(0),
            BodyId::new(1),
            Point3::new(0.0, 1.0, 0.0),
            Vector3::y(),
        ))
    };

    let mut handler = ImpactHandler::default();
    let first = handler
        .process_constraints(&mut bodies, vec![contact()])
        .unwrap();
    assert!(first.impulses[0] > 1.0);

    let second = handler
        .process_constraints(&mut bodies, vec![contact()])
        .unwrap();
    assert!(second.impulses[0].abs() <= 1e-9 * first.impulses[0].max(1.0));
}

#[test]
fn friction_stops_sliding_with_no_slip_model() {
    // A sphere sliding on a fixed support with the no-slip model: the
    // tangential velocity at the contact is eliminated.
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(RigidBody::fixed(BodyId::new(0), Point3::origin())));
    bodies.insert(Box::new(
        RigidBody::new(
            BodyId::new(1),
            1.0,
            Matrix3::identity() * 0.4,
            Point3::new(0.0, 2.0, 0.0),
        )
        .with_velocity(Vector3::new(1.0, -0.5, 0.0), Vector3::zeros()),
    ));

    let contact = ContactConstraint::new(
        GeomId::new(1),
        GeomId::new(0),
        BodyId::new(1),
        BodyId::new(0),
        Point3::new(0.0, 1.0, 0.0),
        Vector3::y(),
    )
    .with_friction(1.0);

    let mut handler = ImpactHandler::new(ImpactHandlerConfig {
        friction_model: Some(FrictionModel::NoSlip),
        ..ImpactHandlerConfig::default()
    });
    handler
        .process_constraints(&mut bodies, vec![UnilateralConstraint::Contact(contact)])
        .unwrap();

    // Normal approach arrested and the contact-point tangential velocity
    // driven to zero.
    let v = bodies.get(BodyId::new(1)).unwrap().velocity().clone_owned();
    assert!(v[1] >= -1e-9);
    // Contact point velocity in x: v_x + w_z * (-1) (r points from COM to
    // contact, r = (0,-1,0)).
    let vp_x = v[0] + v[5];
    assert_relative_eq!(vp_x, 0.0, epsilon = 1e-8);
}

#[test]
fn coulomb_friction_bounded_by_cone() {
    // Fast slide, low friction: the tangential impulse saturates at
    // mu * normal impulse instead of stopping the slide.
    let mu = 0.2;
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(RigidBody::fixed(BodyId::new(0), Point3::origin())));
    bodies.insert(Box::new(
        RigidBody::new(
            BodyId::new(1),
            1.0,
            Matrix3::identity() * 1e6,
            Point3::new(0.0, 2.0, 0.0),
        )
        .with_velocity(Vector3::new(10.0, -1.0, 0.0), Vector3::zeros()),
    ));

    let contact = ContactConstraint::new(
        GeomId::new(1),
        GeomId::new(0),
        BodyId::new(1),
        BodyId::new(0),
        Point3::new(0.0, 1.0, 0.0),
        Vector3::y(),
    )
    .with_friction(mu);

    let mut handler = ImpactHandler::default();
    let report = handler
        .process_constraints(&mut bodies, vec![UnilateralConstraint::Contact(contact)])
        .unwrap();

    let v = linear_velocity(&bodies, 1);
    // Normal arrested.
    assert!(v.y >= -1e-9);
    // Tangential speed reduced by exactly mu * cn (impulse = 0.2 * ~1).
    let cn = report.impulses[0];
    assert_relative_eq!(v.x, 10.0 - mu * cn, epsilon = 1e-6);
    assert!(v.x > 9.0, "slide should not stop under a weak cone");
}

#[test]
fn pre_solve_callback_can_drop_constraints() {
    let mut bodies = BodySet::new();
    bodies.insert(Box::new(unit_sphere_body(
        0,
        Point3::new(0.0, 2.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
    )));
    bodies.insert(Box::new(unit_sphere_body(1, Point3::origin(), Vector3::zeros())));

    let contact = UnilateralConstraint::Contact(ContactConstraint::new(
        GeomId::new(0),
        GeomId::new(1),
        BodyId::new(0),
        BodyId::new(1),
        Point3::new(0.0, 1.0, 0.0),
        Vector3::y(),
    ));

    let mut handler = ImpactHandler::default();
    handler.set_pre_solve_callback(Box::new(|cs| cs.clear()));
    let report = handler.process_constraints(&mut bodies, vec![contact]).unwrap();

    assert_eq!(report.islands, 0);
    // Nothing was solved, nothing applied.
    assert_relative_eq!(linear_velocity(&bodies, 0).y, -1.0, epsilon = 1e-12);
}
