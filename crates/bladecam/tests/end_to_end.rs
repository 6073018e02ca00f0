//! Rebuild a straight cascade, rough the passage in three layers and
//! replay the toolpath against a block of stock.

use std::sync::Arc;

use approx::assert_relative_eq;
use bladecam::cam::{
    Clearance, CutPattern, Cutter, DepthMode, DepthParams, EdgeExtension, LayerNotFinished,
    MotionKind, OperationKind, PathState, Shank, Tool, ToolHolder,
};
use bladecam::geom::{
    BladeGeometryModel, PartAxis, Pitch, Section, SurfaceDefinition, SurfaceKind, SurfaceRole,
};
use bladecam::math::{Aabb, Point3, Vec3};
use bladecam::task::TaskContext;
use bladecam::{
    BladecamConfig, EventCategory, EventFilter, Request, Response, Session, SessionEvent,
};

/// B side at y=0, A side at y=-2, next blade 18 mm along +Y. Chord 16
/// along X, span 8 along Z, two sections of eight points per side.
fn cascade() -> BladeGeometryModel {
    let side = |y: f64, z: f64, station: f64| {
        Section::new(
            station,
            (0..8).map(|i| Point3::new(i as f64 * 16.0 / 7.0, y, z)).collect(),
        )
    };
    let mut model = BladeGeometryModel::new(
        "cascade",
        PartAxis::default(),
        Pitch::Linear {
            offset: Vec3::new(0.0, 18.0, 0.0),
        },
    );
    for (kind, y) in [(SurfaceKind::BSide, 0.0), (SurfaceKind::ASide, -2.0)] {
        let sections = vec![side(y, 0.0, 0.0), side(y, 8.0, 1.0)];
        model.set_definition(
            SurfaceDefinition::define(SurfaceRole::main(kind), sections, false).unwrap(),
        );
    }
    model
}

fn config() -> BladecamConfig {
    let mut config = BladecamConfig::from_toml_str(
        "[simulation]\nresolution = 1.0\n\n[machining]\napproach_distance = 2.0\nretract_distance = 2.0\n",
    )
    .unwrap();
    config.machining.clearance = Clearance::Plane {
        point: Point3::new(0.0, 0.0, 13.0),
        normal: Vec3::z(),
    };
    config
}

fn roughing(session: &Session) -> bladecam::cam::Operation {
    let cutter = Cutter::new(
        Tool::FlatEndMill {
            diameter: 4.0,
            flute_length: 10.0,
            flutes: 2,
        },
        Shank::new(4.0, 10.0),
        ToolHolder::new(30.0, 40.0),
    );
    let mut op = session.new_operation("rough", OperationKind::Rough, cutter);
    op.params = op
        .params
        .with_pattern(CutPattern::ZigZag)
        .with_stepover(1.5)
        .with_extension(EdgeExtension::Linear { length: 3.0 })
        .with_depth(DepthParams {
            mode: DepthMode::ConstantDistance { step: 1.0 },
            start: 0.0,
            end: Some(3.0),
            not_finished: LayerNotFinished::Warn,
        });
    op
}

#[test]
fn test_rough_and_simulate_cascade() {
    let session = Arc::new(Session::new(config(), cascade()));
    let (_, events) = session.events().channel(EventFilter::Categories(vec![
        EventCategory::Geometry,
        EventCategory::Toolpath,
    ]));
    let ctx = TaskContext::detached();

    let revision = match session
        .execute(Request::Rebuild { lamination: None }, &ctx)
        .unwrap()
    {
        Response::Rebuilt { revision } => revision,
        other => panic!("unexpected {other:?}"),
    };
    assert!(session.model().solid().is_some());

    let op = roughing(&session);
    let id = session.add_operation(op).unwrap();

    let handle = session
        .spawn(Request::GenerateToolpath { operation: id })
        .unwrap();
    let generated = match handle.join().unwrap() {
        Response::Generated(generated) => generated,
        other => panic!("unexpected {other:?}"),
    };
    assert!(generated.warnings.is_empty());
    assert_eq!(generated.passes.len(), 3);

    // Layers step down one millimetre at a time from the shroud.
    for (i, pass) in generated.passes.iter().enumerate() {
        let z = 7.0 - i as f64;
        assert_eq!(pass.rows.len(), 9);
        assert!(pass
            .rows
            .iter()
            .flat_map(|r| &r.points)
            .all(|p| (p.position.z - z).abs() < 1e-9));
    }

    let mut layer = vec![PathState::Approach, PathState::Engage, PathState::FirstCut];
    for _ in 0..8 {
        layer.extend([PathState::StepOver, PathState::Cut]);
    }
    layer.extend([PathState::Retract, PathState::Departure, PathState::Traversal]);
    let mut expected = vec![PathState::Start];
    for _ in 0..3 {
        expected.extend(layer.iter().copied());
    }
    expected.push(PathState::End);
    assert_eq!(generated.toolpath.state_trace(), expected);

    // Fixed vertical axis: nothing tilts, every cut stays on its layer.
    assert!(generated
        .toolpath
        .segments
        .iter()
        .all(|s| (s.axis.as_ref() - Vec3::z()).norm() < 1e-9));

    let stock = session
        .stock_from_box(Aabb::new(Point3::origin(), Point3::new(16.0, 16.0, 8.0)))
        .unwrap();
    let initial = stock.volume();
    assert_relative_eq!(initial, 2048.0, epsilon = 1e-9);
    let segments = session.start_simulation(id, stock).unwrap();
    assert_eq!(segments, generated.toolpath.len());

    let summary = session.run_simulation(id, &ctx).unwrap();
    assert_eq!(summary.steps, segments);
    assert_eq!(summary.collisions, 0);
    assert_eq!(summary.overcuts, 0);

    // Three full layers of the 16 x 16 block.
    let analytic = 16.0 * 16.0 * 3.0;
    assert!((summary.removed_volume - analytic).abs() <= 0.01 * analytic);

    let steps = session
        .with_simulation(id, |s| s.steps().to_vec())
        .unwrap();
    let mut previous = initial;
    for step in &steps {
        assert!(step.remaining_volume <= previous + 1e-9);
        previous = step.remaining_volume;
        // Linking moves all run outside or above the block.
        if !matches!(step.kind, MotionKind::Cut | MotionKind::Engage | MotionKind::StepOver) {
            assert_eq!(step.removed_volume, 0.0, "{:?} step {}", step.kind, step.index);
        }
    }
    let final_volume = session.with_simulation(id, |s| s.stock().volume()).unwrap();
    assert_relative_eq!(final_volume, initial - summary.removed_volume, epsilon = 1e-6);

    let mut csv = Vec::new();
    bladecam::stocksim::write_csv(&steps, &mut csv).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert_eq!(text.lines().count(), steps.len() + 1);

    let seen: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            SessionEvent::SolidRebuilt { revision },
            SessionEvent::ToolpathGenerated {
                operation: id,
                segments
            },
        ]
    );
}

#[test]
fn test_geometry_change_invalidates_toolpath() {
    let session = Session::new(config(), cascade());
    let ctx = TaskContext::detached();
    session.rebuild(None, &ctx).unwrap();
    let op = roughing(&session);
    let id = session.add_operation(op).unwrap();
    session.generate(id, &ctx).unwrap();
    assert!(session.is_toolpath_valid(id).unwrap());

    session.rebuild(None, &ctx).unwrap();
    assert!(!session.is_toolpath_valid(id).unwrap());

    let regenerated = session.generate(id, &ctx).unwrap();
    assert_eq!(regenerated.passes.len(), 3);
    assert!(session.is_toolpath_valid(id).unwrap());
}
