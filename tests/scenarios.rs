mod common;

use sea::message::SerialCommunicator;
use sea::output::Discard;
use sea::{read_snapshots, Error, Model, RunStatus, Sea, SeaParams, Snapshot, ValidationError};

#[test]
fn zero_steps_return_the_initial_state_exactly() {
    let mut sea = common::sea_with(|p| p.nt = 0);
    common::bump_state(&mut sea);
    let initial = sea.clone();

    sea.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();

    for l in 0..sea.nlevels() {
        assert_eq!(sea.grid(l), initial.grid(l));
    }
}

#[test]
fn uniform_rest_state_is_a_fixed_point() {
    let mut sea = common::sea_with(|p| p.nt = 100);
    common::rest_state(&mut sea);
    let initial = sea.clone();

    let status = RunStatus::new();
    sea.run(&SerialCommunicator::new(), &status, 0).unwrap();
    assert_eq!(status.step(), 100);

    for (i, j) in sea.grid(0).shape().interior().iter() {
        let cell = sea.grid(0).cell(i, j, 0);
        assert!((cell[0] - 1.0).abs() < 1e-6 && cell[1].abs() < 1e-6 && cell[2].abs() < 1e-6, "({}, {}): {:?}", i, j, cell);
    }
    for l in 0..sea.nlevels() {
        assert!(sea.grid(l).max_interior_difference(initial.grid(l)) < 1e-5, "level {} drifted", l);
    }
}

#[test]
fn unrecognised_model_tag_names_its_level() {
    let text = common::TWO_LEVELS
        .replace("nlevels 2", "nlevels 3")
        .replace("models S C", "models S C X")
        .replace("nzs 1 4", "nzs 1 4 4");

    match Sea::from_param_str(&text) {
        Err(Error::Validation(ValidationError::InvalidModel { level, tag })) => {
            assert_eq!((level, tag.as_str()), (2, "X"));
        }
        other => panic!("expected an invalid model error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn missing_fields_are_named() {
    let text: String = common::TWO_LEVELS
        .lines()
        .filter(|line| !line.trim_start().starts_with("gamma_down"))
        .map(|line| format!("{}\n", line))
        .collect();

    match SeaParams::parse(&text) {
        Err(Error::Validation(ValidationError::MissingField(field))) => assert_eq!(field, "gamma_down"),
        other => panic!("expected a missing field error, got {:?}", other),
    }
}

fn coarse_mass(sea: &Sea) -> f64 {
    let grid = sea.grid(0);
    grid.shape().interior().iter().map(|(i, j)| grid.cell(i, j, 0)[0] as f64).sum()
}

#[test]
fn single_level_conserves_mass() {
    let mut sea = common::sea_with(|p| {
        p.nt = 20;
        p.nlevels = 1;
        p.models.truncate(1);
        p.nzs.truncate(1);
        p.print_levels = vec![0];
    });
    common::bump_state(&mut sea);
    let before = coarse_mass(&sea);

    sea.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();
    assert!(((coarse_mass(&sea) - before) / before).abs() < 1e-5);
}

#[test]
fn nested_shallow_water_conserves_coarse_mass() {
    let mut sea = common::sea_with(|p| {
        p.nt = 50;
        p.models = vec![Model::SingleLayerSwe, Model::SingleLayerSwe];
        p.nzs = vec![1, 1];
    });
    common::bump_state(&mut sea);
    let before = coarse_mass(&sea);

    sea.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();

    let change = (coarse_mass(&sea) - before) / before;
    assert!(change.abs() < 1e-5, "coarse mass changed by {:e}", change);
}

#[test]
fn clones_evolve_independently() {
    let mut sea = common::sea_with(|p| p.nt = 5);
    common::bump_state(&mut sea);
    let untouched = sea.clone();

    sea.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();

    let mut again = untouched.clone();
    common::bump_state(&mut again);
    assert_eq!(untouched.grid(0), again.grid(0));
    assert!(sea.grid(0).max_interior_difference(untouched.grid(0)) > 0.0);
}

#[test]
fn snapshots_are_written_every_dprint_steps() {
    let mut sea = common::sea_with(|p| {
        p.nt = 20;
        p.dprint = 5;
    });
    common::bump_state(&mut sea);
    let dt = sea.time_step();

    let mut snapshots: Vec<Snapshot> = Vec::new();
    sea.run_with_writer(&SerialCommunicator::new(), &RunStatus::new(), 0, &mut snapshots).unwrap();

    let steps: Vec<_> = snapshots.iter().map(|s| (s.step, s.level)).collect();
    assert_eq!(steps, vec![(5, 0), (5, 1), (10, 0), (10, 1), (15, 0), (15, 1), (20, 0), (20, 1)]);
    assert!((snapshots[2].time - 10.0 * dt).abs() < 1e-6);

    let last = &snapshots[7];
    assert_eq!(last.shape, [8, 8, 4, 5]);
    assert_eq!(last.data, sea.grid(1).interior_data());
    assert_eq!(snapshots[6].data, sea.grid(0).interior_data());
}

#[test]
fn output_file_holds_the_printed_levels() {
    let path = std::env::temp_dir().join(format!("sea-scenario-{}.cbor", std::process::id()));
    let mut sea = common::sea_with(|p| {
        p.nt = 10;
        p.dprint = 5;
        p.print_levels = vec![0];
        p.outfile = Some(path.clone());
    });
    common::rest_state(&mut sea);

    sea.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();
    let snapshots = read_snapshots(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].step, 10);
    assert_eq!(snapshots[1].xs.len(), 10);
}

#[test]
fn late_start_takes_the_remaining_steps() {
    let mut sea = common::sea_with(|p| {
        p.nt = 10;
        p.dprint = 1;
        p.print_levels = vec![0];
    });
    common::bump_state(&mut sea);

    let mut snapshots: Vec<Snapshot> = Vec::new();
    sea.run_with_writer(&SerialCommunicator::new(), &RunStatus::new(), 7, &mut snapshots).unwrap();
    assert_eq!(snapshots.iter().map(|s| s.step).collect::<Vec<_>>(), vec![8, 9, 10]);
}

#[test]
fn interrupted_run_leaves_the_state_alone() {
    let mut sea = common::sea_with(|p| p.nt = 10);
    common::bump_state(&mut sea);
    let initial = sea.clone();

    let status = RunStatus::new();
    status.interrupt();

    match sea.run(&SerialCommunicator::new(), &status, 0) {
        Err(Error::Interrupted { step }) => assert_eq!(step, 0),
        other => panic!("expected an interruption, got {:?}", other),
    }
    assert_eq!(sea.grid(0), initial.grid(0));
}

#[test]
fn runaway_momentum_is_reported_as_divergence() {
    let mut sea = common::sea_with(|p| p.nt = 3);
    common::rest_state(&mut sea);

    let mut sx = common::field(&sea, 0, 0.0);
    let one = common::field(&sea, 0, 1.0);
    let zero = common::field(&sea, 0, 0.0);
    sx[sea.grid(0).shape().cell_offset(1, 1, 0) / 3] = 50.0;
    sea.initial_swe_data(&one, &sx, &zero).unwrap();

    let e = sea.run_with_writer(&SerialCommunicator::new(), &RunStatus::new(), 0, &mut Discard).unwrap_err();
    assert!(matches!(e, Error::InLevel { level: 0, rank: 0, step: 0, .. }), "{:?}", e);
    assert!(matches!(e.root(), Error::NumericalDivergence(_)));
}

#[test]
fn singular_heating_system_is_reported_with_its_level() {
    // with a subnormal heat capacity both the temperature and the ignition
    // temperature overflow, and the heating Jacobian is not finite
    let mut sea = common::sea_with(|p| {
        p.nt = 2;
        p.burning = true;
        p.cv = f32::from_bits(1);
    });
    common::rest_state(&mut sea);

    let e = sea.run_with_writer(&SerialCommunicator::new(), &RunStatus::new(), 0, &mut Discard).unwrap_err();
    assert!(matches!(e, Error::InLevel { level: 1, rank: 0, step: 0, .. }), "{:?}", e);
    assert!(matches!(e.root(), Error::SingularMatrix { .. }), "{:?}", e);
}

#[test]
fn outflow_ghosts_copy_the_nearest_interior_cell() {
    let sea = common::sea_with(|p| p.periodic = false);
    let (nx, ny, nz, vec_dim) = (4, 3, 2, 3);
    let ng = sea.params().ng;
    let len = (nx + 2 * ng) * (ny + 2 * ng) * nz * vec_dim;
    let mut data: Vec<f32> = (0..len).map(|n| n as f32).collect();

    sea.bcs(&mut data, nx, ny, nz, vec_dim).unwrap();

    let m = ny + 2 * ng;
    let at = |i: usize, j: usize, k: usize, q: usize| data[((i * m + j) * nz + k) * vec_dim + q];

    for k in 0..nz {
        for q in 0..vec_dim {
            assert_eq!(at(0, 0, k, q), at(ng, ng, k, q));
            assert_eq!(at(nx + 2 * ng - 1, 1, k, q), at(nx + ng - 1, ng, k, q));
            assert_eq!(at(2, m - 1, k, q), at(2, ny + ng - 1, k, q));
        }
    }
}

#[test]
fn matrix_inverse_of_a_five_by_five_system() {
    let mut a = vec![0.0; 25];

    for i in 0..5 {
        for j in 0..5 {
            a[i * 5 + j] = if i == j { 4.0 } else { 1.0 / (1.0 + (i + 2 * j) as f32) };
        }
    }
    let original = a.clone();
    Sea::invert_mat(&mut a, 5, 5).unwrap();

    for i in 0..5 {
        for j in 0..5 {
            let product: f32 = (0..5).map(|k| original[i * 5 + k] * a[k * 5 + j]).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((product - expected).abs() < 1e-5);
        }
    }

    let mut singular = vec![1.0, 2.0, 2.0, 4.0];
    assert!(matches!(Sea::invert_mat(&mut singular, 2, 2), Err(Error::SingularMatrix { .. })));
}
