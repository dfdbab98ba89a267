mod common;

use std::thread;
use std::time::Duration;
use sea::message::{Communicator, LocalCommunicator, SerialCommunicator};
use sea::output::Discard;
use sea::{Error, Model, RunStatus, Sea, SeaParams};

fn group(size: usize) -> Vec<LocalCommunicator> {
    LocalCommunicator::group(size)
        .into_iter()
        .map(|comm| comm.with_timeout(Duration::from_secs(60)))
        .collect()
}

fn run_on_threads(sea: &Sea, size: usize) -> Vec<Result<Sea, Error>> {
    let handles: Vec<_> = group(size)
        .into_iter()
        .map(|comm| {
            let mut sea = sea.clone();
            thread::spawn(move || -> Result<Sea, Error> {
                sea.run_with_writer(&comm, &RunStatus::new(), 0, &mut Discard)?;
                Ok(sea)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn shallow_water_window(p: &mut SeaParams) {
    p.models = vec![Model::SingleLayerSwe, Model::SingleLayerSwe];
    p.nzs = vec![1, 1];
}

fn assert_matches_single_rank(size: usize, configure: impl FnOnce(&mut SeaParams)) {
    let mut sea = common::sea_with(|p| {
        p.nt = 8;
        configure(p);
    });
    common::bump_state(&mut sea);

    let mut serial = sea.clone();
    serial.run(&SerialCommunicator::new(), &RunStatus::new(), 0).unwrap();

    for (rank, result) in run_on_threads(&sea, size).into_iter().enumerate() {
        let parallel = result.unwrap();

        for l in 0..sea.nlevels() {
            let difference = parallel.grid(l).max_interior_difference(serial.grid(l));
            assert!(difference < 1e-5, "{} ranks: rank {} level {} differs by {}", size, rank, l, difference);
        }
    }
}

#[test]
fn two_ranks_match_a_single_rank() {
    assert_matches_single_rank(2, |_| ())
}

#[test]
fn three_ranks_match_a_single_rank() {
    // the third rank owns none of the fine level
    assert_matches_single_rank(3, |_| ())
}

#[test]
fn refluxed_window_matches_a_single_rank_on_two_ranks() {
    assert_matches_single_rank(2, shallow_water_window)
}

#[test]
fn refluxed_window_matches_a_single_rank_on_three_ranks() {
    // the high x side of the window borders the third rank, so its flux
    // corrections are computed on the second rank and sent across
    assert_matches_single_rank(3, shallow_water_window)
}

#[test]
fn divergence_on_one_rank_aborts_every_rank() {
    let mut sea = common::sea_with(|p| p.nt = 3);
    common::rest_state(&mut sea);

    let mut sx = common::field(&sea, 0, 0.0);
    let one = common::field(&sea, 0, 1.0);
    sx[sea.grid(0).shape().cell_offset(1, 1, 0) / 3] = 50.0;
    sea.initial_swe_data(&one, &sx, &common::field(&sea, 0, 0.0)).unwrap();

    let results = run_on_threads(&sea, 2);

    assert!(results.iter().all(|r| r.is_err()));
    assert!(results.iter().any(|r| matches!(r.as_ref().map_err(|e| e.root()), Err(Error::NumericalDivergence(_)))));
}

#[test]
fn mismatched_parameters_are_refused() {
    let mut a = common::sea_with(|p| p.nt = 2);
    let mut b = common::sea_with(|p| {
        p.nt = 2;
        p.p_const = 0.2;
    });
    common::rest_state(&mut a);
    common::rest_state(&mut b);

    let mut comms = group(2);
    let second = comms.pop().unwrap();
    let first = comms.pop().unwrap();
    assert_eq!((first.rank(), second.rank()), (0, 1));

    let handle = thread::spawn(move || b.run_with_writer(&second, &RunStatus::new(), 0, &mut Discard).map(|_| ()));
    let local = a.run_with_writer(&first, &RunStatus::new(), 0, &mut Discard);
    let remote = handle.join().unwrap();

    for result in [local, remote] {
        match result {
            Err(e) => assert!(e.is_validation() || matches!(e, Error::Aborted { .. }), "{:?}", e),
            Ok(_) => panic!("a run with mismatched parameters went ahead"),
        }
    }
}
