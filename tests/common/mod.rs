#![allow(dead_code)]

use sea::{Sea, SeaParams};

/// A 10 x 10 single-layer shallow water level with a compressible 4 x 4
/// window refined by 2, periodic, no burning.
pub const TWO_LEVELS: &str = "
    nx 10
    ny 10
    nt 0
    ng 2
    r 2
    df 0.4
    nlevels 2
    models S C
    nzs 1 4
    xmin 0.0
    xmax 10.0
    ymin 0.0
    ymax 10.0
    zmin 0.0
    zmax 1.0
    rho 1.0
    Q 0.0
    gamma 1.6666666
    E_He 1.0
    Cv 1.0
    R 10.0
    alpha 1.0
    beta 0 0 0
    gamma_down 1 0 0 0 1 0 0 0 1
    p_const 0.1
    periodic true
    burning false
    dprint 10
    print_levels 0 1
";

pub fn params() -> SeaParams {
    SeaParams::parse(TWO_LEVELS).unwrap()
}

pub fn sea_with(configure: impl FnOnce(&mut SeaParams)) -> Sea {
    let mut params = params();
    configure(&mut params);
    Sea::new(params).unwrap()
}

pub fn field(sea: &Sea, level: usize, value: f32) -> Vec<f32> {
    vec![value; sea.grid(level).shape().field_len()]
}

/// Still water of unit depth on level 0, prolonged onto the finer levels.
pub fn rest_state(sea: &mut Sea) {
    let one = field(sea, 0, 1.0);
    let zero = field(sea, 0, 0.0);
    sea.initial_swe_data(&one, &zero, &zero).unwrap();

    for l in 1..sea.nlevels() {
        sea.prolong_initial_data(l).unwrap();
    }
}

/// A smooth, slowly moving hump on level 0, prolonged onto the finer levels.
pub fn bump_state(sea: &mut Sea) {
    let shape = sea.grid(0).shape();
    let (_, m) = shape.extended_dim();
    let ng = shape.ng as f32;

    let d: Vec<f32> = (0..shape.field_len())
        .map(|c| {
            let x = (c / m) as f32 - ng + 0.5 - 5.0;
            let y = (c % m) as f32 - ng + 0.5 - 5.0;
            1.0 + 0.1 * (-(x * x + y * y) / 4.0).exp()
        })
        .collect();
    let sx: Vec<f32> = d.iter().map(|d| 0.05 * d).collect();
    let sy = field(sea, 0, 0.0);
    sea.initial_swe_data(&d, &sx, &sy).unwrap();

    for l in 1..sea.nlevels() {
        sea.prolong_initial_data(l).unwrap();
    }
}
