use std::net::SocketAddr;
use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};
use signal_hook::consts::{SIGINT, SIGTERM};
use simple_logger::SimpleLogger;
use sea::hydro::compressible::Primitive;
use sea::hydro::{low_mach, Model};
use sea::message::{Communicator, SerialCommunicator, TcpCommunicator};
use sea::{Result, RunStatus, Sea, ValidationError};




#[derive(Clone, Copy, Debug, ValueEnum)]
enum Initial {
    /// Still water of uniform depth.
    Rest,
    /// Still water with a Gaussian hump on the top layer.
    Bump,
}




#[derive(Debug, Parser)]
#[clap(version, about = "Run a nested-grid sea simulation")]
struct Opts {
    /// Parameter file
    param_file: PathBuf,

    /// Rank of this process
    #[clap(long, default_value = "0")]
    rank: usize,

    /// Addresses of every process, in rank order
    #[clap(long, value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    /// First coarse step to take
    #[clap(long, default_value = "0")]
    tstart: usize,

    /// Number of worker threads (0 for one per core)
    #[clap(short = 't', long, default_value = "0")]
    threads: usize,

    /// Initial condition
    #[clap(long, value_enum, default_value = "rest")]
    initial: Initial,

    #[clap(short, long)]
    verbose: bool,
}




// ============================================================================
fn initial_data(sea: &mut Sea, initial: Initial) -> Result<()> {
    let level = sea.hierarchy().level(0).clone();
    let shape = level.shape;
    let n = shape.field_len();
    let height = sea.params().zmax - sea.params().zmin;
    let (lx, ly) = (sea.params().xmax - sea.params().xmin, sea.params().ymax - sea.params().ymin);
    let (_, columns_per_row) = shape.extended_dim();

    let hump = |c: usize| -> f32 {
        let (column, k) = (c / shape.nz, c % shape.nz);
        let i = (column / columns_per_row) as f32 - shape.ng as f32;
        let j = (column % columns_per_row) as f32 - shape.ng as f32;
        let x = (i + 0.5) * level.spacing.dx - 0.5 * lx;
        let y = (j + 0.5) * level.spacing.dy - 0.5 * ly;

        match initial {
            Initial::Bump if k == 0 => 0.1 * (-(x * x + y * y) / (0.01 * lx * ly)).exp(),
            _ => 0.0,
        }
    };
    let zero = vec![0.0; n];

    match level.model {
        Model::SingleLayerSwe | Model::MultilayerSwe => {
            let d: Vec<f32> = (0..n).map(|c| height / shape.nz as f32 * (1.0 + hump(c))).collect();
            sea.initial_swe_data(&d, &zero, &zero)?
        }
        Model::Compressible | Model::LowMach => {
            let gamma = sea.physics().gamma;
            let p = sea.params().p_const;
            let mut fields = vec![vec![0.0; n]; 5];

            for c in 0..n {
                let prim = Primitive::new(1.0 + hump(c), [0.0; 3], p);
                let u = match level.model {
                    Model::LowMach => low_mach::to_conserved(&prim, gamma),
                    _ => prim.to_conserved(gamma, &sea.physics().metric)?,
                };
                for (field, x) in fields.iter_mut().zip(u.iter()) {
                    field[c] = *x
                }
            }
            if level.model == Model::LowMach {
                sea.initial_low_mach_data_on(0, &fields[0], &fields[1], &fields[2], &fields[3], &fields[4])?
            } else {
                sea.initial_compressible_data_on(0, &fields[0], &fields[1], &fields[2], &fields[3], &fields[4])?
            }
        }
    }
    for l in 1..sea.nlevels() {
        sea.prolong_initial_data(l)?
    }
    Ok(())
}

fn run_on<C: Communicator>(sea: &mut Sea, comm: &C, status: &RunStatus, tstart: usize) -> Result<()> {
    if comm.rank() == 0 {
        sea.print_inputs();
    }
    sea.run(comm, status, tstart)?;
    info!("rank {} finished at step {}", comm.rank(), status.step());
    Ok(())
}

fn run(opts: &Opts) -> Result<()> {
    if opts.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(opts.threads)
            .build_global()
            .map_err(|e| ValidationError::invalid("threads", e.to_string()))?;
    }

    let status = RunStatus::new();
    signal_hook::flag::register(SIGINT, status.interrupt_flag())?;
    signal_hook::flag::register(SIGTERM, status.interrupt_flag())?;

    let mut sea = Sea::from_param_file(&opts.param_file)?;
    initial_data(&mut sea, opts.initial)?;

    if opts.peers.len() > 1 {
        let comm = TcpCommunicator::new(opts.rank, opts.peers.clone())?;
        run_on(&mut sea, &comm, &status, opts.tstart)
    } else {
        run_on(&mut sea, &SerialCommunicator::new(), &status, opts.tstart)
    }
}

fn main() {
    let opts = Opts::parse();

    SimpleLogger::new()
        .with_level(if opts.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .init()
        .unwrap();

    if let Err(e) = run(&opts) {
        error!("{}", e);
        std::process::exit(1);
    }
}
