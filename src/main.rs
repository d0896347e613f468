use std::f64::consts::PI;
use std::sync::Arc;
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use ebamr::bc::{BcHolder, DomainBc, EbBc};
use ebamr::eb::{AllRegular, Circle, CoarseningPolicy, Complement, EbIndexSpace, ImplicitFunction};
use ebamr::error::Error;
use ebamr::grid_array::GridArray;
use ebamr::index_space::range2d;
use ebamr::layout::DisjointBoxLayout;
use ebamr::level_geometry::LevelGeometry;
use ebamr::message::SerialCommunicator;
use ebamr::parameters::AmrParameters;
use ebamr::poisson::{EbLevelData, EbPoissonOp, EbPoissonOpFactory};
use ebamr::problem_domain::ProblemDomain;
use ebamr::solver::{BiCgStabSolver, DirectSolver, FasMultiGrid, LinearSolver, MultiGrid, RelaxSolver, SolveReport};




#[derive(Clone, Copy, Debug, ValueEnum)]
enum Bottom {
    Relax,
    Bicgstab,
    Direct,
}




#[derive(Debug, Parser)]
#[clap(version, about = "Solve a Poisson test problem on an embedded boundary grid")]
struct Opts {
    /// Number of cells along each side of the unit square
    #[clap(short = 'n', long, default_value = "64")]
    size: i64,

    /// Edge length of the layout boxes
    #[clap(short = 'b', long, default_value = "16")]
    block: i64,

    /// Cut a circular hole of radius 0.25 out of the domain
    #[clap(long)]
    circle: bool,

    /// Use FAS cycles instead of correction cycles
    #[clap(long)]
    fas: bool,

    /// Bottom solver for correction cycles [default: relax]. FAS cycles
    /// relax at the coarsest depth and do not take one.
    #[clap(long, value_enum, conflicts_with = "fas")]
    bottom: Option<Bottom>,

    #[clap(short = 't', long, default_value = "1e-10")]
    tolerance: f64,

    #[clap(short = 'm', long, default_value = "20")]
    max_iterations: usize,

    /// Deepest multigrid level, or -1 for as deep as possible
    #[clap(short = 'd', long, default_value = "-1", allow_hyphen_values = true)]
    max_depth: i32,

    #[clap(short = 'v', long, default_value = "3")]
    verbosity: i32,

    /// Write a CBOR snapshot of the parameters, report and solution
    #[clap(short = 'o', long)]
    output: Option<String>,
}




#[derive(Serialize)]
struct Snapshot<'a> {
    parameters: &'a AmrParameters,
    report: SolveReport,
    solution: Vec<&'a GridArray>,
}




// ============================================================================
fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    let level = if opts.verbosity > 3 { LevelFilter::Debug } else { LevelFilter::Info };

    SimpleLogger::new().with_level(level).init()?;

    let parameters = AmrParameters {
        tolerance: opts.tolerance,
        max_iterations: opts.max_iterations,
        max_depth: opts.max_depth,
        verbosity: opts.verbosity,
        ..AmrParameters::default()
    };
    parameters.validate()?;
    info!("{:?}", opts);

    let domain = ProblemDomain::non_periodic(range2d(0..opts.size, 0..opts.size));
    let dx = 1.0 / opts.size as f64;
    let function: Box<dyn ImplicitFunction> = if opts.circle {
        Box::new(Complement(Circle { center: [0.5, 0.5], radius: 0.25 }))
    } else {
        Box::new(AllRegular)
    };
    let ebis = Arc::new(EbIndexSpace::new(domain.clone(), dx, function.as_ref(), CoarseningPolicy::default(), None));
    let layout = Arc::new(DisjointBoxLayout::uniform(domain.clone(), opts.block, Arc::new(SerialCommunicator)));
    let geom = Arc::new(LevelGeometry::new(layout, ebis, 1, None));
    let factory = EbPoissonOpFactory::new(
        vec![geom.clone()],
        0.0,
        1.0,
        BcHolder::from(DomainBc::dirichlet(0.0)),
        EbBc::Dirichlet(0.0));

    let mut rhs = EbLevelData::from_function(geom.clone(), |[x, y]| -2.0 * PI * PI * (PI * x).sin() * (PI * y).sin());
    let mut phi = EbLevelData::new(geom);
    rhs.scale_by_volume_fraction();

    let report = if opts.fas {
        let mut solver = FasMultiGrid::new();
        solver.set_from_parameters(&parameters);
        solver.define(&factory, &domain, parameters.max_depth, None);
        solver.solve(&mut phi, &rhs, parameters.tolerance, parameters.max_iterations, parameters.verbosity)
    } else {
        let bottom: Box<dyn LinearSolver<EbLevelData, EbPoissonOp>> = match opts.bottom.unwrap_or(Bottom::Relax) {
            Bottom::Relax => Box::new(RelaxSolver::new(1e-3, parameters.bottom_smooth)),
            Bottom::Bicgstab => Box::new(BiCgStabSolver::default()),
            Bottom::Direct => Box::new(DirectSolver::new()),
        };
        let mut solver = MultiGrid::new();
        solver.set_from_parameters(&parameters);
        solver.define(&factory, Some(bottom), &domain, parameters.max_depth, None);
        solver.homogeneous = false;
        solver.solve(&mut phi, &rhs, parameters.tolerance, parameters.max_iterations, parameters.verbosity)
    };
    info!(
        "{} iterations, residual {:.3e} -> {:.3e}",
        report.iterations,
        report.initial_residual,
        report.final_residual);

    if let Some(path) = opts.output {
        let snapshot = Snapshot {
            parameters: &parameters,
            report,
            solution: phi.level_data().iter_local().map(|(_, fab)| fab).collect(),
        };
        let file = std::fs::File::create(&path)?;
        let buffer = std::io::BufWriter::new(file);
        ciborium::ser::into_writer(&snapshot, buffer).map_err(|e| Error::Snapshot(e.to_string()))?;
        info!("wrote {}", path);
    }
    Ok(())
}




// ============================================================================
#[cfg(test)]
mod test {

    use clap::Parser;
    use super::{Bottom, Opts};

    #[test]
    fn bottom_solver_defaults_to_relaxation() {
        let opts = Opts::try_parse_from(["ebamr"]).unwrap();
        assert!(opts.bottom.is_none());
        assert!(!opts.fas);
    }

    #[test]
    fn bottom_solver_is_accepted_for_correction_cycles() {
        let opts = Opts::try_parse_from(["ebamr", "--bottom", "direct"]).unwrap();
        assert!(matches!(opts.bottom, Some(Bottom::Direct)));
    }

    #[test]
    fn bottom_solver_conflicts_with_fas() {
        assert!(Opts::try_parse_from(["ebamr", "--fas", "--bottom", "direct"]).is_err());
        assert!(Opts::try_parse_from(["ebamr", "--fas"]).is_ok());
    }
}
