//! cloudrec-demo: punch holes into a point cloud and fill them again.
//!
//! Set `RUST_LOG` to control log output, e.g. `RUST_LOG=cloudrec=debug`.
//!
//! ```bash
//! # Synthetic wavy plane with a hole in the middle
//! cloudrec-demo plane --points 10000 --hole-radius 0.2
//!
//! # Whitespace separated x y z lines, decimated then reconstructed
//! cloudrec-demo xyz scan.xyz --holes 5 -o filled.xyz
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cloudrec::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Fill gaps in point clouds with a learned patch dictionary
#[derive(Parser)]
#[command(name = "cloudrec-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    reconstruct: ReconstructArgs,

    /// Percent step between progress reports
    #[arg(long, global = true, default_value_t = DEFAULT_PROGRESS_FREQUENCY)]
    progress: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a plane with a circular hole and fill it
    Plane {
        #[arg(long, default_value_t = 10_000)]
        points: usize,

        #[arg(long, default_value_t = 0.2)]
        hole_radius: f32,

        /// Amplitude of a sine ripple added to the plane
        #[arg(long, default_value_t = 0.0)]
        ripple: f32,

        #[arg(long, default_value_t = 7)]
        seed: u64,
    },

    /// Import an xyz file, punch random holes and fill them
    Xyz {
        input: PathBuf,

        /// Output file for the reconstructed cloud
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 5)]
        holes: usize,

        /// Points removed around each hole center
        #[arg(long, default_value_t = 100)]
        hole_size: usize,

        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

#[derive(Args)]
struct ReconstructArgs {
    #[arg(long, global = true, default_value_t = 20)]
    ksvd_iters: usize,

    #[arg(long, global = true, default_value_t = 50)]
    knn: usize,

    #[arg(long, global = true, default_value_t = 4)]
    nfreq: usize,

    #[arg(long, global = true, default_value_t = 10)]
    natm: usize,

    #[arg(long, global = true, default_value_t = 4)]
    latm: usize,

    #[arg(long, global = true, default_value_t = 25_000)]
    max_new_points: usize,

    #[arg(long, global = true, value_enum, default_value_t = Method::Omp)]
    method: Method,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Matching pursuit
    Mp,
    /// Orthogonal matching pursuit
    Omp,
}

impl ReconstructArgs {
    fn config(&self, bounding_box: Option<BoundingBox>) -> ReconstructConfig {
        ReconstructConfig {
            ksvd_iters: self.ksvd_iters,
            knn: self.knn,
            nfreq: self.nfreq,
            natm: self.natm,
            latm: self.latm,
            max_new_points: self.max_new_points,
            bounding_box,
            method: match self.method {
                Method::Mp => SparseApprox::MatchingPursuit,
                Method::Omp => SparseApprox::OrthogonalPursuit,
            },
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cloud = Cloud::new().with_observer(Arc::new(TracingProgress));
    let mut guard = cloud.lock();
    guard.set_progress_frequency(cli.progress);

    let output = match &cli.command {
        Commands::Plane {
            points,
            hole_radius,
            ripple,
            seed,
        } => {
            holed_plane(&mut guard, *points, *hole_radius, *ripple, *seed)?;
            None
        }
        Commands::Xyz {
            input,
            output,
            holes,
            hole_size,
            seed,
        } => {
            let coords = read_xyz(input)?;
            let centroid = guard.import_xyz(&coords)?;
            info!("Recentered imported points by {:?}", centroid);
            guard.build_spatial_index()?;
            let config = DecimateConfig {
                n_holes: *holes,
                knn: *hole_size,
            };
            guard.decimate_with_rng(&config, &mut StdRng::seed_from_u64(*seed))?;
            output.clone()
        }
    };

    guard.build_spatial_index()?;
    let degenerate = guard.approx_cloud_norms(&NormalConfig::default())?;
    if degenerate > 0 {
        info!("{} neighborhoods kept the default normal", degenerate);
    }

    // New points stay inside the sampled region, with some slack along flat axes
    let bounding_box = BoundingBox::from_points(guard.points()).map(|bb| bb.expanded(0.05));
    let report = guard.reconstruct(&cli.reconstruct.config(bounding_box))?;
    info!(
        "Added {} points in {} passes ({} patches filled, {} rejected, residual {:.4})",
        report.points_added, report.passes, report.filled_patches, report.rejected_patches, report.final_residual
    );

    if let Some(path) = output {
        write_xyz(&path, &guard.to_xyz())?;
        info!("Wrote {} points to {}", guard.len(), path.display());
    }
    Ok(())
}

/// Uniform samples of `[-1, 1]²` outside a disc around the origin
fn holed_plane(guard: &mut CloudGuard<'_>, points: usize, hole_radius: f32, ripple: f32, seed: u64) -> Result<()> {
    if hole_radius >= 1.0 {
        bail!("hole radius {} leaves nothing of the unit square", hole_radius);
    }
    guard.clear();
    let mut rng = StdRng::seed_from_u64(seed);
    while guard.len() < points {
        let (x, y): (f32, f32) = (rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        if x.hypot(y) > hole_radius {
            let z = ripple * (3.0 * x).sin() * (3.0 * y).cos();
            guard.add_point(Point3f::new(x, y, z), DEFAULT_NORMAL)?;
        }
    }
    info!("Sampled {} points around a hole of radius {}", points, hole_radius);
    Ok(())
}

fn read_xyz(path: &PathBuf) -> Result<Vec<[f32; 3]>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut coords = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .take(3)
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}: bad coordinate", path.display(), line_no + 1))?;
        let &[x, y, z] = values.as_slice() else {
            bail!("{}:{}: expected three coordinates", path.display(), line_no + 1);
        };
        coords.push([x, y, z]);
    }
    Ok(coords)
}

fn write_xyz(path: &PathBuf, coords: &[[f32; 3]]) -> Result<()> {
    let text: String = coords.iter().map(|[x, y, z]| format!("{} {} {}\n", x, y, z)).collect();
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
