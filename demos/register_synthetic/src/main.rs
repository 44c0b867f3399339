use std::path::PathBuf;

use argh::FromArgs;
use nalgebra::{Isometry3, Point3, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use stereo_ransac::{filter_isometry, IsometryFilterConfig};

#[derive(FromArgs, Debug)]
/// Register two synthetic point sets with wrong matches using the isometry filter.
struct Args {
    /// number of correspondences
    #[argh(option, short = 'n', default = "200")]
    num_points: usize,

    /// fraction of wrong matches, clamped to [0, 1]
    #[argh(option, short = 'o', default = "0.3")]
    outlier_ratio: f64,

    /// amplitude of the uniform noise added to the matches
    #[argh(option, default = "0.005")]
    noise: f64,

    /// seed for the synthetic data
    #[argh(option, short = 's', default = "0")]
    seed: u64,

    /// path to a JSON file with the isometry filter configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => IsometryFilterConfig {
            random_seed: Some(args.seed),
            ..Default::default()
        },
    };
    log::info!("isometry filter config: {:?}", config);

    let motion = Isometry3::new(Vector3::new(0.2, -0.05, 0.6), Vector3::new(0.02, 0.12, -0.03));
    let mut rng = StdRng::seed_from_u64(args.seed);
    let outlier_ratio = args.outlier_ratio.clamp(0.0, 1.0);
    let num_outliers =
        ((args.num_points as f64 * outlier_ratio).round() as usize).min(args.num_points);

    let mut x = Vec::with_capacity(args.num_points);
    let mut p = Vec::with_capacity(args.num_points);
    for i in 0..args.num_points {
        let src = Point3::new(
            rng.random_range(-4.0..4.0),
            rng.random_range(-2.0..2.0),
            rng.random_range(1.0..15.0),
        );
        let mut dst = motion * src
            + Vector3::new(
                rng.random_range(-args.noise..=args.noise),
                rng.random_range(-args.noise..=args.noise),
                rng.random_range(-args.noise..=args.noise),
            );
        if i < num_outliers {
            dst += Vector3::new(
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
            );
        }
        x.push(dst);
        p.push(src);
    }

    let now = std::time::Instant::now();
    let result = filter_isometry(&x, &p, &config)?;
    let elapsed = now.elapsed();

    let correct = result.inliers.iter().filter(|&&i| i >= num_outliers).count();
    let rotation_error = result.transform.rotation.angle_to(&motion.rotation);
    let translation_error =
        (result.transform.translation.vector - motion.translation.vector).norm();

    println!("🚀 Registered {} correspondences in {:?}", args.num_points, elapsed);
    println!(
        "inliers: {} ({} planted inliers recovered out of {})",
        result.inliers.len(),
        correct,
        args.num_points - num_outliers
    );
    println!("iterations: {}", result.iterations);
    println!("rmse: {:.5}", result.rmse);
    println!("rotation error: {:.6} rad", rotation_error);
    println!("translation error: {:.6}", translation_error);

    Ok(())
}
