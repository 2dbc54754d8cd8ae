use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use strain_baseline::{
    compare, config,
    datatypes::{Grid, LoadCase},
    error::{BaselineError, Result},
    generator, reader, writer,
};

#[derive(Parser, Debug)]
#[command(name = "strain-baseline")]
#[command(about = "Analytical line load baselines for strain estimators")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the displacement and strain baseline files
    Generate(GenerateArgs),
    /// Compare a candidate image against a baseline image
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Input json with grid, material and integration_constants sections
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long, default_value = "Baseline")]
    output_dir: PathBuf,
    #[arg(long, allow_hyphen_values = true)]
    start: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    stop: Option<i64>,
    #[arg(long)]
    poisson_ratio: Option<f64>,
    #[arg(long)]
    pe_term: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    c1: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    c2: Option<f64>,
    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    baseline: PathBuf,
    candidate: PathBuf,
    /// Largest accepted absolute difference
    #[arg(short, long, default_value_t = 1e-6)]
    tolerance: f64,
}

/// Resolves the run parameters: defaults, then input file, then flags
fn resolve_parameters(args: &GenerateArgs) -> Result<(Grid, LoadCase)> {
    let (grid, mut load_case) = match &args.input {
        Some(input) => config::run(&input.to_string_lossy())?,
        None => (Grid::default(), LoadCase::default()),
    };

    let grid = Grid::new(
        args.start.unwrap_or(grid.start),
        args.stop.unwrap_or(grid.stop),
    )?;
    if let Some(nu) = args.poisson_ratio {
        load_case.poisson_ratio = nu;
    }
    if let Some(pe_term) = args.pe_term {
        load_case.pe_term = pe_term;
    }
    if let Some(c1) = args.c1 {
        load_case.c1 = c1;
    }
    if let Some(c2) = args.c2 {
        load_case.c2 = c2;
    }

    if load_case.poisson_ratio.abs() >= 0.5 {
        log::warn!(
            "poisson ratio {} is outside the physical range (-0.5, 0.5)",
            load_case.poisson_ratio
        );
    }

    Ok((grid, load_case))
}

fn run_generate(args: &GenerateArgs) -> Result<()> {
    let (grid, load_case) = resolve_parameters(args)?;
    let (displacement, strain) = generator::generate_fields(&grid, &load_case);
    writer::write_baseline(&args.output_dir, &grid, &displacement, &strain, args.quiet)?;
    Ok(())
}

fn run_compare(args: &CompareArgs) -> Result<()> {
    let baseline = reader::read_image(&args.baseline)?;
    let candidate = reader::read_image(&args.candidate)?;

    let report = compare::compare_components(
        &baseline.components()?,
        &candidate.components()?,
        args.tolerance,
    )?;

    log::info!(
        "compared {} points, max abs difference {:e} at {:?}",
        report.points,
        report.max_abs_diff,
        report.worst
    );

    if !report.within_tolerance() {
        return Err(BaselineError::Comparison(format!(
            "{} differs from {} by {:e} (tolerance {:e})",
            args.candidate.display(),
            args.baseline.display(),
            report.max_abs_diff,
            report.tolerance
        )));
    }

    println!(
        "{} matches {} within {:e}",
        args.candidate.display(),
        args.baseline.display(),
        report.tolerance
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.cmd {
        Command::Generate(args) => run_generate(args),
        Command::Compare(args) => run_compare(args),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(extra: &[&str]) -> GenerateArgs {
        let mut argv = vec!["strain-baseline", "generate"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).cmd {
            Command::Generate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults_to_reference_case() {
        let (grid, load_case) = resolve_parameters(&generate_args(&[])).unwrap();
        assert_eq!(grid, Grid::default());
        assert_eq!(load_case, LoadCase::default());
    }

    #[test]
    fn flags_override_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(
            &input,
            r#"{ "grid": { "start": -5, "stop": 6 }, "material": { "poisson_ratio": 0.25 } }"#,
        )
        .unwrap();

        let args = generate_args(&[
            "--input",
            input.to_str().unwrap(),
            "--stop",
            "3",
            "--c1",
            "-1.5",
        ]);
        let (grid, load_case) = resolve_parameters(&args).unwrap();
        assert_eq!(grid, Grid::new(-5, 3).unwrap());
        assert_eq!(load_case.poisson_ratio, 0.25);
        assert_eq!(load_case.c1, -1.5);
    }

    #[test]
    fn generated_baseline_compares_against_itself_across_formats() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("Baseline");
        let out_str = out.to_str().unwrap();
        run_generate(&generate_args(&[
            "--output-dir",
            out_str,
            "--start",
            "-6",
            "--stop",
            "7",
            "--quiet",
        ]))
        .unwrap();

        let args = CompareArgs {
            baseline: out.join("LineLoadStrain.vtk"),
            candidate: out.join("LineLoadStrain.mhd"),
            tolerance: 0.0,
        };
        run_compare(&args).unwrap();
    }

    #[test]
    fn compare_fails_outside_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference");
        let perturbed = dir.path().join("perturbed");
        run_generate(&generate_args(&["-o", reference.to_str().unwrap(), "-q"])).unwrap();
        run_generate(&generate_args(&[
            "-o",
            perturbed.to_str().unwrap(),
            "-q",
            "--poisson-ratio",
            "0.3",
        ]))
        .unwrap();

        let args = CompareArgs {
            baseline: reference.join("LineLoadStrain.mhd"),
            candidate: perturbed.join("LineLoadStrain.mhd"),
            tolerance: 1e-9,
        };
        assert!(matches!(run_compare(&args), Err(BaselineError::Comparison(_))));
    }
}
