//! wiggler-to-femm: CLI tool for generating Halbach wiggler FEMM problems

use anyhow::{bail, Context, Result};
use clap::Parser;
use halbach_femm::{
    solve_and_extract, translate, EmitConfig, FemmProcess, ForceUnit, LengthUnit, MagnetConfig,
    SolveConfig,
};
use std::fs;
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "wiggler-to-femm")]
#[command(about = "Generate a Halbach wiggler magnetostatic problem for FEMM")]
#[command(version)]
struct Args {
    /// JSON parameter file; flags below override its values
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Output Lua script
    #[arg(short, long, default_value = "wiggler.lua")]
    output: PathBuf,

    /// Print generated script to stdout instead of file
    #[arg(long)]
    stdout: bool,

    /// Print the resolved parameters as JSON and exit
    #[arg(long)]
    dump_params: bool,

    /// Length unit (inches, millimeters, centimeters, mils, meters, micrometers)
    #[arg(long)]
    units: Option<String>,

    /// Force unit (lbf, Newtons, kgf)
    #[arg(long)]
    force_units: Option<String>,

    /// Vertical magnet size
    #[arg(long)]
    magnet_width: Option<f64>,

    /// Horizontal size of the full-length magnets
    #[arg(long)]
    magnet_length: Option<f64>,

    /// Drift length between full-length magnets
    #[arg(long)]
    drift_length: Option<f64>,

    /// Half of the vertical gap between the magnet rows
    #[arg(long)]
    magnet_sep: Option<f64>,

    /// Return-yoke steel thickness (0 for none)
    #[arg(long)]
    steel_thick: Option<f64>,

    /// Air gap between adjacent magnets
    #[arg(long)]
    inter_magnet: Option<f64>,

    /// Clearance at both ends of the array
    #[arg(long)]
    margin: Option<f64>,

    /// Horizontal distance from the array to the outer boundary
    #[arg(long)]
    bound_horiz: Option<f64>,

    /// Additional copies of the base period
    #[arg(long)]
    repeats: Option<u32>,

    /// Magnet material (exact FEMM library name)
    #[arg(long)]
    magnet_material: Option<String>,

    /// Yoke material (exact FEMM library name)
    #[arg(long)]
    steel_material: Option<String>,

    /// Mesh size hint (0 for automatic)
    #[arg(long)]
    mesh_size: Option<f64>,

    /// Extra material names known to exist in the FEMM library
    #[arg(long = "allow-material")]
    allow_material: Vec<String>,

    /// File name FEMM saves the problem under
    #[arg(long, default_value = "wiggler.FEM")]
    fem_file: String,

    /// Run FEMM on the script and read back the on-axis field
    #[arg(long)]
    solve: bool,

    /// FEMM executable
    #[arg(long, default_value = "femm")]
    femm_exe: PathBuf,

    /// Contour samples along the beam axis
    #[arg(long, default_value = "25000")]
    samples: usize,

    /// Two-column file FEMM writes the field profile to
    #[arg(long, default_value = "field_profile.txt")]
    field_file: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<MagnetConfig> {
    let mut config = match &args.params {
        Some(path) => MagnetConfig::from_json_file(path)
            .with_context(|| format!("Failed to load parameters: {:?}", path))?,
        None => MagnetConfig::default(),
    };

    if let Some(units) = &args.units {
        config.length_unit = units.parse::<LengthUnit>()?;
    }
    if let Some(units) = &args.force_units {
        config.force_unit = units.parse::<ForceUnit>()?;
    }

    let overrides = [
        (args.magnet_width, &mut config.magnet_width),
        (args.magnet_length, &mut config.magnet_length),
        (args.drift_length, &mut config.drift_length),
        (args.magnet_sep, &mut config.magnet_sep),
        (args.steel_thick, &mut config.steel_thick),
        (args.inter_magnet, &mut config.inter_magnet),
        (args.margin, &mut config.margin),
        (args.bound_horiz, &mut config.bound_horiz),
        (args.mesh_size, &mut config.mesh_size),
    ];
    for (value, field) in overrides {
        if let Some(value) = value {
            *field = value;
        }
    }

    if let Some(repeats) = args.repeats {
        config.num_repeats = repeats;
    }
    if let Some(name) = &args.magnet_material {
        config.magnet_material = name.clone();
    }
    if let Some(name) = &args.steel_material {
        config.steel_material = name.clone();
    }

    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    if args.dump_params {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    config.validate().context("Invalid wiggler parameters")?;

    if args.solve && args.stdout {
        bail!("--solve needs the script on disk; drop --stdout");
    }

    let emit = EmitConfig {
        fem_file: args.fem_file.clone(),
        allow_materials: args.allow_material.clone(),
        solve: args.solve.then(|| SolveConfig {
            samples: args.samples,
            field_file: args.field_file.clone(),
        }),
        ..EmitConfig::default()
    };

    config
        .validate_materials(&emit.material_library())
        .context("Invalid material selection")?;

    let script = translate(&config, &emit).context("Script generation failed")?;

    if args.stdout {
        println!("{}", script);
        return Ok(());
    }

    fs::write(&args.output, &script)
        .with_context(|| format!("Failed to write output file: {:?}", args.output))?;
    info!("Generated FEMM script: {:?}", args.output);

    if args.solve {
        let femm = FemmProcess::new(&args.femm_exe);
        let profile = solve_and_extract(&femm, &args.output, &args.field_file)
            .context("FEMM solve failed")?;

        println!("samples: {}", profile.len());
        if let Some(peak) = profile.peak_abs_field() {
            println!("peak |B|: {:.4} T at x = {:.3} {}", peak.field.abs(), peak.position, config.length_unit);
        }
    }

    Ok(())
}
