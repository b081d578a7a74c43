//! spinsim: fit a weakly coupled spin system to a 1D NMRPipe spectrum.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use solvent_spinsim::config::{ConfigError, Overrides, Settings};
use solvent_spinsim::data::nmrpipe_format::{read_nmrpipe_file, write_like, NmrPipeData, ReadError};
use solvent_spinsim::data::spectrum::RealSpectrum;
use solvent_spinsim::log::FitLog;
use solvent_spinsim::optimize::worker::{spawn_fit, FitEvent, FitRequest};
use solvent_spinsim::simulate::combined::simulate_combined;

#[derive(Parser)]
#[command(
    name = "spinsim",
    version,
    about = "Fit a weakly coupled spin system to a 1D NMRPipe spectrum"
)]
struct Cli {
    /// Settings JSON file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Spin-matrix text file
    #[arg(long)]
    spin_file: Option<PathBuf>,

    /// Input 1D NMRPipe spectrum
    #[arg(long)]
    nmr_file: Option<PathBuf>,

    /// Output NMRPipe file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Spectrometer frequency (MHz)
    #[arg(long)]
    field_strength: Option<f64>,

    /// Water bounds in Hz
    #[arg(long, num_args = 2, value_names = ["LEFT", "RIGHT"], allow_negative_numbers = true)]
    water_bounds: Option<Vec<f64>>,

    /// Fit the water line too
    #[arg(long, default_value_t = false)]
    water_enable: bool,

    /// Initial water frequency (Hz)
    #[arg(long, allow_negative_numbers = true)]
    water_frequency: Option<f64>,

    /// Initial water intensity
    #[arg(long, allow_negative_numbers = true)]
    water_intensity: Option<f64>,

    /// Initial water half-height width (Hz)
    #[arg(long)]
    water_hhw: Option<f64>,

    /// Points in the synthesized output
    #[arg(long)]
    points: Option<usize>,

    /// Save the fit log as JSON
    #[arg(long)]
    log: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            spin_file: self.spin_file.clone(),
            nmr_file: self.nmr_file.clone(),
            output_file: self.output.clone(),
            log_file: self.log.clone(),
            field_strength: self.field_strength,
            water_bounds: self.water_bounds.as_deref().and_then(|b| match b {
                [left, right] => Some((*left, *right)),
                _ => None,
            }),
            water_enable: self.water_enable,
            water_frequency: self.water_frequency,
            water_intensity: self.water_intensity,
            water_hhw: self.water_hhw,
            points: self.points,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    log::info!("spinsim v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> solvent_spinsim::Result<()> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_overrides(&cli.overrides());

    let mut fit_log = FitLog::new();

    let spin = settings.build_spin()?;
    fit_log.add_entry(
        "Spin System",
        &format!("{} nuclei at {} MHz", spin.len(), spin.field_strength()),
        &format!("names={:?} ppm={:?}", spin.names(), spin.ppm()),
    );
    let water = settings.build_water();
    if let Some(w) = &water {
        fit_log.add_entry(
            "Water",
            "Solvent line included in the fit",
            &format!("frequency={} intensity={} hhw={}", w.frequency(), w.intensity(), w.hhw()),
        );
    }

    let nmr_path = settings
        .nmr_file
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(ConfigError::Missing("nmr_file"))?;
    let data = read_nmrpipe_file(&nmr_path)?;
    fit_log.set_source(&nmr_path.display().to_string());
    let real = RealSpectrum::from_acquisition(data.values.clone(), data.acquisition, spin.field_strength());
    let limits = real.freq_range().ok_or(ReadError::Empty)?;
    fit_log.add_entry(
        "Read Spectrum",
        &format!("{} points", real.len()),
        &format!("hz={:.3}..{:.3}", limits.0, limits.1),
    );

    let water_range = settings.water_range();
    let handle = spawn_fit(FitRequest {
        real,
        spin,
        water_range,
        water,
        options: settings.opt_settings.minimizer,
    })?;
    for event in handle.events() {
        if let FitEvent::Iteration {
            quadrant,
            iteration,
            rmse,
        } = &event
        {
            if iteration % 100 == 0 {
                log::debug!("Quadrant {quadrant}: iteration {iteration}, RMSE {rmse:.6}");
            }
        }
        fit_log.record_event(&event);
    }
    let outcome = handle.join()?;
    fit_log.record_outcome(&outcome);

    let points = settings.sim_settings.points;
    let simulated = simulate_combined(&outcome.spin, outcome.water.as_ref(), points, Some(limits))?.reversed();
    write_output(&data, &simulated.y, &settings.output_file)?;
    fit_log.add_entry(
        "Write Output",
        &format!("{} points", simulated.len()),
        &settings.output_file.display().to_string(),
    );

    if let Some(path) = &settings.log_file {
        fit_log.save_json(path)?;
        log::info!("Fit log saved to {}", path.display());
    }
    Ok(())
}

fn write_output(template: &NmrPipeData, values: &[f64], path: &Path) -> std::io::Result<()> {
    write_like(template, values, path)?;
    log::info!("Wrote {} points to {}", values.len(), path.display());
    Ok(())
}
