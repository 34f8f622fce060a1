//! Command Line Interface helpers for delayspec

use crate::{
    containers::{TelescopeGeometry, VisStream},
    error::{CLIError::InvalidCommandLineArgument, DelaySpecError},
    estimate::DelaySpectrumContext,
    filter::DelayFilterContext,
    mask::ProductMask,
    rebin::rebin_frequency,
    window::WindowType,
    with_increment_duration,
};
use clap::{arg, command, ArgMatches, Command, ErrorKind::ArgumentNotFound, ValueHint::FilePath};
use log::{debug, info, trace};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::HashMap,
    ffi::OsString,
    fmt::{Debug, Display},
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match GIT_HEAD_REF {
        Some(hr) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                GIT_COMMIT_HASH.unwrap_or("<unknown>"),
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {hr}")?;
        }
        None => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {BUILT_TIME_UTC}")?;
    writeln!(f, "         with compiler {RUSTC_VERSION}")?;
    writeln!(f)?;
    Ok(())
}

/// Input for the spectrum subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumInput {
    /// Visibilities to estimate spectra of
    pub stream: VisStream,
    /// Layout of the telescope which observed them
    pub telescope: TelescopeGeometry,
}

/// Which task to run, and how.
#[derive(Debug, Clone)]
pub enum DelaySpecTask {
    /// Remove low delays from a stream
    Filter(DelayFilterContext),
    /// Estimate the delay spectrum of each baseline
    Spectrum(DelaySpectrumContext),
}

/// Input and output paths.
#[derive(Debug, Clone)]
pub struct IOContext {
    /// JSON input file
    pub input: PathBuf,
    /// JSON output file
    pub output: PathBuf,
}

/// Everything needed for one invocation of delayspec.
#[derive(Debug, Clone)]
pub struct DelaySpecContext {
    /// The task to run
    pub task: DelaySpecTask,
    /// Input / output paths
    pub io_ctx: IOContext,
    /// spectral rebinning factor applied before the task
    pub channel_bin: Option<usize>,
}

impl Display for DelaySpecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        writeln!(f, "Input:                {}", self.io_ctx.input.display())?;
        writeln!(f, "Output:               {}", self.io_ctx.output.display())?;
        if let Some(channel_bin) = self.channel_bin {
            writeln!(f, "Will rebin every {channel_bin} channels.")?;
        }
        match &self.task {
            DelaySpecTask::Filter(ctx) => writeln!(f, "Delay filter context: \n{ctx}")?,
            DelaySpecTask::Spectrum(ctx) => writeln!(f, "Delay spectrum context: \n{ctx}")?,
        }
        Ok(())
    }
}

/// Parse an optional value, passing on any error other than a missing argument.
fn optional_value<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>, DelaySpecError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    match matches.value_of_t::<T>(name) {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == ArgumentNotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn invalid_argument(option: &str, expected: &str, received: impl Display) -> DelaySpecError {
    DelaySpecError::CLIError(InvalidCommandLineArgument {
        option: option.into(),
        expected: expected.into(),
        received: format!("{received}"),
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DelaySpecError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DelaySpecError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn maybe_rebin(
    stream: VisStream,
    channel_bin: Option<usize>,
    durations: &mut HashMap<String, Duration>,
) -> Result<VisStream, DelaySpecError> {
    match channel_bin {
        Some(channel_bin) => Ok(with_increment_duration!(
            durations,
            "rebin",
            rebin_frequency(&stream, channel_bin)?
        )),
        None => Ok(stream),
    }
}

impl DelaySpecContext {
    fn get_matches<I, T>(args: I) -> Result<ArgMatches, DelaySpecError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let common = [
            arg!(-i --input <PATH> "JSON input file")
                .required(true)
                .value_hint(FilePath)
                .help_heading("INPUT"),
            arg!(-o --output <PATH> "JSON output file")
                .required(true)
                .value_hint(FilePath)
                .help_heading("OUTPUT"),
            arg!(--"channel-bin" <FACTOR> "Rebin <FACTOR> neighbouring channels before processing")
                .required(false),
            arg!(--"no-window" "Do not apodise"),
            arg!(--"dry-run" "Just print the summary and exit"),
            arg!(--"no-draw-progress" "do not show progress bars"),
        ];

        let mut app = command!()
            .subcommand_required(true)
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Estimate or filter the delay power spectrum of radio interferometer visibilities.")
            .subcommand(
                Command::new("filter")
                    .about("Remove power below a delay cut from every product of a stream")
                    .args(&common)
                    .args(&[
                        arg!(--"delay-cut" <US> "Delay below which power is removed [us]")
                            .required(false)
                            .default_value("0.1"),
                        arg!(--tol <TOL> "Singular values below <TOL> of the largest are kept")
                            .required(false),
                        arg!(--"num-delay" <COUNT> "Number of trial delays spanning the cut")
                            .required(false),
                        arg!(--"update-weight" "[WIP] Update the weights after filtering"),
                    ]),
            )
            .subcommand(
                Command::new("spectrum")
                    .about("Estimate the delay spectrum of each Stokes I baseline by Gibbs sampling")
                    .args(&common)
                    .args(&[
                        arg!(--nsamp <COUNT> "Number of Gibbs samples to draw")
                            .required(false)
                            .default_value("20"),
                        arg!(--"freq-zero" <MHZ> "Frequency of the zero channel [MHz]")
                            .help_heading("FREQUENCY")
                            .required(false),
                        arg!(--"freq-spacing" <MHZ> "Spacing of the underlying channels [MHz]")
                            .help_heading("FREQUENCY")
                            .required(false),
                        arg!(--nfreq <COUNT> "Number of channels in the full set")
                            .help_heading("FREQUENCY")
                            .required(false),
                        arg!(--"nyquist-present" "The Nyquist channel is included in the data")
                            .help_heading("FREQUENCY"),
                        arg!(--window <NAME> "Apodisation window")
                            .required(false)
                            .possible_values(["nuttall", "blackman_nuttall", "blackman_harris"])
                            .conflicts_with("no-window"),
                        arg!(--"initial-s" <VALUE> "Flat starting value of the spectrum")
                            .required(false),
                        arg!(--seed <SEED> "Seed for the random draws")
                            .required(false),
                        arg!(--"product-mask" <NAME>... "Exclude products from Stokes I")
                            .required(false)
                            .multiple_values(true)
                            .possible_values(["no_auto", "no_intra", "x_only", "y_only"]),
                    ]),
            );
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_io_matches(matches: &ArgMatches) -> IOContext {
        IOContext {
            input: match matches.value_of_t("input") {
                Ok(path) => path,
                _ => unreachable!("--input <PATH> is required, enforced by clap"),
            },
            output: match matches.value_of_t("output") {
                Ok(path) => path,
                _ => unreachable!("--output <PATH> is required, enforced by clap"),
            },
        }
    }

    fn parse_filter_matches(matches: &ArgMatches) -> Result<DelayFilterContext, DelaySpecError> {
        let mut ctx = DelayFilterContext::default();
        if let Some(delay_cut) = optional_value::<f64>(matches, "delay-cut")? {
            if !(delay_cut >= 0.0) {
                return Err(invalid_argument(
                    "--delay-cut <US>",
                    "a non-negative delay",
                    delay_cut,
                ));
            }
            ctx.delay_cut = delay_cut;
        }
        if let Some(tol) = optional_value::<f64>(matches, "tol")? {
            if !(tol > 0.0 && tol < 1.0) {
                return Err(invalid_argument("--tol <TOL>", "a value between 0 and 1", tol));
            }
            ctx.null_filter.tol = tol;
        }
        if let Some(num_delay) = optional_value::<usize>(matches, "num-delay")? {
            ctx.null_filter.num_delay = num_delay;
        }
        if matches.is_present("no-window") {
            ctx.null_filter.window = None;
        }
        ctx.update_weight = matches.is_present("update-weight");
        ctx.draw_progress = !matches.is_present("no-draw-progress");
        Ok(ctx)
    }

    fn parse_spectrum_matches(matches: &ArgMatches) -> Result<DelaySpectrumContext, DelaySpecError> {
        let mut ctx = DelaySpectrumContext::default();
        if let Some(nsamp) = optional_value::<usize>(matches, "nsamp")? {
            if nsamp == 0 {
                return Err(invalid_argument("--nsamp <COUNT>", "a positive count", nsamp));
            }
            ctx.nsamp = nsamp;
        }
        ctx.freq_zero = optional_value(matches, "freq-zero")?;
        if let Some(spacing) = optional_value::<f64>(matches, "freq-spacing")? {
            if !(spacing > 0.0) {
                return Err(invalid_argument(
                    "--freq-spacing <MHZ>",
                    "a positive spacing",
                    spacing,
                ));
            }
            ctx.freq_spacing = Some(spacing);
        }
        ctx.nfreq = optional_value(matches, "nfreq")?;
        ctx.skip_nyquist = !matches.is_present("nyquist-present");
        if matches.is_present("no-window") {
            ctx.window = None;
        } else if let Some(window) = optional_value::<WindowType>(matches, "window")? {
            ctx.window = Some(window);
        }
        if let Some(initial_s) = optional_value::<f64>(matches, "initial-s")? {
            if !(initial_s > 0.0 && initial_s.is_finite()) {
                return Err(invalid_argument(
                    "--initial-s <VALUE>",
                    "a positive spectrum value",
                    initial_s,
                ));
            }
            ctx.initial_s = initial_s;
        }
        ctx.seed = optional_value(matches, "seed")?;
        match matches.values_of_t::<ProductMask>("product-mask") {
            Ok(masks) => ctx.product_masks = masks,
            Err(err) if err.kind() == ArgumentNotFound => {}
            Err(err) => return Err(err.into()),
        }
        ctx.draw_progress = !matches.is_present("no-draw-progress");
        Ok(ctx)
    }

    /// Parse an iterator of arguments into a [`DelaySpecContext`].
    ///
    /// # Errors
    ///
    /// - [`DelaySpecError::ClapError`] if clap can't parse the arguments, or
    ///   help or version output was requested.
    /// - [`DelaySpecError::CLIError`] if the arguments are invalid.
    /// - [`DelaySpecError::DryRun`] if `--dry-run` was given.
    pub fn from_args<I, T>(args: I) -> Result<Self, DelaySpecError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let (task, sub_matches) = match matches.subcommand() {
            Some(("filter", sub_matches)) => (
                DelaySpecTask::Filter(Self::parse_filter_matches(sub_matches)?),
                sub_matches,
            ),
            Some(("spectrum", sub_matches)) => (
                DelaySpecTask::Spectrum(Self::parse_spectrum_matches(sub_matches)?),
                sub_matches,
            ),
            _ => unreachable!("a subcommand is required, enforced by clap"),
        };

        let io_ctx = Self::parse_io_matches(sub_matches);
        let channel_bin = optional_value::<usize>(sub_matches, "channel-bin")?;
        if channel_bin == Some(0) {
            return Err(invalid_argument(
                "--channel-bin <FACTOR>",
                "a positive factor",
                0,
            ));
        }

        let result = Self {
            task,
            io_ctx,
            channel_bin,
        };

        info!("{}", &result);

        if sub_matches.is_present("dry-run") {
            return Err(DelaySpecError::DryRun {});
        }

        Ok(result)
    }

    /// Read the input, run the task and write the output.
    ///
    /// # Errors
    ///
    /// can raise:
    /// - [`DelaySpecError::Io`] or [`DelaySpecError::Json`] if the files can't
    ///   be read or written.
    /// - [`DelaySpecError::BadArrayShape`] if the input is inconsistent.
    /// - errors from the task.
    pub fn run(self) -> Result<HashMap<String, Duration>, DelaySpecError> {
        let DelaySpecContext {
            task,
            io_ctx,
            channel_bin,
        } = self;

        // used to time large operations
        let mut durations = HashMap::<String, Duration>::new();

        match task {
            DelaySpecTask::Filter(ctx) => {
                let stream: VisStream =
                    with_increment_duration!(durations, "read", read_json(&io_ctx.input)?);
                stream.validate()?;
                let mut stream = maybe_rebin(stream, channel_bin, &mut durations)?;
                with_increment_duration!(durations, "filter", ctx.filter(&mut stream)?);
                with_increment_duration!(durations, "write", write_json(&io_ctx.output, &stream)?);
            }
            DelaySpecTask::Spectrum(ctx) => {
                let SpectrumInput { stream, telescope } =
                    with_increment_duration!(durations, "read", read_json(&io_ctx.input)?);
                stream.validate()?;
                telescope.validate()?;
                let stream = maybe_rebin(stream, channel_bin, &mut durations)?;
                let delay_spec = with_increment_duration!(
                    durations,
                    "spectrum",
                    ctx.estimate(&stream, &telescope)?
                );
                with_increment_duration!(
                    durations,
                    "write",
                    write_json(&io_ctx.output, &delay_spec)?
                );
            }
        }

        Ok(durations)
    }
}

#[cfg(test)]
mod argparse_tests {
    use super::*;
    use crate::containers::Polarisation;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_filter() {
        #[rustfmt::skip]
        let args = vec![
            "delayspec", "filter",
            "-i", "in.json",
            "-o", "out.json",
            "--delay-cut", "0.2",
            "--tol", "1e-6",
            "--no-window",
            "--no-draw-progress",
        ];
        let ctx = DelaySpecContext::from_args(&args).unwrap();
        assert_eq!(ctx.io_ctx.input, PathBuf::from("in.json"));
        assert_eq!(ctx.channel_bin, None);
        match &ctx.task {
            DelaySpecTask::Filter(filter_ctx) => {
                assert_abs_diff_eq!(filter_ctx.delay_cut, 0.2);
                assert_abs_diff_eq!(filter_ctx.null_filter.tol, 1e-6);
                assert_eq!(filter_ctx.null_filter.num_delay, 200);
                assert_eq!(filter_ctx.null_filter.window, None);
                assert!(!filter_ctx.draw_progress);
                assert!(!filter_ctx.update_weight);
            }
            task => panic!("expected filter task, not {task:?}"),
        }
        let display = format!("{}", &ctx);
        assert!(display.contains("Will remove delays below 0.2 us"));
        assert!(display.contains("Will not apodise"));
    }

    #[test]
    fn test_parse_spectrum() {
        #[rustfmt::skip]
        let args = vec![
            "delayspec", "spectrum",
            "-i", "in.json",
            "-o", "out.json",
            "--nsamp", "40",
            "--freq-spacing", "0.390625",
            "--nyquist-present",
            "--window", "blackman_harris",
            "--seed", "7",
            "--channel-bin", "2",
            "--product-mask", "no_auto", "y_only",
        ];
        let ctx = DelaySpecContext::from_args(&args).unwrap();
        assert_eq!(ctx.channel_bin, Some(2));
        match &ctx.task {
            DelaySpecTask::Spectrum(spec_ctx) => {
                assert_eq!(spec_ctx.nsamp, 40);
                assert_eq!(spec_ctx.freq_zero, None);
                assert_eq!(spec_ctx.freq_spacing, Some(0.390625));
                assert!(!spec_ctx.skip_nyquist);
                assert_eq!(spec_ctx.window, Some(WindowType::BlackmanHarris));
                assert_eq!(spec_ctx.seed, Some(7));
                assert_eq!(
                    spec_ctx.product_masks,
                    vec![ProductMask::NoAuto, ProductMask::PolOnly(Polarisation::Y)]
                );
                assert!(spec_ctx.draw_progress);
            }
            task => panic!("expected spectrum task, not {task:?}"),
        }
    }

    #[test]
    fn test_parse_missing_input() {
        let args = vec!["delayspec", "spectrum", "-o", "out.json"];
        match DelaySpecContext::from_args(&args) {
            Err(DelaySpecError::ClapError(inner)) => {
                assert_eq!(inner.kind(), clap::ErrorKind::MissingRequiredArgument);
            }
            Err(e) => panic!("expected missing required argument error, not {e}"),
            Ok(_) => panic!("expected error, but got Ok(_)"),
        }
    }

    #[test]
    fn test_parse_invalid_values() {
        #[rustfmt::skip]
        let args = vec![
            "delayspec", "spectrum", "-i", "in.json", "-o", "out.json", "--nsamp", "0",
        ];
        assert!(matches!(
            DelaySpecContext::from_args(&args),
            Err(DelaySpecError::CLIError(InvalidCommandLineArgument { .. }))
        ));

        #[rustfmt::skip]
        let args = vec![
            "delayspec", "spectrum", "-i", "in.json", "-o", "out.json", "--window", "hann",
        ];
        assert!(matches!(
            DelaySpecContext::from_args(&args),
            Err(DelaySpecError::ClapError(_))
        ));

        #[rustfmt::skip]
        let args = vec![
            "delayspec", "filter", "-i", "in.json", "-o", "out.json", "--tol", "2",
        ];
        assert!(matches!(
            DelaySpecContext::from_args(&args),
            Err(DelaySpecError::CLIError(InvalidCommandLineArgument { .. }))
        ));
    }

    #[test]
    fn test_dry_run() {
        #[rustfmt::skip]
        let args = vec![
            "delayspec", "filter", "-i", "in.json", "-o", "out.json", "--dry-run",
        ];
        assert!(matches!(
            DelaySpecContext::from_args(&args),
            Err(DelaySpecError::DryRun {})
        ));
    }
}
