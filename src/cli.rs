//! Command Line Interface helpers for chanavg

use std::{ffi::OsString, fmt::Debug, fmt::Display};

use clap::{arg, command, ErrorKind::DisplayHelp, ErrorKind::DisplayVersion};
use itertools::Itertools;
use log::{debug, info, trace};
use prettytable::{format as prettyformat, row, table, Table};

use crate::{
    config::{ChanAvgContext, ChanBin, ChanBinMap},
    error::{
        ChanAvgError::{self, ClapError, DryRun},
        CLIError::InvalidCommandLineArgument,
    },
};

/// Args for planning the channel averaging of a selection of spectral windows.
#[derive(Debug)]
pub struct ChanAvgCli {
    /// Averaging parameters
    pub chanavg_ctx: ChanAvgContext,
    /// The resolved bin widths
    pub bin_map: ChanBinMap,
}

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

/// Parse a `--spw` value of the form `SPW:NCHANS`.
///
/// # Errors
///
/// [`crate::CLIError::InvalidCommandLineArgument`] if the value isn't two
/// unsigned integers separated by a colon.
pub fn parse_spw_num_chans(value: &str) -> Result<(usize, usize), ChanAvgError> {
    value
        .split_once(':')
        .and_then(|(spw, num_chans)| {
            Some((spw.trim().parse().ok()?, num_chans.trim().parse().ok()?))
        })
        .ok_or_else(|| {
            InvalidCommandLineArgument {
                option: "--spw <SPW:NCHANS>".into(),
                expected: "<spw id>:<number of channels>, e.g. 0:64".into(),
                received: value.into(),
            }
            .into()
        })
}

impl Display for ChanAvgCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        let (num_input_chans, num_output_chans) = self
            .bin_map
            .iter()
            .fold((0, 0), |(num_in, num_out), (_, binning)| {
                (
                    num_in + binning.num_input_chans,
                    num_out + binning.num_output_chans,
                )
            });
        writeln!(
            f,
            "Averaging {} channels into {} channels over {} spectral windows ({}).",
            num_input_chans,
            num_output_chans,
            self.bin_map.len(),
            self.chanavg_ctx.as_comment()
        )?;

        writeln!(f, "Channel Averaging Context: \n{}", &self.chanavg_ctx)?;

        Ok(())
    }
}

impl ChanAvgCli {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, ChanAvgError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Plan the channel averaging of radio interferometric visibilities.")
            .args(&[
                arg!(--chanbin <CHANBIN> "Channels per averaged channel. Either one width for \
                        every spectral window, or a comma separated width for each --spw")
                    .help_heading("AVERAGING"),
                arg!(--spw <SPW_NCHANS>... "Spectral windows to average, as <spw id>:<number of channels>")
                    .help_heading("SELECTION")
                    .multiple_values(true),
                arg!(--"dry-run" "Just print the summary and exit"),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_chanavg_matches(matches: &clap::ArgMatches) -> Result<ChanAvgContext, ChanAvgError> {
        let chanbin: ChanBin = match matches.value_of("chanbin") {
            Some(chanbin) => chanbin.parse()?,
            None => unreachable!("--chanbin <CHANBIN> is required, enforced by clap"),
        };
        let spw_num_chans = match matches.values_of("spw") {
            Some(values) => values
                .map(parse_spw_num_chans)
                .collect::<Result<Vec<_>, _>>()?,
            None => unreachable!("--spw <SPW_NCHANS> is required, enforced by clap"),
        };
        Ok(ChanAvgContext {
            chanbin,
            spw_num_chans,
        })
    }

    /// Parse an iterator of arguments, `args` into a `ChanAvgCli`.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - [`clap::Error`] if clap cannot parse `args`
    /// - [`crate::ChanBinError`] if the chanbin can't be parsed or doesn't fit
    ///   the spw selection
    /// - [`crate::CLIError`] if a `--spw` value can't be parsed
    /// - [`ChanAvgError::DryRun`] if `--dry-run` was given
    pub fn from_args<I, T>(args: I) -> Result<Self, ChanAvgError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let chanavg_ctx = Self::parse_chanavg_matches(&matches)?;
        let bin_map = chanavg_ctx.bin_map()?;

        let result = Self {
            chanavg_ctx,
            bin_map,
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// A table of how each spectral window will be averaged.
    pub fn plan(&self) -> Table {
        let mut plan_table = table!([
            "",
            "chans",
            "chanbin",
            "width",
            "avg chans",
            "tail",
            "c"
        ]);
        plan_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (spw, binning) in self.bin_map.iter() {
            let tail = binning.trailing_bin_chans();
            plan_table.add_row(row![r =>
                format!("spw{spw}:"),
                binning.num_input_chans,
                binning.requested_width,
                binning.width,
                binning.num_output_chans,
                if tail > 0 { tail.to_string() } else { "".into() },
                if binning.is_clamped() { "c" } else { "" }
            ]);
        }
        plan_table
    }

    /// The widths in use, comma separated in spw order.
    pub fn resolved_chanbin(&self) -> String {
        self.bin_map
            .iter()
            .map(|(_, binning)| binning.width)
            .join(",")
    }
}

/// Run chanavg with the given arguments, returning the exit code.
pub fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    let chanavg_cli = match ChanAvgCli::from_args(args) {
        Ok(chanavg_cli) => chanavg_cli,
        Err(DryRun {}) => {
            info!("Dry run. Not printing the plan.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    println!(
        "Averaging plan (resolved chanbin {}):\n{}",
        chanavg_cli.resolved_chanbin(),
        chanavg_cli.plan()
    );
    0
}
