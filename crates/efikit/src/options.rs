use crate::env;
use alloc::string::{String, ToString};
use anyhow::{Result, bail};
use core::ptr::null_mut;
use jaarg::alloc::ParseMapResult;
use jaarg::{
    ErrorUsageWriter, ErrorUsageWriterContext, HelpWriter, HelpWriterContext, Opt, Opts,
    StandardErrorUsageWriter, StandardFullHelpWriter,
};
use log::{error, info};
use uefi_raw::Status;

/// Default configuration file path, on the first file system volume.
const DEFAULT_CONFIG_PATH: &str = "\\efikit.toml";

/// The parsed options of efikit.
#[derive(Debug)]
pub struct EfikitOptions {
    /// Path to a configuration file to load.
    pub config: String,
    /// Ignore the configuration file and use the built-in defaults.
    pub defaults: bool,
    /// Run only the named demonstration.
    pub demo: Option<String>,
    /// Show debug output.
    pub verbose: bool,
}

impl Default for EfikitOptions {
    fn default() -> Self {
        Self {
            config: DEFAULT_CONFIG_PATH.to_string(),
            defaults: false,
            demo: None,
            verbose: false,
        }
    }
}

impl EfikitOptions {
    /// Produces [EfikitOptions] from the load options of the image.
    pub fn parse() -> Result<Self> {
        const OPTIONS: Opts<&str> = Opts::new(&[
            Opt::help_flag("help", &["--help"]).help_text("Display efikit help"),
            Opt::value("config", &["--config"], "PATH")
                .help_text("Path to the efikit configuration file"),
            Opt::flag("defaults", &["--defaults"])
                .help_text("Ignore the configuration file and use defaults"),
            Opt::value("demo", &["--demo"], "NAME")
                .help_text("Run only one demo: file, network, graphics or discovery"),
            Opt::flag("verbose", &["--verbose"]).help_text("Show debug output"),
        ]);

        let args = env::args()?;

        let parsed = match OPTIONS.parse_map(
            "efikit",
            args.iter(),
            |program_name| {
                let ctx = HelpWriterContext {
                    options: &OPTIONS,
                    program_name,
                };
                info!("{}", StandardFullHelpWriter::new(ctx));
            },
            |program_name, error| {
                let ctx = ErrorUsageWriterContext {
                    options: &OPTIONS,
                    program_name,
                    error,
                };
                error!("{}", StandardErrorUsageWriter::new(ctx));
            },
        ) {
            ParseMapResult::Map(map) => map,
            // SAFETY: Nothing is held open that would outlive the image.
            ParseMapResult::ExitSuccess => unsafe {
                uefi::boot::exit(uefi::boot::image_handle(), Status::SUCCESS, 0, null_mut());
            },
            // SAFETY: See above.
            ParseMapResult::ExitFailure => unsafe {
                uefi::boot::exit(uefi::boot::image_handle(), Status::ABORTED, 0, null_mut());
            },
        };

        let mut result = Self::default();
        for (key, value) in parsed {
            match key {
                "config" => result.config = value,
                "defaults" => result.defaults = true,
                "demo" => result.demo = Some(value),
                "verbose" => result.verbose = true,
                _ => bail!("unknown option: --{key}"),
            }
        }
        Ok(result)
    }
}
