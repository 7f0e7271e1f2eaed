use alloc::string::{String, ToString};
use alloc::vec::Vec;
use anyhow::{Context, Result, bail};
use uefi::proto::loaded_image::{LoadOptionsError, LoadedImage};

/// Loads the command-line arguments passed to efikit through its load options.
pub fn args() -> Result<Vec<String>> {
    let handle = uefi::boot::image_handle();
    let loaded_image = uefi::boot::open_protocol_exclusive::<LoadedImage>(handle)
        .context("unable to open loaded image protocol for efikit")?;

    let options = match loaded_image.load_options_as_cstr16() {
        Ok(options) => options.to_string(),
        // Started without options, e.g. from the boot manager.
        Err(LoadOptionsError::NotSet) => return Ok(Vec::new()),
        Err(LoadOptionsError::NotAligned) => bail!("load options are not properly aligned"),
        Err(LoadOptionsError::InvalidString(error)) => {
            bail!("load options are not a valid string: {}", error)
        }
    };

    Ok(split(&options))
}

/// Split a load options string into arguments.
///
/// Quoting follows shell rules, falling back to whitespace when the quoting is broken.
/// Leading junk that some firmware prepends is dropped, as is the image path when the
/// shell passes it as the first argument.
fn split(options: &str) -> Vec<String> {
    let mut args = shlex::split(options).unwrap_or_else(|| {
        options
            .split_ascii_whitespace()
            .map(|string| string.to_string())
            .collect::<Vec<_>>()
    });

    // Unprintable characters and backticks have both been seen in front of real options.
    args = args
        .into_iter()
        .skip_while(|arg| {
            arg.chars()
                .next()
                .map(|c| c < 0x1f as char || c == '`')
                .unwrap_or(false)
        })
        .collect();

    if let Some(arg) = args.first()
        && !arg.starts_with('-')
    {
        args.remove(0);
    }
    args
}
