use crate::RootConfiguration;
use anyhow::{Result, bail};
use log::{error, info};

/// A demonstration run against some context `C`, usually the firmware.
pub struct Demo<C: ?Sized> {
    /// The name used to select the demo on the command line.
    pub name: &'static str,
    /// Whether the configuration enables this demo.
    pub enabled: fn(&RootConfiguration) -> bool,
    /// Run the demo.
    pub run: fn(&C, &RootConfiguration) -> Result<()>,
}

/// Run the enabled `demos` in order, or only the demo named `only` whether enabled or not.
/// A failing demo is reported and does not stop the ones after it.
/// Returns the number of demos that failed.
pub fn run_all<C: ?Sized>(
    context: &C,
    demos: &[Demo<C>],
    config: &RootConfiguration,
    only: Option<&str>,
) -> Result<usize> {
    if let Some(only) = only
        && !demos.iter().any(|demo| demo.name == only)
    {
        bail!("unknown demo: {}", only);
    }

    let mut failures = 0;
    for demo in demos {
        let selected = match only {
            Some(only) => demo.name == only,
            None => (demo.enabled)(config),
        };
        if !selected {
            info!("skipping the {} demo", demo.name);
            continue;
        }

        info!("running the {} demo", demo.name);
        if let Err(error) = (demo.run)(context, config) {
            failures += 1;
            error!("the {} demo failed", demo.name);
            for (index, stack) in error.chain().enumerate() {
                error!("[{}]: {}", index, stack);
            }
        }
    }
    Ok(failures)
}
