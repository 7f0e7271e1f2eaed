use efikit_config::runner::Demo;
use eficore::Firmware;

/// discovery: Count the handles that carry configured protocols.
pub mod discovery;

/// file: Write a file on the boot volume, read it back and list the root directory.
pub mod file;

/// graphics: Switch to the best graphics mode and draw on the screen.
pub mod graphics;

/// network: Bring up the first network interface and show its details.
pub mod network;

/// Every demo, in the order they run.
pub const DEMOS: &[Demo<Firmware>] = &[
    Demo {
        name: "file",
        enabled: |config| config.file.enabled,
        run: file::run,
    },
    Demo {
        name: "network",
        enabled: |config| config.network.enabled,
        run: network::run,
    },
    Demo {
        name: "graphics",
        enabled: |config| config.graphics.enabled,
        run: graphics::run,
    },
    Demo {
        name: "discovery",
        enabled: |config| config.discovery.enabled,
        run: discovery::run,
    },
];
