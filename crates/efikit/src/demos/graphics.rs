use crate::console;
use anyhow::{Context, Result};
use efikit_config::RootConfiguration;
use eficore::graphics::{BltPixel, GraphicsOutput, Rect};
use eficore::{Firmware, Status, status_of};
use log::info;

/// Convert a configured `[red, green, blue]` triple.
fn color([red, green, blue]: [u8; 3]) -> BltPixel {
    BltPixel::rgb(red, green, blue)
}

/// Switch to the best mode, paint the background and draw the configured rectangle.
pub fn run(firmware: &Firmware, config: &RootConfiguration) -> Result<()> {
    let graphics_config = &config.graphics;
    let mut graphics = match GraphicsOutput::locate(firmware) {
        Ok(graphics) => graphics,
        Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => {
            info!("no graphics output found");
            return Ok(());
        }
        Err(error) => return Err(error),
    };

    if graphics_config.best_mode {
        match graphics.set_best_mode().context("unable to switch graphics mode")? {
            Some(mode) => info!("switched to graphics mode {}", mode),
            None => info!("current graphics mode is already the largest"),
        }
    }

    let (mode, info) = graphics.current_mode()?;
    info!(
        "mode {}: {}x{} {}",
        mode, info.horizontal_resolution, info.vertical_resolution, info.pixel_format
    );
    info!("Drawing on screen...");

    graphics.clear(color(graphics_config.background))?;
    let rectangle = &graphics_config.rectangle;
    graphics.fill_rect(
        Rect::new(rectangle.x, rectangle.y, rectangle.width, rectangle.height),
        color(rectangle.color),
    )?;

    if config.pause {
        console::pause(
            firmware,
            "Graphics demo completed. Press any key to return to text mode...",
        )?;
    }
    console::text_mode()
}
