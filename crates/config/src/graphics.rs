use crate::enabled;
use serde::{Deserialize, Serialize};

/// The configuration of the graphics demonstration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GraphicsConfiguration {
    /// Whether to run the demonstration.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Whether to switch to the highest resolution mode first.
    #[serde(default = "enabled", rename = "best-mode")]
    pub best_mode: bool,
    /// The screen background, as red, green and blue.
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    /// The rectangle drawn on top of the background.
    #[serde(default)]
    pub rectangle: RectangleConfiguration,
}

/// A filled rectangle on screen.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RectangleConfiguration {
    #[serde(default = "default_offset")]
    pub x: usize,
    #[serde(default = "default_offset")]
    pub y: usize,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    /// The fill color, as red, green and blue.
    #[serde(default = "default_color")]
    pub color: [u8; 3],
}

fn default_background() -> [u8; 3] {
    [0, 0, 128]
}

fn default_offset() -> usize {
    50
}

fn default_width() -> usize {
    200
}

fn default_height() -> usize {
    100
}

fn default_color() -> [u8; 3] {
    [255, 255, 255]
}

impl Default for GraphicsConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            best_mode: true,
            background: default_background(),
            rectangle: Default::default(),
        }
    }
}

impl Default for RectangleConfiguration {
    fn default() -> Self {
        Self {
            x: default_offset(),
            y: default_offset(),
            width: default_width(),
            height: default_height(),
            color: default_color(),
        }
    }
}
