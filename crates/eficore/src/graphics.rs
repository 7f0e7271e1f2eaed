use crate::discovery::{Interface, Protocol};
use crate::firmware::Firmware;
use crate::pool::PoolBox;
use crate::status::{StatusError, check, fail, require};
use alloc::format;
use alloc::vec::Vec;
use anyhow::{Context, Result};
use core::fmt::{self, Display, Formatter};
use core::mem::size_of;
use core::ptr;
use log::{debug, info};
use uefi_raw::{Guid, Status, guid};

/// Color masks for [PixelFormat::BIT_MASK] modes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PixelBitmask {
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub reserved_mask: u32,
}

/// Layout of a pixel in the framebuffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    /// Red, green, blue, reserved; 8 bits each.
    pub const RGB: Self = Self(0);
    /// Blue, green, red, reserved; 8 bits each.
    pub const BGR: Self = Self(1);
    /// Layout given by the mode's [PixelBitmask].
    pub const BIT_MASK: Self = Self(2);
    /// No framebuffer, only Blt is available.
    pub const BLT_ONLY: Self = Self(3);
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::RGB => write!(f, "rgb"),
            Self::BGR => write!(f, "bgr"),
            Self::BIT_MASK => write!(f, "bitmask"),
            Self::BLT_ONLY => write!(f, "blt-only"),
            Self(other) => write!(f, "unknown({})", other),
        }
    }
}

/// Information about a graphics mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ModeInformation {
    pub version: u32,
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    pub pixel_format: PixelFormat,
    pub pixel_information: PixelBitmask,
    pub pixels_per_scan_line: u32,
}

/// The current mode of a graphics output protocol.
#[repr(C)]
pub struct GraphicsMode {
    pub max_mode: u32,
    pub mode: u32,
    pub info: *mut ModeInformation,
    pub size_of_info: usize,
    pub frame_buffer_base: u64,
    pub frame_buffer_size: usize,
}

/// A pixel as used by Blt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BltPixel {
    pub blue: u8,
    pub green: u8,
    pub red: u8,
    pub reserved: u8,
}

impl BltPixel {
    /// Build a pixel from its red, green and blue components.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            blue,
            green,
            red,
            reserved: 0,
        }
    }
}

/// Block transfer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BltOperation {
    /// Fill a rectangle of video memory with one pixel.
    VideoFill = 0,
    /// Copy video memory into a buffer.
    VideoToBltBuffer = 1,
    /// Copy a buffer into video memory.
    BufferToVideo = 2,
    /// Copy video memory to video memory.
    VideoToVideo = 3,
}

/// The graphics output protocol.
#[repr(C)]
pub struct GraphicsOutputProtocol {
    pub query_mode: Option<
        unsafe extern "efiapi" fn(
            this: *mut GraphicsOutputProtocol,
            mode_number: u32,
            size_of_info: *mut usize,
            info: *mut *mut ModeInformation,
        ) -> Status,
    >,
    pub set_mode:
        Option<unsafe extern "efiapi" fn(this: *mut GraphicsOutputProtocol, mode_number: u32) -> Status>,
    pub blt: Option<
        unsafe extern "efiapi" fn(
            this: *mut GraphicsOutputProtocol,
            blt_buffer: *mut BltPixel,
            blt_operation: BltOperation,
            source_x: usize,
            source_y: usize,
            destination_x: usize,
            destination_y: usize,
            width: usize,
            height: usize,
            delta: usize,
        ) -> Status,
    >,
    pub mode: *mut GraphicsMode,
}

impl Protocol for GraphicsOutputProtocol {
    const GUID: Guid = guid!("9042a9de-23dc-4a38-96fb-7aded080516a");
}

/// A rectangle on screen, in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    /// Create a rectangle at (`x`, `y`) of `width` by `height` pixels.
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered, or [None] if that overflows.
    fn area(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    /// Bytes per row of a Blt buffer holding this rectangle.
    fn row_bytes(&self) -> Result<usize> {
        self.width
            .checked_mul(size_of::<BltPixel>())
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("rectangle row size overflows")
    }

    /// Whether the rectangle lies within a `width` by `height` screen.
    fn fits(&self, width: u32, height: u32) -> bool {
        let inside = |start: usize, length: usize, limit: u32| {
            start
                .checked_add(length)
                .is_some_and(|end| end <= limit as usize)
        };
        inside(self.x, self.width, width) && inside(self.y, self.height, height)
    }
}

/// A located graphics output protocol.
pub struct GraphicsOutput<'fw> {
    interface: Interface<'fw, GraphicsOutputProtocol>,
}

impl<'fw> GraphicsOutput<'fw> {
    /// Locate the first graphics output protocol.
    pub fn locate(firmware: &'fw Firmware) -> Result<Self> {
        let raw = firmware
            .locate::<GraphicsOutputProtocol>()
            .context("unable to locate graphics output")?;
        Ok(Self {
            interface: Interface::new(firmware, raw),
        })
    }

    fn table(&self) -> &GraphicsOutputProtocol {
        self.interface.table()
    }

    /// The protocol's mode record.
    fn mode(&self) -> Result<&GraphicsMode> {
        let mode = self.table().mode;
        if mode.is_null() {
            return Err(fail(Status::NOT_READY, "graphics output has no mode"));
        }
        // SAFETY: Non-null mode records are owned by the protocol and outlive it.
        Ok(unsafe { &*mode })
    }

    /// Number of modes the device supports. Valid modes are `0..max_mode`.
    pub fn max_mode(&self) -> Result<u32> {
        Ok(self.mode()?.max_mode)
    }

    /// The current mode number and its information.
    pub fn current_mode(&self) -> Result<(u32, ModeInformation)> {
        let mode = self.mode()?;
        if mode.info.is_null() {
            return Err(fail(Status::NOT_READY, "graphics output has no mode information"));
        }
        // SAFETY: Non-null mode information is owned by the protocol.
        Ok((mode.mode, unsafe { *mode.info }))
    }

    /// Query information about `mode_number`.
    pub fn query_mode(&self, mode_number: u32) -> Result<ModeInformation> {
        let query_mode = require(self.table().query_mode, "QueryMode")?;

        let mut size = 0;
        let mut info = ptr::null_mut();
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe { query_mode(self.interface.raw.as_ptr(), mode_number, &mut size, &mut info) };
        check(status).with_context(|| format!("unable to query graphics mode {}", mode_number))?;

        // The firmware allocated the record for us, so it goes back to the pool.
        // SAFETY: QueryMode hands out a pool allocation we now own.
        let info = unsafe { PoolBox::adopt(self.interface.firmware, info) }
            .ok_or(StatusError::new(Status::BAD_BUFFER_SIZE))
            .context("firmware returned no mode information")?;
        if size < size_of::<ModeInformation>() {
            return Err(StatusError::new(Status::BAD_BUFFER_SIZE))
                .context("firmware returned truncated mode information");
        }
        Ok(*info)
    }

    /// Query every mode, yielding each mode number with its information.
    pub fn modes(&self) -> Result<impl Iterator<Item = (u32, Result<ModeInformation>)> + '_> {
        let max_mode = self.max_mode()?;
        Ok((0..max_mode).map(move |mode_number| (mode_number, self.query_mode(mode_number))))
    }

    /// Switch to `mode_number`.
    pub fn set_mode(&mut self, mode_number: u32) -> Result<()> {
        let set_mode = require(self.table().set_mode, "SetMode")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { set_mode(self.interface.raw.as_ptr(), mode_number) };
        check(status).with_context(|| format!("unable to set graphics mode {}", mode_number))?;
        debug!("set graphics mode {}", mode_number);
        Ok(())
    }

    /// Switch to the mode with the highest resolution.
    ///
    /// A mode wins when both its width and height exceed those of the best mode so far.
    /// Modes that fail to query are skipped. Returns the chosen mode, or [None] when no
    /// mode qualified and the current mode was kept.
    pub fn set_best_mode(&mut self) -> Result<Option<u32>> {
        let mut best: Option<(u32, u32, u32)> = None;

        for (mode_number, info) in self.modes()? {
            let info = match info {
                Ok(info) => info,
                Err(error) => {
                    debug!("skipping graphics mode {}: {:#}", mode_number, error);
                    continue;
                }
            };

            let (best_width, best_height) = best.map_or((0, 0), |(_, width, height)| (width, height));
            if info.horizontal_resolution > best_width && info.vertical_resolution > best_height {
                best = Some((
                    mode_number,
                    info.horizontal_resolution,
                    info.vertical_resolution,
                ));
            }
        }

        let Some((mode_number, width, height)) = best else {
            info!("no better graphics mode found, keeping the current mode");
            return Ok(None);
        };

        info!("selected graphics mode {} ({}x{})", mode_number, width, height);
        self.set_mode(mode_number)?;
        Ok(Some(mode_number))
    }

    /// Issue a Blt call.
    fn blt(
        &mut self,
        buffer: *mut BltPixel,
        operation: BltOperation,
        source: (usize, usize),
        destination: (usize, usize),
        size: (usize, usize),
        delta: usize,
    ) -> Result<()> {
        let blt = require(self.table().blt, "Blt")?;
        // SAFETY: Callers pass a buffer that matches the operation and size.
        let status = unsafe {
            blt(
                self.interface.raw.as_ptr(),
                buffer,
                operation,
                source.0,
                source.1,
                destination.0,
                destination.1,
                size.0,
                size.1,
                delta,
            )
        };
        check(status).with_context(|| format!("unable to perform {:?}", operation))?;
        Ok(())
    }

    /// Fill the whole screen with `color`.
    pub fn clear(&mut self, color: BltPixel) -> Result<()> {
        let (_, info) = self.current_mode()?;
        let screen = Rect::new(
            0,
            0,
            info.horizontal_resolution as usize,
            info.vertical_resolution as usize,
        );
        self.fill_rect(screen, color)
    }

    /// Fill `rect` with `color`.
    pub fn fill_rect(&mut self, rect: Rect, color: BltPixel) -> Result<()> {
        let mut color = color;
        self.blt(
            &mut color,
            BltOperation::VideoFill,
            (0, 0),
            (rect.x, rect.y),
            (rect.width, rect.height),
            0,
        )
    }

    /// Copy `pixels`, stored row by row, into `rect`.
    pub fn draw_bitmap(&mut self, rect: Rect, pixels: &[BltPixel]) -> Result<()> {
        let area = rect
            .area()
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("bitmap size overflows")?;
        if pixels.len() < area {
            return Err(fail(
                Status::INVALID_PARAMETER,
                "bitmap holds fewer pixels than the rectangle",
            ));
        }

        let delta = rect.row_bytes()?;

        // Blt never writes through the buffer for this operation.
        self.blt(
            pixels.as_ptr().cast_mut(),
            BltOperation::BufferToVideo,
            (0, 0),
            (rect.x, rect.y),
            (rect.width, rect.height),
            delta,
        )
    }

    /// Read the pixels of `rect` from the screen, row by row.
    /// The rectangle must lie within the current mode.
    pub fn capture(&mut self, rect: Rect) -> Result<Vec<BltPixel>> {
        let (_, info) = self.current_mode()?;
        if !rect.fits(info.horizontal_resolution, info.vertical_resolution) {
            return Err(fail(
                Status::INVALID_PARAMETER,
                "capture rectangle is outside the screen",
            ));
        }
        let area = rect
            .area()
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("capture size overflows")?;
        let delta = rect.row_bytes()?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(area)
            .map_err(|_| fail(Status::OUT_OF_RESOURCES, "unable to allocate capture buffer"))?;
        pixels.resize(area, BltPixel::default());
        self.blt(
            pixels.as_mut_ptr(),
            BltOperation::VideoToBltBuffer,
            (rect.x, rect.y),
            (0, 0),
            (rect.width, rect.height),
            delta,
        )?;
        Ok(pixels)
    }

    /// Copy the pixels of `source` on screen to (`x`, `y`).
    pub fn copy_rect(&mut self, source: Rect, x: usize, y: usize) -> Result<()> {
        self.blt(
            ptr::null_mut(),
            BltOperation::VideoToVideo,
            (source.x, source.y),
            (x, y),
            (source.width, source.height),
            0,
        )
    }
}
