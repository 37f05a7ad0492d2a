use std::fmt;

use serde::Serialize;

use crate::bundle::Bundle;
use crate::error::InvalidConfiguration;

/// Colour depths an image-capable cluster may advertise.
pub const SUPPORTED_COLOR_DEPTHS: [u32; 3] = [8, 16, 32];

/// What kind of next-turn information the cluster can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Next-turn messages may carry a custom image as well as an enum code.
    ImageCapable,
    /// Next-turn messages carry only an enum code.
    EnumOnly,
}

impl ClusterKind {
    pub const IMAGE_CAPABLE_CODE: u32 = 1;
    pub const ENUM_ONLY_CODE: u32 = 2;

    pub fn code(self) -> u32 {
        match self {
            ClusterKind::ImageCapable => Self::IMAGE_CAPABLE_CODE,
            ClusterKind::EnumOnly => Self::ENUM_ONLY_CODE,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            Self::IMAGE_CAPABLE_CODE => Some(ClusterKind::ImageCapable),
            Self::ENUM_ONLY_CODE => Some(ClusterKind::EnumOnly),
            _ => None,
        }
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterKind::ImageCapable => f.write_str("image-capable"),
            ClusterKind::EnumOnly => f.write_str("enum-only"),
        }
    }
}

/// Navigation capabilities of the instrument cluster.
///
/// Image geometry is only meaningful for [`ClusterKind::ImageCapable`]; the
/// enum-only constructor zeroes it. Values are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterConfig {
    min_interval_millis: u32,
    kind: ClusterKind,
    image_width: u32,
    image_height: u32,
    image_color_depth_bits: u32,
    extra: Bundle,
}

impl ClusterConfig {
    /// A cluster that renders next-turn enum codes only.
    pub fn enum_only(min_interval_millis: u32) -> Self {
        Self {
            min_interval_millis,
            kind: ClusterKind::EnumOnly,
            image_width: 0,
            image_height: 0,
            image_color_depth_bits: 0,
            extra: Bundle::new(),
        }
    }

    /// A cluster that additionally renders custom next-turn images.
    pub fn image_capable(
        min_interval_millis: u32,
        image_width: u32,
        image_height: u32,
        image_color_depth_bits: u32,
    ) -> Result<Self, InvalidConfiguration> {
        validate_image(image_width, image_height, image_color_depth_bits)?;
        Ok(Self {
            min_interval_millis,
            kind: ClusterKind::ImageCapable,
            image_width,
            image_height,
            image_color_depth_bits,
            extra: Bundle::new(),
        })
    }

    /// Returns a copy carrying `extra` as its extension map.
    pub fn with_extra(mut self, extra: Bundle) -> Self {
        self.extra = extra;
        self
    }

    /// Minimum time between cluster updates, in milliseconds.
    pub fn min_interval_millis(&self) -> u32 {
        self.min_interval_millis
    }

    pub fn kind(&self) -> ClusterKind {
        self.kind
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn image_color_depth_bits(&self) -> u32 {
        self.image_color_depth_bits
    }

    pub fn extra(&self) -> &Bundle {
        &self.extra
    }

    pub fn supports_custom_images(&self) -> bool {
        self.kind == ClusterKind::ImageCapable
    }

    /// Rebuilds a config from decoded fields, rejecting contradictory ones.
    pub(crate) fn from_parts(
        min_interval_millis: u32,
        kind: ClusterKind,
        image_width: u32,
        image_height: u32,
        image_color_depth_bits: u32,
        extra: Bundle,
    ) -> Result<Self, &'static str> {
        match kind {
            ClusterKind::EnumOnly => {
                if image_width != 0 || image_height != 0 || image_color_depth_bits != 0 {
                    return Err("enum-only cluster carries image geometry");
                }
                Ok(Self::enum_only(min_interval_millis).with_extra(extra))
            }
            ClusterKind::ImageCapable => Self::image_capable(
                min_interval_millis,
                image_width,
                image_height,
                image_color_depth_bits,
            )
            .map(|config| config.with_extra(extra))
            .map_err(|_| "invalid image geometry"),
        }
    }
}

fn validate_image(width: u32, height: u32, depth: u32) -> Result<(), InvalidConfiguration> {
    if width == 0 {
        return Err(InvalidConfiguration::ZeroImageWidth);
    }
    if height == 0 {
        return Err(InvalidConfiguration::ZeroImageHeight);
    }
    if !SUPPORTED_COLOR_DEPTHS.contains(&depth) {
        return Err(InvalidConfiguration::UnsupportedColorDepth(depth));
    }
    Ok(())
}

impl fmt::Display for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusterConfig{{ minIntervalMillis: {}, kind: {}, imageWidth: {}, imageHeight: {}, imageColorDepthBits: {}, extra: {} }}",
            self.min_interval_millis,
            self.kind,
            self.image_width,
            self.image_height,
            self.image_color_depth_bits,
            self.extra
        )
    }
}
