//! Device categorization from the Bluetooth class-of-device bitmask.

/// Width and position of the major device class field inside the
/// class-of-device bitmask (bits 8..13).
const MAJOR_CLASS_SHIFT: u32 = 8;
const MAJOR_CLASS_MASK: u32 = 0x1F;

/// Coarse device category derived from the class-of-device bitmask.
///
/// Closed enumeration: every 32-bit bitmask maps to exactly one variant,
/// with unassigned major class values falling back to [`Unknown`].
///
/// [`Unknown`]: DeviceCategory::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    Misc,
    Computer,
    Phone,
    LanNetwork,
    AudioVideo,
    Peripheral,
    Imaging,
    Wearable,
    Toy,
    Health,
    Unknown,
}

impl DeviceCategory {
    /// Extract the major class field from a class-of-device bitmask and map
    /// it to a category. Total: no bitmask value fails.
    pub fn from_bitmask(bits: u32) -> Self {
        match (bits >> MAJOR_CLASS_SHIFT) & MAJOR_CLASS_MASK {
            0x00 => DeviceCategory::Misc,
            0x01 => DeviceCategory::Computer,
            0x02 => DeviceCategory::Phone,
            0x03 => DeviceCategory::LanNetwork,
            0x04 => DeviceCategory::AudioVideo,
            0x05 => DeviceCategory::Peripheral,
            0x06 => DeviceCategory::Imaging,
            0x07 => DeviceCategory::Wearable,
            0x08 => DeviceCategory::Toy,
            0x09 => DeviceCategory::Health,
            _ => DeviceCategory::Unknown,
        }
    }

    /// Categorize an optional bitmask; LE sightings carry none and are
    /// reported as [`DeviceCategory::Unknown`].
    pub fn classify(bits: Option<u32>) -> Self {
        bits.map_or(DeviceCategory::Unknown, Self::from_bitmask)
    }

    /// Wire label for this category.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCategory::Misc => "Misc",
            DeviceCategory::Computer => "Computer",
            DeviceCategory::Phone => "Phone",
            DeviceCategory::LanNetwork => "LAN/Network",
            DeviceCategory::AudioVideo => "Audio/Video",
            DeviceCategory::Peripheral => "Peripheral",
            DeviceCategory::Imaging => "Imaging",
            DeviceCategory::Wearable => "Wearable",
            DeviceCategory::Toy => "Toy",
            DeviceCategory::Health => "Health",
            DeviceCategory::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
