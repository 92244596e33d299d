//! Binary image validation and the firmware-descriptor contract.
//!
//! Container unpacking and architecture detection live outside this crate.
//! Their results arrive as a [`FirmwareDescriptor`], which is validated here
//! before any core is built from it.

use thiserror::Error;

use crate::memory::RAM_BASE;
use crate::{Architecture, EmulatorError};

/// Hard ceiling on accepted image size (1 GiB).
pub const MAX_IMAGE_BYTES: usize = 1 << 30;

/// Reasons an image is rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ImageError {
    /// Image contains no bytes.
    #[error("image is empty")]
    Empty,
    /// Image exceeds the size ceiling.
    #[error("image is {len} bytes, limit is {limit}")]
    TooLarge {
        /// Image length in bytes.
        len: usize,
        /// Accepted ceiling in bytes.
        limit: usize,
    },
    /// Image would not fit inside the ROM region at the requested address.
    #[error("image of {len} bytes does not fit in ROM at {address:#010x}")]
    LoadAddressOutOfRom {
        /// Requested load address.
        address: u32,
        /// Image length in bytes.
        len: usize,
    },
    /// Configured region buffer exceeds the size ceiling.
    #[error("{region} size of {len} bytes exceeds the limit of {limit}")]
    RegionTooLarge {
        /// Region name, `rom` or `ram`.
        region: &'static str,
        /// Configured size in bytes.
        len: usize,
        /// Accepted ceiling in bytes.
        limit: usize,
    },
    /// Descriptor was marked invalid by the loader that produced it.
    #[error("firmware descriptor is marked invalid")]
    DescriptorInvalid,
    /// Payload entry point falls inside the boot program placed before it.
    #[error("payload entry {entry:#010x} overlaps boot program ending at {boot_end:#010x}")]
    PayloadOverlap {
        /// Requested payload entry point.
        entry: u32,
        /// First address past the boot program.
        boot_end: u32,
    },
}

/// Checks an image length against the empty and ceiling policies.
///
/// # Errors
///
/// Returns [`ImageError::Empty`] or [`ImageError::TooLarge`].
pub const fn check_image_len(len: usize) -> Result<(), ImageError> {
    if len == 0 {
        return Err(ImageError::Empty);
    }
    if len > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge {
            len,
            limit: MAX_IMAGE_BYTES,
        });
    }
    Ok(())
}

/// Checks that `len` bytes loaded at `address` stay inside the ROM region.
///
/// # Errors
///
/// Returns [`ImageError::LoadAddressOutOfRom`] when the image would overlap RAM.
pub fn check_rom_placement(address: u32, len: usize) -> Result<(), ImageError> {
    let end = u64::from(address) + len as u64;
    if end > u64::from(RAM_BASE) {
        return Err(ImageError::LoadAddressOutOfRom { address, len });
    }
    Ok(())
}

/// Loader output consumed by core selection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FirmwareDescriptor {
    /// Extracted image bytes.
    pub data: Vec<u8>,
    /// Container format tag reported by the loader (informational).
    pub format: String,
    /// Architecture tag reported by the detector.
    pub architecture: String,
    /// Estimated entry point, used as the load address.
    pub estimated_entry_point: u32,
    /// Loader's own validity verdict.
    pub is_valid: bool,
}

impl FirmwareDescriptor {
    /// Validates the descriptor and resolves its architecture tag.
    ///
    /// The architecture and entry point are trusted as load parameters; the
    /// data length is checked independently.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidImage`] for invalid, empty, oversized,
    /// or misplaced data, and [`EmulatorError::UnknownArchitecture`] for an
    /// unrecognised tag.
    pub fn validate(&self) -> Result<Architecture, EmulatorError> {
        if !self.is_valid {
            return Err(ImageError::DescriptorInvalid.into());
        }
        check_image_len(self.data.len())?;
        check_rom_placement(self.estimated_entry_point, self.data.len())?;
        Architecture::from_tag(&self.architecture)
    }
}

/// Seam for the external architecture detector.
pub trait ArchitectureDetector {
    /// Classifies a raw image, or returns `None` when no architecture matches.
    fn detect(&self, image: &[u8]) -> Option<Architecture>;
}
