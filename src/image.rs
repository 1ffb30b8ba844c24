//! Loading a DLL file into a [`BinaryVariant`].
//!
//! The loader establishes the variant's identity from the image itself and refuses files
//! that disagree with what the caller expects to be loading.

use pelite::{pe32, pe64};

use crate::disasm::{BinaryVariant, CodeSection};
use crate::error::{Error, Result};
use crate::variant::{Bitness, Subsystem, VariantId};

/// Facts about a PE file needed to decode it.
#[derive(Debug, Clone)]
pub struct ImageInfo<'a> {
    pub bitness: Bitness,
    /// Low word of the product version, or `None` without a version resource.
    pub build: Option<u32>,
    pub code: CodeSection<'a>,
}

// pe32 and pe64 expose the same API through two distinct traits
macro_rules! image_info {
    ($pe:expr, $bitness:expr) => {{
        let pe = $pe;
        let header = pe.optional_header();
        let image_base = header.ImageBase as u64;

        let text = pe
            .section_headers()
            .iter()
            .find(|s| s.name_bytes() == b".text")
            .ok_or_else(|| Error::Precondition("image has no .text section".to_owned()))?;

        // Raw data is padded to the file alignment; keep only the mapped part
        let raw = pe.get_section_bytes(text)?;
        let bytes = &raw[..raw.len().min(text.VirtualSize as usize)];

        let build = pe
            .resources()
            .ok()
            .and_then(|r| r.version_info().ok())
            .and_then(|v| v.fixed().map(|f| f.dwProductVersion.Build as u32));

        ImageInfo {
            bitness: $bitness,
            build,
            code: CodeSection {
                image_base,
                image_size: header.SizeOfImage as u64,
                address: image_base + text.VirtualAddress as u64,
                bytes,
            },
        }
    }};
}

/// Reads the bitness, build number and `.text` section of a PE file.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo<'_>> {
    use pe32::Pe as _;
    use pe64::Pe as _;

    Ok(match pe64::PeFile::from_bytes(bytes) {
        Ok(pe) => image_info!(pe, Bitness::X64),
        Err(pelite::Error::PeMagic) => image_info!(pe32::PeFile::from_bytes(bytes)?, Bitness::X86),
        Err(e) => return Err(e.into()),
    })
}

/// Build number reported by the version resource of a module.
///
/// The 5767 CryRenderD3D10 shipped with an unset build number.
pub fn real_build(subsystem: Subsystem, reported: u32) -> u32 {
    match (subsystem, reported) {
        (Subsystem::CryRenderD3D10, 1) => 5767,
        _ => reported,
    }
}

/// Decodes the PE file in `bytes`, checking that it is the variant `expected`.
pub fn load_variant(bytes: &[u8], expected: VariantId) -> Result<BinaryVariant> {
    let info = inspect(bytes)?;

    if info.bitness != expected.bitness {
        return Err(Error::Precondition(format!(
            "expected {expected}, image is {}",
            info.bitness
        )));
    }

    let build = info
        .build
        .map(|b| real_build(expected.subsystem, b))
        .ok_or_else(|| Error::Precondition(format!("{expected}: image has no version resource")))?;
    if build != expected.build {
        return Err(Error::Precondition(format!(
            "expected {expected}, image reports build {build}"
        )));
    }

    BinaryVariant::decode(expected, info.code)
}
