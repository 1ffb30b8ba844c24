//! Identity of a single compiled binary: which module, which build, which bitness.

use std::fmt;

/// Instruction set flavor of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bitness {
    X86,
    X64,
}

impl Bitness {
    pub const ALL: [Bitness; 2] = [Bitness::X64, Bitness::X86];

    /// Bitness value as understood by [`iced_x86::Decoder`] and [`iced_x86::Encoder`].
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Bitness::X86 => 32,
            Bitness::X64 => 64,
        }
    }

    #[inline]
    pub fn is_64bit(self) -> bool {
        self == Bitness::X64
    }
}

impl fmt::Display for Bitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Game module a variant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subsystem {
    Cry3DEngine,
    CryAISystem,
    CryAction,
    CryAnimation,
    CryEntitySystem,
    CryFont,
    CryGame,
    CryInput,
    CryMovie,
    CryNetwork,
    CryPhysics,
    CryRenderD3D10,
    CryRenderD3D9,
    CryRenderNULL,
    CryScriptSystem,
    CrySoundSystem,
    CrySystem,
}

impl Subsystem {
    pub const ALL: [Subsystem; 17] = [
        Subsystem::Cry3DEngine,
        Subsystem::CryAISystem,
        Subsystem::CryAction,
        Subsystem::CryAnimation,
        Subsystem::CryEntitySystem,
        Subsystem::CryFont,
        Subsystem::CryGame,
        Subsystem::CryInput,
        Subsystem::CryMovie,
        Subsystem::CryNetwork,
        Subsystem::CryPhysics,
        Subsystem::CryRenderD3D10,
        Subsystem::CryRenderD3D9,
        Subsystem::CryRenderNULL,
        Subsystem::CryScriptSystem,
        Subsystem::CrySoundSystem,
        Subsystem::CrySystem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Cry3DEngine => "Cry3DEngine",
            Subsystem::CryAISystem => "CryAISystem",
            Subsystem::CryAction => "CryAction",
            Subsystem::CryAnimation => "CryAnimation",
            Subsystem::CryEntitySystem => "CryEntitySystem",
            Subsystem::CryFont => "CryFont",
            Subsystem::CryGame => "CryGame",
            Subsystem::CryInput => "CryInput",
            Subsystem::CryMovie => "CryMovie",
            Subsystem::CryNetwork => "CryNetwork",
            Subsystem::CryPhysics => "CryPhysics",
            Subsystem::CryRenderD3D10 => "CryRenderD3D10",
            Subsystem::CryRenderD3D9 => "CryRenderD3D9",
            Subsystem::CryRenderNULL => "CryRenderNULL",
            Subsystem::CryScriptSystem => "CryScriptSystem",
            Subsystem::CrySoundSystem => "CrySoundSystem",
            Subsystem::CrySystem => "CrySystem",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.dll", self.name())
    }

    /// Case-insensitive lookup by module name, with or without the `.dll` suffix.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_suffix(".dll").unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one binary variant as established by the loader.
///
/// The build number is an opaque grouping key; nothing in the matching logic interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantId {
    pub subsystem: Subsystem,
    pub build: u32,
    pub bitness: Bitness,
}

impl VariantId {
    pub fn new(subsystem: Subsystem, build: u32, bitness: Bitness) -> Self {
        Self {
            subsystem,
            build,
            bitness,
        }
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build {} ({})", self.subsystem, self.build, self.bitness)
    }
}
