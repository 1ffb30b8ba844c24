//! Known game builds and which of them a generation run covers.

use crate::variant::Bitness;

pub const CRYSIS_BUILDS: &[u32] = &[5767, 5879, 6115, 6156];
pub const CRYSIS_WARS_64BIT_BUILDS: &[u32] = &[6566, 6586, 6627, 6670, 6729];
pub const CRYSIS_WARS_32BIT_BUILDS: &[u32] = &[6527, 6566, 6586, 6627, 6670, 6729];
pub const CRYSIS_WARHEAD_64BIT_BUILDS: &[u32] = &[710, 711];
pub const CRYSIS_WARHEAD_32BIT_BUILDS: &[u32] = &[687, 710, 711];

/// Build used when only a quick check is requested.
pub const QUICK_BUILD: u32 = 6156;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    Crysis,
    CrysisWars,
    CrysisWarhead,
}

impl Game {
    pub fn of_build(build: u32) -> Option<Self> {
        if CRYSIS_BUILDS.contains(&build) {
            Some(Game::Crysis)
        } else if CRYSIS_WARS_32BIT_BUILDS.contains(&build) {
            Some(Game::CrysisWars)
        } else if CRYSIS_WARHEAD_32BIT_BUILDS.contains(&build) {
            Some(Game::CrysisWarhead)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Game::Crysis => "Crysis",
            Game::CrysisWars => "Crysis Wars",
            Game::CrysisWarhead => "Crysis Warhead",
        }
    }
}

/// Which builds a generation run loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Only [`QUICK_BUILD`], once per bitness. Output is printed, not written.
    #[default]
    Quick,
    /// Every supported build of every game.
    Full,
}

impl Selection {
    /// Builds to load for `bitness`, in load order.
    ///
    /// 32-bit Crysis Warhead is not supported and never loaded.
    pub fn builds(self, bitness: Bitness) -> Vec<u32> {
        match (self, bitness) {
            (Selection::Quick, _) => vec![QUICK_BUILD],
            (Selection::Full, Bitness::X86) => CRYSIS_BUILDS
                .iter()
                .chain(CRYSIS_WARS_32BIT_BUILDS)
                .copied()
                .collect(),
            (Selection::Full, Bitness::X64) => CRYSIS_BUILDS
                .iter()
                .chain(CRYSIS_WARS_64BIT_BUILDS)
                .chain(CRYSIS_WARHEAD_64BIT_BUILDS)
                .copied()
                .collect(),
        }
    }
}
