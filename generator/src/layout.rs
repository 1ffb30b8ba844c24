use std::path::{Path, PathBuf};

use memory_patch_gen::builds::Game;
use memory_patch_gen::{Bitness, Subsystem};

/// Path of a module inside the DLL tree:
///
/// ```text
/// DLLs/
/// ├── Crysis_6156/Bin32/*.dll
/// ├── Crysis_6156/Bin64/*.dll
/// ├── Crysis_Wars_6729/...
/// └── Crysis_Warhead_711/Bin64/Crysis64.exe
/// ```
pub fn module_path(
    root: &Path,
    subsystem: Subsystem,
    build: u32,
    bitness: Bitness,
) -> Option<PathBuf> {
    let game = Game::of_build(build)?;
    let build_dir = match game {
        Game::Crysis => format!("Crysis_{build}"),
        Game::CrysisWars => format!("Crysis_Wars_{build}"),
        Game::CrysisWarhead => format!("Crysis_Warhead_{build}"),
    };
    let bin_dir = match bitness {
        Bitness::X86 => "Bin32",
        Bitness::X64 => "Bin64",
    };

    // Warhead links CryAction and CryGame into its executable
    let file_name = match (game, subsystem) {
        (Game::CrysisWarhead, Subsystem::CryAction | Subsystem::CryGame) => {
            "Crysis64.exe".to_owned()
        }
        _ => subsystem.file_name(),
    };

    Some(root.join(build_dir).join(bin_dir).join(file_name))
}
