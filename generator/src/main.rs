use std::{error::Error, path::Path, path::PathBuf};

use clap::Parser;
use memory_patch_gen::{
    builds::Selection,
    disasm::BinaryVariant,
    image,
    signature::catalog,
    Bitness, Subsystem, VariantId,
};

mod layout;
mod render;

use render::CodeWriter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct CliArgs {
    #[arg(
        long,
        value_name = "DIR",
        env = "CRY_DLLS_PATH",
        default_value = "DLLs",
        help = "Root of the DLL tree, one Crysis_<build> directory per build."
    )]
    dlls: PathBuf,

    #[arg(long, help = "Process every supported build instead of only 6156.")]
    full: bool,

    #[arg(
        long,
        value_name = "FILE",
        help = "Replace the generated section of this C++ file instead of printing it."
    )]
    output: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Only generate patches for this module.")]
    subsystem: Option<String>,

    #[arg(long, help = "Print every cross-reference of each loaded module.")]
    dump_xrefs: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    simplelog::TermLogger::init(
        match args.verbose {
            true => simplelog::LevelFilter::Debug,
            false => simplelog::LevelFilter::Info,
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let selection = match args.full {
        true => Selection::Full,
        false => Selection::Quick,
    };

    let subsystems = match &args.subsystem {
        Some(name) => vec![Subsystem::from_name(name)
            .ok_or_else(|| format!("'{name}' is not a known module"))?],
        None => catalog::patched_subsystems(),
    };

    let mut writer = CodeWriter::default();
    render::file_header(&mut writer)?;

    for subsystem in subsystems {
        render::subsystem_header(&mut writer, subsystem)?;

        // 32-bit builds first, then 64-bit, each loaded only once its predecessor is done
        let variants = [Bitness::X86, Bitness::X64]
            .into_iter()
            .flat_map(|bitness| {
                selection
                    .builds(bitness)
                    .into_iter()
                    .map(move |build| VariantId::new(subsystem, build, bitness))
            })
            .map(|id| load(&args.dlls, id, args.dump_xrefs));

        for patch in memory_patch_gen::generate(subsystem, variants)? {
            log::info!("Generating {}", patch.function_name());
            render::patch(&mut writer, &patch)?;
        }
    }

    match &args.output {
        Some(path) => {
            log::info!("Writing {}", path.display());
            let existing = std::fs::read_to_string(path)?;
            std::fs::write(path, render::splice(&existing, writer.lines())?)?;
        }
        None => println!("{}", writer.lines().join("\n")),
    }

    Ok(())
}

fn load(root: &Path, id: VariantId, dump_xrefs: bool) -> memory_patch_gen::Result<BinaryVariant> {
    let path = layout::module_path(root, id.subsystem, id.build, id.bitness).ok_or_else(|| {
        memory_patch_gen::Error::Precondition(format!("no known game has build {}", id.build))
    })?;

    log::info!("Loading {}", path.display());
    let bytes = std::fs::read(&path)?;
    let variant = image::load_variant(&bytes, id)?;

    if dump_xrefs {
        variant.xref_listing().for_each(|line| println!("{line}"));
    }
    Ok(variant)
}
