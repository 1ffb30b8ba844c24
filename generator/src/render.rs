//! C++ rendering of generated patches, in the style of `MemoryPatch.cpp`.

use std::error::Error;

use memory_patch_gen::cases::Branch;
use memory_patch_gen::hook::HookStub;
use memory_patch_gen::iced_x86::{Formatter, MasmFormatter};
use memory_patch_gen::memory_patch::GeneratedPatch;
use memory_patch_gen::{Bitness, Subsystem};

pub const MARKER: &str = "// GENERATED MEMORY PATCHES";
const SEPARATOR: &str =
    "////////////////////////////////////////////////////////////////////////////////";

const INDENT: &str = "\t";
const MAX_LINE_LENGTH: usize = 120;

#[derive(Default)]
pub struct CodeWriter {
    indent_level: usize,
    lines: Vec<String>,
}

impl CodeWriter {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn add(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        let line = match line.is_empty() {
            true => String::new(),
            false => INDENT.repeat(self.indent_level) + line,
        };
        self.push(line)
    }

    /// Adds a line ignoring the current indentation, for preprocessor directives.
    pub fn add_unindented(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        self.push(line.to_owned())
    }

    fn push(&mut self, line: String) -> Result<(), Box<dyn Error>> {
        // Tabs count as one column
        if line.chars().count() > MAX_LINE_LENGTH {
            return Err(format!("Too long line: \"{line}\"").into());
        }
        self.lines.push(line);
        Ok(())
    }

    pub fn begin_block(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        self.add(line)?;
        self.indent_level += 1;
        Ok(())
    }

    pub fn end_block(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        self.indent_level = self.indent_level.saturating_sub(1);
        self.add(line)
    }

    pub fn begin_function(
        &mut self,
        ret_type: &str,
        name: &str,
        params: &[String],
    ) -> Result<(), Box<dyn Error>> {
        let mut line = format!("{ret_type} {name}(");
        for (index, param) in params.iter().enumerate() {
            if line.len() + param.len() > MAX_LINE_LENGTH - 3 {
                if index > 0 {
                    line.push(',');
                }
                self.add(&line)?;
                line.clear();
            }
            if index > 0 && !line.is_empty() {
                line.push_str(", ");
            }
            if line.is_empty() {
                line.push_str(INDENT);
            }
            line.push_str(param);
        }
        self.add(&(line + ")"))?;
        self.begin_block("{")
    }

    pub fn doc_comment(&mut self, comment: &str) -> Result<(), Box<dyn Error>> {
        self.add("/**")?;
        let mut lines: Vec<&str> = comment.lines().collect();
        if lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        for line in lines {
            self.add(format!(" * {}", line.trim_start()).trim_end())?;
        }
        self.add(" */")
    }

    pub fn build_switch_cases(&mut self, branches: &[Branch]) -> Result<(), Box<dyn Error>> {
        for branch in branches {
            for build in &branch.builds {
                self.add(&format!("case {build}:"))?;
            }
            self.begin_block("{")?;
            for statement in &branch.statements {
                self.add(statement)?;
            }
            self.add("break;")?;
            self.end_block("}")?;
        }
        Ok(())
    }

    /// Writes the stub as a byte array, one instruction per line with its disassembly.
    pub fn assembly_array(&mut self, stub: &HookStub, name: &str) -> Result<(), Box<dyn Error>> {
        let mut formatter = MasmFormatter::new();
        let options = formatter.options_mut();
        options.set_uppercase_hex(false);
        options.set_hex_prefix("0x");
        options.set_hex_suffix("");
        options.set_space_after_operand_separator(true);

        let max_length = stub.machine_code.iter().map(Vec::len).max().unwrap_or(0);

        self.begin_block(&format!("unsigned char {name}[] = {{"))?;
        let mut disassembly = String::new();
        for (instruction, code) in stub.instructions.iter().zip(&stub.machine_code) {
            disassembly.clear();
            formatter.format(instruction, &mut disassembly);

            let bytes: String = code.iter().map(|b| format!("0x{b:02x}, ")).collect();
            let padding = " ".repeat((max_length - code.len()) * 6);
            self.add(&format!("{bytes}{padding} // {disassembly}"))?;
        }
        self.end_block("};")
    }
}

pub fn file_header(w: &mut CodeWriter) -> Result<(), Box<dyn Error>> {
    w.add(SEPARATOR)?;
    w.add(MARKER)?;
    w.add(SEPARATOR)
}

pub fn subsystem_header(w: &mut CodeWriter, subsystem: Subsystem) -> Result<(), Box<dyn Error>> {
    w.add("")?;
    w.add(SEPARATOR)?;
    w.add(&format!("// {subsystem}"))?;
    w.add(SEPARATOR)
}

pub fn patch(w: &mut CodeWriter, patch: &GeneratedPatch) -> Result<(), Box<dyn Error>> {
    w.add("")?;
    w.doc_comment(patch.doc)?;
    w.begin_function("void", &patch.function_name(), &patch.params)?;

    if !patch.hooks.is_empty() {
        w.add_unindented("#ifdef BUILD_64BIT")?;
        hook(w, patch, Bitness::X64)?;
        w.add_unindented("#else")?;
        hook(w, patch, Bitness::X86)?;
        w.add_unindented("#endif")?;
        w.add("")?;
    }

    w.add("switch (gameBuild)")?;
    w.begin_block("{")?;
    w.add_unindented("#ifdef BUILD_64BIT")?;
    w.build_switch_cases(patch.branches(Bitness::X64))?;
    w.add_unindented("#else")?;
    w.build_switch_cases(patch.branches(Bitness::X86))?;
    w.add_unindented("#endif")?;
    w.end_block("}")?;
    w.end_block("}")
}

fn hook(
    w: &mut CodeWriter,
    patch: &GeneratedPatch,
    bitness: Bitness,
) -> Result<(), Box<dyn Error>> {
    let stub = patch
        .hook(bitness)
        .ok_or_else(|| format!("{}: no {bitness} hook", patch.function_name()))?;
    w.assembly_array(stub, "code")?;
    w.add("")?;
    w.add(&stub.handler_copy_statement())
}

/// Replaces everything from the marker block onward in `existing` with `generated`.
pub fn splice(existing: &str, generated: &[String]) -> Result<String, Box<dyn Error>> {
    let mut lines: Vec<&str> = existing.lines().collect();
    let marker = lines
        .iter()
        .position(|&l| l == MARKER)
        .ok_or_else(|| format!("marker \"{MARKER}\" not found"))?;

    // The separator line above the marker is part of the generated header
    lines.truncate(marker.saturating_sub(1));

    let mut output = lines.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }
    output.push_str(&generated.join("\n"));
    output.push('\n');
    Ok(output)
}
