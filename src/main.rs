use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, ValueEnum};

use sc3tool::instruction::InstructionEncoding;
use sc3tool::package::{ScriptPackage, ScriptPackageEncoding, StringTableEncoding};
use sc3tool::script::{compile_script, decompile_script, syntax as script_syntax};
use sc3tool::spec_bank::SpecBank;
use sc3tool::strings::{
    syntax as string_syntax, CompiledStringEncoding, StringGlyphSyntax, StringTableEntry,
    StringTagsSpec, UnitWidth,
};
use sc3tool::text_stream::TextStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Compile,
    Decompile,
}

/// A tool for working with MAGES. engine script packages and string tables.
#[derive(Parser)]
struct Args {
    /// The tool operation mode.
    #[arg(long, value_enum)]
    mode: Mode,

    /// The path to the directory for the uncompiled files.
    #[arg(long)]
    uncompiled_directory: PathBuf,

    /// The path to the directory for the compiled files.
    #[arg(long)]
    compiled_directory: PathBuf,

    /// The file extension used for compiled script package files.
    #[arg(long, default_value = "scx")]
    script_package_extension: String,

    /// The file extension used for compiled string table files.
    #[arg(long, default_value = "msb")]
    string_table_extension: String,

    /// The path to the specifications bank directory.
    #[arg(long)]
    bank_directory: PathBuf,

    /// The flag set selecting data to load from the specifications bank.
    #[arg(long)]
    flag_set: String,

    /// The charset to load from the specifications bank.
    #[arg(long)]
    charset: String,

    /// Generate SDB debug-map files alongside decompiled scripts.
    #[arg(long)]
    generate_sdb: bool,
}

struct Tool {
    args: Args,
    instruction_encoding: InstructionEncoding,
    string_encoding: CompiledStringEncoding,
    glyph_syntax: StringGlyphSyntax,
}

impl Tool {
    fn new(args: Args) -> anyhow::Result<Self> {
        let bank = SpecBank::load(&args.bank_directory).with_context(|| {
            format!("failed to load spec bank from {}", args.bank_directory.display())
        })?;
        let flags = bank.flags(&args.flag_set)?;

        let instruction_encoding = InstructionEncoding::build_from(bank.instruction_specs(&flags)?)?;
        let string_tags = StringTagsSpec::new(bank.string_tag_specs(&flags)?)?;
        let string_encoding = CompiledStringEncoding::new(UnitWidth::U16, string_tags);
        let glyph_syntax = StringGlyphSyntax::build_from(bank.glyph_specs(&args.charset)?)?;

        Ok(Self {
            args,
            instruction_encoding,
            string_encoding,
            glyph_syntax,
        })
    }

    fn run(&self) -> anyhow::Result<bool> {
        match self.args.mode {
            Mode::Compile => self.compile_all(),
            Mode::Decompile => self.decompile_all(),
        }
    }

    fn compile_all(&self) -> anyhow::Result<bool> {
        let mut error_occurred = false;
        for path in collect_files(&self.args.uncompiled_directory)? {
            let Ok(name) = path.strip_prefix(&self.args.uncompiled_directory) else {
                continue;
            };
            let name = name.to_path_buf();
            let result = match extension(&path).as_deref() {
                Some("scs") => Some(self.compile_script_package(&name)),
                Some("mst") => Some(self.compile_string_table(&name)),
                _ => None,
            };
            if let Some(Err(error)) = result {
                eprintln!("Error while compiling {}: {error:#}", path.display());
                error_occurred = true;
            }
        }
        Ok(error_occurred)
    }

    fn decompile_all(&self) -> anyhow::Result<bool> {
        let mut error_occurred = false;
        for path in collect_files(&self.args.compiled_directory)? {
            let Ok(name) = path.strip_prefix(&self.args.compiled_directory) else {
                continue;
            };
            let name = name.to_path_buf();
            let ext = extension(&path);
            let result = if ext.as_deref() == Some(self.args.script_package_extension.as_str()) {
                Some(self.decompile_script_package(&name))
            } else if ext.as_deref() == Some(self.args.string_table_extension.as_str()) {
                Some(self.decompile_string_table(&name))
            } else {
                None
            };
            if let Some(Err(error)) = result {
                eprintln!("Error while decompiling {}: {error:#}", path.display());
                error_occurred = true;
            }
        }
        Ok(error_occurred)
    }

    fn compile_script_package(&self, name: &Path) -> anyhow::Result<()> {
        let script_path = self.args.uncompiled_directory.join(name);
        let string_table_path = script_path.with_extension("sct");
        let package_path = self
            .args
            .compiled_directory
            .join(name)
            .with_extension(&self.args.script_package_extension);

        let script_text = fs::read_to_string(&script_path)
            .with_context(|| format!("failed to read {}", script_path.display()))?;
        let mut stream = TextStream::new(&script_text);
        let elements = script_syntax::parse_script(&mut stream)?;

        let string_table_text = fs::read_to_string(&string_table_path)
            .with_context(|| format!("failed to read {}", string_table_path.display()))?;
        let mut stream = TextStream::new(&string_table_text);
        let entries = string_syntax::parse_string_table(&mut stream)?;

        let mut strings = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.index != i as i32 {
                bail!("missing string with index {i}");
            }
            strings.push(self.glyph_syntax.compile(&entry.tokens)?);
        }

        let script = compile_script(&self.instruction_encoding, &elements)?;
        let package = ScriptPackage::new(script, strings);
        let data = ScriptPackageEncoding::new(&self.string_encoding).encode(&package)?;

        write_file(&package_path, data.as_slice())
    }

    fn compile_string_table(&self, name: &Path) -> anyhow::Result<()> {
        let source_path = self.args.uncompiled_directory.join(name);
        let table_path = self
            .args
            .compiled_directory
            .join(name)
            .with_extension(&self.args.string_table_extension);

        let text = fs::read_to_string(&source_path)
            .with_context(|| format!("failed to read {}", source_path.display()))?;
        let mut stream = TextStream::new(&text);
        let entries = string_syntax::parse_string_table(&mut stream)?;

        let mut compiled = Vec::with_capacity(entries.len());
        for entry in &entries {
            compiled.push(StringTableEntry::new(
                entry.index,
                self.glyph_syntax.compile(&entry.tokens)?,
            ));
        }

        let data = StringTableEncoding::new(&self.string_encoding).encode(&compiled)?;
        write_file(&table_path, data.as_slice())
    }

    fn decompile_script_package(&self, name: &Path) -> anyhow::Result<()> {
        let package_path = self.args.compiled_directory.join(name);
        let script_path = self.args.uncompiled_directory.join(name).with_extension("scs");
        let string_table_path = self.args.uncompiled_directory.join(name).with_extension("sct");
        let sdb_path = self.args.uncompiled_directory.join(name).with_extension("sdb");

        let data = fs::read(&package_path)
            .with_context(|| format!("failed to read {}", package_path.display()))?;
        let package = ScriptPackageEncoding::new(&self.string_encoding).decode(&data)?;

        let decompiled = decompile_script(&self.instruction_encoding, &package.script);

        let mut entries = Vec::with_capacity(package.strings.len());
        for (i, tokens) in package.strings.iter().enumerate() {
            entries.push(StringTableEntry::new(i as i32, self.glyph_syntax.decompile(tokens)));
        }

        // the two text outputs are written independently; one failing must
        // not suppress the other
        let mut failures: Vec<anyhow::Error> = Vec::new();

        let write_string_table = || -> anyhow::Result<()> {
            let text = string_syntax::format_string_table(&entries)?;
            write_file(&string_table_path, text.as_bytes())
        };
        if let Err(error) = write_string_table() {
            failures.push(error);
        }

        let write_script = || -> anyhow::Result<()> {
            if self.args.generate_sdb {
                let (text, sdb) = script_syntax::format_script_with_sdb(
                    &decompiled.elements,
                    &decompiled.instruction_positions,
                );
                write_file(&script_path, text.as_bytes())?;
                write_file(&sdb_path, sdb.as_bytes())
            } else {
                let text = script_syntax::format_script(&decompiled.elements);
                write_file(&script_path, text.as_bytes())
            }
        };
        if let Err(error) = write_script() {
            failures.push(error);
        }

        if failures.len() > 1 {
            let combined = failures
                .iter()
                .map(|error| format!("{error:#}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!(combined));
        }
        match failures.pop() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn decompile_string_table(&self, name: &Path) -> anyhow::Result<()> {
        let table_path = self.args.compiled_directory.join(name);
        let output_path = self.args.uncompiled_directory.join(name).with_extension("mst");

        let data = fs::read(&table_path)
            .with_context(|| format!("failed to read {}", table_path.display()))?;
        let entries = StringTableEncoding::new(&self.string_encoding).decode(&data)?;

        let mut decompiled = Vec::with_capacity(entries.len());
        for entry in &entries {
            decompiled.push(StringTableEntry::new(
                entry.index,
                self.glyph_syntax.decompile(&entry.tokens),
            ));
        }

        let text = string_syntax::format_string_table(&decompiled)?;
        write_file(&output_path, text.as_bytes())
    }
}

fn collect_files(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fn walk(directory: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(directory, &mut files)
        .with_context(|| format!("failed to enumerate {}", directory.display()))?;
    files.sort();
    Ok(files)
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().into_owned())
}

fn write_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let tool = match Tool::new(args) {
        Ok(tool) => tool,
        Err(error) => {
            eprintln!("Error: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    match tool.run() {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
