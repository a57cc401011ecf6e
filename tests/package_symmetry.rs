//! Re-encode tests against real game data. These need a spec bank and a
//! directory of compiled packages, located through environment variables:
//!
//!   SC3_BANK_DIR     path to the spec bank directory
//!   SC3_FLAG_SET     flag set name to load
//!   SC3_PACKAGE_DIR  directory containing *.scx files
//!
//! Run with `cargo test --features test_with_game_files`.

#[cfg(feature = "test_with_game_files")]
mod tests {
    use std::{env, fs, io, path::Path};

    use thiserror::Error;

    use sc3tool::instruction::InstructionEncoding;
    use sc3tool::package::ScriptPackageEncoding;
    use sc3tool::script::{compile_script, decompile_script, syntax as script_syntax};
    use sc3tool::spec_bank::SpecBank;
    use sc3tool::strings::{CompiledStringEncoding, StringTagsSpec, UnitWidth};
    use sc3tool::text_stream::TextStream;

    #[derive(Debug, Error)]
    enum TestFailure {
        #[error("IO Error")]
        IoError(#[from] io::Error),

        #[error("Environment variable error")]
        EnvVarError(#[from] env::VarError),

        #[error("Spec bank error: {0}")]
        BankError(#[from] sc3tool::spec_bank::BankError),

        #[error("Not all packages survived the round trip")]
        RoundTripFailure,
    }

    fn load_encodings() -> Result<(InstructionEncoding, CompiledStringEncoding), TestFailure> {
        let bank = SpecBank::load(Path::new(&env::var("SC3_BANK_DIR")?))?;
        let flags = bank.flags(&env::var("SC3_FLAG_SET")?)?;

        let instruction_encoding = InstructionEncoding::build_from(bank.instruction_specs(&flags)?)
            .expect("bank instruction specs");
        let tags = StringTagsSpec::new(bank.string_tag_specs(&flags)?).expect("bank tag specs");
        Ok((instruction_encoding, CompiledStringEncoding::new(UnitWidth::U16, tags)))
    }

    #[test]
    fn packages_round_trip() -> Result<(), TestFailure> {
        let (instruction_encoding, string_encoding) = load_encodings()?;
        let package_encoding = ScriptPackageEncoding::new(&string_encoding);

        let dir = env::var("SC3_PACKAGE_DIR")?;
        let mut failed = 0usize;
        let mut total = 0usize;

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("scx") {
                continue;
            }
            total += 1;

            let data = fs::read(&path)?;
            let package = match package_encoding.decode(&data) {
                Ok(package) => package,
                Err(error) => {
                    println!("{}: decode error: {error}", path.display());
                    failed += 1;
                    continue;
                }
            };

            let decompiled = decompile_script(&instruction_encoding, &package.script);
            let text = script_syntax::format_script(&decompiled.elements);

            let mut stream = TextStream::new(&text);
            let elements = match script_syntax::parse_script(&mut stream) {
                Ok(elements) => elements,
                Err(error) => {
                    println!("{}: reparse error: {error}", path.display());
                    failed += 1;
                    continue;
                }
            };

            let recompiled = match compile_script(&instruction_encoding, &elements) {
                Ok(script) => script,
                Err(error) => {
                    println!("{}: recompile error: {error}", path.display());
                    failed += 1;
                    continue;
                }
            };

            // compare against a second decompile of the rebuilt script;
            // offsets shift with the label table, the rendering must not
            let renders = decompile_script(&instruction_encoding, &recompiled);
            let text2 = script_syntax::format_script(&renders.elements);
            if text != text2 {
                println!("{}: render mismatch", path.display());
                failed += 1;
            }
        }

        println!("{0}/{1} packages round-tripped", total - failed, total);

        if failed > 0 {
            return Err(TestFailure::RoundTripFailure);
        }
        Ok(())
    }
}
