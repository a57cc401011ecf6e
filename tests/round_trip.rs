use sc3tool::instruction::{InstructionEncoding, InstructionSpec, OperandKind};
use sc3tool::package::{ScriptPackage, ScriptPackageEncoding, StringTableEncoding};
use sc3tool::script::{compile_script, decompile_script, syntax as script_syntax, PlainScriptElement};
use sc3tool::strings::{
    syntax as string_syntax, CompiledStringEncoding, GlyphSpec, StringGlyphSyntax,
    StringTableEntry, StringTagSpec, StringTagsSpec, StringToken, UnitWidth,
};
use sc3tool::text_stream::TextStream;

fn instruction_encoding() -> InstructionEncoding {
    InstructionEncoding::build_from(vec![
        InstructionSpec::new("End", vec![0x00, 0x00], vec![]),
        InstructionSpec::new("Jump", vec![0x00, 0x0C], vec![OperandKind::Int16]),
        InstructionSpec::new("JumpTable", vec![0x00, 0x0F], vec![OperandKind::Expr, OperandKind::Int16]),
        InstructionSpec::new("Eval", vec![0x00, 0x15], vec![OperandKind::Expr]),
        InstructionSpec::new("MesMain", vec![0x01, 0x01], vec![OperandKind::UInt8, OperandKind::Expr, OperandKind::Expr]),
    ])
    .unwrap()
}

fn string_encoding() -> CompiledStringEncoding {
    let tags = StringTagsSpec::new(vec![
        StringTagSpec::new("newline", 0x00, vec![]),
        StringTagSpec::new("color", 0x04, vec![OperandKind::Expr]),
    ])
    .unwrap();
    CompiledStringEncoding::new(UnitWidth::U16, tags)
}

fn glyph_syntax() -> StringGlyphSyntax {
    let mut glyphs = Vec::new();
    for (i, ch) in ('A'..='Z').enumerate() {
        glyphs.push(GlyphSpec::new(0x41 + i as i32, ch.to_string(), true, true));
    }
    glyphs.push(GlyphSpec::new(0x20, " ", true, true));
    StringGlyphSyntax::build_from(glyphs).unwrap()
}

const SCRIPT_SOURCE: &str = "\
0:
\tMesMain 1, $W(0), 2 + 3 * 4
\t$W(10) = $MR[1]($W(2)) + 5;
\tJump 1
1:
\tEnd
*0:
\tEnd
";

fn parse_script_text(text: &str) -> Vec<PlainScriptElement> {
    let mut stream = TextStream::new(text);
    script_syntax::parse_script(&mut stream).unwrap()
}

#[test]
fn script_text_survives_compile_decompile() {
    let encoding = instruction_encoding();

    let elements = parse_script_text(SCRIPT_SOURCE);
    let script = compile_script(&encoding, &elements).unwrap();
    let decompiled = decompile_script(&encoding, &script);
    let text = script_syntax::format_script(&decompiled.elements);

    assert_eq!(text, SCRIPT_SOURCE);
}

#[test]
fn script_binary_survives_decompile_recompile() {
    let encoding = instruction_encoding();

    let elements = parse_script_text(SCRIPT_SOURCE);
    let script = compile_script(&encoding, &elements).unwrap();

    let decompiled = decompile_script(&encoding, &script);
    let text = script_syntax::format_script(&decompiled.elements);

    let reparsed = parse_script_text(&text);
    let recompiled = compile_script(&encoding, &reparsed).unwrap();

    assert_eq!(recompiled, script);
}

#[test]
fn package_survives_full_pipeline() {
    let instruction_encoding = instruction_encoding();
    let string_encoding = string_encoding();
    let glyphs = glyph_syntax();
    let package_encoding = ScriptPackageEncoding::new(&string_encoding);

    let elements = parse_script_text(SCRIPT_SOURCE);
    let script = compile_script(&instruction_encoding, &elements).unwrap();

    let uncompiled_strings = [
        vec![StringToken::Chunk { text: "HELLO".to_string(), italic: false }],
        vec![
            StringToken::tag("color", vec![sc3tool::expression::ExpressionNode::Number(1)]),
            StringToken::Chunk { text: "WORLD".to_string(), italic: false },
            StringToken::tag("newline", vec![]),
        ],
    ];
    let strings: Vec<Vec<StringToken>> = uncompiled_strings
        .iter()
        .map(|tokens| glyphs.compile(tokens).unwrap())
        .collect();

    let package = ScriptPackage::new(script, strings);
    let data = package_encoding.encode(&package).unwrap();
    let decoded = package_encoding.decode(&data).unwrap();

    assert_eq!(decoded.strings, package.strings);

    // decompile the decoded script and re-run the whole pipeline; the
    // second-generation binary must match the first byte for byte
    let decompiled = decompile_script(&instruction_encoding, &decoded.script);
    let text = script_syntax::format_script(&decompiled.elements);
    let recompiled = compile_script(&instruction_encoding, &parse_script_text(&text)).unwrap();
    let repackaged = ScriptPackage::new(recompiled, decoded.strings.clone());
    let data2 = package_encoding.encode(&repackaged).unwrap();
    let decoded2 = package_encoding.decode(&data2).unwrap();
    let decompiled2 = decompile_script(&instruction_encoding, &decoded2.script);

    assert_eq!(
        script_syntax::format_script(&decompiled2.elements),
        script_syntax::format_script(&decompiled.elements),
    );
}

#[test]
fn string_table_text_survives_compile_decompile() {
    let string_encoding = string_encoding();
    let glyphs = glyph_syntax();
    let table_encoding = StringTableEncoding::new(&string_encoding);

    let source = "0:ABC\\color:2;DEF\n1:XY\\newline;\n";
    let mut stream = TextStream::new(source);
    let entries = string_syntax::parse_string_table(&mut stream).unwrap();

    let compiled: Vec<StringTableEntry> = entries
        .iter()
        .map(|entry| StringTableEntry::new(entry.index, glyphs.compile(&entry.tokens).unwrap()))
        .collect();

    let data = table_encoding.encode(&compiled).unwrap();
    let decoded = table_encoding.decode(&data).unwrap();

    let decompiled: Vec<StringTableEntry> = decoded
        .iter()
        .map(|entry| StringTableEntry::new(entry.index, glyphs.decompile(&entry.tokens)))
        .collect();

    let text = string_syntax::format_string_table(&decompiled).unwrap();
    assert_eq!(text, source);
}
