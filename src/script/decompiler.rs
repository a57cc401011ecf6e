use std::collections::{BTreeSet, HashMap};

use crate::expression::{ExpressionNode, OperatorKind};
use crate::instruction::{Instruction, InstructionEncoding, InstructionError};
use crate::reader::ByteReader;

use super::{PlainScriptElement, RawScript};

/// Decompilation result: the element sequence plus the code offset of every
/// instruction element, in emission order. The offsets feed the debug-map
/// sidecar writer.
#[derive(Debug)]
pub struct DecompiledScript {
    pub elements: Vec<PlainScriptElement>,
    pub instruction_positions: Vec<usize>,
}

/// Best-effort structured rendering of a raw script.
///
/// The code is partitioned into chunks at label/return-label boundaries and
/// each chunk decodes independently; a chunk that cannot be decoded turns
/// into an error comment plus a raw dump without affecting its siblings.
pub fn decompile_script(encoding: &InstructionEncoding, script: &RawScript) -> DecompiledScript {
    let code = &script.code[..];

    let (mut chunks, chunk_map) = initialize_chunks(script);

    for chunk in &mut chunks {
        chunk.preprocess(code, encoding);
    }

    // cross-reference classification: a chunk is data because of how other
    // code uses its address, not because of its own bytes
    let mut assignments = Vec::new();
    for chunk in &chunks {
        for element in &chunk.body {
            if let BodyElement::Instruction { instruction, .. } = element {
                analyze_instruction(instruction, &mut assignments);
            }
        }
    }
    for (label, kind) in assignments {
        if let Some(&position) = script.labels.get(label) {
            if let Some(&index) = chunk_map.get(&position) {
                chunks[index].kind = kind;
            }
        }
    }

    let data_next: Vec<bool> = (0..chunks.len())
        .map(|i| i + 1 >= chunks.len() || chunks[i + 1].kind != ChunkKind::None)
        .collect();
    for (chunk, data_next) in chunks.iter_mut().zip(data_next) {
        chunk.postprocess(code, data_next);
    }

    let mut elements = Vec::new();
    let mut instruction_positions = Vec::new();
    for chunk in chunks {
        for index in &chunk.labels {
            elements.push(PlainScriptElement::Label(*index));
        }
        for index in &chunk.return_labels {
            elements.push(PlainScriptElement::ReturnLabel(*index));
        }
        for element in chunk.body {
            match element {
                BodyElement::Instruction { instruction, position } => {
                    instruction_positions.push(position);
                    elements.push(PlainScriptElement::Instruction(instruction));
                }
                BodyElement::Comment(text) => {
                    elements.push(PlainScriptElement::Comment(text));
                }
            }
        }
        if let Some(error) = &chunk.error {
            elements.push(PlainScriptElement::Error {
                position: chunk.last_position,
                message: error.to_string(),
            });
        }
        if chunk.last_position != chunk.end {
            elements.push(PlainScriptElement::Raw(
                code[chunk.last_position..chunk.end].to_vec(),
            ));
        }
    }

    DecompiledScript {
        elements,
        instruction_positions,
    }
}

fn initialize_chunks(script: &RawScript) -> (Vec<Chunk>, HashMap<usize, usize>) {
    let code_len = script.code.len();

    let markers: BTreeSet<usize> = script
        .labels
        .iter()
        .chain(script.return_labels.iter())
        .copied()
        .collect();
    let markers: Vec<usize> = markers.into_iter().collect();

    let mut chunks = Vec::with_capacity(markers.len());
    let mut chunk_map = HashMap::new();
    for (i, &marker) in markers.iter().enumerate() {
        let end = if i + 1 < markers.len() {
            markers[i + 1]
        } else {
            code_len
        };
        // offsets from a malformed file may point past the code
        let start = marker.min(code_len);
        let end = end.min(code_len).max(start);
        chunk_map.insert(marker, i);
        chunks.push(Chunk::new(start, end));
    }

    for (index, offset) in script.labels.iter().enumerate() {
        chunks[chunk_map[offset]].labels.push(index);
    }
    for (index, offset) in script.return_labels.iter().enumerate() {
        chunks[chunk_map[offset]].return_labels.push(index);
    }

    (chunks, chunk_map)
}

fn analyze_instruction(instruction: &Instruction, out: &mut Vec<(usize, ChunkKind)>) {
    let label_operand = |index: usize| -> Option<usize> {
        let value = instruction.operands.get(index)?.as_int()?;
        usize::try_from(value).ok()
    };

    match instruction.name.as_str() {
        "SetMesModeFormat" => {
            if let Some(label) = label_operand(1) {
                out.push((label, ChunkKind::MesModeFormatTable));
            }
        }
        "JumpTable" => {
            if let Some(label) = label_operand(1) {
                out.push((label, ChunkKind::AdrTable));
            }
        }
        "SetTextTable" => {
            if let Some(label) = label_operand(1) {
                out.push((label, ChunkKind::TextTable));
            }
        }
        "InitNameID" => {
            if let Some(label) = label_operand(0) {
                out.push((label, ChunkKind::NameIdTable));
            }
        }
        "EncycDataInit" => {
            if let Some(label) = label_operand(0) {
                out.push((label, ChunkKind::EncycDataTable));
            }
            if let Some(label) = label_operand(1) {
                out.push((label, ChunkKind::EncycSortTable));
            }
        }
        _ => {}
    }

    for operand in &instruction.operands {
        analyze_expression(operand, out);
    }
}

fn analyze_expression(expression: &ExpressionNode, out: &mut Vec<(usize, ChunkKind)>) {
    let ExpressionNode::Operation(operation) = expression else {
        return;
    };
    if operation.kind == OperatorKind::FuncLabel {
        if let Some(ExpressionNode::Number(index)) = operation.right.first() {
            if let Ok(label) = usize::try_from(*index) {
                out.push((label, ChunkKind::Int32Table));
            }
        }
    }
    for operand in &operation.left {
        analyze_expression(operand, out);
    }
    for operand in &operation.right {
        analyze_expression(operand, out);
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ChunkKind {
    None,
    Int16Table,
    Int32Table,
    AdrTable,
    TextTable,
    NameIdTable,
    EncycDataTable,
    EncycSortTable,
    MesModeFormatTable,
}

enum BodyElement {
    Instruction { instruction: Instruction, position: usize },
    Comment(String),
}

struct Chunk {
    start: usize,
    end: usize,

    labels: Vec<usize>,
    return_labels: Vec<usize>,
    kind: ChunkKind,
    body: Vec<BodyElement>,
    error: Option<InstructionError>,
    last_position: usize,

    // true while inside a sentinel-delimited table, where trailing zeros
    // must not be mistaken for alignment padding
    incomplete: bool,
}

impl Chunk {
    fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            labels: Vec::new(),
            return_labels: Vec::new(),
            kind: ChunkKind::None,
            body: Vec::new(),
            error: None,
            last_position: start,
            incomplete: false,
        }
    }

    fn reset(&mut self) {
        self.error = None;
        self.body.clear();
        self.last_position = self.start;
        self.incomplete = false;
    }

    fn preprocess(&mut self, code: &[u8], encoding: &InstructionEncoding) {
        self.reset();
        if let Err(error) = self.disassemble(code, encoding) {
            self.error = Some(error);
        }
    }

    fn postprocess(&mut self, code: &[u8], data_next: bool) {
        if self.kind != ChunkKind::None && self.labels.len() == 1 {
            self.reset();
            if let Err(error) = self.decode_table(code) {
                self.error = Some(error);
            }
        }

        if !self.incomplete && data_next && self.check_padding(code) {
            self.error = None;
            self.last_position = self.end;
        }
    }

    fn disassemble(&mut self, code: &[u8], encoding: &InstructionEncoding) -> Result<(), InstructionError> {
        let mut reader = ByteReader::slice(code, self.start, self.end);
        while !reader.at_end() {
            let position = reader.position();
            let instruction = encoding.decode(&mut reader)?;
            self.push_instruction(instruction, position, reader.position());
        }
        Ok(())
    }

    fn decode_table(&mut self, code: &[u8]) -> Result<(), InstructionError> {
        let mut reader = ByteReader::slice(code, self.start, self.end);
        match self.kind {
            ChunkKind::Int16Table => self.decode_int16_table(&mut reader),
            ChunkKind::Int32Table => self.decode_int32_table(&mut reader),
            ChunkKind::AdrTable => self.decode_adr_table(&mut reader),
            ChunkKind::TextTable => self.decode_text_table(&mut reader),
            ChunkKind::NameIdTable => self.decode_name_id_table(&mut reader),
            ChunkKind::EncycDataTable => self.decode_encyc_data_table(&mut reader),
            ChunkKind::EncycSortTable => self.decode_encyc_sort_table(&mut reader),
            ChunkKind::MesModeFormatTable => self.decode_mes_mode_format_table(&mut reader),
            ChunkKind::None => unreachable!(),
        }
    }

    fn decode_int16_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        while !reader.at_end() {
            self.push_word(reader, "dw")?;
        }
        Ok(())
    }

    fn decode_int32_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        while !reader.at_end() {
            self.push_dword(reader, "dd")?;
        }
        Ok(())
    }

    fn decode_adr_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        while !reader.at_end() {
            self.push_word(reader, "Adr")?;
        }
        Ok(())
    }

    fn decode_text_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        while !reader.at_end() {
            self.push_dword(reader, "StringID")?;
        }
        Ok(())
    }

    fn decode_name_id_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        self.incomplete = true;
        loop {
            let id = self.push_word(reader, "dw")?;
            if id == 0xFFFF {
                break;
            }

            self.push_dword(reader, "StringID")?;
            self.push_dword(reader, "StringID")?;
        }
        self.incomplete = false;
        Ok(())
    }

    fn decode_encyc_data_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        self.incomplete = true;
        let mut index = 0;
        loop {
            let value = self.push_word(reader, "dw")?;
            if value == 0xFF {
                break;
            }

            self.push_comment(format!("tip #{index}"));
            index += 1;

            // category, name, pronunciation, sorting key, content
            for _ in 0..5 {
                self.push_dword(reader, "StringID")?;
            }
        }
        self.incomplete = false;
        Ok(())
    }

    fn decode_encyc_sort_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        self.incomplete = true;

        self.push_dword(reader, "StringID")?;
        self.push_dword(reader, "StringID")?;

        for _ in 0..2 {
            loop {
                let value = self.push_word(reader, "dw")?;
                if value == 0xFFFF {
                    break;
                }
            }
        }

        self.incomplete = false;
        Ok(())
    }

    fn decode_mes_mode_format_table(&mut self, reader: &mut ByteReader) -> Result<(), InstructionError> {
        let mut index = 0;
        while !reader.at_end() {
            let comment = match index {
                0 => Some("display mode"),
                1 => Some("message window ID"),
                2 => Some("message window position X"),
                3 => Some("message window position Y"),
                4 => Some("name display mode"),
                5 => Some("max name width"),
                6 => Some("name fixed position X"),
                7 => Some("name fixed position Y"),
                8 => Some("name character width"),
                9 => Some("name character height"),
                10 => Some("max line width"),
                11 => Some("line icon mode"),
                12 => Some("line icon fixed position X"),
                13 => Some("line icon fixed position Y"),
                14 => Some("text character width"),
                15 => Some("text character height"),
                16 => Some("ruby character width"),
                17 => Some("ruby character height"),
                18 => Some("text line spacing"),
                19 => Some("ruby line spacing"),
                _ => None,
            };
            if let Some(comment) = comment {
                self.push_comment(comment.to_string());
            }
            self.push_word(reader, "dw")?;
            index += 1;
        }
        Ok(())
    }

    /// Reads an unsigned 16-bit row and emits it as a pseudo-instruction.
    /// No sign extension: the sentinel comparisons need the raw value.
    fn push_word(&mut self, reader: &mut ByteReader, name: &str) -> Result<i32, InstructionError> {
        let position = reader.position();
        let value = reader.read_u16_le()? as i32;
        self.push_instruction(
            Instruction::new(name, vec![ExpressionNode::Number(value)]),
            position,
            reader.position(),
        );
        Ok(value)
    }

    fn push_dword(&mut self, reader: &mut ByteReader, name: &str) -> Result<i32, InstructionError> {
        let position = reader.position();
        let value = reader.read_u32_le()? as i32;
        self.push_instruction(
            Instruction::new(name, vec![ExpressionNode::Number(value)]),
            position,
            reader.position(),
        );
        Ok(value)
    }

    fn push_instruction(&mut self, instruction: Instruction, position: usize, after: usize) {
        self.body.push(BodyElement::Instruction { instruction, position });
        self.last_position = after;
    }

    fn push_comment(&mut self, text: String) {
        self.body.push(BodyElement::Comment(text));
    }

    fn check_padding(&self, code: &[u8]) -> bool {
        if self.end % 4 != 0 {
            return false;
        }
        let remaining = self.end - self.last_position;
        if !(1..4).contains(&remaining) {
            return false;
        }
        code[self.last_position..self.end].iter().all(|&byte| byte == 0)
    }
}
