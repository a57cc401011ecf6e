use thiserror::Error;

use crate::reader::{ByteReader, UnexpectedEnd};
use crate::script::RawScript;
use crate::strings::{CompiledStringEncoding, StringError, StringTableEntry, StringToken};

const SCRIPT_MAGIC: &[u8; 4] = b"SC3\0";
const STRING_TABLE_MAGIC: &[u8; 4] = b"MES\0";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("unexpected end of data")]
    UnexpectedEnd(#[from] UnexpectedEnd),

    #[error(transparent)]
    String(#[from] StringError),

    #[error("invalid magic")]
    BadMagic,

    #[error("invalid string positions start offset")]
    BadStringPositionsStart,

    #[error("invalid string positions end offset")]
    BadStringPositionsEnd,

    #[error("invalid languages count")]
    BadLanguageCount,

    #[error("invalid string table layout")]
    BadStringTableLayout,
}

/// A compiled script plus its string pool, as stored in one package file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ScriptPackage {
    pub script: RawScript,
    pub strings: Vec<Vec<StringToken>>,
}

impl ScriptPackage {
    pub fn new(script: RawScript, strings: Vec<Vec<StringToken>>) -> Self {
        Self { script, strings }
    }
}

/// Codec for the script package container.
pub struct ScriptPackageEncoding<'a> {
    string_encoding: &'a CompiledStringEncoding,
}

impl<'a> ScriptPackageEncoding<'a> {
    pub fn new(string_encoding: &'a CompiledStringEncoding) -> Self {
        Self { string_encoding }
    }

    pub fn encode(&self, package: &ScriptPackage) -> Result<Vec<u8>, PackageError> {
        let script = &package.script;
        let code_offset = 12 + script.labels.len() * 4;
        let padding = (4 - script.code.len() % 4) % 4;
        let string_addresses_start = code_offset + script.code.len() + padding;
        let string_addresses_end = string_addresses_start + package.strings.len() * 4;

        let mut strings_data = Vec::with_capacity(package.strings.len());
        for tokens in &package.strings {
            let mut data = Vec::new();
            self.string_encoding.encode(&mut data, tokens)?;
            strings_data.push(data);
        }

        let mut out = Vec::new();
        out.extend_from_slice(SCRIPT_MAGIC);
        out.extend_from_slice(&(string_addresses_start as u32).to_le_bytes());
        out.extend_from_slice(&(string_addresses_end as u32).to_le_bytes());

        for &label in &script.labels {
            out.extend_from_slice(&((code_offset + label) as u32).to_le_bytes());
        }

        out.extend_from_slice(&script.code);
        out.extend(std::iter::repeat(0).take(padding));

        let mut offset = string_addresses_end + script.return_labels.len() * 4;
        for data in &strings_data {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += data.len();
        }

        for &return_label in &script.return_labels {
            out.extend_from_slice(&((code_offset + return_label) as u32).to_le_bytes());
        }

        for data in &strings_data {
            out.extend_from_slice(data);
        }

        Ok(out)
    }

    /// Label offsets stay absolute: the decoded code buffer keeps a
    /// zero-filled prefix covering the header and label table, so every
    /// offset in the label tables indexes it directly.
    pub fn decode(&self, data: &[u8]) -> Result<ScriptPackage, PackageError> {
        let mut reader = ByteReader::new(data);

        let magic = reader.read_exact(4)?;
        if magic != SCRIPT_MAGIC {
            return Err(PackageError::BadMagic);
        }

        let string_addresses_start = reader.read_u32_le()? as usize;
        if string_addresses_start > data.len() {
            return Err(PackageError::BadStringPositionsStart);
        }

        let string_addresses_end = reader.read_u32_le()? as usize;
        if string_addresses_end < string_addresses_start || string_addresses_end > data.len() {
            return Err(PackageError::BadStringPositionsEnd);
        }

        // the label table has no length field; read addresses while they
        // keep looking like label offsets
        let mut labels = Vec::new();
        let mut lowest_label = string_addresses_start;
        while reader.position() + 4 <= lowest_label {
            let position = reader.position();
            let label = reader.read_u32_le()? as usize;
            if label < position + 4 || label > string_addresses_start {
                reader.seek(position)?;
                break;
            }
            labels.push(label);
            lowest_label = lowest_label.min(label);
        }

        let mut code = vec![0u8; string_addresses_start];
        reader.seek(lowest_label.min(string_addresses_start))?;
        let code_start = reader.position();
        code[code_start..].copy_from_slice(reader.read_exact(string_addresses_start - code_start)?);

        let mut string_positions = Vec::new();
        reader.seek(string_addresses_start)?;
        let mut lowest_string_position = data.len();
        while reader.position() + 4 <= string_addresses_end {
            let position = reader.read_u32_le()? as usize;
            lowest_string_position = lowest_string_position.min(position);
            string_positions.push(position);
        }

        reader.seek(string_addresses_end)?;
        let mut return_labels = Vec::new();
        while reader.position() + 4 <= lowest_string_position.min(data.len()) {
            return_labels.push(reader.read_u32_le()? as usize);
        }

        let mut strings = Vec::with_capacity(string_positions.len());
        for &position in &string_positions {
            if position > data.len() {
                return Err(UnexpectedEnd.into());
            }
            let mut string_reader = ByteReader::slice(data, position, data.len());
            strings.push(self.string_encoding.decode(&mut string_reader)?);
        }

        let script = RawScript::new(code, labels, return_labels);
        Ok(ScriptPackage::new(script, strings))
    }
}

/// Codec for the string table container.
pub struct StringTableEncoding<'a> {
    string_encoding: &'a CompiledStringEncoding,
}

impl<'a> StringTableEncoding<'a> {
    pub fn new(string_encoding: &'a CompiledStringEncoding) -> Self {
        Self { string_encoding }
    }

    pub fn encode(&self, entries: &[StringTableEntry]) -> Result<Vec<u8>, PackageError> {
        let mut strings_data = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut data = Vec::new();
            self.string_encoding.encode(&mut data, &entry.tokens)?;
            strings_data.push(data);
        }

        let mut out = Vec::new();
        out.extend_from_slice(STRING_TABLE_MAGIC);
        out.extend_from_slice(&1u32.to_le_bytes()); // languages
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        out.extend_from_slice(&((16 + entries.len() * 8) as u32).to_le_bytes());

        let mut offset = 0usize;
        for (entry, data) in entries.iter().zip(&strings_data) {
            out.extend_from_slice(&(entry.index as u32).to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += data.len();
        }

        for data in &strings_data {
            out.extend_from_slice(data);
        }

        Ok(out)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<StringTableEntry>, PackageError> {
        let mut reader = ByteReader::new(data);

        let magic = reader.read_exact(4)?;
        if magic != STRING_TABLE_MAGIC {
            return Err(PackageError::BadMagic);
        }

        let languages = reader.read_u32_le()? as usize;
        if languages < 1 {
            return Err(PackageError::BadLanguageCount);
        }

        let entry_count = reader.read_u32_le()? as usize;
        let strings_start = reader.read_u32_le()? as usize;

        let mut headers = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let index = reader.read_u32_le()? as i32;
            let offset = reader.read_u32_le()? as usize;
            // only language 0 is honored
            for _ in 1..languages {
                reader.read_u32_le()?;
            }
            let position = strings_start
                .checked_add(offset)
                .filter(|&position| position <= data.len())
                .ok_or(PackageError::BadStringTableLayout)?;
            headers.push((index, position));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for (index, position) in headers {
            let mut string_reader = ByteReader::slice(data, position, data.len());
            let tokens = self.string_encoding.decode(&mut string_reader)?;
            entries.push(StringTableEntry::new(index, tokens));
        }

        Ok(entries)
    }
}
