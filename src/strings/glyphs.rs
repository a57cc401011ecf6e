use std::collections::HashMap;

use thiserror::Error;

use crate::trie::{Trie, TrieBuilder};

use super::{GlyphSpec, StringSpecError, StringToken};

#[derive(Debug, Error)]
pub enum GlyphError {
    #[error("no {style} glyph available for {ch} (U+{codepoint:04X})")]
    NoGlyph {
        style: &'static str,
        ch: char,
        codepoint: u32,
    },
}

/// Converts between text chunks and glyph tokens for one charset.
///
/// Regular and italic text use separate tries because a charset may carry a
/// glyph in only one of the two styles.
pub struct StringGlyphSyntax {
    regular_tree: Trie<char, usize>,
    italic_tree: Trie<char, usize>,
    table: HashMap<i32, usize>,
    specs: Vec<GlyphSpec>,
}

impl StringGlyphSyntax {
    pub fn build_from(specs: Vec<GlyphSpec>) -> Result<Self, StringSpecError> {
        let regular_tree = build_glyph_tree(&specs, false)?;
        let italic_tree = build_glyph_tree(&specs, true)?;

        let mut table = HashMap::new();
        for (index, spec) in specs.iter().enumerate() {
            if table.contains_key(&spec.index) {
                return Err(StringSpecError::DuplicateGlyphIndex(spec.index));
            }
            table.insert(spec.index, index);
        }

        Ok(Self {
            regular_tree,
            italic_tree,
            table,
            specs,
        })
    }

    /// Replaces every text chunk with glyph tokens, longest match first.
    pub fn compile(&self, uncompiled: &[StringToken]) -> Result<Vec<StringToken>, GlyphError> {
        let mut compiled = Vec::new();
        for token in uncompiled {
            match token {
                StringToken::Chunk { text, italic } => {
                    self.compile_chunk(&mut compiled, text, *italic)?;
                }
                other => compiled.push(other.clone()),
            }
        }
        Ok(compiled)
    }

    /// Maps glyph tokens back to text chunks; glyphs the charset does not
    /// know stay raw glyph tokens.
    pub fn decompile(&self, compiled: &[StringToken]) -> Vec<StringToken> {
        compiled
            .iter()
            .map(|token| match token {
                StringToken::Glyph(value) => match self.table.get(value) {
                    Some(&index) => {
                        let spec = &self.specs[index];
                        StringToken::Chunk {
                            text: spec.text.clone(),
                            italic: !spec.regular && spec.italic,
                        }
                    }
                    None => token.clone(),
                },
                other => other.clone(),
            })
            .collect()
    }

    fn compile_chunk(&self, tokens: &mut Vec<StringToken>, text: &str, italic: bool) -> Result<(), GlyphError> {
        let chars: Vec<char> = text.chars().collect();
        let mut offset = 0;
        while offset < chars.len() {
            let tree = if italic { &self.italic_tree } else { &self.regular_tree };

            let mut longest_match = None;
            let mut cursor = tree;
            let mut index = offset;
            while index < chars.len() {
                let Some(next) = cursor.branch(&chars[index]) else {
                    break;
                };
                cursor = next;
                index += 1;
                if let Some(&spec_index) = cursor.value() {
                    let spec = &self.specs[spec_index];
                    if (!italic && spec.regular) || (italic && spec.italic) {
                        longest_match = Some((spec_index, index));
                    }
                }
            }

            let Some((spec_index, match_end)) = longest_match else {
                let ch = chars[offset];
                return Err(GlyphError::NoGlyph {
                    style: if italic { "italic" } else { "regular" },
                    ch,
                    codepoint: ch as u32,
                });
            };
            tokens.push(StringToken::Glyph(self.specs[spec_index].index));
            offset = match_end;
        }
        Ok(())
    }
}

fn build_glyph_tree(specs: &[GlyphSpec], italic: bool) -> Result<Trie<char, usize>, StringSpecError> {
    let mut tree = TrieBuilder::new();
    for (index, spec) in specs.iter().enumerate() {
        if (!italic && !spec.regular) || (italic && !spec.italic) {
            continue;
        }
        if spec.text.is_empty() {
            return Err(StringSpecError::EmptyGlyphText(spec.index));
        }
        let mut cursor = &mut tree;
        for ch in spec.text.chars() {
            cursor = cursor.ensure_branch(ch);
        }
        if cursor.has_value() {
            return Err(StringSpecError::DuplicateGlyphText {
                style: if italic { "italic" } else { "regular" },
                text: spec.text.clone(),
            });
        }
        cursor.set_value(index);
    }
    Ok(tree.freeze())
}
