//! In-process sequence search
//!
//! Literals go through one Aho-Corasick automaton holding each literal's
//! ASCII/UTF-8, UTF-16LE and (when representable) Latin-1 encodings, searched
//! with overlapping semantics. Regexes run over the raw bytes and over a
//! narrowed view of both UTF-16LE alignments.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use redact_core::{RedactError, Result};
use regex::bytes::Regex;

use crate::rule::byte_regex;
use crate::search::{CompiledSearch, Encoding, SearchHit, SearchPattern, SequenceSearcher};

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSearcher;

impl SequenceSearcher for NativeSearcher {
    fn name(&self) -> &'static str {
        "native"
    }

    fn compile(&self, patterns: &[SearchPattern]) -> Result<Box<dyn CompiledSearch>> {
        let mut needles: Vec<Vec<u8>> = Vec::new();
        let mut needle_meta = Vec::new();
        let mut regexes = Vec::new();

        for (id, pattern) in patterns.iter().enumerate() {
            match pattern {
                SearchPattern::Literal(text) => {
                    if text.is_empty() {
                        return Err(RedactError::config("empty search literal"));
                    }
                    for (bytes, encoding) in literal_encodings(text) {
                        if !needles.contains(&bytes) {
                            needles.push(bytes);
                            needle_meta.push((id, encoding));
                        }
                    }
                }
                SearchPattern::Regex(source) => regexes.push((id, byte_regex(source)?)),
            }
        }

        let literals = if needles.is_empty() {
            None
        } else {
            let automaton = AhoCorasickBuilder::new()
                .prefilter(true)
                .build(&needles)
                .map_err(|e| RedactError::config(format!("cannot build literal search: {}", e)))?;
            Some(automaton)
        };

        Ok(Box::new(NativeCompiled {
            literals,
            needle_meta,
            regexes,
        }))
    }
}

fn literal_encodings(text: &str) -> Vec<(Vec<u8>, Encoding)> {
    let primary = if text.is_ascii() {
        Encoding::Ascii
    } else {
        Encoding::Utf8
    };
    let mut out = vec![(text.as_bytes().to_vec(), primary)];

    let wide: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    out.push((wide, Encoding::Utf16Le));

    if !text.is_ascii() && text.chars().all(|c| u32::from(c) <= 0xFF) {
        let narrow = text.chars().map(|c| u32::from(c) as u8).collect();
        out.push((narrow, Encoding::Latin1));
    }
    out
}

/// One byte per UTF-16LE code unit starting at `align`; units outside
/// Latin-1 become NUL so they cannot extend a match.
fn utf16_narrow(content: &[u8], align: usize) -> Vec<u8> {
    content
        .get(align..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map(|unit| if unit[1] == 0 { unit[0] } else { 0 })
        .collect()
}

struct NativeCompiled {
    literals: Option<AhoCorasick>,
    needle_meta: Vec<(usize, Encoding)>,
    regexes: Vec<(usize, Regex)>,
}

impl CompiledSearch for NativeCompiled {
    fn search(&self, content: &[u8]) -> Vec<SearchHit> {
        let mut hits = Vec::new();

        if let Some(automaton) = &self.literals {
            for m in automaton.find_overlapping_iter(content) {
                let (pattern_id, encoding) = self.needle_meta[m.pattern().as_usize()];
                hits.push(SearchHit {
                    start: m.start() as u64,
                    end: m.end() as u64,
                    pattern_id,
                    encoding,
                });
            }
        }

        for (pattern_id, regex) in &self.regexes {
            for m in regex.find_iter(content).filter(|m| !m.is_empty()) {
                hits.push(SearchHit {
                    start: m.start() as u64,
                    end: m.end() as u64,
                    pattern_id: *pattern_id,
                    encoding: Encoding::Utf8,
                });
            }
            for align in 0..2 {
                let narrow = utf16_narrow(content, align);
                for m in regex.find_iter(&narrow).filter(|m| !m.is_empty()) {
                    hits.push(SearchHit {
                        start: (align + 2 * m.start()) as u64,
                        end: (align + 2 * m.end()) as u64,
                        pattern_id: *pattern_id,
                        encoding: Encoding::Utf16Le,
                    });
                }
            }
        }

        hits.sort();
        hits.dedup_by(|a, b| a.start == b.start && a.end == b.end && a.pattern_id == b.pattern_id);
        hits
    }
}
