//! Title-aware sentence chunker.
//!
//! Splits normalized document text into overlapping passages of roughly
//! `chunk_chars` characters. Each passage stays inside one section and is
//! prefixed with that section's title, so a chunk pulled out of the middle of
//! a long lesson still says what it is about.
//!
//! # Algorithm
//!
//! 1. Normalize whitespace and strip boilerplate labels (`Pregunta:`,
//!    `Respuesta:`, `Ejemplo:` ...), which otherwise pollute embeddings.
//! 2. Split into sections. A line starting with `#` or `=`, or a short line
//!    that is mostly uppercase, opens a new section and becomes its title.
//! 3. Drop sections whose body is shorter than `min_section_chars`.
//! 4. Split each section body into sentences on `.`, `!`, `?` or `…`
//!    followed by whitespace.
//! 5. Pack sentences greedily. When the next sentence would overflow the
//!    budget, close the chunk and seed the next one with the trailing words
//!    of the previous chunk (at most `overlap_chars` characters).
//! 6. A sentence that alone exceeds the budget is emitted as its own chunk.
//!    The size bound is typical, not a hard ceiling.
//!
//! Every produced chunk satisfies
//! `chars(chunk) <= chunk_chars + chars(longest sentence in its section)`.
//!
//! # Example
//!
//! ```rust
//! use aula_retrieval_core::chunk::{chunk_text, ChunkParams};
//!
//! let text = "LA SUMA\nLa suma junta dos cantidades para obtener un total. \
//!             Por ejemplo, 2 más 3 es igual a 5.";
//! let chunks = chunk_text(text, &ChunkParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert!(chunks[0].starts_with("LA SUMA\n"));
//! ```

use crate::models::Chunk;

/// Labels removed before chunking.
pub const DEFAULT_BOILERPLATE_MARKERS: &[&str] = &[
    "Pregunta:",
    "Respuesta:",
    "Ejemplo:",
    "Question:",
    "Answer:",
    "Example:",
];

/// Longest line that can still be read as an uppercase heading.
const MAX_HEADING_CHARS: usize = 80;
const MIN_HEADING_LETTERS: usize = 3;
const HEADING_UPPERCASE_RATIO: f32 = 0.8;

/// Chunking parameters. All lengths are in characters.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    pub min_section_chars: usize,
    pub boilerplate_markers: Vec<String>,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_chars: 400,
            overlap_chars: 100,
            min_section_chars: 50,
            boilerplate_markers: DEFAULT_BOILERPLATE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Section {
    title: Option<String>,
    body: String,
}

/// Split `text` into chunk texts, in document order.
///
/// Returns an empty vector when every section is shorter than
/// `min_section_chars`.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<String> {
    let normalized = normalize_text(text, &params.boilerplate_markers);
    let mut chunks = Vec::new();

    for section in split_sections(&normalized) {
        if char_len(section.body.trim()) < params.min_section_chars {
            continue;
        }
        pack_section(&section, params, &mut chunks);
    }

    chunks
}

/// Attach identity and metadata to chunk texts from one source file.
///
/// Indices are contiguous from 0 and `total_chunks` is the same on every chunk.
pub fn build_chunks(source_file: &str, subject: &str, texts: Vec<String>) -> Vec<Chunk> {
    let total_chunks = texts.len();
    texts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            source_file: source_file.to_string(),
            chunk_index,
            size: char_len(&text),
            text,
            subject: subject.to_string(),
            total_chunks,
        })
        .collect()
}

/// Collapse whitespace and strip boilerplate markers.
///
/// Runs of spaces and tabs become one space, lines are trimmed, and runs
/// of blank lines collapse to a single paragraph break.
pub fn normalize_text(text: &str, markers: &[String]) -> String {
    let mut stripped = text.replace("\r\n", "\n").replace('\r', "\n");
    for marker in markers.iter().filter(|m| !m.is_empty()) {
        stripped = stripped.replace(marker.as_str(), " ");
    }

    let mut out = String::with_capacity(stripped.len());
    let mut pending_break = false;
    for line in stripped.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            pending_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        pending_break = false;
    }
    out
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::default();

    for line in text.split('\n') {
        if let Some(title) = heading_title(line) {
            if current.title.is_some() || !current.body.trim().is_empty() {
                sections.push(current);
            }
            current = Section {
                title: Some(title).filter(|t| !t.is_empty()),
                body: String::new(),
            };
            continue;
        }
        current.body.push_str(line);
        current.body.push('\n');
    }

    if current.title.is_some() || !current.body.trim().is_empty() {
        sections.push(current);
    }
    sections
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('#') || trimmed.starts_with('=') {
        let title = trimmed.trim_matches(|c: char| c == '#' || c == '=').trim();
        return Some(title.to_string());
    }
    if is_mostly_uppercase(trimmed) {
        return Some(trimmed.trim_end_matches(':').trim().to_string());
    }
    None
}

fn is_mostly_uppercase(line: &str) -> bool {
    if char_len(line) > MAX_HEADING_CHARS {
        return false;
    }
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    if letters < MIN_HEADING_LETTERS {
        return false;
    }
    let upper = line.chars().filter(|c| c.is_uppercase()).count();
    upper as f32 / letters as f32 >= HEADING_UPPERCASE_RATIO
}

fn split_sentences(body: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for paragraph in body.split("\n\n") {
        let joined = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut current = String::new();
        let mut chars = joined.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            let terminal = matches!(c, '.' | '!' | '?' | '…');
            if terminal && chars.peek().is_some_and(|next| next.is_whitespace()) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }

        let rest = current.trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
    }

    sentences
}

fn pack_section(section: &Section, params: &ChunkParams, out: &mut Vec<String>) {
    let prefix = match &section.title {
        Some(title) => format!("{}\n", title),
        None => String::new(),
    };
    let prefix_len = char_len(&prefix);
    // Title plus carried words must leave room for at least one new character.
    let overlap_budget = params
        .overlap_chars
        .min(params.chunk_chars.saturating_sub(prefix_len + 1));

    let mut body = String::new();
    // Whether `body` holds anything beyond words carried from the last chunk.
    let mut fresh = false;

    for sentence in split_sentences(&section.body) {
        let sentence_len = char_len(&sentence);

        if prefix_len + sentence_len > params.chunk_chars {
            if fresh {
                out.push(format!("{}{}", prefix, body));
            }
            out.push(format!("{}{}", prefix, sentence));
            body = overlap_tail(&sentence, overlap_budget);
            fresh = false;
            continue;
        }

        let separator = usize::from(!body.is_empty());
        let projected = prefix_len + char_len(&body) + separator + sentence_len;
        if projected > params.chunk_chars && fresh {
            out.push(format!("{}{}", prefix, body));
            body = overlap_tail(&body, overlap_budget);
        }

        if !body.is_empty() {
            body.push(' ');
        }
        body.push_str(&sentence);
        fresh = true;
    }

    if fresh {
        out.push(format!("{}{}", prefix, body));
    }
}

/// Trailing whole words of `text` fitting in `budget` characters.
fn overlap_tail(text: &str, budget: usize) -> String {
    let mut words: Vec<&str> = Vec::new();
    let mut used = 0;
    for word in text.split_whitespace().rev() {
        let cost = char_len(word) + usize::from(!words.is_empty());
        if used + cost > budget {
            break;
        }
        used += cost;
        words.push(word);
    }
    words.reverse();
    words.join(" ")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
