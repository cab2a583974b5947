//! ============================================================================
//! Chunk Splitter - Bounded, overlapping text segments
//! ============================================================================
//! Splits raw text into chunks of at most `chunk_size` characters. Each cut
//! prefers the latest paragraph break in the window, then a sentence end,
//! then whitespace, and only then an arbitrary character. The next chunk
//! starts exactly `overlap` characters before the previous one ended, so
//! dropping the first `overlap` characters of every chunk after the first
//! and concatenating gives back the original text.
//! ============================================================================

use crate::types::{MemoryError, Result};

/// Cut points, most preferred first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    const PREFERENCE: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

    /// Whether a chunk ending right before `end` ends on this boundary
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        let last = chars[end - 1];
        let before = if end >= 2 { Some(chars[end - 2]) } else { None };
        match self {
            Boundary::Paragraph => last == '\n' && before == Some('\n'),
            Boundary::Sentence => {
                last == '\n'
                    || (last.is_whitespace() && matches!(before, Some('.' | '!' | '?')))
            }
            Boundary::Word => last.is_whitespace(),
        }
    }
}

/// Deterministic recursive-boundary splitter
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(MemoryError::Configuration(format!(
                "invalid chunking: size {} overlap {}",
                chunk_size, overlap
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `content` into ordered chunks.
    /// Blank content yields no chunks; content that fits yields exactly one.
    pub fn split(&self, content: &str) -> Vec<String> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = content.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![content.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            if chars.len() - start <= self.chunk_size {
                chunks.push(chars[start..].iter().collect());
                break;
            }
            let end = self.find_end(&chars, start);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.overlap;
        }
        chunks
    }

    /// Pick the end of the chunk starting at `start`. The cut stays in the
    /// back half of the window and past the overlap so every step advances.
    fn find_end(&self, chars: &[char], start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        let min_end = (start + self.overlap + 1).max(start + self.chunk_size / 2);

        Boundary::PREFERENCE
            .iter()
            .find_map(|boundary| {
                (min_end..=hard_end)
                    .rev()
                    .find(|&end| boundary.ends_at(chars, end))
            })
            .unwrap_or(hard_end)
    }
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}
