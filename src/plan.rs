//! Partitioning of a file into fixed-size byte ranges.

use crate::fetch::ByteRange;

/// Split `name` into base and extension at the last dot.
///
/// A leading dot (`.bashrc`) or a trailing dot does not start an extension.
pub fn split_file_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Name of part `index` (0-based) out of `chunk_count`: `{base}_part{n}of{count}{.ext}`.
pub fn part_name(base: &str, extension: Option<&str>, index: u64, chunk_count: u64) -> String {
    match extension {
        Some(ext) => format!("{base}_part{}of{chunk_count}.{ext}", index + 1),
        None => format!("{base}_part{}of{chunk_count}", index + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub name: String,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn byte_range(&self) -> ByteRange {
        ByteRange {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    file_name: String,
    chunk_size: u64,
    parts: Vec<ChunkRange>,
}

impl ChunkPlan {
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero; configuration rejects that earlier.
    pub fn new(file_name: &str, total_bytes: u64, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");

        let chunk_count = total_bytes.div_ceil(chunk_size);
        let (base, extension) = split_file_name(file_name);

        let parts = (0..chunk_count)
            .map(|index| {
                let start = index * chunk_size;
                let end = (start + chunk_size - 1).min(total_bytes - 1);
                ChunkRange {
                    index,
                    start,
                    end,
                    name: part_name(base, extension, index, chunk_count),
                }
            })
            .collect();

        Self {
            file_name: file_name.to_string(),
            chunk_size,
            parts,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u64 {
        self.parts.len() as u64
    }

    pub fn parts(&self) -> &[ChunkRange] {
        &self.parts
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.last().map(|p| p.end + 1).unwrap_or(0)
    }

    /// Shell commands that rebuild the original file from its parts.
    pub fn merge_instructions(&self) -> String {
        let count = self.chunk_count();
        let (base, extension) = split_file_name(&self.file_name);
        let suffix = extension.map(|e| format!(".{e}")).unwrap_or_default();

        let windows_parts = self
            .parts
            .iter()
            .map(|p| format!("\"{}\"", p.name))
            .collect::<Vec<_>>()
            .join(" + ");

        format!(
            "How to merge the {count} parts\n\
             \n\
             Put all parts in one folder, then run:\n\
             \n\
             Windows (CMD):\n\
             copy /b {windows_parts} \"{original}\"\n\
             \n\
             Linux/macOS (terminal):\n\
             cat \"{base}_part\"{{1..{count}}}\"of{count}{suffix}\" > \"{original}\"",
            original = self.file_name,
        )
    }
}
