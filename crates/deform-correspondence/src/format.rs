//! Line-oriented text persistence.
//!
//! ```text
//! <count>
//! <source_id>,<target_id_1>,<target_id_2>,...
//! ```
//!
//! The first line is the element count. It pre-sizes dense containers,
//! up to [`MAX_CORRESPONDENCE_ELEMENTS`], and is ignored by sparse ones. Elements with no targets are not written.
//! A target of `-1` is read as "no target".

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use deform_types::constants::MAX_CORRESPONDENCE_ELEMENTS;
use deform_types::{DeformError, DeformResult};

use crate::container::{Correspondence, CorrespondenceKind};

impl Correspondence {
    /// Parses a correspondence of the given kind.
    pub fn read_from<R: BufRead>(reader: R, kind: CorrespondenceKind) -> DeformResult<Self> {
        let mut lines = reader.lines().enumerate();

        let (size, count_line) = loop {
            match lines.next() {
                Some((i, line)) => {
                    let line = line?;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    break (parse_id(trimmed, i + 1)?, i + 1);
                }
                None => {
                    return Err(DeformError::Parse {
                        line: 1,
                        message: "missing element count".into(),
                    });
                }
            }
        };

        if kind != CorrespondenceKind::Sparse && size > MAX_CORRESPONDENCE_ELEMENTS {
            return Err(DeformError::Parse {
                line: count_line,
                message: format!(
                    "element count {size} exceeds the limit of {MAX_CORRESPONDENCE_ELEMENTS}"
                ),
            });
        }
        let mut corr =
            Correspondence::try_with_kind(kind, size).map_err(|e| DeformError::Parse {
                line: count_line,
                message: format!("cannot allocate {size} elements: {e}"),
            })?;

        for (i, line) in lines {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let line_no = i + 1;

            let mut fields = trimmed.split(',').map(str::trim);
            let source = parse_id(fields.next().unwrap_or_default(), line_no)?;

            for field in fields.filter(|f| !f.is_empty()) {
                if field == "-1" {
                    continue;
                }
                let target = parse_id(field, line_no)?;
                corr.add(source, target).map_err(|e| DeformError::Parse {
                    line: line_no,
                    message: e.to_string(),
                })?;
            }
        }

        Ok(corr)
    }

    /// Reads a correspondence file.
    pub fn read_path(path: impl AsRef<Path>, kind: CorrespondenceKind) -> DeformResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file), kind)
    }

    /// Writes the text form. Sources appear in ascending order, targets in
    /// insertion order.
    pub fn write_to<W: Write>(&self, mut writer: W) -> DeformResult<()> {
        writeln!(writer, "{}", self.size())?;
        for (source, targets) in self.entries() {
            write!(writer, "{}", source)?;
            for t in targets {
                write!(writer, ",{}", t)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes a correspondence file, replacing any existing file.
    pub fn write_path(&self, path: impl AsRef<Path>) -> DeformResult<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))
    }
}

fn parse_id(field: &str, line: usize) -> DeformResult<usize> {
    field.parse::<usize>().map_err(|_| DeformError::Parse {
        line,
        message: format!("expected a non-negative integer, found {:?}", field),
    })
}
