use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    document::{Document, SparseVector},
    error::{CorpusErr, Result},
};

/// The on-disk representation of a document, one JSON object per line.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: u64,
    size: usize,
    indices: Vec<u32>,
    values: Vec<f64>,
}

/// Reads a JSON-lines corpus, blank lines are skipped.
///
/// # Arguments
/// * `reader` - The source of records.
/// * `vocab_size` - The size every term vector must have.
///
/// # Returns
/// The documents in file order, or a `CorpusErr` on the first malformed record.
pub fn read_documents<R: BufRead>(reader: R, vocab_size: usize) -> Result<Vec<Document>> {
    let mut docs = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = serde_json::from_str(&line).map_err(|source| CorpusErr::Parse {
            line: idx + 1,
            source,
        })?;

        if record.size != vocab_size {
            return Err(CorpusErr::VocabularyMismatch {
                id: record.id,
                got: record.size,
                expected: vocab_size,
            });
        }

        let counts = SparseVector::new(record.size, record.indices, record.values)?;
        docs.push(Document::new(record.id, counts));
    }

    Ok(docs)
}

/// Loads and concatenates the corpora stored at `paths`.
///
/// # Returns
/// A `CorpusErr::DuplicateId` if two records share an id, across files too.
pub fn load_paths<P: AsRef<Path>>(paths: &[P], vocab_size: usize) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    let mut seen = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        let file = File::open(path)?;
        let loaded = read_documents(BufReader::new(file), vocab_size)?;
        debug!("loaded {} documents from {}", loaded.len(), path.display());

        for doc in loaded {
            if !seen.insert(doc.id) {
                return Err(CorpusErr::DuplicateId(doc.id));
            }
            docs.push(doc);
        }
    }

    info!("loaded {} documents from {} file(s)", docs.len(), paths.len());
    Ok(docs)
}

/// Writes `docs` in the format understood by `read_documents`.
pub fn write_documents<W: Write>(writer: W, docs: &[Document]) -> Result<()> {
    let mut writer = BufWriter::new(writer);

    for doc in docs {
        let record = Record {
            id: doc.id,
            size: doc.counts.size(),
            indices: doc.counts.indices().to_vec(),
            values: doc.counts.values().to_vec(),
        };

        serde_json::to_writer(&mut writer, &record).map_err(|e| CorpusErr::Io(e.into()))?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_records_and_skips_blank_lines() {
        let input = r#"{"id":0,"size":4,"indices":[0,2],"values":[1.0,3.0]}

{"id":1,"size":4,"indices":[],"values":[]}
"#;
        let docs = read_documents(Cursor::new(input), 4).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].words(), 4.);
        assert_eq!(docs[1].counts.nnz(), 0);
    }

    #[test]
    fn reports_line_of_malformed_record() {
        let input = "{\"id\":0,\"size\":4,\"indices\":[],\"values\":[]}\nnot json\n";
        let err = read_documents(Cursor::new(input), 4).unwrap_err();
        assert!(matches!(err, CorpusErr::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_vocabulary_mismatch() {
        let input = r#"{"id":9,"size":3,"indices":[],"values":[]}"#;
        let err = read_documents(Cursor::new(input), 4).unwrap_err();
        assert!(matches!(
            err,
            CorpusErr::VocabularyMismatch {
                id: 9,
                got: 3,
                expected: 4
            }
        ));
    }

    #[test]
    fn write_then_read_preserves_documents() {
        let docs = vec![
            Document::new(3, SparseVector::new(5, vec![1, 4], vec![2., 1.]).unwrap()),
            Document::new(4, SparseVector::new(5, vec![0], vec![7.]).unwrap()),
        ];

        let mut buf = Vec::new();
        write_documents(&mut buf, &docs).unwrap();
        let read = read_documents(Cursor::new(buf), 5).unwrap();
        assert_eq!(read, docs);
    }
}
