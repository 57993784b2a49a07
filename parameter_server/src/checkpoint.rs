use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A snapshot of the global model at the end of an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub iteration: u64,
    pub topics: usize,
    pub vocab: usize,
    pub extra: usize,
    pub params: Vec<f64>,
}

impl Checkpoint {
    /// The file name used for the checkpoint of `iteration`.
    pub fn file_name(iteration: u64) -> String {
        format!("checkpoint-{iteration:08}.json")
    }

    /// Writes the checkpoint inside `dir`.
    ///
    /// # Returns
    /// The path of the written file.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(self.iteration));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(path)
    }

    /// Reads a checkpoint previously written with `write`.
    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint {
            iteration: 12,
            topics: 2,
            vocab: 2,
            extra: 1,
            params: vec![0.5, 1., 1.5, 2., 0.],
        };

        let path = checkpoint.write(dir.path()).unwrap();
        assert!(path.ends_with("checkpoint-00000012.json"));
        assert_eq!(Checkpoint::read(&path).unwrap(), checkpoint);
    }
}
