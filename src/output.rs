use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::hydro::Model;




/**
 * The interior of one level at one output time, gathered from every process.
 * `data` has the layout `nx x ny x nz x vec_dim`, x slowest.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: usize,
    pub time: f32,
    pub level: usize,
    pub model: Model,
    pub shape: [usize; 4],
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
    pub zs: Vec<f32>,
    pub data: Vec<f32>,
}




/**
 * Receives the snapshots produced during a run, on rank 0 only.
 */
pub trait SnapshotWriter {
    fn write(&mut self, snapshot: Snapshot) -> Result<()>;
}

impl SnapshotWriter for Vec<Snapshot> {
    fn write(&mut self, snapshot: Snapshot) -> Result<()> {
        self.push(snapshot);
        Ok(())
    }
}

/**
 * Drops every snapshot; for runs with no output file.
 */
pub struct Discard;

impl SnapshotWriter for Discard {
    fn write(&mut self, _: Snapshot) -> Result<()> {
        Ok(())
    }
}




/**
 * Appends snapshots to a file as a sequence of CBOR values.
 */
pub struct CborWriter {
    buffer: BufWriter<File>,
}




// ============================================================================
impl CborWriter {

    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { buffer: BufWriter::new(File::create(path)?) })
    }
}

impl SnapshotWriter for CborWriter {
    fn write(&mut self, snapshot: Snapshot) -> Result<()> {
        ciborium::ser::into_writer(&snapshot, &mut self.buffer).map_err(|e| Error::Serialization(format!("{:?}", e)))?;
        self.buffer.flush()?;
        Ok(())
    }
}




/**
 * Read back every snapshot in a file written by `CborWriter`.
 */
pub fn read_snapshots<P: AsRef<Path>>(path: P) -> Result<Vec<Snapshot>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut snapshots = Vec::new();

    while !reader.fill_buf()?.is_empty() {
        let snapshot = ciborium::de::from_reader(&mut reader).map_err(|e| Error::Serialization(format!("{:?}", e)))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}
