//! On-disk snapshots of a split state tree.
//!
//! Layout: magic, format version, a bincode-framed definition, one raw
//! payload per canonical leaf in definition order, and a trailing checksum
//! over all payload bytes. Everything needed to interpret a payload lives in
//! the definition, so loading is a strict replay with no inference.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Result};

use crate::graph::{GraphDef, LeafValues};
use crate::hashing::{fnv1a_bytes, fnv1a_init};
use crate::tensor::{DType, Tensor};

const MAGIC: &[u8; 8] = b"TRSTSNAP";
const VERSION: u32 = 1;

/// Writes a definition/values pair to `path`, refusing misaligned input.
pub fn save(path: impl AsRef<Path>, def: &GraphDef, values: &LeafValues) -> Result<()> {
    def.check_values(values)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;

    let def_bytes = bincode::serialize(def)?;
    writer.write_all(&(def_bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&def_bytes)?;

    let mut checksum = fnv1a_init();
    for (leaf, tensor) in def.leaves().iter().zip(values.as_slice()) {
        let payload = tensor.bytes();
        writer.write_all(&leaf.spec.dtype.tag().to_le_bytes())?;
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(payload)?;
        checksum = fnv1a_bytes(checksum, payload);
    }
    writer.write_all(&checksum.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug)]
pub struct LoadedSnapshot {
    pub def: GraphDef,
    pub values: LeafValues,
}

/// Reads a snapshot back, validating magic, version, definition, per-leaf
/// dtype tags and payload lengths, and the trailing checksum.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedSnapshot> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        bail!("invalid snapshot magic header");
    }
    let version = read_u32(&mut reader)?;
    if version != VERSION {
        bail!("unsupported snapshot version {}", version);
    }

    let def_len = read_u32(&mut reader)? as usize;
    let mut def_bytes = vec![0u8; def_len];
    reader.read_exact(&mut def_bytes)?;
    let def: GraphDef = bincode::deserialize(&def_bytes)?;

    let mut checksum = fnv1a_init();
    let mut entries = Vec::with_capacity(def.num_leaves());
    for leaf in def.leaves() {
        let tag = read_u32(&mut reader)?;
        let dtype = DType::from_tag(tag)
            .ok_or_else(|| anyhow!("unknown dtype tag {} for leaf '{}'", tag, leaf.path))?;
        ensure!(
            dtype == leaf.spec.dtype,
            "leaf '{}' dtype {:?} does not match definition {:?}",
            leaf.path,
            dtype,
            leaf.spec.dtype
        );
        let payload_len = read_u64(&mut reader)? as usize;
        ensure!(
            payload_len == leaf.spec.byte_len(),
            "leaf '{}' payload length {} does not match expected {}",
            leaf.path,
            payload_len,
            leaf.spec.byte_len()
        );
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;
        checksum = fnv1a_bytes(checksum, &payload);
        entries.push(Tensor::from_bytes(&leaf.spec, payload)?);
    }

    let stored_checksum = read_u64(&mut reader)?;
    ensure!(stored_checksum == checksum, "snapshot checksum mismatch");

    Ok(LoadedSnapshot {
        def,
        values: LeafValues::new(entries),
    })
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
