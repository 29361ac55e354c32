//! Policy archives for warm-starting from prior runs.
//!
//! An archive is a bincode-encoded sequence of per-generation policy blobs.
//! A blob carries the unit count and per-unit float count alongside the raw
//! weights; both must match the configured population exactly or startup
//! aborts, nothing is resized or truncated silently.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::Policy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyBlob {
    pub unit_count: u32,
    pub unit_size: u32,
    pub data: Vec<f32>,
}

#[derive(Default, Serialize, Deserialize)]
pub struct Archive {
    generations: Vec<PolicyBlob>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let archive =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(archive)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    pub fn push(&mut self, blob: PolicyBlob) {
        self.generations.push(blob);
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// blob for one generation; out-of-range or absent indices clamp to the
    /// last stored generation
    pub fn extract(&self, generation: Option<usize>) -> Result<&PolicyBlob> {
        let last = self.generations.len().checked_sub(1).ok_or(Error::EmptyArchive)?;
        let g = generation.unwrap_or(last).min(last);
        Ok(&self.generations[g])
    }
}

/// snapshot a policy's units into an interchange blob
pub fn compress(policy: &dyn Policy) -> PolicyBlob {
    let stride = policy.stride();
    let size = policy.type_size();
    let data = policy
        .data()
        .chunks(stride.max(1))
        .flat_map(|unit| &unit[..size])
        .copied()
        .collect();
    PolicyBlob {
        unit_count: policy.unit_count() as u32,
        unit_size: size as u32,
        data,
    }
}

/// expand a blob back into a policy buffer, honoring the policy stride
pub fn uncompress(policy: &mut dyn Policy, blob: &PolicyBlob) -> Result<()> {
    let units = policy.unit_count();
    let size = policy.type_size();
    if blob.unit_count as usize != units || blob.unit_size as usize != size {
        return Err(Error::ArchiveShape {
            expected_units: units,
            found_units: blob.unit_count as usize,
            expected_size: size,
            found_size: blob.unit_size as usize,
        });
    }
    let stride = policy.stride();
    for (unit, src) in policy
        .data_mut()
        .chunks_mut(stride.max(1))
        .zip(blob.data.chunks(size.max(1)))
    {
        unit[..size].copy_from_slice(src);
    }
    Ok(())
}
