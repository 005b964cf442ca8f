//! ZIP Local-File Records
//!
//! The SU3 content is a ZIP stream of router-descriptor files. Only
//! local-file records are walked; the central directory is never needed.
//! Records flagged with a data descriptor (bit 0x0008) declare zero
//! sizes up front, so the real sizes are recovered by scanning forward
//! to the descriptor signature. All ZIP integers are little-endian.

use std::io::Read;

use flate2::read::DeflateDecoder;
use tracing::{debug, warn};

use crate::cursor::ByteCursor;
use crate::errors::{ReseedError, ReseedResult};

/// Local-file header signature
pub const ZIP_LOCAL_FILE_SIGNATURE: u32 = 0x04034B50;

/// Bit flag announcing a trailing data descriptor
pub const ZIP_FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Data-descriptor signature bytes
pub const ZIP_DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

/// Outcome of reading one local-file record
pub enum LocalFileRecord {
    /// A descriptor payload, decompressed if the record was deflated
    File { name: String, data: Vec<u8> },
    /// Record present but unusable; the walk continues
    Skipped { name: String },
    /// The next signature is not a local-file header
    End,
}

/// Read one local-file record at the cursor
pub(crate) fn read_local_file(cur: &mut ByteCursor<'_>) -> ReseedResult<LocalFileRecord> {
    let signature = cur.u32_le()?;
    if signature != ZIP_LOCAL_FILE_SIGNATURE {
        return Ok(LocalFileRecord::End);
    }

    cur.skip(2)?; // version needed to extract
    let bit_flag = cur.u16_le()?;
    let method = cur.u16_le()?;
    // last-mod time/date and CRC-32; decompression success stands in
    // for the CRC check
    cur.skip(8)?;
    let mut compressed_size = cur.u32_le()? as usize;
    let mut uncompressed_size = cur.u32_le()? as usize;
    let name_len = cur.u16_le()? as usize;
    let extra_len = cur.u16_le()? as usize;
    let name = String::from_utf8_lossy(cur.take(name_len)?).into_owned();
    cur.skip(extra_len)?;

    if bit_flag & ZIP_FLAG_DATA_DESCRIPTOR != 0 {
        // header sizes are zero; recover them from the descriptor
        let data_start = cur.position();
        let sig_pos = cur
            .find_forward(&ZIP_DATA_DESCRIPTOR_SIGNATURE)
            .ok_or(ReseedError::DescriptorNotFound)?;
        cur.seek(sig_pos + 4)?;
        cur.skip(4)?; // CRC-32
        // the signature bytes count as part of the compressed span
        compressed_size = cur.u32_le()? as usize + 4;
        uncompressed_size = cur.u32_le()? as usize;
        cur.seek(data_start)?;
    }

    debug!("processing file {} ({} bytes)", name, compressed_size);
    if compressed_size == 0 {
        warn!("{}: unexpected size 0, skipped", name);
        return Ok(LocalFileRecord::Skipped { name });
    }
    let payload = cur.take(compressed_size)?;

    let data = if method != 0 {
        // assume Deflate
        let mut decoder = DeflateDecoder::new(payload);
        let mut inflated = Vec::with_capacity(uncompressed_size);
        if let Err(e) = decoder.read_to_end(&mut inflated) {
            warn!("{}: inflate failed: {}", name, e);
            finish_record(cur, bit_flag)?;
            return Ok(LocalFileRecord::Skipped { name });
        }
        if inflated.len() > uncompressed_size {
            warn!(
                "{}: actual uncompressed size {} exceeds {} from header",
                name,
                inflated.len(),
                uncompressed_size
            );
            finish_record(cur, bit_flag)?;
            return Ok(LocalFileRecord::Skipped { name });
        }
        inflated
    } else {
        payload.to_vec()
    };

    finish_record(cur, bit_flag)?;
    Ok(LocalFileRecord::File { name, data })
}

/// Step over the remainder of the data descriptor, if the record had one
fn finish_record(cur: &mut ByteCursor<'_>, bit_flag: u16) -> ReseedResult<()> {
    if bit_flag & ZIP_FLAG_DATA_DESCRIPTOR != 0 {
        cur.skip(12)?;
    }
    Ok(())
}
