//! SU3 Archives
//!
//! An SU3 archive is a signed container distributing reseed data: a
//! fixed header, a version string and signer ID, a ZIP content section
//! and a trailing signature. SU3 integers are big-endian.
//!
//! Parsing is deliberately forgiving past the header: whatever number of
//! descriptors could be extracted before a malformed structure is the
//! result, never an error.

use tracing::{debug, error, info, warn};

use opal_core::NetDb;

use crate::cursor::ByteCursor;
use crate::errors::{ReseedError, ReseedResult};
use crate::zip::{read_local_file, LocalFileRecord};

/// Leading magic bytes, followed on the wire by a zero byte
pub const SU3_MAGIC: &[u8; 6] = b"I2Psu3";

/// File type for ZIP content
pub const SU3_FILE_TYPE_ZIP: u8 = 0x00;

/// Content type for reseed data
pub const SU3_CONTENT_TYPE_RESEED: u8 = 0x03;

/// Parsed SU3 fixed header
#[derive(Debug)]
pub struct Su3Header {
    pub signature_type: u16,
    pub signature_length: u16,
    pub version: Vec<u8>,
    pub signer_id: Vec<u8>,
    pub content_length: u64,
    /// Byte offset where the ZIP content starts
    pub content_offset: usize,
}

/// Parse the fixed header, the version string and the signer ID
fn parse_header(cur: &mut ByteCursor<'_>) -> ReseedResult<Su3Header> {
    if cur.take(6)? != SU3_MAGIC {
        return Err(ReseedError::BadMagic);
    }
    cur.skip(1)?; // zero byte after the magic
    cur.skip(1)?; // file format version
    let signature_type = cur.u16_be()?;
    let signature_length = cur.u16_be()?;
    cur.skip(1)?; // unused
    let version_length = cur.u8()?;
    cur.skip(1)?; // unused
    let signer_length = cur.u8()?;
    let content_length = cur.u64_be()?;
    cur.skip(1)?; // unused
    let file_type = cur.u8()?;
    if file_type != SU3_FILE_TYPE_ZIP {
        return Err(ReseedError::UnsupportedFileType(file_type));
    }
    cur.skip(1)?; // unused
    let content_type = cur.u8()?;
    if content_type != SU3_CONTENT_TYPE_RESEED {
        return Err(ReseedError::UnexpectedContentType(content_type));
    }
    cur.skip(12)?; // unused

    let version = cur.take(version_length as usize)?.to_vec();
    let signer_id = cur.take(signer_length as usize)?.to_vec();

    Ok(Su3Header {
        signature_type,
        signature_length,
        version,
        signer_id,
        content_length,
        content_offset: cur.position(),
    })
}

/// Walk an SU3 archive and hand every embedded router descriptor to the
/// netdb. Returns the number of descriptors ingested; a malformed
/// archive yields whatever was ingested up to that point.
pub fn ingest_su3(data: &[u8], netdb: &dyn NetDb) -> usize {
    let mut cur = ByteCursor::new(data);
    let header = match parse_header(&mut cur) {
        Ok(header) => header,
        Err(e) => {
            error!("su3 archive rejected: {}", e);
            return 0;
        }
    };
    info!(
        "su3 archive: {} content bytes, signer {}",
        header.content_length,
        String::from_utf8_lossy(&header.signer_id)
    );

    let mut ingested = 0;
    loop {
        match read_local_file(&mut cur) {
            Ok(LocalFileRecord::File { name, data }) => {
                debug!("ingesting {} ({} bytes)", name, data.len());
                netdb.add_router_info(&data);
                ingested += 1;
            }
            Ok(LocalFileRecord::Skipped { .. }) => {}
            Ok(LocalFileRecord::End) => break,
            Err(e) => {
                warn!("su3 content walk stopped: {}", e);
                break;
            }
        }
        if cur.position() - header.content_offset >= header.content_length as usize {
            break; // beyond the declared content
        }
    }
    ingested
}

#[cfg(test)]
pub(crate) mod testutil {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::Mutex;

    use opal_core::{IdentHash, NetDb};

    use crate::zip::{ZIP_DATA_DESCRIPTOR_SIGNATURE, ZIP_LOCAL_FILE_SIGNATURE};

    #[derive(Default)]
    pub struct MockNetDb {
        pub router_infos: Mutex<Vec<Vec<u8>>>,
    }

    impl NetDb for MockNetDb {
        fn add_router_info(&self, data: &[u8]) {
            self.router_infos.lock().unwrap().push(data.to_vec());
        }

        fn set_unreachable(&self, _ident: &IdentHash, _unreachable: bool) {}
    }

    pub fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub struct ZipEntry<'a> {
        pub name: &'a str,
        pub data: &'a [u8],
        pub deflated: bool,
        pub descriptor: bool,
    }

    impl<'a> ZipEntry<'a> {
        pub fn stored(name: &'a str, data: &'a [u8]) -> Self {
            Self {
                name,
                data,
                deflated: false,
                descriptor: false,
            }
        }

        pub fn deflated(name: &'a str, data: &'a [u8]) -> Self {
            Self {
                name,
                data,
                deflated: true,
                descriptor: false,
            }
        }

        pub fn with_descriptor(name: &'a str, data: &'a [u8]) -> Self {
            Self {
                name,
                data,
                deflated: true,
                descriptor: true,
            }
        }

        pub fn to_bytes(&self) -> Vec<u8> {
            let payload = if self.deflated {
                deflate(self.data)
            } else {
                self.data.to_vec()
            };
            let mut buf = Vec::new();
            buf.extend_from_slice(&ZIP_LOCAL_FILE_SIGNATURE.to_le_bytes());
            buf.extend_from_slice(&20u16.to_le_bytes()); // version needed
            let flag: u16 = if self.descriptor { 0x0008 } else { 0 };
            buf.extend_from_slice(&flag.to_le_bytes());
            let method: u16 = if self.deflated { 8 } else { 0 };
            buf.extend_from_slice(&method.to_le_bytes());
            buf.extend_from_slice(&[0u8; 8]); // time, date, crc-32
            if self.descriptor {
                buf.extend_from_slice(&[0u8; 8]); // sizes deferred
            } else {
                buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
            }
            buf.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // extra field
            buf.extend_from_slice(self.name.as_bytes());
            buf.extend_from_slice(&payload);
            if self.descriptor {
                buf.extend_from_slice(&ZIP_DATA_DESCRIPTOR_SIGNATURE);
                buf.extend_from_slice(&0u32.to_le_bytes()); // crc-32
                buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
            }
            buf
        }
    }

    pub fn su3_archive(entries: &[ZipEntry<'_>]) -> Vec<u8> {
        let content: Vec<u8> = entries.iter().flat_map(|e| e.to_bytes()).collect();
        su3_archive_raw(&content)
    }

    pub fn su3_archive_raw(content: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"I2Psu3");
        buf.push(0); // zero byte after the magic
        buf.push(0); // file format version
        buf.extend_from_slice(&0u16.to_be_bytes()); // signature type
        buf.extend_from_slice(&0u16.to_be_bytes()); // signature length
        buf.push(0); // unused
        buf.push(3); // version length
        buf.push(0); // unused
        buf.push(4); // signer id length
        buf.extend_from_slice(&(content.len() as u64).to_be_bytes());
        buf.push(0); // unused
        buf.push(0); // file type: zip
        buf.push(0); // unused
        buf.push(3); // content type: reseed data
        buf.extend_from_slice(&[0u8; 12]); // unused
        buf.extend_from_slice(b"123"); // version string
        buf.extend_from_slice(b"test"); // signer id
        buf.extend_from_slice(content);
        buf
    }
}
