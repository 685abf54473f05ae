// src/compression.rs

//! Compression format detection and decoding
//!
//! Bundles are zstd- or xz-compressed tar archives; the index cache is a
//! zstd-compressed SQLite file. Format is detected from magic bytes, never
//! from file extension, so a mislabeled download still opens correctly.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes.
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Self::Gzip
        } else if data.len() >= 6 && data[..6] == [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00] {
            Self::Xz
        } else if data.len() >= 4 && data[..4] == [0x28, 0xb5, 0x2f, 0xfd] {
            Self::Zstd
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Wrap a reader in the decoder for the given format.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader)
                .map_err(|e| Error::Fatal(format!("Failed to create zstd decoder: {e}")))?;
            Ok(Box::new(decoder))
        }
    }
}

/// Open a file, sniff its magic bytes, and return a decoding reader.
///
/// The file is reopened after sniffing so the decoder sees the stream from
/// the start.
pub fn open_decoded(path: &Path) -> Result<(CompressionFormat, Box<dyn Read>)> {
    let mut magic = [0u8; 6];
    let mut file = File::open(path)?;
    let n = read_up_to(&mut file, &mut magic)?;
    let format = CompressionFormat::from_magic_bytes(&magic[..n]);

    let reader = BufReader::new(File::open(path)?);
    let decoder = create_decoder(reader, format)?;
    Ok((format, decoder))
}

/// Decompress a byte slice, auto-detecting the format.
pub fn decompress_auto(data: &[u8]) -> Result<Vec<u8>> {
    let format = CompressionFormat::from_magic_bytes(data);
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Fatal(format!("Failed to decompress {format} data: {e}")))?;
    Ok(output)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_magic_detection() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x00, 0x00]),
            CompressionFormat::None
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f]),
            CompressionFormat::None
        );
    }

    #[test]
    fn test_zstd_round_trip() {
        let payload = b"bundle payload bytes";
        let compressed = zstd::encode_all(&payload[..], 3).unwrap();
        assert_eq!(
            CompressionFormat::from_magic_bytes(&compressed),
            CompressionFormat::Zstd
        );
        assert_eq!(decompress_auto(&compressed).unwrap(), payload);
    }

    #[test]
    fn test_open_decoded_sniffs_zstd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.zst");
        let compressed = zstd::encode_all(&b"hello"[..], 3).unwrap();
        File::create(&path)
            .unwrap()
            .write_all(&compressed)
            .unwrap();

        let (format, mut reader) = open_decoded(&path).unwrap();
        assert_eq!(format, CompressionFormat::Zstd);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }
}
