//! Feed reader with transparent gzip decompression
//!
//! Upstream feeds are often shipped compressed. [`open`] sniffs the first
//! bytes of the file for the gzip magic number, so `networks.csv.gz` and a
//! compressed file without the `.gz` suffix both read as plain text.
//!
//! ```rust,no_run
//! use locdb::file_reader;
//! use std::io::BufRead;
//!
//! let reader = file_reader::open("networks.csv.gz")?;
//! for line in reader.lines() {
//!     println!("{}", line?);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader, Read};
use std::path::Path;

/// Buffer size for feed reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// First two bytes of every gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a feed file, decompressing gzip content automatically
///
/// The path "-" reads from stdin (uncompressed).
///
/// # Errors
///
/// Returns an error if the file cannot be opened. Invalid gzip data shows
/// up as a read error on the returned reader.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(path)?);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    Ok(from_reader(reader, is_gzip))
}

/// Wrap an already opened reader with an explicit compression flag
pub fn from_reader<R>(reader: R, is_gzip: bool) -> Box<dyn BufRead + Send>
where
    R: Read + Send + 'static,
{
    if is_gzip {
        // Multi-member aware: concatenated .gz files are common for feeds
        Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            MultiGzDecoder::new(reader),
        ))
    } else {
        Box::new(BufReader::with_capacity(BUFFER_SIZE, reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn read_lines(reader: Box<dyn BufRead + Send>) -> Vec<String> {
        reader.lines().collect::<io::Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_plain_text_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.0/8,DE,64512,").unwrap();
        writeln!(file, "2001:db8::/32,US,,A3").unwrap();
        file.flush().unwrap();

        let lines = read_lines(open(file.path()).unwrap());
        assert_eq!(lines, vec!["10.0.0.0/8,DE,64512,", "2001:db8::/32,US,,A3"]);
    }

    #[test]
    fn test_gzip_file() {
        let mut file = NamedTempFile::with_suffix(".csv.gz").unwrap();
        file.write_all(&gzip("compressed 1\ncompressed 2\n")).unwrap();
        file.flush().unwrap();

        let lines = read_lines(open(file.path()).unwrap());
        assert_eq!(lines, vec!["compressed 1", "compressed 2"]);
    }

    #[test]
    fn test_gzip_detected_without_extension() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(&gzip("sniffed\n")).unwrap();
        file.flush().unwrap();

        assert_eq!(read_lines(open(file.path()).unwrap()), vec!["sniffed"]);
    }

    #[test]
    fn test_concatenated_members() {
        let mut data = gzip("first\n");
        data.extend(gzip("second\n"));
        let reader = from_reader(io::Cursor::new(data), true);
        assert_eq!(read_lines(reader), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_lines(open(file.path()).unwrap()).is_empty());
    }

    #[test]
    fn test_missing_file() {
        assert!(open("/nonexistent/feed.csv").is_err());
    }
}
