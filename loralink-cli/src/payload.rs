//! Payload sources and sinks
//!
//! `-` means stdin or stdout; anything else is a file path.

use bytes::Bytes;
use std::fs;
use std::io::{self, Read, Write};

/// Read a whole payload
pub fn read_input(source: &str) -> io::Result<Bytes> {
    if source == "-" {
        tracing::info!("Reading payload from stdin");
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    } else {
        tracing::info!("Reading payload from {}", source);
        Ok(Bytes::from(fs::read(source)?))
    }
}

/// Write a whole payload
pub fn write_output(destination: &str, data: &[u8]) -> io::Result<()> {
    if destination == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data)?;
        stdout.flush()
    } else {
        tracing::info!("Writing {} bytes to {}", data.len(), destination);
        fs::write(destination, data)
    }
}
