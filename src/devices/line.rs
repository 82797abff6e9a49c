use std::io::{self, ErrorKind, Read, Write};

use serialport::{ClearBuffer, SerialPort};

/// Longest line kept before the rest is dropped. NMEA caps sentences at 82
/// characters and the SQM reply is 55, so anything past this is line noise.
const MAX_LINE_LENGTH: usize = 256;

/// A byte channel to one instrument.
pub trait Channel: Read + Write + Send {
    /// Drop whatever the device sent before the next request.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl Channel for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Read one line, without its terminator.
///
/// A read timeout or end of stream ends the line early and returns whatever
/// arrived, possibly nothing. Every other I/O error is returned.
pub fn read_line<C: Read + ?Sized>(channel: &mut C) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];

    loop {
        match channel.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => match byte[0] {
                b'\n' => break,
                b'\r' => {}
                b if line.len() < MAX_LINE_LENGTH => line.push(b),
                _ => {}
            },
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(line)
}
