use tracing::{debug, error, warn};

use super::line::{Channel, read_line};
use super::BrightnessMeter;
use crate::error::{LoggerError, Result};

/// "Request reading" command.
const READ_COMMAND: &[u8; 2] = b"rx";

/// Character ranges of the fields in an `rx` reply, e.g.
/// `r, 06.70m,0000022921Hz,0000000020c,0000000.000s, 039.4C`.
const BRIGHTNESS: (usize, usize) = (2, 8);
const FREQUENCY: (usize, usize) = (10, 20);
const COUNT: (usize, usize) = (23, 33);
const PERIOD: (usize, usize) = (35, 46);
const TEMPERATURE: (usize, usize) = (49, 54);

const REPLY_LENGTH: usize = TEMPERATURE.1;

/// One SQM reading, fields kept exactly as the meter sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqmReading {
    pub brightness: String,
    pub frequency: String,
    pub count: String,
    pub period: String,
    pub temperature: String,
}

impl SqmReading {
    /// Slice a reply at the fixed offsets. Fields past the end of a short
    /// reply come back truncated or empty.
    pub fn from_reply(reply: &str) -> Self {
        SqmReading {
            brightness: slice_clipped(reply, BRIGHTNESS),
            frequency: slice_clipped(reply, FREQUENCY),
            count: slice_clipped(reply, COUNT),
            period: slice_clipped(reply, PERIOD),
            temperature: slice_clipped(reply, TEMPERATURE),
        }
    }
}

fn slice_clipped(reply: &str, (start, end): (usize, usize)) -> String {
    reply.chars().skip(start).take(end - start).collect()
}

/// Unihedron SQM-LU on a serial line.
pub struct Sqm<C> {
    channel: C,
}

impl<C: Channel> Sqm<C> {
    pub fn new(channel: C) -> Self {
        Sqm { channel }
    }

    /// Send `rx` and slice the reply. No retry: a timed-out read gives an
    /// empty reading.
    pub fn query(&mut self) -> Result<SqmReading> {
        self.channel.discard_input()?;
        self.channel.write_all(READ_COMMAND).map_err(|e| {
            error!("Unexpected error sending command to SQM: {}", e);
            e
        })?;
        self.channel.flush()?;

        let raw = read_line(&mut self.channel).map_err(|e| {
            error!("Unexpected error reading SQM response: {}", e);
            e
        })?;
        let reply = String::from_utf8(raw).map_err(|e| {
            error!("Error decoding SQM response: {}", e);
            LoggerError::Decode(format!("SQM response is not valid UTF-8: {}", e))
        })?;
        let reply = reply.trim();

        if reply.chars().count() < REPLY_LENGTH {
            warn!("Short SQM response ({} chars): {:?}", reply.chars().count(), reply);
        } else {
            debug!("SQM response: {}", reply);
        }

        Ok(SqmReading::from_reply(reply))
    }

    #[cfg(test)]
    pub fn into_inner(self) -> C {
        self.channel
    }
}

impl<C: Channel> BrightnessMeter for Sqm<C> {
    fn read_brightness(&mut self) -> Result<SqmReading> {
        self.query()
    }
}
