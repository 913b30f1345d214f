//! Serial-port plumbing for Marlin boards.

use std::{io, time::Duration};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use crate::config::SerialSettings;
use crate::printer::PrinterError;

/// Opening the port resets the board; the firmware needs a moment to boot
/// before it will accept commands.
const BOOT_SETTLE: Duration = Duration::from_secs(2);

/// Opens the configured port as 8-N-1 with no flow control, toggling DTR to
/// reset the board, then waits out the boot and discards any greeting bytes.
pub async fn open_serial(settings: &SerialSettings) -> Result<SerialStream, PrinterError> {
    let mut port = tokio_serial::new(&settings.port, settings.baudrate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_secs_f64(settings.timeout))
        .open_native_async()
        .map_err(io::Error::from)?;
    port.write_data_terminal_ready(false).map_err(io::Error::from)?;
    sleep(Duration::from_millis(2)).await;
    port.write_data_terminal_ready(true).map_err(io::Error::from)?;
    sleep(BOOT_SETTLE).await;
    port.clear(ClearBuffer::Input).map_err(io::Error::from)?;
    Ok(port)
}

/// Reads one line, stripping the terminator. `Ok(None)` means the stream
/// ended; an elapsed timeout is its own error so callers can tell silence
/// from a broken link.
pub async fn read_line_timeout<R>(
    reader: &mut R,
    limit: Duration,
) -> Result<Option<String>, PrinterError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    match timeout(limit, reader.read_line(&mut line)).await {
        Err(_) => Err(PrinterError::ResponseTimeout),
        Ok(Err(error)) => Err(error.into()),
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(Some(line))
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        tokio::io::{duplex, AsyncWriteExt, BufReader},
    };

    #[tokio::test]
    async fn test_read_line_strips_terminator() {
        let (near, mut far) = duplex(64);
        far.write_all(b"ok T:25.0\r\n").await.unwrap();
        let mut reader = BufReader::new(near);
        let line = read_line_timeout(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(line.as_deref(), Some("ok T:25.0"));
    }

    #[tokio::test]
    async fn test_read_line_times_out_on_silence() {
        let (near, _far) = duplex(64);
        let mut reader = BufReader::new(near);
        let result = read_line_timeout(&mut reader, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(PrinterError::ResponseTimeout)));
    }

    #[tokio::test]
    async fn test_read_line_reports_eof() {
        let (near, far) = duplex(64);
        drop(far);
        let mut reader = BufReader::new(near);
        let line = read_line_timeout(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(line, None);
    }
}
