//! Serial port backed by tokio-serial
//!
//! tokio's readiness model is mapped onto start/query operations by polling
//! the stream with a waker built from the operation's [`ReadySignal`]. A
//! `Pending` poll registers that waker with the reactor, which fires the
//! signal once the port can make progress.

use crate::port::{IoCompletion, IoStart, OpenPort, PhysicalPort};
use crate::settings::PortSettings;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::SerialStream;
use uartlog_core::{ReadySignal, UartLogError, UartLogResult};

/// Serial port driven through the run loop's readiness signals
pub struct SerialPort {
    stream: SerialStream,
    name: String,
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort").field("name", &self.name).finish()
    }
}

impl SerialPort {
    /// Open and configure a serial port
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(settings: &PortSettings) -> UartLogResult<Self> {
        settings.validate()?;

        let builder = settings.builder();
        let stream = SerialStream::open(&builder)
            .map_err(|e| map_open_error(&settings.port_name, e))?;

        log::info!(
            "serial: opened {} at {} baud (parity {:?}, flow control {})",
            settings.port_name,
            settings.baud_rate,
            settings.parity,
            settings.flow_control
        );

        Ok(Self {
            stream,
            name: settings.port_name.clone(),
        })
    }

    /// Device name the port was opened with
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn map_open_error(port_name: &str, err: tokio_serial::Error) -> UartLogError {
    match err.kind {
        tokio_serial::ErrorKind::InvalidInput => {
            UartLogError::ConfigRejected(format!("{}: {}", port_name, err.description))
        }
        _ => UartLogError::PortUnavailable(format!("{}: {}", port_name, err.description)),
    }
}

fn poll_with<T>(
    signal: &ReadySignal,
    poll: impl FnOnce(&mut Context<'_>) -> Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    let waker = signal.waker();
    let mut cx = Context::from_waker(&waker);
    poll(&mut cx)
}

fn to_start(poll: Poll<io::Result<usize>>) -> IoStart {
    match poll {
        Poll::Ready(Ok(n)) => IoStart::ImmediateComplete(n),
        Poll::Ready(Err(e)) => IoStart::Failed(e),
        Poll::Pending => IoStart::Pending,
    }
}

fn to_completion(poll: Poll<io::Result<usize>>) -> IoCompletion {
    match poll {
        Poll::Ready(Ok(n)) => IoCompletion::Complete(n),
        Poll::Ready(Err(e)) => IoCompletion::Failed(e),
        Poll::Pending => IoCompletion::StillIncomplete,
    }
}

impl SerialPort {
    fn poll_write(&mut self, data: &[u8], signal: &ReadySignal) -> Poll<io::Result<usize>> {
        let stream = &mut self.stream;
        poll_with(signal, |cx| Pin::new(stream).poll_write(cx, data))
    }

    fn poll_read(&mut self, buf: &mut [u8], signal: &ReadySignal) -> Poll<io::Result<usize>> {
        let stream = &mut self.stream;
        poll_with(signal, |cx| {
            let mut read_buf = ReadBuf::new(buf);
            match Pin::new(stream).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(read_buf.filled().len())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Pending,
            }
        })
    }
}

impl PhysicalPort for SerialPort {
    fn start_write(&mut self, data: &[u8], signal: &ReadySignal) -> IoStart {
        to_start(self.poll_write(data, signal))
    }

    fn write_result(&mut self, data: &[u8], signal: &ReadySignal) -> IoCompletion {
        to_completion(self.poll_write(data, signal))
    }

    fn start_read(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoStart {
        to_start(self.poll_read(buf, signal))
    }

    fn read_result(&mut self, buf: &mut [u8], signal: &ReadySignal) -> IoCompletion {
        to_completion(self.poll_read(buf, signal))
    }

    fn close(&mut self) {
        // The descriptor is released when the stream is dropped
        log::info!("serial: closing {}", self.name);
    }
}

impl OpenPort for SerialPort {
    fn open_port(settings: &PortSettings) -> UartLogResult<Self> {
        SerialPort::open(settings)
    }
}
