//! Boundary to the USB link of a NetMD recorder.
//!
//! The core never opens devices itself. Whatever owns the USB handle
//! implements [`Transport`] and hands it to a [`crate::NetMdDevice`]. Every
//! call is synchronous and blocks until the device answers or the
//! transport-defined timeout elapses; timeouts surface as
//! [`NetMdError::Transport`] and are never retried by the core.

use std::time::Duration;

use crate::{NetMdError, Result};

/// Synchronous command/response link to a single device.
pub trait Transport {
    /// Sends one command frame and returns the complete reply frame.
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>>;

    /// Reads the four-byte device status word.
    fn control_read(&mut self, timeout: Duration) -> Result<[u8; 4]>;

    /// Reads a status block of `len` bytes following a completed transfer.
    fn control_read_block(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Writes a raw vendor control message, bypassing the reply queue.
    fn control_write(&mut self, request: &[u8], timeout: Duration) -> Result<usize>;

    /// Pushes a block of the audio stream to the bulk endpoint.
    fn bulk_write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        (**self).exchange(request)
    }

    fn control_read(&mut self, timeout: Duration) -> Result<[u8; 4]> {
        (**self).control_read(timeout)
    }

    fn control_read_block(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).control_read_block(len, timeout)
    }

    fn control_write(&mut self, request: &[u8], timeout: Duration) -> Result<usize> {
        (**self).control_write(request, timeout)
    }

    fn bulk_write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_write(data, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        (**self).exchange(request)
    }

    fn control_read(&mut self, timeout: Duration) -> Result<[u8; 4]> {
        (**self).control_read(timeout)
    }

    fn control_read_block(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).control_read_block(len, timeout)
    }

    fn control_write(&mut self, request: &[u8], timeout: Duration) -> Result<usize> {
        (**self).control_write(request, timeout)
    }

    fn bulk_write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_write(data, timeout)
    }
}

/// Status word the device reports while it is idle.
pub const IDLE_STATUS: [u8; 4] = [0; 4];

/// Polls the status word until `ready` accepts it.
///
/// There is no internal retry budget: the loop ends when the predicate holds
/// or when the transport gives up on a read.
pub fn poll_until<T, F>(transport: &mut T, timeout: Duration, ready: F) -> Result<[u8; 4]>
where
    T: Transport + ?Sized,
    F: Fn(&[u8; 4]) -> bool,
{
    let mut polls = 0usize;
    loop {
        let status = transport.control_read(timeout)?;
        polls += 1;
        if ready(&status) {
            tracing::trace!(polls, ?status, "device status reached");
            return Ok(status);
        }
    }
}

/// Fails with [`NetMdError::Transport`] when a write moved fewer bytes than
/// requested.
pub(crate) fn expect_written(written: usize, requested: usize) -> Result<()> {
    if written < requested {
        return Err(NetMdError::Transport(format!(
            "short write: {written} of {requested} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct StatusScript(VecDeque<Result<[u8; 4]>>);

    impl Transport for StatusScript {
        fn exchange(&mut self, _request: &[u8]) -> Result<Vec<u8>> {
            Err(NetMdError::transport("not scripted"))
        }

        fn control_read(&mut self, _timeout: Duration) -> Result<[u8; 4]> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(NetMdError::transport("timed out")))
        }

        fn control_read_block(&mut self, _len: usize, _timeout: Duration) -> Result<Vec<u8>> {
            Err(NetMdError::transport("not scripted"))
        }

        fn control_write(&mut self, _request: &[u8], _timeout: Duration) -> Result<usize> {
            Err(NetMdError::transport("not scripted"))
        }

        fn bulk_write(&mut self, _data: &[u8], _timeout: Duration) -> Result<usize> {
            Err(NetMdError::transport("not scripted"))
        }
    }

    #[test]
    fn polls_until_predicate_holds() {
        let mut script = StatusScript(VecDeque::from(vec![
            Ok([0, 0, 4, 0]),
            Ok([0, 0, 1, 0]),
            Ok(IDLE_STATUS),
        ]));

        let status = poll_until(&mut script, Duration::from_millis(10), |s| *s == IDLE_STATUS)
            .unwrap();
        assert_eq!(status, IDLE_STATUS);
        assert!(script.0.is_empty());
    }

    #[test]
    fn transport_timeout_ends_polling() {
        let mut script = StatusScript(VecDeque::from(vec![Ok(IDLE_STATUS)]));

        let err = poll_until(&mut script, Duration::from_millis(10), |s| *s != IDLE_STATUS)
            .unwrap_err();
        assert!(matches!(err, NetMdError::Transport(_)));
    }
}
