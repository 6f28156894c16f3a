use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use modemipc_frame::FrameError;
use modemipc_transport::Interest;
use tracing::{debug, info, warn};

use crate::channel::{Channel, StreamChannel};
use crate::config::TransportConfig;
use crate::error::{MuxError, Result};
use crate::transport::{Drained, Transport};

/// A [`Transport`] bound to the channel it drives.
///
/// Either let [`turn`](Self::turn) / [`run_until`](Self::run_until) run the
/// loop, or feed readiness from a foreign event loop through
/// [`on_writable`](Self::on_writable) and [`on_readable`](Self::on_readable).
pub struct Device<C: Channel> {
    transport: Transport,
    channel: C,
}

impl Device<StreamChannel> {
    /// Open a modem device node or socket path with the given config.
    pub fn open(path: impl AsRef<std::path::Path>, config: TransportConfig) -> Result<Self> {
        let path = path.as_ref();
        let channel = StreamChannel::open(path)?;
        info!(
            path = %path.display(),
            transport = channel.transport_name(),
            "baseband channel open"
        );
        Ok(Self::new(channel, config))
    }
}

impl<C: Channel> Device<C> {
    pub fn new(channel: C, config: TransportConfig) -> Self {
        Self {
            transport: Transport::new(config),
            channel,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send one queued request.
    pub fn on_writable(&mut self) -> Result<Drained> {
        self.transport.drain_one(&mut self.channel)
    }

    /// Receive and dispatch at most one message.
    ///
    /// Undecodable input is logged and skipped. Returns whether a message
    /// was dispatched.
    pub fn on_readable(&mut self) -> Result<bool> {
        match self.channel.receive() {
            Ok(Some(message)) => {
                debug!(message = %message, "received");
                self.transport.dispatch(message);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(MuxError::Frame(
                err @ (FrameError::InvalidLength { .. } | FrameError::PayloadTooLarge { .. }),
            )) => {
                warn!(error = %err, "dropping undecodable message");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// One loop iteration.
    ///
    /// Expires overdue requests, then waits up to `timeout` (shortened to
    /// the next request deadline) for the channel. Writable interest is only
    /// registered while requests are queued.
    ///
    /// Returns the outcome of the write attempted in this turn, if any, so a
    /// request the channel rejected can be told apart from one that was sent.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<Option<Drained>> {
        let now = Instant::now();
        self.transport.expire(now);

        if self.channel.has_buffered_input() {
            self.on_readable()?;
            return Ok(None);
        }

        let wants_write = self.transport.wants_write();
        let interest = if wants_write {
            Interest::BOTH
        } else {
            Interest::READABLE
        };
        let until_deadline = self
            .transport
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now));
        let wait = match (timeout, until_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let ready = self.channel.wait_ready(interest, wait)?;
        let drained = if ready.writable && wants_write {
            Some(self.on_writable()?)
        } else {
            None
        };
        if ready.readable || ready.closed {
            // A hangup still gets one read so buffered bytes and EOF surface.
            self.on_readable()?;
        }
        Ok(drained)
    }

    /// Run the loop until `done` holds or `deadline` passes.
    ///
    /// Returns `Ok(true)` when `done` was satisfied.
    pub fn run_until<F>(&mut self, mut done: F, deadline: Option<Instant>) -> Result<bool>
    where
        F: FnMut(&Transport) -> bool,
    {
        loop {
            if done(&self.transport) {
                return Ok(true);
            }
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.turn(timeout)?;
        }
    }

    /// Run until every queued request has been sent and answered or expired.
    pub fn settle(&mut self, deadline: Option<Instant>) -> Result<bool> {
        self.run_until(|t| t.queued_len() == 0 && t.pending_len() == 0, deadline)
    }
}

impl<C: Channel> Drop for Device<C> {
    fn drop(&mut self) {
        let queued = self.transport.queued_len();
        let pending = self.transport.pending_len();
        if queued > 0 || pending > 0 {
            warn!(queued, pending, "closing channel with requests outstanding");
        } else {
            debug!("closing channel");
        }
    }
}

impl<C: Channel + AsRawFd> AsRawFd for Device<C> {
    fn as_raw_fd(&self) -> RawFd {
        self.channel.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytes::Bytes;
    use modemipc_frame::{Header, Message, MessageType};

    use super::*;
    use crate::channel::mock::MockChannel;

    #[test]
    fn turn_sends_then_dispatches() {
        let mut device = Device::new(MockChannel::default(), TransportConfig::default());
        let got = Rc::new(RefCell::new(Vec::new()));

        let got_in_cb = got.clone();
        let seq = device
            .transport_mut()
            .request(0x0A01, MessageType::Get, Bytes::new(), move |_, resp| {
                got_in_cb.borrow_mut().push(resp.unwrap().payload.to_vec());
            })
            .unwrap();

        device.turn(Some(Duration::ZERO)).unwrap();
        assert_eq!(device.channel().sent.len(), 1);
        assert_eq!(device.transport().pending_len(), 1);

        device.channel.push_inbound(Message::new(
            Header::response(1, seq.get(), 0x0A01),
            &b"up"[..],
        ));
        device.turn(Some(Duration::ZERO)).unwrap();
        assert_eq!(*got.borrow(), vec![b"up".to_vec()]);
    }

    #[test]
    fn turn_reports_a_rejected_write() {
        let mut device = Device::new(
            MockChannel {
                fail_sends: 1,
                ..MockChannel::default()
            },
            TransportConfig::default(),
        );
        let lost = device
            .transport_mut()
            .post(0x0A01, MessageType::Exec, &b"x"[..])
            .unwrap();
        let sent = device
            .transport_mut()
            .post(0x0A02, MessageType::Exec, &b"y"[..])
            .unwrap();

        assert_eq!(
            device.turn(Some(Duration::ZERO)).unwrap(),
            Some(Drained::Lost(lost))
        );
        assert_eq!(
            device.turn(Some(Duration::ZERO)).unwrap(),
            Some(Drained::Sent(sent))
        );
        assert_eq!(device.turn(Some(Duration::ZERO)).unwrap(), None);
        assert_eq!(device.channel().sent.len(), 1);
        assert_eq!(device.channel().sent[0].command, 0x0A02);
    }

    #[test]
    fn decode_errors_do_not_stop_the_loop() {
        let mut device = Device::new(MockChannel::default(), TransportConfig::default());
        let count = Rc::new(RefCell::new(0));

        let count_in_cb = count.clone();
        device
            .transport_mut()
            .subscribe_notification(0x0801, move |_, _| *count_in_cb.borrow_mut() += 1)
            .unwrap();

        device
            .channel
            .inbound
            .push_back(Err(MuxError::Frame(FrameError::InvalidLength { length: 3, min: 7 })));
        device.channel.push_inbound(Message::new(
            Header::unsolicited(1, 0x0801, MessageType::Notification),
            &b""[..],
        ));

        assert!(!device.on_readable().unwrap());
        assert!(device.on_readable().unwrap());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn closed_channel_ends_the_loop() {
        let mut device = Device::new(
            MockChannel {
                closed: true,
                ..MockChannel::default()
            },
            TransportConfig::default(),
        );
        let err = device.run_until(|_| false, None).unwrap_err();
        assert!(matches!(err, MuxError::Closed));
    }

    #[test]
    fn run_until_gives_up_at_deadline() {
        let mut device = Device::new(MockChannel::default(), TransportConfig::default());
        device
            .transport_mut()
            .request(0x0A01, MessageType::Get, Bytes::new(), |_, _| {})
            .unwrap();

        let settled = device
            .settle(Some(Instant::now() + Duration::from_millis(20)))
            .unwrap();
        assert!(!settled);
        assert_eq!(device.transport().pending_len(), 1);
    }

    #[test]
    fn expired_requests_settle_the_loop() {
        let config = TransportConfig::default().with_response_timeout(Some(Duration::ZERO));
        let mut device = Device::new(MockChannel::default(), config);
        let timed_out = Rc::new(RefCell::new(false));

        let flag = timed_out.clone();
        device
            .transport_mut()
            .request(0x0A01, MessageType::Get, Bytes::new(), move |_, resp| {
                *flag.borrow_mut() = resp.is_err();
            })
            .unwrap();

        assert!(device
            .settle(Some(Instant::now() + Duration::from_secs(5)))
            .unwrap());
        assert!(*timed_out.borrow());
    }
}
