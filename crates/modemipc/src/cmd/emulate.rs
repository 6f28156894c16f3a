use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use modemipc_frame::{
    describe, Direction, FrameError, Header, Message, MessageReader, MessageType, MessageWriter,
};
use modemipc_mux::{SequenceAllocator, SequenceId, MIN_SEQUENCE};
use modemipc_transport::{Interest, IpcStream, SocketEndpoint};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, running_flag, EmulateArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};

const TICK: Duration = Duration::from_millis(200);

/// Periodic notification source. Each payload is a one-byte counter.
struct Ticker {
    every: Duration,
    command: u16,
    next_at: Instant,
    count: u8,
}

/// One connected host.
struct Session {
    reader: MessageReader<IpcStream>,
    writer: MessageWriter<IpcStream>,
    mseq: SequenceAllocator,
    echo_sequence: bool,
    ticker: Option<Ticker>,
}

pub fn run(args: EmulateArgs) -> CliResult<i32> {
    let notify_every = args
        .notify_every
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let endpoint =
        SocketEndpoint::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let running = running_flag()?;
    info!(
        path = %endpoint.path().display(),
        echo_sequence = !args.no_echo,
        "modem emulator ready"
    );

    while running.load(Ordering::SeqCst) {
        let stream = endpoint
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let mut session = Session::new(stream, &args, notify_every)?;
        session.serve(&running)?;
        info!("host disconnected");
    }

    Ok(SUCCESS)
}

impl Session {
    fn new(
        stream: IpcStream,
        args: &EmulateArgs,
        notify_every: Option<Duration>,
    ) -> CliResult<Self> {
        let write_half = stream
            .try_clone()
            .map_err(|err| transport_error("session setup failed", err))?;
        Ok(Self {
            reader: MessageReader::new(stream, Direction::ToModem),
            writer: MessageWriter::new(write_half),
            mseq: SequenceAllocator::new(),
            echo_sequence: !args.no_echo,
            ticker: notify_every.map(|every| Ticker {
                every,
                command: args.notify_command,
                next_at: Instant::now() + every,
                count: 0,
            }),
        })
    }

    /// Answer requests until the host hangs up.
    ///
    /// A host that exits with replies still unread shows up as a reset;
    /// that ends the session like a clean close.
    fn serve(&mut self, running: &AtomicBool) -> CliResult<()> {
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if let Err(err) = self.tick(now) {
                return hangup_or(err, "notification failed");
            }

            if !self.reader.has_buffered_message() {
                let wait = self
                    .ticker
                    .as_ref()
                    .map_or(TICK, |t| t.next_at.saturating_duration_since(now).min(TICK));
                let ready = self
                    .reader
                    .get_ref()
                    .wait_ready(Interest::READABLE, Some(wait))
                    .map_err(|err| transport_error("poll failed", err))?;
                if ready.is_idle() {
                    continue;
                }
            }

            match self.receive() {
                Ok(()) => {}
                Err(
                    err @ (FrameError::InvalidLength { .. } | FrameError::PayloadTooLarge { .. }),
                ) => {
                    warn!(error = %err, "dropping undecodable request");
                }
                Err(err) => return hangup_or(err, "receive failed"),
            }
        }
        Ok(())
    }

    /// Read at most one request and answer it.
    fn receive(&mut self) -> modemipc_frame::Result<()> {
        match self.reader.try_read_message()? {
            Some(request) => self.answer(&request),
            None => Ok(()),
        }
    }

    fn answer(&mut self, request: &Message) -> modemipc_frame::Result<()> {
        if !request.kind().is_request() {
            warn!(message = %request, "ignoring non-request message");
            return Ok(());
        }
        let aseq = if self.echo_sequence {
            request.header.mseq
        } else {
            0
        };
        let header = Header::response(self.next_mseq(), aseq, request.command());
        debug!(
            command = %describe(request.command()),
            kind = %request.kind(),
            aseq,
            len = request.payload.len(),
            "answering request"
        );
        self.writer.send(&header, &request.payload)
    }

    fn tick(&mut self, now: Instant) -> modemipc_frame::Result<()> {
        let Some(ticker) = self.ticker.as_mut() else {
            return Ok(());
        };
        if now < ticker.next_at {
            return Ok(());
        }
        ticker.next_at = now + ticker.every;
        ticker.count = ticker.count.wrapping_add(1);
        let (command, count) = (ticker.command, ticker.count);

        let header = Header::unsolicited(self.next_mseq(), command, MessageType::Notification);
        debug!(command = %describe(command), count, "sending notification");
        self.writer.send(&header, &[count])
    }

    fn next_mseq(&mut self) -> u8 {
        self.mseq
            .allocate(|_| false)
            .map_or(MIN_SEQUENCE, SequenceId::get)
    }
}

fn hangup_or(err: FrameError, context: &str) -> CliResult<()> {
    if err.is_disconnect() {
        debug!(error = %err, "host hung up");
        Ok(())
    } else {
        Err(frame_error(context, err))
    }
}
