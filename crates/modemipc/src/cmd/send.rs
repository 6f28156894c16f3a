use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::time::{Duration, Instant};

use modemipc_mux::{Device, Drained, RequestError, TransportConfig};

use crate::cmd::{parse_duration, parse_hex, SendArgs};
use crate::exit::{mux_error, request_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_response, print_sent, OutputFormat, ResponseRecord};

// Covers the wait for the channel to become writable on top of the
// response deadline.
const SEND_GRACE: Duration = Duration::from_secs(1);

type Outcome = Rc<RefCell<Option<Result<ResponseRecord, RequestError>>>>;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;
    let kind = args.kind.message_type();

    let config = TransportConfig::default().with_response_timeout(Some(timeout));
    let mut device =
        Device::open(&args.path, config).map_err(|err| mux_error("open failed", err))?;
    let deadline = Instant::now() + timeout + SEND_GRACE;

    if args.no_wait {
        let sequence = device
            .transport_mut()
            .post(args.command, kind, payload)
            .map_err(|err| mux_error("enqueue failed", err))?;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CliError::new(
                    TIMEOUT,
                    "send failed: channel never became writable",
                ));
            }
            match device
                .turn(Some(deadline - now))
                .map_err(|err| mux_error("send failed", err))?
            {
                Some(Drained::Sent(sent)) if sent == sequence => break,
                Some(Drained::Lost(lost)) if lost == sequence => {
                    return Err(CliError::new(FAILURE, "send failed: request was not written"));
                }
                _ => {}
            }
        }
        print_sent(sequence.get(), args.command, format);
        return Ok(SUCCESS);
    }

    let outcome: Outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    device
        .transport_mut()
        .request(args.command, kind, payload, move |_, result| {
            *slot.borrow_mut() = Some(result.map(|resp| ResponseRecord::from(&resp)));
        })
        .map_err(|err| mux_error("enqueue failed", err))?;

    // Settled without an outcome means the write was rejected.
    device
        .run_until(
            |t| outcome.borrow().is_some() || (t.queued_len() == 0 && t.pending_len() == 0),
            Some(deadline),
        )
        .map_err(|err| mux_error("send failed", err))?;

    let result = outcome.borrow_mut().take();
    match result {
        Some(Ok(record)) => {
            print_response(&record, format);
            Ok(SUCCESS)
        }
        Some(Err(err)) => Err(request_error("send failed", err)),
        None if device.transport().pending_len() > 0 || device.transport().wants_write() => Err(
            CliError::new(TIMEOUT, format!("send failed: no response within {timeout:?}")),
        ),
        None => Err(CliError::new(FAILURE, "send failed: request was not written")),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cmd::RequestType;

    fn args() -> SendArgs {
        SendArgs {
            path: PathBuf::from("/tmp/modem.sock"),
            command: 0x0A01,
            kind: RequestType::Get,
            data: None,
            hex: None,
            file: None,
            no_wait: false,
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn empty_payload_by_default() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }

    #[test]
    fn hex_and_data_payloads() {
        let hex = SendArgs {
            hex: Some("0a0b".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&hex).unwrap(), vec![0x0A, 0x0B]);

        let data = SendArgs {
            data: Some("AT".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&data).unwrap(), b"AT".to_vec());
    }

    #[test]
    fn missing_payload_file_is_an_error() {
        let file = SendArgs {
            file: Some(PathBuf::from("/nonexistent/modemipc/payload.bin")),
            ..args()
        };
        assert_eq!(resolve_payload(&file).unwrap_err().code, crate::exit::FAILURE);
    }
}
