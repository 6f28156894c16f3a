use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use modemipc_mux::{Device, MuxError, Notification, Transport, TransportConfig};

use crate::cmd::{running_flag, ListenArgs};
use crate::exit::{mux_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_notification, OutputFormat};

// How often the loop wakes to check for ctrl-c.
const TICK: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.notify.is_empty() && args.indicate.is_empty() {
        return Err(CliError::new(
            USAGE,
            "nothing to listen for: pass --notify and/or --indicate",
        ));
    }

    let mut device = Device::open(&args.path, TransportConfig::default())
        .map_err(|err| mux_error("open failed", err))?;

    let running = running_flag()?;

    let printed = Rc::new(Cell::new(0usize));
    let transport = device.transport_mut();
    for &command in &args.notify {
        transport
            .subscribe_notification(command, printer(printed.clone(), format))
            .map_err(|err| mux_error("subscribe failed", err))?;
    }
    for &command in &args.indicate {
        transport
            .subscribe_indication(command, printer(printed.clone(), format))
            .map_err(|err| mux_error("subscribe failed", err))?;
    }

    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed.get() >= count) {
            break;
        }
        match device.turn(Some(TICK)) {
            Ok(_) => {}
            Err(MuxError::Closed) => {
                tracing::info!("modem closed the channel");
                break;
            }
            Err(err) => return Err(mux_error("receive failed", err)),
        }
    }

    Ok(SUCCESS)
}

fn printer(
    printed: Rc<Cell<usize>>,
    format: OutputFormat,
) -> impl FnMut(&mut Transport, &Notification<'_>) + 'static {
    move |_, notification| {
        print_notification(notification, format);
        printed.set(printed.get().saturating_add(1));
    }
}
