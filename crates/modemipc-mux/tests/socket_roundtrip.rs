#![cfg(unix)]

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use modemipc_frame::{Direction, Header, MessageReader, MessageType, MessageWriter};
use modemipc_mux::{Correlation, Device, StreamChannel, TransportConfig};
use modemipc_transport::IpcStream;

const CMD_SIM_STATUS: u16 = 0x0501;
const CMD_NET_REGIST: u16 = 0x0805;
const CMD_PWR_PHONE_STATE: u16 = 0x0102;

/// Reads two requests, answers them in reverse order, the second one
/// without echoing its sequence id, then sends a notification.
fn modem(stream: IpcStream) {
    let write_half = stream.try_clone().unwrap();
    let mut reader = MessageReader::new(stream, Direction::ToModem);
    let mut writer = MessageWriter::new(write_half);

    let first = reader.read_message().unwrap();
    let second = reader.read_message().unwrap();

    writer
        .send(
            &Header::response(1, second.header.mseq, second.command()),
            b"second",
        )
        .unwrap();
    writer
        .send(&Header::response(2, 0, first.command()), b"first")
        .unwrap();
    writer
        .send(
            &Header::unsolicited(3, CMD_PWR_PHONE_STATE, MessageType::Notification),
            b"\x02",
        )
        .unwrap();
}

#[test]
fn out_of_order_replies_and_notification_over_a_socket() {
    let (host, peer) = IpcStream::pair().unwrap();
    let modem = thread::spawn(move || modem(peer));

    let channel = StreamChannel::new(host).unwrap();
    let mut device = Device::new(channel, TransportConfig::default());
    let events = Rc::new(RefCell::new(Vec::new()));

    let notified = events.clone();
    device
        .transport_mut()
        .subscribe_notification(CMD_PWR_PHONE_STATE, move |_, n| {
            notified.borrow_mut().push(format!("noti:{:?}", n.payload));
        })
        .unwrap();
    for command in [CMD_SIM_STATUS, CMD_NET_REGIST] {
        let answered = events.clone();
        device
            .transport_mut()
            .request(command, MessageType::Get, &b""[..], move |_, resp| {
                let resp = resp.unwrap();
                answered.borrow_mut().push(format!(
                    "{:04x}:{}:{}",
                    resp.command,
                    String::from_utf8_lossy(resp.payload),
                    resp.matched_by == Correlation::Command
                ));
            })
            .unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let done = device
        .run_until(|_| events.borrow().len() == 3, Some(deadline))
        .unwrap();
    assert!(done);
    assert_eq!(
        *events.borrow(),
        vec![
            "0805:second:false".to_string(),
            "0501:first:true".to_string(),
            "noti:[2]".to_string(),
        ]
    );
    assert_eq!(device.transport().pending_len(), 0);

    modem.join().unwrap();
}
