// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use npi_protocol::{subsystem, Error, MsgType};

use super::*;
use crate::transport::DriverEvent;

type Tl = TransportLayer<UartTransport<FakeUart>, FakeLines, CountingPower>;
type Log = Vec<(Vec<u8>, Option<usize>)>;

fn uart_tl(config: LinkConfig) -> Tl {
    TransportLayer::new(
        config,
        UartTransport::new(FakeUart::default()),
        FakeLines::default(),
        CountingPower::default(),
    )
}

fn holds(tl: &Tl) -> i32 {
    tl.power().policy().holds
}

fn edge(tl: &mut Tl, log: &mut Log) -> bool {
    tl.remote_ready_edge(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)))
}

fn driver(tl: &mut Tl, ev: DriverEvent<'_>, log: &mut Log) {
    tl.driver_event(ev, &mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
}

#[test]
fn write_is_refused_while_busy() {
    let mut tl = uart_tl(config(false));
    tl.open();
    assert_eq!(tl.write(&[0; 4]), Ok(()));
    assert!(tl.check_busy());
    assert_eq!(tl.write(&[0; 4]), Err(Error::Busy));

    let mut log = Log::new();
    driver(&mut tl, DriverEvent::WriteDone(6), &mut log);
    assert_eq!(log, vec![(vec![], Some(6))]);
    assert!(!tl.check_busy());

    assert_eq!(tl.write(&[0; NPI_TL_BUF_SIZE + 1]), Err(Error::Oversize));
    assert_eq!(tl.tx_pkt_count(), 1);
}

#[test]
fn failed_write_completion_frees_the_link() {
    let mut tl = uart_tl(config(false));
    tl.open();
    tl.write(&[0; 4]).unwrap();

    let mut log = Log::new();
    driver(&mut tl, DriverEvent::WriteDone(0), &mut log);
    assert_eq!(log, vec![(vec![], Some(0))]);
    assert!(!tl.check_busy());
    assert!(!tl.is_tx_active());
    assert_eq!(tl.write(&[0; 4]), Ok(()));
    assert_eq!(tl.transport().port().writes.len(), 2);
}

#[test]
fn received_frame_does_not_end_a_write() {
    let frame = npi(MsgType::Async, subsystem::SYS, 0x05, &[9]);
    let mut tl = uart_tl(config(false));
    tl.open();
    tl.write(&[0; 4]).unwrap();

    let mut log = Log::new();
    driver(&mut tl, DriverEvent::ReadDone(&wire(&frame)), &mut log);
    assert_eq!(log, vec![(body(&frame), None)]);
    assert!(tl.check_busy());
}

#[test]
fn port_failure_is_busy_and_recoverable() {
    let mut tl = uart_tl(config(false));
    tl.open();
    tl.transport_mut().port_mut().refuse_write = true;
    assert_eq!(tl.write(&[0; 4]), Err(Error::Busy));
    assert!(!tl.check_busy());
    tl.transport_mut().port_mut().refuse_write = false;
    assert_eq!(tl.write(&[0; 4]), Ok(()));
}

#[test]
fn edges_are_ignored_without_power_saving() {
    let mut tl = uart_tl(config(false));
    tl.open();
    tl.lines_mut().remote = true;
    let mut log = Log::new();
    assert!(!edge(&mut tl, &mut log));
    assert_eq!(holds(&tl), 0);
}

#[test]
fn power_saving_write_transaction() {
    let mut tl = uart_tl(config(true));
    tl.open();
    assert!(!tl.check_busy());
    assert_eq!(holds(&tl), 0);

    tl.write(&[1, 2, 3, 4]).unwrap();
    assert!(tl.lines().local);
    assert!(tl.check_busy());
    assert_eq!(holds(&tl), 1);
    assert!(tl.transport().port().writes.is_empty());

    let mut log = Log::new();
    tl.lines_mut().remote = true;
    assert!(edge(&mut tl, &mut log));
    tl.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(tl.transport().port().writes.len(), 1);

    driver(&mut tl, DriverEvent::WriteDone(6), &mut log);
    assert!(log.is_empty());

    tl.lines_mut().remote = false;
    assert!(edge(&mut tl, &mut log));
    assert_eq!(tl.transport().port().cancels, 1);
    driver(&mut tl, DriverEvent::ReadDone(&[]), &mut log);

    assert_eq!(log, vec![(vec![], Some(6))]);
    assert_eq!(holds(&tl), 0);
    assert!(!tl.lines().local);
    assert!(!tl.check_busy());
    assert!(!tl.is_tx_active());
}

#[test]
fn power_saving_read_transaction() {
    let frame = npi(MsgType::Async, subsystem::SYS, 0x05, &[9, 9]);
    let mut tl = uart_tl(config(true));
    tl.open();

    let mut log = Log::new();
    tl.lines_mut().remote = true;
    edge(&mut tl, &mut log);
    assert_eq!(holds(&tl), 1);
    tl.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert!(tl.lines().local);

    driver(&mut tl, DriverEvent::ReadDone(&wire(&frame)), &mut log);
    assert_eq!(log, vec![(body(&frame), None)]);
    assert_eq!(holds(&tl), 0);
    assert!(!tl.lines().local);
}

#[test]
fn missed_edge_is_resynchronised() {
    let mut tl = uart_tl(config(true));
    tl.open();
    let mut log = Log::new();

    tl.lines_mut().remote = true;
    edge(&mut tl, &mut log);
    // Release and re-assert collapsed into one interrupt.
    assert!(edge(&mut tl, &mut log));
    assert_eq!(holds(&tl), 1);
    assert!(tl.power().is_held());
}

#[test]
fn short_assertion_releases_power() {
    let mut tl = uart_tl(config(true));
    tl.open();
    let mut log = Log::new();

    tl.lines_mut().remote = true;
    edge(&mut tl, &mut log);
    assert_eq!(holds(&tl), 1);
    tl.lines_mut().remote = false;
    edge(&mut tl, &mut log);
    assert_eq!(holds(&tl), 0);
    assert!(log.is_empty());
}

#[test]
fn stamped_assertion_starts_write_after_release() {
    let mut tl = uart_tl(config(true));
    tl.open();
    let mut log = Log::new();

    tl.write(&[1, 2, 3, 4]).unwrap();
    tl.lines_mut().remote = true;
    edge(&mut tl, &mut log);
    // The line is already gone by the time the task runs.
    tl.lines_mut().remote = false;
    tl.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(tl.transport().port().writes.len(), 1);
}

#[test]
fn open_with_remote_already_asserted() {
    let mut tl = uart_tl(config(true));
    tl.lines_mut().remote = true;
    tl.open();
    assert_eq!(holds(&tl), 1);
    assert!(tl.lines().local);
    assert_eq!(tl.transport().port().reads, 1);

    tl.close();
    assert_eq!(holds(&tl), 0);
    assert!(!tl.lines().local);
}

#[test]
fn master_is_busy_while_remote_asserted() {
    let mut tl = uart_tl(LinkConfig {
        power_saving: true,
        role: Role::Master,
    });
    tl.open();
    assert!(!tl.check_busy());
    tl.lines_mut().remote = true;
    assert!(tl.check_busy());
    assert_eq!(tl.write(&[0; 4]), Err(Error::Busy));
}
