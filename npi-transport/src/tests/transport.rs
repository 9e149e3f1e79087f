// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{NPI_SOF, NPI_TL_BUF_SIZE};
use npi_protocol::{fcs, spi, subsystem, MsgType};

use super::*;
use crate::transport::{DriverEvent, Transport};

type Log = Vec<(Vec<u8>, Option<usize>)>;

fn event<T: Transport>(t: &mut T, ev: DriverEvent<'_>, log: &mut Log) {
    t.driver_event(ev, &mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
}

#[test]
fn uart_write_is_fragmented_and_completes_once() {
    let mut t = UartTransport::with_max_transfer(FakeUart::default(), 8);
    t.open(false);
    assert_eq!(t.port().reads, 1);

    let payload: Vec<u8> = (0..20).collect();
    assert_eq!(t.write(&payload), 22);
    assert_eq!(t.port().writes.len(), 1);
    assert_eq!(t.port().writes[0].len(), 8);

    let mut log = Log::new();
    event(&mut t, DriverEvent::WriteDone(8), &mut log);
    event(&mut t, DriverEvent::WriteDone(8), &mut log);
    assert!(log.is_empty());
    assert_eq!(t.port().writes[2].len(), 6);
    event(&mut t, DriverEvent::WriteDone(6), &mut log);
    assert_eq!(log, vec![(vec![], Some(22))]);

    let sent = t.port().writes.concat();
    assert_eq!(sent[0], NPI_SOF);
    assert_eq!(sent[1..21], payload[..]);
    assert_eq!(sent[21], fcs::xor(&payload));
}

#[test]
fn uart_second_write_waits_for_the_first() {
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);
    assert_eq!(t.write(&[1, 2, 3, 4]), 6);
    assert_eq!(t.write(&[5, 6, 7, 8]), 0);
    let mut log = Log::new();
    event(&mut t, DriverEvent::WriteDone(6), &mut log);
    assert_eq!(t.write(&[5, 6, 7, 8]), 6);
}

#[test]
fn uart_failed_write_still_completes() {
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);
    assert_eq!(t.write(&[1, 2, 3, 4]), 6);

    let mut log = Log::new();
    event(&mut t, DriverEvent::WriteDone(0), &mut log);
    assert_eq!(log, vec![(vec![], Some(0))]);
    assert_eq!(t.write(&[5, 6, 7, 8]), 6);
}

#[test]
fn uart_short_write_sends_the_rest() {
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);
    assert_eq!(t.write(&[1, 2, 3, 4]), 6);

    let mut log = Log::new();
    event(&mut t, DriverEvent::WriteDone(4), &mut log);
    assert!(log.is_empty());
    assert_eq!(t.port().writes.len(), 2);
    assert_eq!(t.port().writes[1], t.port().writes[0][4..]);

    // The driver gives up on the remainder.
    event(&mut t, DriverEvent::WriteDone(0), &mut log);
    assert_eq!(log, vec![(vec![], Some(4))]);
    assert_eq!(t.write(&[5, 6, 7, 8]), 6);
}

#[test]
fn uart_frame_split_across_reads() {
    let frame = npi(MsgType::Async, subsystem::SYS, 0x02, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    let bytes = wire(&frame);
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);

    let mut log = Log::new();
    event(&mut t, DriverEvent::ReadDone(&bytes[..3]), &mut log);
    event(&mut t, DriverEvent::ReadDone(&bytes[3..9]), &mut log);
    assert!(log.is_empty());
    event(&mut t, DriverEvent::ReadDone(&bytes[9..]), &mut log);
    assert_eq!(log, vec![(body(&frame), None)]);
    // Re-armed after every completion.
    assert_eq!(t.port().reads, 4);
}

#[test]
fn uart_bad_checksum_is_a_zero_length_completion() {
    let frame = npi(MsgType::Async, subsystem::SYS, 0x02, &[0xAA; 4]);
    let mut bytes = wire(&frame);
    *bytes.last_mut().unwrap() ^= 0xFF;
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);

    let mut log = Log::new();
    event(&mut t, DriverEvent::ReadDone(&bytes), &mut log);
    assert_eq!(log, vec![(vec![], None)]);
}

#[test]
fn uart_write_start_failure_does_not_block() {
    let mut t = UartTransport::new(FakeUart::default());
    t.open(false);
    t.port_mut().refuse_write = true;
    assert_eq!(t.write(&[1, 2, 3, 4]), 0);
    t.port_mut().refuse_write = false;
    assert_eq!(t.write(&[1, 2, 3, 4]), 6);
}

#[test]
fn uart_power_saving_write_waits_for_remote_ready() {
    let mut t = UartTransport::new(FakeUart::default());
    t.open(true);
    assert_eq!(t.port().reads, 0);

    assert_eq!(t.write(&[1, 2, 3, 4]), 6);
    assert!(t.port().writes.is_empty());
    assert_eq!(t.port().reads, 1);

    let mut log = Log::new();
    t.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(t.port().writes.len(), 1);

    // The read half is still open.
    event(&mut t, DriverEvent::WriteDone(6), &mut log);
    assert!(log.is_empty());

    t.stop_transfer(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(t.port().cancels, 1);
    event(&mut t, DriverEvent::ReadDone(&[]), &mut log);
    assert_eq!(log, vec![(vec![], Some(6))]);
}

#[test]
fn uart_power_saving_read_ends_on_first_frame() {
    let frame = npi(MsgType::SyncReq, subsystem::SYS, 0x01, &[]);
    let mut t = UartTransport::new(FakeUart::default());
    t.open(true);

    let mut log = Log::new();
    t.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(t.port().reads, 1);
    event(&mut t, DriverEvent::ReadDone(&wire(&frame)), &mut log);
    assert_eq!(log, vec![(body(&frame), None)]);
    assert_eq!(t.port().reads, 1);
}

#[test]
fn spi_write_replaces_armed_read() {
    let mut t = SpiTransport::new(FakeSpi::default());
    t.open(false);
    assert_eq!(t.port().transfers.len(), 1);
    assert!(t.port().transfers[0].iter().all(|&b| b == 0));

    assert_eq!(t.write(&[0x11, 0x22]), 6);
    assert_eq!(t.port().cancels, 1);
    let tx = &t.port().transfers[1];
    assert_eq!(tx.len(), NPI_TL_BUF_SIZE);
    assert_eq!(tx[..6], [0x00, NPI_SOF, 0x02, 0x11, 0x22, 0x02 ^ 0x11 ^ 0x22]);
    assert!(tx[6..].iter().all(|&b| b == 0));
}

#[test]
fn spi_transfer_done_reports_both_directions() {
    let mut t = SpiTransport::new(FakeSpi::default());
    t.open(false);
    assert_eq!(t.write(&[0x11, 0x22]), 6);

    let mut rx = [0u8; NPI_TL_BUF_SIZE];
    spi::encode(&[7, 8, 9], &mut rx).unwrap();
    let mut log = Log::new();
    event(&mut t, DriverEvent::TransferDone(&rx), &mut log);
    assert_eq!(log, vec![(vec![7, 8, 9], Some(6))]);

    // A fresh read is armed.
    assert_eq!(t.port().transfers.len(), 3);
    event(&mut t, DriverEvent::TransferDone(&[0; NPI_TL_BUF_SIZE]), &mut log);
    assert_eq!(log[1], (vec![], None));
}

#[test]
fn spi_start_failure_resets_length() {
    let mut t = SpiTransport::new(FakeSpi::default());
    t.open(true);
    t.port_mut().refuse = true;
    assert_eq!(t.write(&[1]), 0);
    t.port_mut().refuse = false;
    assert_eq!(t.write(&[1]), 5);
}

#[test]
fn spi_unclocked_read_is_cancelled() {
    let mut t = SpiTransport::new(FakeSpi::default());
    t.open(true);
    assert!(t.port().transfers.is_empty());

    let mut log = Log::new();
    t.handle_remote_ready(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(t.port().transfers.len(), 1);
    t.stop_transfer(&mut |rx: &[u8], tx: Option<usize>| log.push((rx.to_vec(), tx)));
    assert_eq!(t.port().cancels, 1);
    assert_eq!(log, vec![(vec![], None)]);
}

#[test]
fn spi_oversized_body_is_refused() {
    let mut t = SpiTransport::new(FakeSpi::default());
    t.open(true);
    assert_eq!(t.max_body(), 255);
    assert_eq!(t.write(&[0; 256]), 0);
    assert!(t.port().transfers.is_empty());
}
