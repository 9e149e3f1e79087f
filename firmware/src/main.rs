// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod driver;
mod service;

use core::sync::atomic::Ordering;

#[cfg(feature = "debug")]
use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::bind_interrupts;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::interrupt::{self, InterruptExt};
use embassy_nrf::peripherals;
use npi_protocol::subsystem;
use npi_transport::{LinkConfig, NpiCollector, NpiLink, NpiTask, Role, TransportLayer};
use static_cell::StaticCell;

use driver::{CountedPower, Lines, Link, MRDY_ASSERTED};
use service::{StackStandIn, SysService, TxCounter};

#[cfg(feature = "npi-uart")]
bind_interrupts!(struct Irqs {
    UARTE0_UART0 => embassy_nrf::uarte::InterruptHandler<peripherals::UARTE0>;
});

#[cfg(feature = "npi-spi")]
bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_SPI0 => embassy_nrf::spis::InterruptHandler<peripherals::SPI0>;
});

#[cfg(not(feature = "debug"))]
mod dummy_logging {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}

        unsafe fn flush() {}

        unsafe fn release() {}

        unsafe fn write(_bytes: &[u8]) {}
    }
}

static LINK: StaticCell<Link> = StaticCell::new();

#[embassy_executor::task]
async fn npi_task(link: &'static Link) -> ! {
    let mut stack = StackStandIn::new(link);
    let mut sys = SysService::new(link);
    let mut tx_counter = TxCounter::default();

    let mut task = NpiTask::new(link, NpiCollector::new(), &mut stack);
    unwrap!(task.register_subsystem(subsystem::SYS, &mut sys));
    task.set_transaction_listener(&mut tx_counter);
    info!("NPI task running");
    task.run().await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut conf = embassy_nrf::config::Config::default();
    conf.hfclk_source = embassy_nrf::config::HfclkSource::ExternalXtal;
    conf.lfclk_source = embassy_nrf::config::LfclkSource::ExternalXtal;

    conf.gpiote_interrupt_priority = interrupt::Priority::P2;
    conf.time_interrupt_priority = interrupt::Priority::P2;

    let p = embassy_nrf::init(conf);

    // SRDY and MRDY are active low, SRDY idles de-asserted
    let srdy = Output::new(p.P0_20, Level::High, OutputDrive::Standard);
    let mrdy = Input::new(p.P0_11, Pull::Up);
    MRDY_ASSERTED.store(mrdy.is_low(), Ordering::Relaxed);

    let config = LinkConfig {
        power_saving: cfg!(feature = "power-saving"),
        role: Role::Slave,
    };

    #[cfg(feature = "npi-uart")]
    let (transport, uart_rx, uart_tx) = {
        let mut config_uart = embassy_nrf::uarte::Config::default();
        config_uart.parity = embassy_nrf::uarte::Parity::EXCLUDED;
        // NPI_UART_BAUDRATE
        config_uart.baudrate = embassy_nrf::uarte::Baudrate::BAUD115200;

        let uart = embassy_nrf::uarte::Uarte::new(p.UARTE0, Irqs, p.P0_16, p.P0_18, config_uart);
        interrupt::UARTE0_UART0.set_priority(interrupt::Priority::P3);
        let (tx, rx) = uart.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);
        let transport = npi_transport::UartTransport::with_max_transfer(
            driver::SignalUart,
            consts::NPI_UART_MAX_TRANSFER,
        );
        (transport, rx, tx)
    };

    #[cfg(feature = "npi-spi")]
    let (transport, spis) = {
        let mut config_spi = embassy_nrf::spis::Config::default();
        // Clocked out when the master reads past our frame
        config_spi.orc = 0x00;
        let spis = embassy_nrf::spis::Spis::new(p.SPI0, Irqs, p.P0_18, p.P0_16, p.P0_14, p.P0_12, config_spi);
        interrupt::SPIM0_SPIS0_SPI0.set_priority(interrupt::Priority::P3);
        (npi_transport::SpiTransport::new(driver::SignalSpi), spis)
    };

    let link: &'static Link = LINK.init(NpiLink::new(TransportLayer::new(
        config,
        transport,
        Lines::new(srdy),
        CountedPower,
    )));

    #[cfg(feature = "npi-uart")]
    {
        unwrap!(spawner.spawn(driver::uart_rx_task(uart_rx, link)));
        unwrap!(spawner.spawn(driver::uart_tx_task(uart_tx, link)));
    }
    #[cfg(feature = "npi-spi")]
    unwrap!(spawner.spawn(driver::spi_task(spis, link)));

    if config.power_saving {
        unwrap!(spawner.spawn(driver::mrdy_task(mrdy, link)));
    }

    link.open();
    unwrap!(spawner.spawn(npi_task(link)));
    info!("Init tasks");
}
