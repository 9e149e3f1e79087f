// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use npi_protocol::{subsystem, Error, HciPacket, MsgType, NpiFrame};

/// A complete message as it travels through the link queues.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    Npi(NpiFrame),
    Hci(HciPacket),
}

impl Frame {
    /// HCI traffic has no sync sub-protocol and is always asynchronous.
    pub fn msg_type(&self) -> Result<MsgType, Error> {
        match self {
            Self::Npi(frame) => frame.msg_type(),
            Self::Hci(_) => Ok(MsgType::Async),
        }
    }

    pub fn is_sync_request(&self) -> bool {
        matches!(self.msg_type(), Ok(MsgType::SyncReq))
    }

    pub fn subsystem(&self) -> u8 {
        match self {
            Self::Npi(frame) => frame.subsystem(),
            Self::Hci(_) => subsystem::BLE_HCI,
        }
    }

    /// Length handed to the transport layer.
    pub fn body_len(&self) -> usize {
        match self {
            Self::Npi(frame) => frame.body_len(),
            Self::Hci(packet) => packet.encoded_len(),
        }
    }

    pub fn encode_body(&self, out: &mut [u8]) -> Result<usize, Error> {
        match self {
            Self::Npi(frame) => frame.encode_body(out),
            Self::Hci(packet) => packet.encode(out),
        }
    }
}

impl From<NpiFrame> for Frame {
    fn from(frame: NpiFrame) -> Self {
        Self::Npi(frame)
    }
}

impl From<HciPacket> for Frame {
    fn from(packet: HciPacket) -> Self {
        Self::Hci(packet)
    }
}
