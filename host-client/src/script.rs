// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame scripts.
//!
//! ```toml
//! [[frame]]
//! subsystem = 1
//! cmd = 0x02
//! type = "sync-req"
//! payload = "0102"
//! delay_ms = 20
//! ```

use std::path::Path;
use std::time::Duration;

use npi_protocol::NpiFrame;

use crate::args::{self, FrameType};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Script {
    #[serde(rename = "frame", default)]
    pub frames: Vec<ScriptFrame>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScriptFrame {
    pub subsystem: u8,
    pub cmd: u8,
    #[serde(rename = "type", default)]
    pub kind: FrameType,
    #[serde(default)]
    pub payload: String,
    /// Pause after this frame was sent (and answered).
    pub delay_ms: Option<u64>,
}

impl ScriptFrame {
    pub fn frame(&self) -> Result<NpiFrame, args::Error> {
        args::frame(self.kind.into(), self.subsystem, self.cmd, &self.payload)
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, args::ConfigError> {
        let script = std::fs::read_to_string(path)?;
        Self::parse(&script)
    }

    pub fn parse(script: &str) -> Result<Self, args::ConfigError> {
        toml::from_str(script).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npi_protocol::MsgType;

    #[test]
    fn frames_keep_their_order() {
        let script = Script::parse(
            r#"
            [[frame]]
            subsystem = 1
            cmd = 2
            type = "sync-req"
            payload = "0102"

            [[frame]]
            subsystem = 9
            cmd = 0x10
            delay_ms = 5
            "#,
        )
        .unwrap();
        assert_eq!(script.frames.len(), 2);

        let first = script.frames[0].frame().unwrap();
        assert_eq!(first.msg_type(), Ok(MsgType::SyncReq));
        assert_eq!(first.payload[..], [1, 2]);
        assert_eq!(script.frames[0].delay(), None);

        let second = script.frames[1].frame().unwrap();
        assert_eq!(second.msg_type(), Ok(MsgType::Async));
        assert_eq!(second.subsystem(), 9);
        assert_eq!(second.cmd1, 0x10);
        assert_eq!(script.frames[1].delay(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn empty_script_has_no_frames() {
        assert!(Script::parse("").unwrap().frames.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Script::parse("[[frame]]\nsubsystem = 1\ncmd = 1\ntype = \"poll\"\n");
        assert!(err.is_err());
    }
}
