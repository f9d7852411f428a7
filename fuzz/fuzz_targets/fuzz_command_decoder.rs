//! Fuzz target: `decode_command` / `Report::decode`
//!
//! Drives arbitrary byte sequences into both directions of the codec and
//! asserts that neither panics and that borrowed payloads stay inside the
//! input frame.
//!
//! cargo fuzz run fuzz_command_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use medbox::rpc::codec::{Command, Report, decode_command};

fuzz_target!(|data: &[u8]| {
    match decode_command(data) {
        Ok(Command::WifiCredentials { ssid, password }) => {
            assert!(ssid.len() + password.len() + 3 == data.len());
        }
        Ok(Command::OtaData(chunk)) => {
            assert_eq!(chunk.len() + 1, data.len());
        }
        _ => {}
    }

    // Anything the peer side accepts must survive a re-encode.
    if let Ok(report) = Report::decode(data) {
        assert_eq!(Report::decode(&report.encode()), Ok(report));
    }
});
