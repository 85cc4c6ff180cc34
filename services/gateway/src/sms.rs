//! Contract boundary for the external SMS gateway that actually delivers
//! device-provisioning commands (spec §6, §1 Non-goals). Implementing SMS
//! delivery is out of scope; this trait is the seam `POST /dashcam/command/`
//! calls through, mirroring `DeviceCatalog`/`LocationNotifier` in
//! `services/ingest`.

use tracing::info;

pub trait SmsGateway: Send + Sync {
    fn send(&self, imei: &str, command: &str);
}

pub struct LoggingSmsGateway;

impl SmsGateway for LoggingSmsGateway {
    fn send(&self, imei: &str, command: &str) {
        info!(imei, command, "SMS dispatch requested (no gateway wired up)");
    }
}

/// Builds the provisioning command per spec §6: points the device at this
/// server's signaling listener.
pub fn provision_command(server_ip: &str, server_port: u16) -> String {
    format!("<SPBSJ*P:BSJGPS*D:{server_ip},{server_port}>")
}

/// Builds the factory-reset command per spec §6.
pub fn reset_command() -> String {
    "<SPBSJ*P:BSJGPS*Q:0,0>".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_command_embeds_ip_and_port() {
        assert_eq!(provision_command("10.0.0.1", 6665), "<SPBSJ*P:BSJGPS*D:10.0.0.1,6665>");
    }

    #[test]
    fn reset_command_is_fixed() {
        assert_eq!(reset_command(), "<SPBSJ*P:BSJGPS*Q:0,0>");
    }
}
