/// One client row of the OpenVPN client list, as read from the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSession {
    /// Address assigned inside the tunnel.
    pub virtual_address: String,
    /// Certificate common name; display only.
    pub common_name: String,
    /// Client's public address with the port removed.
    pub real_address: String,
}

impl RawSession {
    pub fn new(virtual_address: &str, common_name: &str, real_address: &str) -> Self {
        Self {
            virtual_address: virtual_address.to_string(),
            common_name: common_name.to_string(),
            real_address: real_address.to_string(),
        }
    }
}
