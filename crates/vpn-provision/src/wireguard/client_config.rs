//! Client configuration file rendering.

use std::fmt::Write as _;

/// Server-side values written into every client file.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub public_key: String,
    /// Public `host:port`.
    pub endpoint: String,
    pub dns: String,
    pub keepalive_secs: u16,
}

/// Render a `wg-quick` client file routing all IPv4 traffic through the tunnel.
pub fn render_wireguard_client_config(
    private_key: &str,
    address: &str,
    server: &ServerInfo,
) -> String {
    let mut out = String::with_capacity(256);
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {private_key}");
    let _ = writeln!(out, "Address = {address}/32");
    let _ = writeln!(out, "DNS = {}", server.dns);
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", server.public_key);
    let _ = writeln!(out, "Endpoint = {}", server.endpoint);
    let _ = writeln!(out, "AllowedIPs = 0.0.0.0/0");
    if server.keepalive_secs > 0 {
        let _ = writeln!(out, "PersistentKeepalive = {}", server.keepalive_secs);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_interface_and_peer() {
        let server = ServerInfo {
            public_key: "SERVERKEY=".into(),
            endpoint: "vpn.example.com:51820".into(),
            dns: "8.8.8.8".into(),
            keepalive_secs: 25,
        };
        let cfg = render_wireguard_client_config("CLIENTKEY=", "10.8.0.2", &server);
        assert_eq!(
            cfg,
            "[Interface]\nPrivateKey = CLIENTKEY=\nAddress = 10.8.0.2/32\nDNS = 8.8.8.8\n\n\
             [Peer]\nPublicKey = SERVERKEY=\nEndpoint = vpn.example.com:51820\n\
             AllowedIPs = 0.0.0.0/0\nPersistentKeepalive = 25\n"
        );
    }

    #[test]
    fn test_keepalive_zero_is_omitted() {
        let server = ServerInfo {
            public_key: "S".into(),
            endpoint: "e:1".into(),
            dns: "1.1.1.1".into(),
            keepalive_secs: 0,
        };
        let cfg = render_wireguard_client_config("C", "10.8.0.9", &server);
        assert!(!cfg.contains("PersistentKeepalive"));
    }
}
