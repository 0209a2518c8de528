use std::net::UdpSocket;
use std::sync::OnceLock;

/// Version stamped into diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Best-effort outbound IPv4 address of this host, `127.0.0.1` when unknown.
///
/// Connecting a UDP socket sends no packets; it only asks the OS which local
/// address would route to the target. The lookup runs once per process.
pub fn local_ip() -> String {
    static LOCAL_IP: OnceLock<String> = OnceLock::new();
    LOCAL_IP
        .get_or_init(|| {
            UdpSocket::bind("0.0.0.0:0")
                .and_then(|socket| {
                    socket.connect("8.8.8.8:80")?;
                    socket.local_addr()
                })
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|_| "127.0.0.1".to_string())
        })
        .clone()
}
