use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Ports UDP standards du magic packet
pub const DEFAULT_WOL_PORTS: [u16; 2] = [9, 7];

#[derive(Debug, thiserror::Error)]
pub enum WolError {
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("magic packet could not be sent to {0}")]
    SendFailed(Ipv4Addr),
}

/// Accepte aa:bb:cc:dd:ee:ff, aa-bb-..., ou 12 hex contigus
pub fn parse_mac(mac: &str) -> Result<[u8; 6], WolError> {
    let hex: String = mac.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WolError::InvalidMac(mac.to_string()));
    }
    let mut out = [0u8; 6];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| WolError::InvalidMac(mac.to_string()))?;
    }
    Ok(out)
}

/// 6 x 0xFF puis 16 fois l'adresse MAC
pub fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut pkt = [0xFFu8; 102];
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    pkt
}

/// Émetteur Wake-on-LAN
pub trait Waker: Send + Sync {
    fn wake(&self, mac: &str) -> Result<(), WolError>;
}

/// Envoie le magic packet en UDP broadcast
#[derive(Debug, Clone)]
pub struct UdpWaker {
    pub broadcast: Ipv4Addr,
    pub ports: Vec<u16>,
}

impl Default for UdpWaker {
    fn default() -> Self {
        Self {
            broadcast: Ipv4Addr::BROADCAST,
            ports: DEFAULT_WOL_PORTS.to_vec(),
        }
    }
}

impl Waker for UdpWaker {
    fn wake(&self, mac: &str) -> Result<(), WolError> {
        let pkt = magic_packet(parse_mac(mac)?);

        let sock = UdpSocket::bind(("0.0.0.0", 0))?;
        sock.set_broadcast(true)?;

        // succès si au moins un port passe
        let mut ok = false;
        for port in &self.ports {
            let addr = SocketAddrV4::new(self.broadcast, *port);
            match sock.send_to(&pkt, addr) {
                Ok(_) => ok = true,
                Err(e) => tracing::warn!(%addr, error = %e, "WOL send error"),
            }
        }

        if ok {
            tracing::info!(mac, broadcast = %self.broadcast, "magic packet sent");
            Ok(())
        } else {
            Err(WolError::SendFailed(self.broadcast))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac_formats() {
        let expected = [0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03];
        assert_eq!(parse_mac("aa:bb:cc:01:02:03").unwrap(), expected);
        assert_eq!(parse_mac("AA-BB-CC-01-02-03").unwrap(), expected);
        assert_eq!(parse_mac("aabbcc010203").unwrap(), expected);
    }

    #[test]
    fn test_parse_mac_rejects_garbage() {
        assert!(parse_mac("aa:bb:cc:01:02").is_err());
        assert!(parse_mac("zz:bb:cc:01:02:03").is_err());
        assert!(parse_mac("aa:bb:cc:01:02:03:04").is_err());
        assert!(parse_mac("").is_err());
    }

    #[test]
    fn test_magic_packet_layout() {
        let mac = [1, 2, 3, 4, 5, 6];
        let pkt = magic_packet(mac);
        assert_eq!(&pkt[..6], &[0xFF; 6]);
        for i in 0..16 {
            assert_eq!(&pkt[6 + i * 6..12 + i * 6], &mac);
        }
    }

    #[test]
    fn test_wake_to_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        let waker = UdpWaker { broadcast: Ipv4Addr::LOCALHOST, ports: vec![port] };

        waker.wake("aa:bb:cc:dd:ee:ff").unwrap();

        let mut buf = [0u8; 128];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(n, 102);
        assert_eq!(&buf[6..12], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }
}
