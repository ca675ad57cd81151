//! Link-local addressing helpers.

use std::net::Ipv6Addr;

/// Link-local address `fe80::/64` with the interface id derived from `mac64`
/// (universal/local bit flipped).
pub fn link_local_from_mac(mac64: &[u8; 8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xfe;
    octets[1] = 0x80;
    octets[8..].copy_from_slice(mac64);
    octets[8] ^= 0x02;
    Ipv6Addr::from(octets)
}

/// MAC64 recovered from a link-local address' interface id.
pub fn mac_from_link_local(address: &Ipv6Addr) -> [u8; 8] {
    let mut mac = [0u8; 8];
    mac.copy_from_slice(&address.octets()[8..]);
    mac[0] ^= 0x02;
    mac
}

/// Unicast address in `fe80::/10`.
pub fn is_link_local_unicast(address: &Ipv6Addr) -> bool {
    address.segments()[0] & 0xffc0 == 0xfe80
}

/// Multicast address with link-local scope (`ff02::/16` and friends).
pub fn is_link_local_multicast(address: &Ipv6Addr) -> bool {
    let octets = address.octets();
    octets[0] == 0xff && octets[1] & 0x0f == 0x02
}

/// Destination accepted by MLE: link-local unicast or link-local multicast.
pub fn is_link_local_scope(address: &Ipv6Addr) -> bool {
    is_link_local_unicast(address) || is_link_local_multicast(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_local_from_mac() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let address = link_local_from_mac(&mac);
        assert_eq!(address, "fe80::211:2233:4455:6677".parse::<Ipv6Addr>().unwrap());
        assert_eq!(mac_from_link_local(&address), mac);
    }

    #[test]
    fn test_scope_checks() {
        let ll: Ipv6Addr = "fe80::1".parse().unwrap();
        let global: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let all_nodes: Ipv6Addr = "ff02::1".parse().unwrap();
        let site: Ipv6Addr = "ff05::1".parse().unwrap();

        assert!(is_link_local_unicast(&ll));
        assert!(!is_link_local_unicast(&global));
        assert!(is_link_local_scope(&all_nodes));
        assert!(!is_link_local_scope(&site));
        assert!(!is_link_local_scope(&global));
    }
}
