//! Free port discovery for the audit server.

use super::AuditError;
use std::net::{Ipv4Addr, TcpListener};

/// Ports probed before giving up.
pub const PORT_PROBE_LIMIT: u16 = 100;

/// Find the first port in `start..start + 100` that can be bound on
/// localhost right now.
///
/// The probe listener is dropped before returning, so another process may
/// take the port before the server binds it. The server then fails to
/// start and the liveness check reports it.
pub fn find_available_port(start: u16) -> Result<u16, AuditError> {
    (0..PORT_PROBE_LIMIT)
        .map_while(|offset| start.checked_add(offset))
        .find(|&port| is_available(port))
        .ok_or(AuditError::NoFreePort {
            start,
            count: PORT_PROBE_LIMIT,
        })
}

fn is_available(port: u16) -> bool {
    port != 0 && TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bind a run of consecutive ports, returning the listeners and the
    /// first port. Retries until the OS hands out a usable range.
    fn occupy_run(len: u16) -> (Vec<TcpListener>, u16) {
        for _ in 0..50 {
            let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            let base = probe.local_addr().unwrap().port();
            drop(probe);
            if base.checked_add(len + 1).is_none() {
                continue;
            }

            let listeners: Vec<_> = (0..len)
                .filter_map(|i| TcpListener::bind((Ipv4Addr::LOCALHOST, base + i)).ok())
                .collect();
            if listeners.len() == usize::from(len) {
                return (listeners, base);
            }
        }
        panic!("could not occupy a run of {len} ports");
    }

    #[test]
    fn test_skips_occupied_ports() {
        let (listeners, base) = occupy_run(3);
        let next_free = is_available(base + 3);

        let port = find_available_port(base).unwrap();

        if next_free {
            assert_eq!(port, base + 3);
        } else {
            assert!(port > base + 3);
        }
        assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok());
        drop(listeners);
    }

    #[test]
    fn test_free_start_port_is_returned() {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        assert_eq!(find_available_port(port).unwrap(), port);
    }
}
