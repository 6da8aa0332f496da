use std::net::Ipv4Addr;
use std::time::Duration;

use netdisco_rs::ports::service_name;
use netdisco_rs::scanner::PortScanner;
use netdisco_rs::types::PortStatus;
use tokio::net::TcpListener;

#[tokio::test]
async fn loopback_listener_is_open_and_dropped_port_closed() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let open = listener.local_addr().unwrap().port();

    let closed = {
        let gone = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        gone.local_addr().unwrap().port()
    };

    let scanner = PortScanner::new(Duration::from_secs(2), 8);
    let entries = scanner.scan_ports(Ipv4Addr::LOCALHOST, &[open, closed]).await;
    assert_eq!(entries.len(), 2);

    let status_of = |port: u16| entries.iter().find(|e| e.port == port).map(|e| e.status);
    assert_eq!(status_of(open), Some(PortStatus::Open));
    assert_eq!(status_of(closed), Some(PortStatus::Closed));
    drop(listener);
}

#[test]
fn well_known_services() {
    assert_eq!(service_name(22), Some("SSH"));
    assert_eq!(service_name(3389), Some("RDP"));
    assert_eq!(service_name(161), None);
    assert_eq!(service_name(49151), None);
}
