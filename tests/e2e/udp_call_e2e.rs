use std::error::Error;
use std::time::Duration;

use serde_json::json;

use miio::crypto::cipher;
use miio::e2e_common::{DeviceEmulator, EmulatorBehavior};
use miio::handshake::transport::{TimedUdpTransport, MAX_DATAGRAM};
use miio::session::{call_with_transport, Request, ResponseCheck};

#[tokio::test]
async fn udp_call_e2e_golden_device() -> Result<(), Box<dyn Error>> {
    let mut token = [0u8; 16];
    for (i, b) in token.iter_mut().enumerate() {
        *b = i as u8;
    }
    let device = DeviceEmulator::bind_with(token, 42, 1, EmulatorBehavior::Respond(json!(["on"])))
        .await?
        .spawn()?;

    let mut transport =
        TimedUdpTransport::with_limits(device.addr, Duration::from_secs(2), MAX_DATAGRAM).await?;
    let params = vec![json!("power")];
    let raw = call_with_transport(
        &mut transport,
        &token,
        &Request::new("get_prop", &params),
        ResponseCheck::Verify,
    )
    .await?;
    drop(transport);

    let response: serde_json::Value = serde_json::from_slice(cipher::strip_padding(&raw))?;
    assert_eq!(response, json!({"id": 1, "result": ["on"]}));

    let requests = device.requests();
    assert_eq!(requests.len(), 1);
    let header = requests[0].header;
    assert_eq!(header.length, 80);
    assert_eq!(header.device_id, 42);
    assert_eq!(header.stamp, 1);
    let checksum: String = header.checksum.iter().map(|b| format!("{:02x}", b)).collect();
    assert_eq!(checksum, "4afd1243d55765f90bdbfdbacfc3f622");
    Ok(())
}
