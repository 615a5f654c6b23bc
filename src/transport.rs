//! One JSON datagram per fused frame.

use std::net::{SocketAddr, UdpSocket};

use crate::{Result, types::OutputRecord};

pub trait RecordSink {
    fn send(&mut self, record: &OutputRecord) -> Result<()>;
}

pub fn encode_record(record: &OutputRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

pub fn decode_record(payload: &[u8]) -> Result<OutputRecord> {
    Ok(serde_json::from_slice(payload)?)
}

pub struct UdpTransport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    pub fn new(destination: SocketAddr) -> Result<Self> {
        let bind_addr = if destination.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        log::info!(
            "sending records from {} to {destination}",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl RecordSink for UdpTransport {
    fn send(&mut self, record: &OutputRecord) -> Result<()> {
        let payload = encode_record(record)?;
        self.socket.send_to(&payload, self.destination)?;
        Ok(())
    }
}

/// Keeps every record in memory; used for replay runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<OutputRecord>,
}

impl RecordSink for MemorySink {
    fn send(&mut self, record: &OutputRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expression::Expression,
        gesture::GestureLabel,
        types::{HeadPose, Keypoint},
    };
    use std::time::Duration;

    fn sample() -> OutputRecord {
        let mut body_pose = vec![None; 18];
        body_pose[1] = Some(Keypoint {
            id: 1,
            x: 320,
            y: 200,
            conf: 0.75,
        });
        OutputRecord {
            face_found: true,
            head_pose: HeadPose {
                pitch: -4.5,
                yaw: 12.25,
                roll: 0.5,
            },
            expression: Expression::Happy,
            hand_found: true,
            gesture: GestureLabel::ThankYou,
            sign_asl: "hello".to_string(),
            sign_conf: 0.875,
            asl_char: "A".to_string(),
            current_text: "HI".to_string(),
            body_pose,
        }
    }

    #[test]
    fn wire_format_field_names() {
        let value: serde_json::Value = serde_json::from_slice(&encode_record(&sample()).unwrap()).unwrap();
        assert_eq!(value["expression"], "happy");
        assert_eq!(value["gesture"], "thank_you");
        assert_eq!(value["head_pose"]["yaw"], 12.25);
        assert_eq!(value["body_pose"].as_array().unwrap().len(), 18);
        assert!(value["body_pose"][0].is_null());
        assert_eq!(value["body_pose"][1]["x"], 320);
    }

    #[test]
    fn decode_restores_record() {
        let record = sample();
        let decoded = decode_record(&encode_record(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn udp_delivers_one_datagram_per_record() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut transport = UdpTransport::new(receiver.local_addr().unwrap()).unwrap();

        transport.send(&sample()).unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(decode_record(&buf[..len]).unwrap(), sample());
    }
}
