//! Integration tests for the MQTT link
//!
//! A scripted MQTT 3.1.1 broker on an ephemeral port plays the other side
//! of the connection, so every test sees the exact packets the driver
//! writes and controls when acknowledgements arrive.


use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use hestia_core::{BridgeConfig, BridgeConfigBuilder, ReconnectConfig};

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A control packet as read off the wire
#[derive(Debug)]
pub struct RawPacket {
    pub header: u8,
    pub body: Vec<u8>,
}

impl RawPacket {
    pub fn kind(&self) -> u8 {
        self.header >> 4
    }

    /// Topic filters of a SUBSCRIBE, in packet order
    pub fn subscribe_filters(&self) -> Vec<String> {
        assert_eq!(self.kind(), SUBSCRIBE, "not a SUBSCRIBE: {:?}", self);
        let mut filters = Vec::new();
        let mut at = 2;
        while at < self.body.len() {
            let (filter, next) = read_string(&self.body, at);
            filters.push(filter);
            // Requested QoS byte
            at = next + 1;
        }
        filters
    }

    /// Topic and payload of a PUBLISH
    pub fn publish(&self) -> (String, Vec<u8>) {
        assert_eq!(self.kind(), PUBLISH, "not a PUBLISH: {:?}", self);
        let qos = (self.header >> 1) & 0x03;
        let (topic, mut at) = read_string(&self.body, 0);
        if qos > 0 {
            at += 2;
        }
        (topic, self.body[at..].to_vec())
    }

    fn packet_id(&self) -> [u8; 2] {
        [self.body[0], self.body[1]]
    }
}

fn read_string(buf: &[u8], at: usize) -> (String, usize) {
    let len = u16::from_be_bytes([buf[at], buf[at + 1]]) as usize;
    let start = at + 2;
    let value = String::from_utf8(buf[start..start + len].to_vec()).unwrap();
    (value, start + len)
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Broker side of one client connection
pub struct BrokerConn {
    stream: TcpStream,
}

impl BrokerConn {
    /// Read the next packet, answering keep-alive pings transparently
    pub async fn read(&mut self) -> RawPacket {
        loop {
            let packet = tokio::time::timeout(READ_TIMEOUT, self.read_raw())
                .await
                .expect("timed out waiting for a packet from the client");
            if packet.kind() == PINGREQ {
                self.stream.write_all(&[0xD0, 0x00]).await.unwrap();
                continue;
            }
            return packet;
        }
    }

    async fn read_raw(&mut self) -> RawPacket {
        let header = self.stream.read_u8().await.unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.stream.read_u8().await.unwrap();
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        self.stream.read_exact(&mut body).await.unwrap();
        RawPacket { header, body }
    }

    /// Expect CONNECT and accept it
    pub async fn accept_connect(&mut self) {
        let packet = self.read().await;
        assert_eq!(packet.kind(), CONNECT, "expected CONNECT, got {:?}", packet);
        self.stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
    }

    /// Expect SUBSCRIBE, grant every filter at QoS 0 and return the filters
    pub async fn accept_subscribe(&mut self) -> Vec<String> {
        let packet = self.read().await;
        let filters = packet.subscribe_filters();
        self.suback(&packet, filters.len()).await;
        filters
    }

    async fn suback(&mut self, subscribe: &RawPacket, granted: usize) {
        let mut out = vec![0x90];
        encode_remaining_length(2 + granted, &mut out);
        out.extend_from_slice(&subscribe.packet_id());
        out.extend(std::iter::repeat(0x00).take(granted));
        self.stream.write_all(&out).await.unwrap();
    }

    /// Send a QoS 0 PUBLISH to the client
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) {
        let mut out = vec![0x30];
        encode_remaining_length(2 + topic.len() + payload.len(), &mut out);
        out.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        out.extend_from_slice(topic.as_bytes());
        out.extend_from_slice(payload);
        self.stream.write_all(&out).await.unwrap();
    }

    /// Whether the next packet is a DISCONNECT
    pub async fn reads_disconnect(&mut self) -> bool {
        self.read().await.kind() == DISCONNECT
    }
}

/// Listening side of the scripted broker
pub struct ScriptedBroker {
    listener: TcpListener,
}

impl ScriptedBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Accept the next client connection
    pub async fn accept(&self) -> BrokerConn {
        let (stream, _) = tokio::time::timeout(READ_TIMEOUT, self.listener.accept())
            .await
            .expect("client did not connect")
            .unwrap();
        BrokerConn { stream }
    }

    /// Accept a connection and complete CONNECT and SUBSCRIBE
    pub async fn accept_session(&self) -> (BrokerConn, Vec<String>) {
        let mut conn = self.accept().await;
        conn.accept_connect().await;
        let filters = conn.accept_subscribe().await;
        (conn, filters)
    }

    /// Bridge config pointed at this broker with fast, unlimited retries
    pub fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfigBuilder::new()
            .broker("127.0.0.1", self.port())
            .build()
            .unwrap();
        config.mqtt.keep_alive = Duration::from_secs(60);
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: 0,
        };
        config
    }
}
