use domain::{DataType, Device, ProtocolConfig, Tag};
use ems_normalize::RawValue;
use ems_protocol::{
    DefaultSessionFactory, ProtocolSession, ReadError, SessionError, SessionFactory,
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// 回环上的最小 Modbus TCP 从站：记录请求，地址 ≥ 60000 返回异常码 0x02。
#[derive(Default)]
struct FakeSlave {
    registers: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    /// 起始地址在此集合中的请求不应答
    silent: HashSet<u16>,
    /// 接受连接后立即关闭
    hang_up: bool,
    requests: Mutex<Vec<(u8, u16, u16)>>,
}

impl FakeSlave {
    fn requests(&self) -> Vec<(u8, u16, u16)> {
        self.requests.lock().expect("lock").clone()
    }
}

async fn spawn_slave(slave: FakeSlave) -> (SocketAddr, Arc<FakeSlave>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let slave = Arc::new(slave);
    let shared = slave.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if shared.hang_up {
                drop(stream);
                continue;
            }
            tokio::spawn(serve(stream, shared.clone()));
        }
    });
    (addr, slave)
}

async fn serve(mut stream: TcpStream, slave: Arc<FakeSlave>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; len - 1];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }
        let function = pdu[0];
        let start = u16::from_be_bytes([pdu[1], pdu[2]]);
        let count = u16::from_be_bytes([pdu[3], pdu[4]]);
        slave
            .requests
            .lock()
            .expect("lock")
            .push((function, start, count));
        if slave.silent.contains(&start) {
            continue;
        }

        let response = if start >= 60000 {
            vec![function | 0x80, 0x02]
        } else {
            match function {
                1 | 2 => {
                    let mut bytes = vec![0u8; (count as usize).div_ceil(8)];
                    for offset in 0..count {
                        if slave.coils.get(&(start + offset)).copied().unwrap_or(false) {
                            bytes[offset as usize / 8] |= 1 << (offset % 8);
                        }
                    }
                    let mut response = vec![function, bytes.len() as u8];
                    response.extend(bytes);
                    response
                }
                3 | 4 => {
                    let mut response = vec![function, (count * 2) as u8];
                    for offset in 0..count {
                        let value = slave
                            .registers
                            .get(&(start + offset))
                            .copied()
                            .unwrap_or(0);
                        response.extend_from_slice(&value.to_be_bytes());
                    }
                    response
                }
                _ => vec![function | 0x80, 0x01],
            }
        };

        let mut frame = Vec::with_capacity(7 + response.len());
        frame.extend_from_slice(&header[0..4]);
        frame.extend_from_slice(&((response.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend(response);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn device(addr: SocketAddr, timeout_ms: u64, retry_count: u32) -> Device {
    Device {
        id: "plc-1".to_string(),
        name: "PLC".to_string(),
        serial_number: None,
        model_id: None,
        enabled: true,
        protocol: ProtocolConfig::ModbusTcp {
            host: addr.ip().to_string(),
            port: addr.port(),
            slave_id: 1,
        },
        tags: Vec::new(),
        polling_interval_ms: 1000,
        timeout_ms,
        retry_count,
        created_at_ms: 0,
        updated_at_ms: 0,
    }
}

#[tokio::test]
async fn contiguous_tags_share_one_request() {
    let mut slave = FakeSlave::default();
    slave.registers.insert(100, 500);
    slave.registers.insert(101, 0x3FC0);
    slave.registers.insert(102, 0x0000);
    slave.registers.insert(103, (-7i16) as u16);
    slave.coils.insert(10, true);
    let (addr, slave) = spawn_slave(slave).await;

    let mut session = DefaultSessionFactory
        .create(&device(addr, 1000, 1))
        .expect("session");
    session.connect().await.expect("connect");
    assert!(session.is_connected());

    let tags = vec![
        Tag::new("temperature", 100, DataType::HoldingRegister),
        Tag::new("power", 101, DataType::Float32),
        Tag::new("delta", 103, DataType::Int16),
        Tag::new("pump", 10, DataType::Coil),
    ];
    let results = session.read_batch(&tags).await.expect("read");

    assert_eq!(results[0], Ok(RawValue::Registers(vec![500])));
    assert_eq!(results[1], Ok(RawValue::Registers(vec![0x3FC0, 0x0000])));
    assert_eq!(results[2], Ok(RawValue::Registers(vec![(-7i16) as u16])));
    assert_eq!(results[3], Ok(RawValue::Bool(true)));
    assert_eq!(slave.requests(), vec![(1, 10, 1), (3, 100, 4)]);

    session.disconnect().await;
    session.disconnect().await;
    assert!(!session.is_connected());
}

#[tokio::test]
async fn exception_only_affects_its_request() {
    let mut slave = FakeSlave::default();
    slave.registers.insert(1, 42);
    let (addr, _slave) = spawn_slave(slave).await;

    let mut session = DefaultSessionFactory
        .create(&device(addr, 1000, 3))
        .expect("session");
    session.connect().await.expect("connect");

    let tags = vec![
        Tag::new("ok", 1, DataType::Uint16),
        Tag::new("missing", 60001, DataType::Uint16),
    ];
    let results = session.read_batch(&tags).await.expect("read");
    assert_eq!(results[0], Ok(RawValue::Registers(vec![42])));
    assert_eq!(results[1], Err(ReadError::Exception(0x02)));
}

#[tokio::test]
async fn unanswered_request_times_out_after_all_attempts() {
    let mut slave = FakeSlave::default();
    slave.registers.insert(1, 7);
    slave.silent.insert(500);
    let (addr, slave) = spawn_slave(slave).await;

    let mut session = DefaultSessionFactory
        .create(&device(addr, 150, 2))
        .expect("session");
    session.connect().await.expect("connect");

    let tags = vec![
        Tag::new("good", 1, DataType::Uint16),
        Tag::new("silent", 500, DataType::Uint16),
    ];
    let results = session.read_batch(&tags).await.expect("read");
    assert_eq!(results[0], Ok(RawValue::Registers(vec![7])));
    assert_eq!(
        results[1],
        Err(ReadError::Timeout {
            attempts: 2,
            timeout_ms: 150
        })
    );
    let silent_requests = slave
        .requests()
        .into_iter()
        .filter(|(_, start, _)| *start == 500)
        .count();
    assert_eq!(silent_requests, 2);
}

#[tokio::test]
async fn refused_port_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut session = DefaultSessionFactory
        .create(&device(addr, 1000, 1))
        .expect("session");
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Connection(_)), "{:?}", err);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn peer_hang_up_is_a_session_error() {
    let slave = FakeSlave {
        hang_up: true,
        ..FakeSlave::default()
    };
    let (addr, _slave) = spawn_slave(slave).await;

    let mut session = DefaultSessionFactory
        .create(&device(addr, 1000, 1))
        .expect("session");
    session.connect().await.expect("connect");

    let err = session
        .read_batch(&[Tag::new("t", 1, DataType::Uint16)])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TransportDown(_)), "{:?}", err);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn read_without_connect_is_rejected() {
    let addr: SocketAddr = "127.0.0.1:1502".parse().expect("addr");
    let mut session = DefaultSessionFactory
        .create(&device(addr, 1000, 1))
        .expect("session");
    assert!(matches!(
        session.read_batch(&[]).await,
        Err(SessionError::NotConnected)
    ));
}

#[test]
fn factory_rejects_invalid_protocol() {
    let addr: SocketAddr = "127.0.0.1:502".parse().expect("addr");
    let mut device = device(addr, 1000, 1);
    device.protocol = ProtocolConfig::ModbusTcp {
        host: "127.0.0.1".to_string(),
        port: 502,
        slave_id: 0,
    };
    assert!(matches!(
        DefaultSessionFactory.create(&device),
        Err(SessionError::Config(_))
    ));
}
