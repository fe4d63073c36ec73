//! IEC 104 会话：STARTDT 握手、总召唤、按 IOA 映射点位。

use super::codec::{
    Apdu, Asdu, C_IC_NA_1, COT_ACTIVATION_TERM, FrameError, PointValue, SEQ_MODULO, STARTDT_ACT,
    STARTDT_CON, STOPDT_ACT, TESTFR_ACT, TESTFR_CON, read_apdu, write_apdu,
};
use crate::error::{ReadError, SessionError};
use crate::session::{BatchResult, ProtocolSession, SessionOptions};
use async_trait::async_trait;
use domain::Tag;
use ems_normalize::RawValue;
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

/// 未确认 I 帧达到该数量时发送 S 帧（w 参数）。
const ACK_WINDOW: u16 = 8;

/// IEC 104 连接配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iec104Config {
    pub host: String,
    pub port: u16,
    /// 总召唤目标公共地址
    pub common_address: u16,
}

/// 已建立的链路及其序号状态。
struct Link {
    stream: TcpStream,
    send_seq: u16,
    recv_seq: u16,
    unacked: u16,
}

impl Link {
    async fn send(&mut self, apdu: &Apdu) -> Result<(), SessionError> {
        write_apdu(&mut self.stream, apdu)
            .await
            .map_err(|e| SessionError::TransportDown(e.to_string()))
    }

    async fn send_asdu(&mut self, asdu: &Asdu) -> Result<(), SessionError> {
        let apdu = Apdu::I {
            send_seq: self.send_seq,
            recv_seq: self.recv_seq,
            asdu: asdu.encode(),
        };
        self.send(&apdu).await?;
        self.send_seq = (self.send_seq + 1) % SEQ_MODULO;
        self.unacked = 0;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Apdu, SessionError> {
        read_apdu(&mut self.stream).await.map_err(|e| match e {
            FrameError::Io(err) => SessionError::TransportDown(err.to_string()),
            FrameError::Malformed(reason) => SessionError::TransportDown(reason),
        })
    }

    /// 记录收到的 I 帧，必要时确认。
    async fn track_received(&mut self) -> Result<(), SessionError> {
        self.recv_seq = (self.recv_seq + 1) % SEQ_MODULO;
        self.unacked += 1;
        if self.unacked >= ACK_WINDOW {
            self.acknowledge().await?;
        }
        Ok(())
    }

    async fn acknowledge(&mut self) -> Result<(), SessionError> {
        if self.unacked == 0 {
            return Ok(());
        }
        let ack = Apdu::S {
            recv_seq: self.recv_seq,
        };
        self.send(&ack).await?;
        self.unacked = 0;
        Ok(())
    }
}

/// IEC 104 会话
pub struct Iec104Session {
    config: Iec104Config,
    options: SessionOptions,
    link: Option<Link>,
}

impl Iec104Session {
    pub fn new(config: Iec104Config, options: SessionOptions) -> Self {
        Self {
            config,
            options,
            link: None,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn open(&self) -> Result<Link, SessionError> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let mut link = Link {
            stream,
            send_seq: 0,
            recv_seq: 0,
            unacked: 0,
        };

        link.send(&Apdu::U(STARTDT_ACT)).await?;
        loop {
            match link.receive().await {
                Ok(Apdu::U(STARTDT_CON)) => return Ok(link),
                Ok(Apdu::U(TESTFR_ACT)) => link.send(&Apdu::U(TESTFR_CON)).await?,
                Ok(other) => debug!(
                    target: "ems.protocol",
                    endpoint = %self.endpoint(),
                    frame = ?other,
                    "iec104_frame_before_startdt_con"
                ),
                Err(SessionError::TransportDown(reason)) => {
                    return Err(SessionError::Connection(format!(
                        "startdt handshake failed: {}",
                        reason
                    )));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// 执行一次总召唤，收集上报值直到激活终止或截止时间。返回是否收到激活终止。
    async fn interrogate(
        link: &mut Link,
        common_address: u16,
        deadline: Instant,
        values: &mut HashMap<u32, Result<RawValue, ReadError>>,
    ) -> Result<bool, SessionError> {
        link.send_asdu(&Asdu::interrogation(common_address)).await?;

        loop {
            let apdu = match timeout_at(deadline, link.receive()).await {
                Ok(received) => received?,
                Err(_) => return Ok(false),
            };
            match apdu {
                Apdu::I { asdu, .. } => {
                    link.track_received().await?;
                    let asdu = match Asdu::parse(asdu) {
                        Ok(asdu) => asdu,
                        Err(e) => {
                            warn!(target: "ems.protocol", error = %e, "iec104_asdu_invalid");
                            continue;
                        }
                    };
                    if asdu.type_id == C_IC_NA_1 {
                        if asdu.negative {
                            warn!(
                                target: "ems.protocol",
                                cause = asdu.cause,
                                common_address,
                                "iec104_interrogation_rejected"
                            );
                            return Ok(true);
                        }
                        if asdu.cause == COT_ACTIVATION_TERM {
                            return Ok(true);
                        }
                        continue;
                    }
                    match asdu.information_objects() {
                        Some(Ok(objects)) => {
                            for object in objects {
                                values.insert(object.ioa, to_raw(object.value, object.invalid));
                            }
                        }
                        Some(Err(e)) => {
                            warn!(
                                target: "ems.protocol",
                                type_id = asdu.type_id,
                                error = %e,
                                "iec104_objects_invalid"
                            );
                        }
                        None => debug!(
                            target: "ems.protocol",
                            type_id = asdu.type_id,
                            "iec104_type_ignored"
                        ),
                    }
                }
                Apdu::U(TESTFR_ACT) => link.send(&Apdu::U(TESTFR_CON)).await?,
                Apdu::U(_) | Apdu::S { .. } => {}
            }
        }
    }
}

fn to_raw(value: PointValue, invalid: bool) -> Result<RawValue, ReadError> {
    if invalid {
        return Err(ReadError::InvalidQuality);
    }
    match value {
        PointValue::Bool(flag) => Ok(RawValue::Bool(flag)),
        PointValue::Analog(number) => Ok(RawValue::Analog(number)),
        PointValue::Indeterminate => Err(ReadError::InvalidQuality),
    }
}

#[async_trait]
impl ProtocolSession for Iec104Session {
    fn protocol(&self) -> &'static str {
        "iec104"
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.link.is_some() {
            return Ok(());
        }
        let link = timeout(self.options.timeout, self.open())
            .await
            .map_err(|_| SessionError::ConnectTimeout(self.options.timeout_ms()))??;
        info!(
            target: "ems.protocol",
            endpoint = %self.endpoint(),
            common_address = self.config.common_address,
            "iec104_connected"
        );
        self.link = Some(link);
        Ok(())
    }

    async fn read_batch(&mut self, tags: &[Tag]) -> Result<BatchResult, SessionError> {
        let common_address = self.config.common_address;
        let attempts = self.options.attempts.max(1);
        let link = self.link.as_mut().ok_or(SessionError::NotConnected)?;

        let mut values = HashMap::new();
        let mut outcome = Ok(());
        for attempt in 1..=attempts {
            let deadline = Instant::now() + self.options.timeout;
            match Self::interrogate(link, common_address, deadline, &mut values).await {
                Ok(true) => break,
                Ok(false) => {
                    let complete = tags
                        .iter()
                        .all(|tag| values.contains_key(&(tag.address as u32)));
                    if complete {
                        break;
                    }
                    debug!(
                        target: "ems.protocol",
                        attempt,
                        attempts,
                        received = values.len(),
                        "iec104_interrogation_timeout"
                    );
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        if outcome.is_ok() {
            outcome = link.acknowledge().await;
        }

        if let Err(e) = outcome {
            warn!(
                target: "ems.protocol",
                endpoint = %self.endpoint(),
                error = %e,
                "iec104_transport_down"
            );
            self.link = None;
            return Err(e);
        }

        Ok(tags
            .iter()
            .map(|tag| {
                values
                    .get(&(tag.address as u32))
                    .cloned()
                    .unwrap_or(Err(ReadError::NoData))
            })
            .collect())
    }

    async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            let stop = link.send(&Apdu::U(STOPDT_ACT));
            if timeout(self.options.timeout, stop).await.is_err() {
                debug!(
                    target: "ems.protocol",
                    endpoint = %self.endpoint(),
                    "iec104_stopdt_timeout"
                );
            }
            info!(
                target: "ems.protocol",
                endpoint = %self.endpoint(),
                "iec104_disconnected"
            );
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
