//! Modbus 会话：链路上的合并读取与请求级重试。

use super::plan::{FunctionCode, ReadRequest, plan_requests};
use super::transport::{ModbusTransport, RtuTransport, TcpTransport};
use crate::error::{ReadError, SessionError, is_transport_down};
use crate::session::{BatchResult, ProtocolSession, SessionOptions};
use async_trait::async_trait;
use domain::Tag;
use ems_normalize::RawValue;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Modbus TCP 会话
pub type ModbusTcpSession = ModbusSession<TcpTransport>;

/// Modbus RTU 会话
pub type ModbusRtuSession = ModbusSession<RtuTransport>;

/// 一次请求的返回数据。
#[derive(Debug, Clone, PartialEq)]
enum RequestValues {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

/// 请求失败：影响成员点位，或整个会话。
enum RequestFailure {
    Read(ReadError),
    TransportDown(String),
}

/// Modbus 会话（TCP 与 RTU 共用读取逻辑）。
pub struct ModbusSession<T> {
    transport: T,
    options: SessionOptions,
    ctx: Option<Context>,
}

impl<T: ModbusTransport> ModbusSession<T> {
    pub fn new(transport: T, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            ctx: None,
        }
    }
}

#[async_trait]
impl<T: ModbusTransport> ProtocolSession for ModbusSession<T> {
    fn protocol(&self) -> &'static str {
        self.transport.protocol()
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.ctx.is_some() {
            return Ok(());
        }
        let ctx = timeout(self.options.timeout, self.transport.open())
            .await
            .map_err(|_| SessionError::ConnectTimeout(self.options.timeout_ms()))??;
        info!(
            target: "ems.protocol",
            protocol = self.transport.protocol(),
            endpoint = %self.transport.endpoint(),
            "modbus_connected"
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn read_batch(&mut self, tags: &[Tag]) -> Result<BatchResult, SessionError> {
        let ctx = self.ctx.as_mut().ok_or(SessionError::NotConnected)?;
        let result = read_all(ctx, tags, &self.options).await;
        if let Err(SessionError::TransportDown(reason)) = &result {
            warn!(
                target: "ems.protocol",
                endpoint = %self.transport.endpoint(),
                reason = %reason,
                "modbus_transport_down"
            );
            self.ctx = None;
        }
        result
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!(
                    target: "ems.protocol",
                    endpoint = %self.transport.endpoint(),
                    error = %e,
                    "modbus_disconnect_failed"
                );
            }
            info!(
                target: "ems.protocol",
                endpoint = %self.transport.endpoint(),
                "modbus_disconnected"
            );
        }
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }
}

async fn read_all(
    ctx: &mut Context,
    tags: &[Tag],
    options: &SessionOptions,
) -> Result<BatchResult, SessionError> {
    let mut results: BatchResult = vec![Err(ReadError::NoData); tags.len()];

    for request in plan_requests(tags) {
        match read_with_retry(ctx, &request, options).await {
            Ok(values) => {
                for &index in &request.members {
                    results[index] = extract(&values, request.start, &tags[index]);
                }
            }
            Err(RequestFailure::Read(err)) => {
                debug!(
                    target: "ems.protocol",
                    function = request.function as u8,
                    start = request.start,
                    count = request.count,
                    error = %err,
                    "modbus_request_failed"
                );
                for &index in &request.members {
                    results[index] = Err(err.clone());
                }
            }
            Err(RequestFailure::TransportDown(reason)) => {
                return Err(SessionError::TransportDown(reason));
            }
        }
    }
    Ok(results)
}

async fn read_with_retry(
    ctx: &mut Context,
    request: &ReadRequest,
    options: &SessionOptions,
) -> Result<RequestValues, RequestFailure> {
    let attempts = options.attempts.max(1);
    let mut last = ReadError::Timeout {
        attempts,
        timeout_ms: options.timeout_ms(),
    };

    for attempt in 1..=attempts {
        match timeout(options.timeout, execute(ctx, request)).await {
            Ok(Ok(Ok(values))) => return Ok(values),
            Ok(Ok(Err(code))) => {
                return Err(RequestFailure::Read(ReadError::Exception(u8::from(code))));
            }
            Ok(Err(tokio_modbus::Error::Transport(err))) if is_transport_down(&err) => {
                return Err(RequestFailure::TransportDown(err.to_string()));
            }
            Ok(Err(err)) => last = ReadError::Protocol(err.to_string()),
            Err(_) => {
                last = ReadError::Timeout {
                    attempts,
                    timeout_ms: options.timeout_ms(),
                }
            }
        }
        debug!(
            target: "ems.protocol",
            function = request.function as u8,
            start = request.start,
            attempt,
            attempts,
            "modbus_request_retry"
        );
    }
    Err(RequestFailure::Read(last))
}

async fn execute(
    ctx: &mut Context,
    request: &ReadRequest,
) -> Result<Result<RequestValues, tokio_modbus::ExceptionCode>, tokio_modbus::Error> {
    let (start, count) = (request.start, request.count);
    let values = match request.function {
        FunctionCode::ReadCoils => ctx.read_coils(start, count).await?.map(RequestValues::Bits),
        FunctionCode::ReadDiscreteInputs => ctx
            .read_discrete_inputs(start, count)
            .await?
            .map(RequestValues::Bits),
        FunctionCode::ReadHoldingRegisters => ctx
            .read_holding_registers(start, count)
            .await?
            .map(RequestValues::Words),
        FunctionCode::ReadInputRegisters => ctx
            .read_input_registers(start, count)
            .await?
            .map(RequestValues::Words),
    };
    Ok(values)
}

fn extract(values: &RequestValues, start: u16, tag: &Tag) -> Result<RawValue, ReadError> {
    let offset = (tag.address - start) as usize;
    match values {
        RequestValues::Bits(bits) => bits
            .get(offset)
            .map(|bit| RawValue::Bool(*bit))
            .ok_or(ReadError::ShortResponse),
        RequestValues::Words(words) => words
            .get(offset..offset + tag.size as usize)
            .map(|slice| RawValue::Registers(slice.to_vec()))
            .ok_or(ReadError::ShortResponse),
    }
}
