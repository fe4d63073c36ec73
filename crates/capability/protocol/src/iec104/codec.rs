//! IEC 60870-5-104 APCI/ASDU 编解码。
//!
//! ```text
//! APDU = 0x68 | len | ctrl1 ctrl2 ctrl3 ctrl4 | ASDU（仅 I 帧）
//! ASDU = type | VSQ | COT(2) | CA(2) | { IOA(3) | 信息元素 }*
//! ```
//!
//! 多字节字段均为小端序。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const START_BYTE: u8 = 0x68;

pub const STARTDT_ACT: u8 = 0x07;
pub const STARTDT_CON: u8 = 0x0B;
pub const STOPDT_ACT: u8 = 0x13;
pub const STOPDT_CON: u8 = 0x23;
pub const TESTFR_ACT: u8 = 0x43;
pub const TESTFR_CON: u8 = 0x83;

/// 单点信息
pub const M_SP_NA_1: u8 = 1;
/// 双点信息
pub const M_DP_NA_1: u8 = 3;
/// 测量值，归一化值
pub const M_ME_NA_1: u8 = 9;
/// 测量值，标度化值
pub const M_ME_NB_1: u8 = 11;
/// 测量值，短浮点数
pub const M_ME_NC_1: u8 = 13;
/// 带 CP56Time2a 时标的单点信息
pub const M_SP_TB_1: u8 = 30;
/// 带 CP56Time2a 时标的双点信息
pub const M_DP_TB_1: u8 = 31;
/// 带 CP56Time2a 时标的归一化值
pub const M_ME_TD_1: u8 = 34;
/// 带 CP56Time2a 时标的标度化值
pub const M_ME_TE_1: u8 = 35;
/// 带 CP56Time2a 时标的短浮点数
pub const M_ME_TF_1: u8 = 36;
/// 总召唤命令
pub const C_IC_NA_1: u8 = 100;

pub const COT_ACTIVATION: u8 = 6;
pub const COT_ACTIVATION_CON: u8 = 7;
pub const COT_ACTIVATION_TERM: u8 = 10;
pub const COT_INTERROGATED_BY_STATION: u8 = 20;

/// 站召唤限定词
pub const QOI_STATION: u8 = 20;

/// 序号模数（15 位）
pub const SEQ_MODULO: u16 = 32768;

const MAX_APDU_BODY: usize = 253;
const CP56TIME2A_LEN: usize = 7;
const QUALITY_INVALID: u8 = 0x80;

/// 帧错误
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// 应用协议数据单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apdu {
    /// 信息传输帧
    I {
        send_seq: u16,
        recv_seq: u16,
        asdu: Bytes,
    },
    /// 监视帧（确认）
    S { recv_seq: u16 },
    /// 未编号控制帧
    U(u8),
}

impl Apdu {
    pub fn encode(&self) -> Bytes {
        let asdu_len = match self {
            Self::I { asdu, .. } => asdu.len(),
            _ => 0,
        };
        let mut buf = BytesMut::with_capacity(6 + asdu_len);
        buf.put_u8(START_BYTE);
        buf.put_u8((4 + asdu_len) as u8);
        match self {
            Self::I {
                send_seq,
                recv_seq,
                asdu,
            } => {
                put_seq(&mut buf, *send_seq);
                put_seq(&mut buf, *recv_seq);
                buf.put_slice(asdu);
            }
            Self::S { recv_seq } => {
                buf.put_u8(0x01);
                buf.put_u8(0x00);
                put_seq(&mut buf, *recv_seq);
            }
            Self::U(function) => {
                buf.put_u8(*function);
                buf.put_slice(&[0, 0, 0]);
            }
        }
        buf.freeze()
    }

    /// 解码长度字节之后的部分（控制域 + ASDU）。
    pub fn decode(mut body: Bytes) -> Result<Self, FrameError> {
        if body.len() < 4 {
            return Err(FrameError::Malformed(format!(
                "apdu body too short: {}",
                body.len()
            )));
        }
        let control = body.split_to(4);
        let apdu = if control[0] & 0x01 == 0 {
            Self::I {
                send_seq: read_seq(control[0], control[1]),
                recv_seq: read_seq(control[2], control[3]),
                asdu: body,
            }
        } else if control[0] & 0x03 == 0x01 {
            Self::S {
                recv_seq: read_seq(control[2], control[3]),
            }
        } else {
            Self::U(control[0])
        };
        Ok(apdu)
    }
}

fn put_seq(buf: &mut BytesMut, seq: u16) {
    buf.put_u8(((seq << 1) & 0xFE) as u8);
    buf.put_u8((seq >> 7) as u8);
}

fn read_seq(low: u8, high: u8) -> u16 {
    ((low as u16) >> 1) | ((high as u16) << 7)
}

/// 从流中读取一个 APDU。
pub async fn read_apdu<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Apdu, FrameError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;
    if header[0] != START_BYTE {
        return Err(FrameError::Malformed(format!(
            "unexpected start byte 0x{:02X}",
            header[0]
        )));
    }
    let len = header[1] as usize;
    if !(4..=MAX_APDU_BODY).contains(&len) {
        return Err(FrameError::Malformed(format!("invalid apdu length {}", len)));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Apdu::decode(Bytes::from(body))
}

/// 写入一个 APDU。
pub async fn write_apdu<W: AsyncWrite + Unpin>(writer: &mut W, apdu: &Apdu) -> io::Result<()> {
    writer.write_all(&apdu.encode()).await?;
    writer.flush().await
}

/// 应用服务数据单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asdu {
    pub type_id: u8,
    /// VSQ 的 SQ 位：信息对象地址连续
    pub sequence: bool,
    /// 信息对象/元素个数
    pub count: u8,
    pub cause: u8,
    /// P/N 位：否定确认
    pub negative: bool,
    pub test: bool,
    pub originator: u8,
    pub common_address: u16,
    pub body: Bytes,
}

impl Asdu {
    pub fn parse(mut data: Bytes) -> Result<Self, FrameError> {
        if data.len() < 6 {
            return Err(FrameError::Malformed(format!(
                "asdu too short: {}",
                data.len()
            )));
        }
        let type_id = data.get_u8();
        let vsq = data.get_u8();
        let cot = data.get_u8();
        let originator = data.get_u8();
        let common_address = data.get_u16_le();
        Ok(Self {
            type_id,
            sequence: vsq & 0x80 != 0,
            count: vsq & 0x7F,
            cause: cot & 0x3F,
            negative: cot & 0x40 != 0,
            test: cot & 0x80 != 0,
            originator,
            common_address,
            body: data,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.body.len());
        buf.put_u8(self.type_id);
        buf.put_u8((self.count & 0x7F) | if self.sequence { 0x80 } else { 0 });
        let mut cot = self.cause & 0x3F;
        if self.negative {
            cot |= 0x40;
        }
        if self.test {
            cot |= 0x80;
        }
        buf.put_u8(cot);
        buf.put_u8(self.originator);
        buf.put_u16_le(self.common_address);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// 总召唤命令（激活）。
    pub fn interrogation(common_address: u16) -> Self {
        let mut body = BytesMut::with_capacity(4);
        put_ioa(&mut body, 0);
        body.put_u8(QOI_STATION);
        Self {
            type_id: C_IC_NA_1,
            sequence: false,
            count: 1,
            cause: COT_ACTIVATION,
            negative: false,
            test: false,
            originator: 0,
            common_address,
            body: body.freeze(),
        }
    }

    /// 解析监视方向的信息对象；不支持的类型返回 `None`。
    pub fn information_objects(&self) -> Option<Result<Vec<InformationObject>, FrameError>> {
        let element_len = element_len(self.type_id)?;
        Some(self.parse_objects(element_len))
    }

    fn parse_objects(&self, element_len: usize) -> Result<Vec<InformationObject>, FrameError> {
        let count = self.count as usize;
        let expected = if self.sequence {
            3 + count * element_len
        } else {
            count * (3 + element_len)
        };
        if self.body.len() < expected {
            return Err(FrameError::Malformed(format!(
                "type {} with {} objects needs {} bytes, got {}",
                self.type_id,
                count,
                expected,
                self.body.len()
            )));
        }

        let mut body = self.body.clone();
        let mut objects = Vec::with_capacity(count);
        let base = if self.sequence { get_ioa(&mut body) } else { 0 };
        for index in 0..count {
            let ioa = if self.sequence {
                base + index as u32
            } else {
                get_ioa(&mut body)
            };
            let element = body.split_to(element_len);
            objects.push(decode_element(self.type_id, ioa, element));
        }
        Ok(objects)
    }
}

/// 信息对象的值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    Bool(bool),
    Analog(f64),
    /// 双点信息的中间/不确定态
    Indeterminate,
}

/// 解析后的信息对象
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InformationObject {
    pub ioa: u32,
    pub value: PointValue,
    /// IV 位
    pub invalid: bool,
}

fn element_len(type_id: u8) -> Option<usize> {
    let len = match type_id {
        M_SP_NA_1 | M_DP_NA_1 => 1,
        M_ME_NA_1 | M_ME_NB_1 => 3,
        M_ME_NC_1 => 5,
        M_SP_TB_1 | M_DP_TB_1 => 1 + CP56TIME2A_LEN,
        M_ME_TD_1 | M_ME_TE_1 => 3 + CP56TIME2A_LEN,
        M_ME_TF_1 => 5 + CP56TIME2A_LEN,
        _ => return None,
    };
    Some(len)
}

fn decode_element(type_id: u8, ioa: u32, mut element: Bytes) -> InformationObject {
    let (value, quality) = match type_id {
        M_SP_NA_1 | M_SP_TB_1 => {
            let siq = element.get_u8();
            (PointValue::Bool(siq & 0x01 != 0), siq)
        }
        M_DP_NA_1 | M_DP_TB_1 => {
            let diq = element.get_u8();
            let value = match diq & 0x03 {
                1 => PointValue::Bool(false),
                2 => PointValue::Bool(true),
                _ => PointValue::Indeterminate,
            };
            (value, diq)
        }
        M_ME_NA_1 | M_ME_TD_1 => {
            let nva = element.get_i16_le();
            let qds = element.get_u8();
            (PointValue::Analog(nva as f64 / 32768.0), qds)
        }
        M_ME_NB_1 | M_ME_TE_1 => {
            let sva = element.get_i16_le();
            let qds = element.get_u8();
            (PointValue::Analog(sva as f64), qds)
        }
        _ => {
            let value = element.get_f32_le();
            let qds = element.get_u8();
            (PointValue::Analog(value as f64), qds)
        }
    };
    InformationObject {
        ioa,
        value,
        invalid: quality & QUALITY_INVALID != 0,
    }
}

pub fn put_ioa(buf: &mut BytesMut, ioa: u32) {
    buf.put_u8(ioa as u8);
    buf.put_u8((ioa >> 8) as u8);
    buf.put_u8((ioa >> 16) as u8);
}

fn get_ioa(buf: &mut Bytes) -> u32 {
    let low = buf.get_u8() as u32;
    let mid = buf.get_u8() as u32;
    let high = buf.get_u8() as u32;
    low | (mid << 8) | (high << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u_frames_encode_to_six_bytes() {
        assert_eq!(
            Apdu::U(STARTDT_ACT).encode().as_ref(),
            &[0x68, 0x04, 0x07, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            Apdu::decode(Bytes::from_static(&[0x0B, 0, 0, 0])).unwrap(),
            Apdu::U(STARTDT_CON)
        );
    }

    #[test]
    fn sequence_numbers_use_fifteen_bits() {
        let frame = Apdu::I {
            send_seq: 300,
            recv_seq: 32767,
            asdu: Bytes::from_static(&[1, 2, 3, 4, 5, 6]),
        };
        let encoded = frame.encode();
        assert_eq!(encoded[1] as usize, encoded.len() - 2);
        assert_eq!(Apdu::decode(encoded.slice(2..)).unwrap(), frame);

        let ack = Apdu::S { recv_seq: 129 };
        assert_eq!(Apdu::decode(ack.encode().slice(2..)).unwrap(), ack);
    }

    #[test]
    fn interrogation_layout() {
        let asdu = Asdu::interrogation(0xFFFF).encode();
        assert_eq!(
            asdu.as_ref(),
            &[C_IC_NA_1, 0x01, COT_ACTIVATION, 0x00, 0xFF, 0xFF, 0, 0, 0, QOI_STATION]
        );
    }

    #[test]
    fn float_objects_with_invalid_flag() {
        let mut body = BytesMut::new();
        put_ioa(&mut body, 1001);
        body.put_f32_le(230.5);
        body.put_u8(0x00);
        put_ioa(&mut body, 1002);
        body.put_f32_le(1.0);
        body.put_u8(0x80);
        let asdu = Asdu {
            type_id: M_ME_NC_1,
            sequence: false,
            count: 2,
            cause: COT_INTERROGATED_BY_STATION,
            negative: false,
            test: false,
            originator: 0,
            common_address: 1,
            body: body.freeze(),
        };
        let parsed = Asdu::parse(asdu.encode()).unwrap();
        let objects = parsed.information_objects().unwrap().unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].ioa, 1001);
        assert_eq!(objects[0].value, PointValue::Analog(230.5));
        assert!(!objects[0].invalid);
        assert!(objects[1].invalid);
    }

    #[test]
    fn sequence_bit_increments_ioa() {
        let mut body = BytesMut::new();
        put_ioa(&mut body, 10);
        body.put_u8(0x01);
        body.put_u8(0x00);
        body.put_u8(0x02);
        let asdu = Asdu {
            type_id: M_SP_NA_1,
            sequence: true,
            count: 3,
            cause: COT_INTERROGATED_BY_STATION,
            negative: false,
            test: false,
            originator: 0,
            common_address: 1,
            body: body.freeze(),
        };
        let objects = asdu.information_objects().unwrap().unwrap();
        let ioas: Vec<u32> = objects.iter().map(|o| o.ioa).collect();
        assert_eq!(ioas, vec![10, 11, 12]);
        assert_eq!(objects[0].value, PointValue::Bool(true));
        assert_eq!(objects[1].value, PointValue::Bool(false));
        assert_eq!(objects[2].value, PointValue::Bool(false));
    }

    #[test]
    fn normalized_and_double_point_values() {
        let mut body = BytesMut::new();
        put_ioa(&mut body, 5);
        body.put_i16_le(16384);
        body.put_u8(0);
        let asdu = Asdu {
            type_id: M_ME_NA_1,
            sequence: false,
            count: 1,
            cause: COT_INTERROGATED_BY_STATION,
            negative: false,
            test: false,
            originator: 0,
            common_address: 1,
            body: body.freeze(),
        };
        let objects = asdu.information_objects().unwrap().unwrap();
        assert_eq!(objects[0].value, PointValue::Analog(0.5));

        let mut body = BytesMut::new();
        put_ioa(&mut body, 6);
        body.put_u8(0x03);
        let asdu = Asdu {
            type_id: M_DP_NA_1,
            body: body.freeze(),
            ..asdu
        };
        let objects = asdu.information_objects().unwrap().unwrap();
        assert_eq!(objects[0].value, PointValue::Indeterminate);
    }

    #[test]
    fn truncated_body_is_malformed() {
        let asdu = Asdu {
            type_id: M_ME_NC_1,
            sequence: false,
            count: 2,
            cause: COT_INTERROGATED_BY_STATION,
            negative: false,
            test: false,
            originator: 0,
            common_address: 1,
            body: Bytes::from_static(&[1, 0, 0, 0, 0]),
        };
        assert!(matches!(
            asdu.information_objects(),
            Some(Err(FrameError::Malformed(_)))
        ));
        let unknown = Asdu {
            type_id: 45,
            ..asdu
        };
        assert!(unknown.information_objects().is_none());
    }
}
